//! Protocol upgrades (`Upgrade: websocket`).
//!
//! The upgrade request is an ordinary `ropen`; what changes is ownership:
//! once the server answers `101 Switching Protocols`, the connection
//! leaves its pool for good and belongs to the returned [`Upgraded`]
//! handle. Websocket framing on top of it is out of scope.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::io::{self, Read, Write};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use http::header::{CONNECTION, UPGRADE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::cookie::CookieJar;
use crate::conn::Connection;
use crate::pool::PooledConn;
use crate::source::Empty;
use crate::sync::Deadline;
use crate::Error;

/// A connection whose ownership was transferred out of the pool by a
/// successful upgrade. Reads and writes go straight to the transport.
pub struct Upgraded {
    conn: Connection,
    status: StatusCode,
    headers: HeaderMap,
}

impl Upgraded {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn close(&mut self) {
        self.conn.close();
    }
}

impl Read for Upgraded {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.conn.read(buf)
    }
}

impl Write for Upgraded {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.conn.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.conn.flush()
    }
}

impl std::fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Upgraded[{}]", self.status)
    }
}

/// Send the upgrade handshake on a pooled connection and detach it.
pub(crate) fn perform_upgrade(
    mut handle: PooledConn,
    target: &str,
    headers: &HeaderMap,
    jar: Option<&CookieJar>,
    deadline: &Deadline,
) -> Result<Upgraded, Error> {
    let mut headers = headers.clone();
    if !headers.contains_key(CONNECTION) {
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    }
    if !headers.contains_key(UPGRADE) {
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    }
    if !headers.contains_key("sec-websocket-version") {
        headers.insert("sec-websocket-version", HeaderValue::from_static("13"));
    }
    if !headers.contains_key("sec-websocket-key") {
        let key = nonce_key();
        let value = HeaderValue::from_str(&key)
            .map_err(|_| Error::InvalidHeader("sec-websocket-key"))?;
        headers.insert("sec-websocket-key", value);
    }

    let head = handle
        .conn_mut()
        .ropen(&Method::GET, target, &headers, &mut Empty, jar, deadline)?;

    if head.status != StatusCode::SWITCHING_PROTOCOLS {
        // Connection handle drops here and goes back to the pool.
        return Err(Error::Status(head.status.as_u16()));
    }

    debug!("upgraded connection on {}", target);

    Ok(Upgraded {
        conn: handle.detach(),
        status: head.status,
        headers: head.headers,
    })
}

// 16 random-ish bytes, base64 encoded. The key only has to be fresh per
// request, not cryptographically strong.
fn nonce_key() -> String {
    let mut raw = [0u8; 16];
    for chunk in raw.chunks_mut(8) {
        let v = RandomState::new().build_hasher().finish().to_ne_bytes();
        chunk.copy_from_slice(&v[..chunk.len()]);
    }
    BASE64_STANDARD.encode(raw)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nonce_is_fresh_and_decodable() {
        let a = nonce_key();
        let b = nonce_key();
        assert_ne!(a, b);
        assert_eq!(BASE64_STANDARD.decode(&a).unwrap().len(), 16);
    }
}
