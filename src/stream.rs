//! The streaming response object.
//!
//! A [`Stream`] is the caller's handle to an in-progress response body. It
//! owns the connection lease for exactly as long as the body is unread:
//! the moment the last body byte is consumed, the connection goes back to
//! its pool (or is closed, when keep-alive forbids reuse). Dropping a
//! stream with an unread body drains it first so the connection is not
//! poisoned for the next request.

use std::io::{self, Read};

use http::{HeaderMap, StatusCode};

use crate::conn::{Framing, ResponseHead};
use crate::pool::PooledConn;
use crate::response::Response;
use crate::sync::Deadline;
use crate::Error;

pub struct Stream {
    // Present while the body is being read; released at body end.
    handle: Option<PooledConn>,
    status: StatusCode,
    headers: HeaderMap,
    framing: Framing,
    history: Vec<Response>,
    deadline: Deadline,
}

impl Stream {
    pub(crate) fn new(handle: PooledConn, head: ResponseHead) -> Self {
        let mut stream = Stream {
            handle: Some(handle),
            status: head.status,
            headers: head.headers,
            framing: head.framing,
            history: Vec::new(),
            deadline: Deadline::none(),
        };
        if stream.framing.is_done() {
            // No body at all (HEAD, 204, 304, 1xx): the lease ends now.
            stream.release();
        }
        stream
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// One header value as a string, if present and well-formed.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Prior responses from redirects, oldest first.
    pub fn history(&self) -> &[Response] {
        &self.history
    }

    pub(crate) fn prepend_history(&mut self, mut earlier: Vec<Response>) {
        earlier.append(&mut self.history);
        self.history = earlier;
    }

    pub(crate) fn take_history(&mut self) -> Vec<Response> {
        std::mem::take(&mut self.history)
    }

    /// Bound subsequent body reads by `deadline`.
    pub fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline = deadline;
    }

    /// Error out on 4xx/5xx statuses; never raised implicitly.
    pub fn throw_if_error(&self) -> Result<&Self, Error> {
        if self.status.is_client_error() || self.status.is_server_error() {
            Err(Error::Status(self.status.as_u16()))
        } else {
            Ok(self)
        }
    }

    /// Read up to `buf.len()` body bytes.
    ///
    /// Returns [`Error::Eof`] once the body has been fully consumed and
    /// [`Error::NotConnected`] if the stream never had a response.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.framing.is_done() {
            return Err(Error::Eof);
        }
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::NotConnected);
        };

        let conn = handle.conn_mut();
        conn.apply_read_deadline(&self.deadline)?;
        let result = conn.read_body_some(&mut self.framing, buf);

        match result {
            Ok(n) => {
                if self.framing.is_done() {
                    self.release();
                }
                Ok(n)
            }
            Err(e) => {
                // A failed body read leaves unknown state on the wire; the
                // connection must not serve another request.
                if let Some(handle) = self.handle.as_mut() {
                    handle.conn_mut().mark_close();
                }
                self.release();
                Err(e)
            }
        }
    }

    /// Read the remaining body into `out`, growing it. Returns bytes added.
    pub fn read(&mut self, out: &mut Vec<u8>) -> Result<usize, Error> {
        let mut buf = [0u8; 16 * 1024];
        let mut total = 0;
        loop {
            let n = self.do_read(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    /// Read and discard the rest of the body.
    pub fn dump(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; 16 * 1024];
        while self.do_read(&mut buf)? > 0 {}
        Ok(())
    }

    /// Remaining body as bytes.
    pub fn bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.read(&mut out)?;
        Ok(out)
    }

    /// Remaining body as text, replacing invalid UTF-8.
    pub fn text(&mut self) -> Result<String, Error> {
        Ok(String::from_utf8_lossy(&self.bytes()?).into_owned())
    }

    /// Remaining body deserialized from JSON.
    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, Error> {
        let bytes = self.bytes()?;
        serde_json::from_slice(&bytes).map_err(|e| Error::HttpParse(format!("json body: {}", e)))
    }

    /// Buffer everything left and turn the stream into a [`Response`],
    /// carrying the history along.
    pub fn into_response(mut self) -> Result<Response, Error> {
        let body = Stream::bytes(&mut self)?;
        Ok(Response {
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            body,
            history: std::mem::take(&mut self.history),
        })
    }

    // Like read_some but with io-style Ok(0) at end of body.
    fn do_read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.read_some(buf) {
            Ok(n) => Ok(n),
            Err(Error::Eof) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn release(&mut self) {
        // Dropping the lease returns or closes the connection.
        self.handle.take();
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.do_read(buf).map_err(|e| e.into_io())
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.handle.is_some() && !self.framing.is_done() {
            // Best effort: drain so the connection can be reused. Failures
            // closed the connection already.
            let _ = self.dump();
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream[status: {}, body done: {}]",
            self.status,
            self.framing.is_done()
        )
    }
}
