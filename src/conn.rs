//! A single HTTP/1.1 connection: one transport, one exchange at a time.
//!
//! The pool moves `Connection` values out to exactly one holder, so the
//! single-in-flight invariant is enforced by ownership. `ropen` performs
//! the full request/response-head exchange and hands back a
//! [`ResponseHead`] whose [`Framing`] drives subsequent body reads.

use std::io::{self, Read, Write};
use std::time::SystemTime;

use http::header::{
    ACCEPT, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, SET_COOKIE, TRANSFER_ENCODING,
    USER_AGENT,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

use crate::chunked::{self, ChunkedDecoder};
use crate::cookie::{self, CookieJar};
use crate::endpoint::Endpoint;
use crate::fields::keep_alive::parse_keep_alive;
use crate::source::Source;
use crate::sync::Deadline;
use crate::transport::Transport;
use crate::util::validate_hostname;
use crate::Error;

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("reqwell/", env!("CARGO_PKG_VERSION"));

// Prefetch size for sources of unknown length; if the first read drains
// the source we can still send Content-Length instead of chunking.
const PREFETCH_SIZE: usize = 16 * 1024;

const MAX_RESPONSE_HEAD: usize = 64 * 1024;

/// Keep-alive budget for a connection, updated from each response.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct KeepAliveState {
    pub deadline: Option<SystemTime>,
    pub remaining: Option<u64>,
}

impl KeepAliveState {
    pub fn usable(&self, now: SystemTime) -> bool {
        if matches!(self.remaining, Some(0)) {
            return false;
        }
        !matches!(self.deadline, Some(t) if t <= now)
    }
}

/// How the response body is delimited on the wire.
#[derive(Debug)]
pub(crate) enum Framing {
    /// No body (or already fully consumed).
    Done,
    /// `Content-Length` countdown.
    Length(u64),
    /// `Transfer-Encoding: chunked` de-framing.
    Chunked(ChunkedDecoder),
    /// Body runs until the server closes.
    Close,
}

impl Framing {
    pub fn is_done(&self) -> bool {
        matches!(self, Framing::Done)
    }
}

/// Status line and headers of a response, plus the body framing that the
/// stream uses to continue reading.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub framing: Framing,
}

#[derive(Debug)]
pub struct Connection {
    transport: Option<Transport>,
    endpoint: Endpoint,
    host: String,
    // Bytes read past the end of the response head.
    leftover: Vec<u8>,
    keep_alive: KeepAliveState,
    close_after_response: bool,
    // Deadline governing reads; socket timeouts are poll intervals and
    // reads retry until this says stop.
    read_deadline: Deadline,
}

impl Connection {
    /// A connection bound to `endpoint` with `host` used for SNI,
    /// verification and `Host` synthesis. Starts unconnected.
    pub(crate) fn new(endpoint: Endpoint, host: &str) -> Result<Self, Error> {
        let mut conn = Connection {
            transport: None,
            endpoint,
            host: String::new(),
            leftover: Vec::new(),
            keep_alive: KeepAliveState::default(),
            close_after_response: false,
            read_deadline: Deadline::none(),
        };
        conn.set_host(host)?;
        Ok(conn)
    }

    /// Bind the hostname used for SNI/verification and `Host` synthesis.
    pub(crate) fn set_host(&mut self, name: &str) -> Result<(), Error> {
        if !matches!(self.endpoint, Endpoint::Unix(_)) {
            validate_hostname(name)?;
        }
        self.host = name.to_ascii_lowercase();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn keep_alive(&self) -> KeepAliveState {
        self.keep_alive
    }

    pub(crate) fn mark_close(&mut self) {
        self.close_after_response = true;
    }

    pub(crate) fn must_close(&self) -> bool {
        self.close_after_response
    }

    /// Open the transport (closing any previous one) and, for TLS
    /// endpoints, complete the verified handshake.
    pub(crate) fn connect(&mut self, deadline: &Deadline) -> Result<(), Error> {
        if self.transport.is_some() {
            self.close();
        }
        debug!("connect {} ({})", self.endpoint, self.host);
        let transport = Transport::connect(&self.endpoint, &self.host, deadline)?;
        self.transport = Some(transport);
        self.leftover.clear();
        self.keep_alive = KeepAliveState::default();
        self.close_after_response = false;
        Ok(())
    }

    /// Graceful close; safe to call repeatedly.
    pub(crate) fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            debug!("close {}", self.endpoint);
            transport.shutdown();
        }
        self.leftover.clear();
    }

    pub(crate) fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Open and idle, within its keep-alive budget.
    pub(crate) fn is_reusable(&self, now: SystemTime) -> bool {
        self.is_open() && !self.close_after_response && self.keep_alive.usable(now)
    }

    /// Perform one request and read the response head. No redirect
    /// handling; that is the session's loop.
    pub(crate) fn ropen(
        &mut self,
        method: &Method,
        target: &str,
        headers: &HeaderMap,
        source: &mut dyn Source,
        jar: Option<&CookieJar>,
        deadline: &Deadline,
    ) -> Result<ResponseHead, Error> {
        if self.transport.is_none() {
            return Err(Error::NotConnected);
        }

        // This use consumes one request of the advertised budget.
        if let Some(remaining) = self.keep_alive.remaining {
            self.keep_alive.remaining = Some(remaining.saturating_sub(1));
        }

        let body = match self.plan_body(source) {
            Ok(v) => v,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        let head = self.build_head(method, target, headers, source, &body, jar)?;

        trace!("{} {} ({} header bytes)", method, target, head.len());

        if let Err(e) = self.send_request(&head, body, source, deadline) {
            // A partially written request poisons the connection.
            self.close();
            return Err(e);
        }

        let (status, response_headers, version_minor) = loop {
            let raw = match self.read_head(deadline) {
                Ok(v) => v,
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            };
            let (status, response_headers, version_minor) = match parse_head(&raw) {
                Ok(v) => v,
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            };
            // 100 Continue and other non-upgrade interim responses are
            // skipped; the real response follows.
            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                continue;
            }
            break (status, response_headers, version_minor);
        };

        debug!("{} {} -> {}", method, target, status);

        if let Some(jar) = jar {
            apply_set_cookie(jar, &response_headers, &self.host, target);
        }

        self.update_keep_alive(&response_headers, version_minor);

        let framing = response_framing(method, status, &response_headers)?;
        if matches!(framing, Framing::Close) {
            self.close_after_response = true;
        }

        Ok(ResponseHead {
            status,
            headers: response_headers,
            framing,
        })
    }

    /// Bound the next body reads by `deadline` (no-op limits when none).
    pub(crate) fn apply_read_deadline(&mut self, deadline: &Deadline) -> Result<(), Error> {
        self.read_deadline = deadline.clone();
        match self.transport.as_ref() {
            Some(transport) => transport.apply_deadline(deadline),
            None => Ok(()),
        }
    }

    /// Read some body bytes according to `framing`. `Ok(0)` means done.
    pub(crate) fn read_body_some(
        &mut self,
        framing: &mut Framing,
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        match framing {
            Framing::Done => Ok(0),
            Framing::Length(remaining) => {
                let want = (*remaining).min(buf.len() as u64) as usize;
                let n = self.read(&mut buf[..want])?;
                if n == 0 {
                    self.close();
                    return Err(Error::Transport(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed inside body",
                    )));
                }
                *remaining -= n as u64;
                if *remaining == 0 {
                    *framing = Framing::Done;
                }
                Ok(n)
            }
            Framing::Chunked(decoder) => {
                let result = {
                    let mut reader = ConnReader {
                        leftover: &mut self.leftover,
                        transport: &mut self.transport,
                        deadline: &self.read_deadline,
                    };
                    decoder.read_some(&mut reader, buf)
                };
                let n = match result {
                    Ok(n) => n,
                    Err(e) => {
                        self.close();
                        return Err(e.into());
                    }
                };
                if decoder.is_done() {
                    *framing = Framing::Done;
                }
                Ok(n)
            }
            Framing::Close => {
                let n = self.read(buf)?;
                if n == 0 {
                    *framing = Framing::Done;
                    self.close();
                }
                Ok(n)
            }
        }
    }

    // Decide between Content-Length and chunked before anything is written.
    fn plan_body(&mut self, source: &mut dyn Source) -> Result<BodyPlan, Error> {
        if let Some(size) = source.size() {
            return Ok(if size == 0 {
                BodyPlan::Empty
            } else {
                BodyPlan::Sized(size)
            });
        }
        let mut chunk = vec![0u8; PREFETCH_SIZE];
        let (n, more) = source.read_some(&mut chunk).map_err(Error::Transport)?;
        chunk.truncate(n);
        Ok(if more {
            BodyPlan::Chunked(chunk)
        } else {
            BodyPlan::Prefetched(chunk)
        })
    }

    fn build_head(
        &self,
        method: &Method,
        target: &str,
        headers: &HeaderMap,
        source: &dyn Source,
        body: &BodyPlan,
        jar: Option<&CookieJar>,
    ) -> Result<Vec<u8>, Error> {
        let mut head = Vec::with_capacity(512);
        let _ = write!(head, "{} {} HTTP/1.1\r\n", method, target);

        if !headers.contains_key(HOST) {
            // Unix-socket connections have no bound hostname.
            let host = if self.host.is_empty() { "localhost" } else { &self.host };
            let _ = write!(head, "Host: {}\r\n", host);
        }
        if !headers.contains_key(USER_AGENT) {
            let _ = write!(head, "User-Agent: {}\r\n", DEFAULT_USER_AGENT);
        }
        if !headers.contains_key(ACCEPT) {
            let _ = write!(head, "Accept: */*\r\n");
        }

        if let Some(jar) = jar {
            let cookies = jar.get(&self.host, path_of(target), self.endpoint.is_tls());
            if !cookies.is_empty() {
                let _ = write!(head, "Cookie: {}\r\n", cookies);
            }
        }

        let has_body = !matches!(body, BodyPlan::Empty);
        if has_body && !headers.contains_key(CONTENT_TYPE) {
            let content_type = source.default_content_type();
            if !content_type.is_empty() {
                let _ = write!(head, "Content-Type: {}\r\n", content_type);
            }
        }

        match body {
            BodyPlan::Empty => {
                // An empty body still announces its length on methods that
                // carry one by convention.
                if *method == Method::POST || *method == Method::PUT || *method == Method::PATCH {
                    let _ = write!(head, "Content-Length: 0\r\n");
                }
            }
            BodyPlan::Sized(size) => {
                let _ = write!(head, "Content-Length: {}\r\n", size);
            }
            BodyPlan::Prefetched(chunk) => {
                let _ = write!(head, "Content-Length: {}\r\n", chunk.len());
            }
            BodyPlan::Chunked(_) => {
                let _ = write!(head, "Transfer-Encoding: chunked\r\n");
            }
        }

        for (name, value) in headers {
            head.extend_from_slice(name.as_str().as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }

        head.extend_from_slice(b"\r\n");
        Ok(head)
    }

    fn send_request(
        &mut self,
        head: &[u8],
        body: BodyPlan,
        source: &mut dyn Source,
        deadline: &Deadline,
    ) -> Result<(), Error> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        transport.apply_deadline(deadline)?;

        transport.write_all(head)?;

        match body {
            BodyPlan::Empty => {}
            BodyPlan::Sized(total) => {
                let mut written = 0u64;
                let mut buf = vec![0u8; PREFETCH_SIZE];
                loop {
                    let (n, more) = source.read_some(&mut buf)?;
                    transport.write_all(&buf[..n])?;
                    written += n as u64;
                    if !more {
                        break;
                    }
                    if n == 0 {
                        return Err(Error::Transport(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "body source stalled",
                        )));
                    }
                }
                if written != total {
                    return Err(Error::Transport(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("source wrote {} bytes, size() said {}", written, total),
                    )));
                }
            }
            BodyPlan::Prefetched(chunk) => {
                transport.write_all(&chunk)?;
            }
            BodyPlan::Chunked(first) => {
                chunked::write_chunk(transport, &first)?;
                let mut buf = vec![0u8; PREFETCH_SIZE];
                loop {
                    let (n, more) = source.read_some(&mut buf)?;
                    chunked::write_chunk(transport, &buf[..n])?;
                    if !more {
                        break;
                    }
                    if n == 0 {
                        return Err(Error::Transport(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "body source stalled",
                        )));
                    }
                }
                chunked::write_final_chunk(transport)?;
            }
        }

        transport.flush()?;
        transport.clear_deadline();
        Ok(())
    }

    // Read until the blank line ending the response head; bytes beyond it
    // stay in `leftover` for the body.
    fn read_head(&mut self, deadline: &Deadline) -> Result<Vec<u8>, Error> {
        {
            let transport = self.transport.as_ref().ok_or(Error::NotConnected)?;
            transport.apply_deadline(deadline)?;
        }

        let mut buf = std::mem::take(&mut self.leftover);
        let mut tmp = [0u8; 8 * 1024];
        loop {
            if let Some(end) = find_head_end(&buf) {
                self.leftover = buf.split_off(end);
                if let Some(transport) = self.transport.as_ref() {
                    transport.clear_deadline();
                }
                return Ok(buf);
            }
            if buf.len() > MAX_RESPONSE_HEAD {
                return Err(Error::HttpParse("response header too large".into()));
            }
            let n = {
                let mut reader = ConnReader {
                    leftover: &mut self.leftover,
                    transport: &mut self.transport,
                    deadline,
                };
                reader.read(&mut tmp)?
            };
            if n == 0 {
                return Err(Error::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed before response header",
                )));
            }
            buf.extend_from_slice(&tmp[..n]);
        }
    }

    fn update_keep_alive(&mut self, headers: &HeaderMap, version_minor: u8) {
        let tokens: Vec<String> = headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_ascii_lowercase())
            .collect();

        let mut close = if version_minor == 0 {
            // HTTP/1.0 closes unless keep-alive is negotiated.
            !tokens.iter().any(|t| t == "keep-alive")
        } else {
            false
        };
        if tokens.iter().any(|t| t == "close") {
            close = true;
        }

        if let Some(value) = headers.get("keep-alive") {
            match value
                .to_str()
                .map_err(|_| Error::HttpParse("keep-alive not ascii".into()))
                .and_then(|v| parse_keep_alive(v, SystemTime::now()))
            {
                Ok(ka) => {
                    self.keep_alive.deadline = ka.timeout.or(self.keep_alive.deadline);
                    if let Some(max) = ka.max {
                        // The request this response answers already counts
                        // against the server's budget.
                        self.keep_alive.remaining = Some(max.saturating_sub(1));
                    }
                }
                Err(_) => {
                    debug!("malformed keep-alive header, closing after response");
                    close = true;
                }
            }
        }

        self.close_after_response = close;
    }
}

// Body reads go through leftover head bytes first, then the socket.
impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = ConnReader {
            leftover: &mut self.leftover,
            transport: &mut self.transport,
            deadline: &self.read_deadline,
        };
        reader.read(buf)
    }
}

// Raw writes for upgraded (tunneled) connections.
impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.transport.as_mut() {
            Some(t) => t.write(buf),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.transport.as_mut() {
            Some(t) => t.flush(),
            None => Ok(()),
        }
    }
}

struct ConnReader<'a> {
    leftover: &'a mut Vec<u8>,
    transport: &'a mut Option<Transport>,
    deadline: &'a Deadline,
}

impl Read for ConnReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.leftover.is_empty() {
            let n = self.leftover.len().min(buf.len());
            buf[..n].copy_from_slice(&self.leftover[..n]);
            self.leftover.drain(..n);
            return Ok(n);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Ok(0);
        };
        loop {
            match transport.read(buf) {
                Ok(n) => return Ok(n),
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    // Socket timeouts are poll intervals; the deadline
                    // decides whether this read actually gives up.
                    self.deadline
                        .check()
                        .map_err(|abort| abort.into_io())?;
                    transport
                        .apply_deadline(self.deadline)
                        .map_err(|abort| abort.into_io())?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

enum BodyPlan {
    Empty,
    Sized(u64),
    /// Unknown-size source that turned out to fit in one prefetch.
    Prefetched(Vec<u8>),
    /// First prefetched chunk of a body that continues.
    Chunked(Vec<u8>),
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn path_of(target: &str) -> &str {
    let end = target
        .find(|c| c == '?' || c == '#')
        .unwrap_or(target.len());
    &target[..end]
}

fn parse_head(raw: &[u8]) -> Result<(StatusCode, HeaderMap, u8), Error> {
    let mut header_storage = [httparse::EMPTY_HEADER; 128];
    let mut response = httparse::Response::new(&mut header_storage);

    match response.parse(raw) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(Error::HttpParse("truncated response head".into()))
        }
        Err(e) => return Err(Error::HttpParse(e.to_string())),
    }

    let code = response
        .code
        .ok_or_else(|| Error::HttpParse("missing status code".into()))?;
    let status =
        StatusCode::from_u16(code).map_err(|_| Error::HttpParse(format!("bad status {}", code)))?;
    let version_minor = response.version.unwrap_or(1);

    let mut headers = HeaderMap::with_capacity(response.headers.len());
    for h in response.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| Error::HttpParse(format!("bad header name {}", h.name)))?;
        let value = HeaderValue::from_bytes(h.value)
            .map_err(|_| Error::HttpParse(format!("bad value for header {}", h.name)))?;
        headers.append(name, value);
    }

    Ok((status, headers, version_minor))
}

fn apply_set_cookie(jar: &CookieJar, headers: &HeaderMap, host: &str, target: &str) {
    for value in headers.get_all(SET_COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        match cookie::parse_set_cookie(value) {
            Ok(sc) => {
                jar.set(&sc, host, true, path_of(target), cookie::default_list());
            }
            // Unparseable cookies are dropped, not fatal.
            Err(_) => debug!("ignoring unparseable set-cookie: {:?}", value),
        }
    }
}

fn response_framing(
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Framing, Error> {
    let no_body = *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;
    if no_body {
        return Ok(Framing::Done);
    }

    let chunked = headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case("chunked"));
    if chunked {
        return Ok(Framing::Chunked(ChunkedDecoder::new()));
    }

    if let Some(value) = headers.get(CONTENT_LENGTH) {
        let length: u64 = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| Error::HttpParse("bad content-length".into()))?;
        return Ok(if length == 0 {
            Framing::Done
        } else {
            Framing::Length(length)
        });
    }

    Ok(Framing::Close)
}
