use std::fmt;
use std::io;

/// Errors produced by this crate.
///
/// Transport and TLS failures are fatal to the connection they occurred on.
/// Protocol and policy errors leave the connection usable unless stated
/// otherwise. [`Error::Status`] is never produced automatically; it only
/// comes out of [`Stream::throw_if_error`][crate::Stream::throw_if_error].
#[derive(Debug)]
pub enum Error {
    /// The url could not be understood.
    BadUrl(String),
    /// The url scheme is not one of http/https/ws/wss/unix.
    UnknownScheme(String),
    /// DNS lookup failed.
    DnsFailed(String),
    /// Socket I/O failed.
    Transport(io::Error),
    /// TLS handshake or certificate verification failed.
    Tls(String),
    /// The server response could not be parsed.
    HttpParse(String),
    /// HTTP status code indicating an error (status >= 400).
    Status(u16),
    /// Hop count exceeded `max_redirects`.
    TooManyRedirects,
    /// Redirect target blocked by the configured redirect mode.
    ForbiddenRedirect,
    /// `Location` missing or unusable, or the redirect would need to
    /// resend a body that cannot be reset.
    InvalidRedirect(&'static str),
    /// `enforce_tls` violated by the request URL or a redirect target.
    Insecure,
    /// A connection was asked to serve a URL whose host differs from the
    /// host it is bound to.
    WrongHost { expected: String, got: String },
    /// The operation was cancelled or its deadline passed.
    OperationAborted,
    /// A caller-provided buffer could not hold the data and could not grow.
    NeedBuffer,
    /// The response body was already fully consumed.
    Eof,
    /// The stream has no response to read from.
    NotConnected,
    /// A synthesized or user header was not valid.
    InvalidHeader(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadUrl(url) => write!(f, "bad url: {}", url),
            Error::UnknownScheme(scheme) => write!(f, "unknown scheme: {}", scheme),
            Error::DnsFailed(msg) => write!(f, "dns failed: {}", msg),
            Error::Transport(e) => write!(f, "transport: {}", e),
            Error::Tls(msg) => write!(f, "tls: {}", msg),
            Error::HttpParse(msg) => write!(f, "http parse: {}", msg),
            Error::Status(code) => write!(f, "http status: {}", code),
            Error::TooManyRedirects => write!(f, "too many redirects"),
            Error::ForbiddenRedirect => write!(f, "redirect forbidden by policy"),
            Error::InvalidRedirect(msg) => write!(f, "invalid redirect: {}", msg),
            Error::Insecure => write!(f, "tls required but target is not tls"),
            Error::WrongHost { expected, got } => {
                write!(f, "wrong host: connection bound to {}, got {}", expected, got)
            }
            Error::OperationAborted => write!(f, "operation aborted"),
            Error::NeedBuffer => write!(f, "buffer too small and cannot grow"),
            Error::Eof => write!(f, "body already consumed"),
            Error::NotConnected => write!(f, "stream is not connected"),
            Error::InvalidHeader(what) => write!(f, "invalid header: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock {
            // Read/write deadlines are set from the caller's Deadline, so a
            // socket timeout means the operation was cancelled by the timer.
            Error::OperationAborted
        } else {
            Error::Transport(e)
        }
    }
}

impl Error {
    /// Flatten into an `io::Error` for use behind `io::Read`.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            Error::Transport(e) => e,
            Error::Eof => io::Error::new(io::ErrorKind::UnexpectedEof, self.to_string()),
            Error::OperationAborted => io::Error::new(io::ErrorKind::TimedOut, self.to_string()),
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn io_timeout_is_aborted() {
        let e: Error = io::Error::new(io::ErrorKind::TimedOut, "t").into();
        assert!(matches!(e, Error::OperationAborted));
    }

    #[test]
    fn io_other_is_transport() {
        let e: Error = io::Error::new(io::ErrorKind::ConnectionReset, "r").into();
        assert!(matches!(e, Error::Transport(_)));
    }
}
