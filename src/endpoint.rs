//! Resolved transport endpoints.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use url::Url;

use crate::redirect::effective_port;
use crate::util::lower;
use crate::Error;

/// A resolved transport address, used as the pool key.
///
/// Equality and hashing go by protocol tag and bytes, so `http://h` and
/// `https://h` resolve to distinct endpoints even on the same address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp { addr: SocketAddr, tls: bool },
    Unix(PathBuf),
}

impl Endpoint {
    pub fn is_tls(&self) -> bool {
        matches!(self, Endpoint::Tcp { tls: true, .. })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Tcp { addr, tls: true } => write!(f, "tls://{}", addr),
            Endpoint::Tcp { addr, tls: false } => write!(f, "tcp://{}", addr),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Whether `scheme` implies TLS on the wire.
pub(crate) fn scheme_is_tls(scheme: &str) -> bool {
    matches!(scheme, "https" | "wss")
}

/// Validate that a URL may be served by a connection bound to
/// `(endpoint, host, use_tls)` for the origin port `expected_port`.
///
/// Reused connections must not be handed a URL for another host
/// ([`Error::WrongHost`]), another security level ([`Error::Insecure`] /
/// [`Error::UnknownScheme`]) or another port. The port comparison goes
/// against the origin the pool was created for, not the resolved socket
/// address, since resolvers may legitimately remap ports.
pub(crate) fn check_endpoint(
    url: &Url,
    endpoint: &Endpoint,
    host: &str,
    use_tls: bool,
    expected_port: Option<u16>,
) -> Result<(), Error> {
    let scheme = url.scheme();

    match endpoint {
        Endpoint::Unix(_) => {
            if scheme != "unix" {
                return Err(Error::UnknownScheme(scheme.to_string()));
            }
            return Ok(());
        }
        Endpoint::Tcp { .. } => {
            if !matches!(scheme, "http" | "https" | "ws" | "wss") {
                return Err(Error::UnknownScheme(scheme.to_string()));
            }
        }
    }

    if scheme_is_tls(scheme) != use_tls {
        return Err(Error::Insecure);
    }

    let url_host = url.host_str().unwrap_or("");
    if !url_host.eq_ignore_ascii_case(host) {
        return Err(Error::WrongHost {
            expected: lower(host),
            got: lower(url_host),
        });
    }

    if let Some(port) = expected_port {
        if effective_port(url) != port {
            return Err(Error::WrongHost {
                expected: format!("{}:{}", lower(host), port),
                got: format!("{}:{}", lower(url_host), effective_port(url)),
            });
        }
    }

    Ok(())
}
