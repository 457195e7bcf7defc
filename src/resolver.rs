//! Name resolution.
//!
//! Resolution is pluggable so tests (and special setups like DNS-based
//! load balancing) can point hostnames wherever they want. The default
//! goes through [`ToSocketAddrs`].

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use crate::sync::Deadline;
use crate::Error;

/// Trait for name resolvers. `netloc` is `host:port`.
///
/// A `Fn(&str) -> io::Result<Vec<SocketAddr>>` closure is a valid resolver.
pub trait Resolver: Send + Sync + 'static {
    fn resolve(&self, netloc: &str) -> io::Result<Vec<SocketAddr>>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> io::Result<Vec<SocketAddr>> + Send + Sync + 'static,
{
    fn resolve(&self, netloc: &str) -> io::Result<Vec<SocketAddr>> {
        self(netloc)
    }
}

/// Default resolver using the system lookup via [`ToSocketAddrs`].
#[derive(Debug, Default)]
pub struct StdResolver;

impl Resolver for StdResolver {
    fn resolve(&self, netloc: &str) -> io::Result<Vec<SocketAddr>> {
        Ok(netloc.to_socket_addrs()?.collect())
    }
}

#[derive(Clone)]
pub(crate) struct ArcResolver(Arc<dyn Resolver>);

impl Default for ArcResolver {
    fn default() -> Self {
        ArcResolver(Arc::new(StdResolver))
    }
}

impl fmt::Debug for ArcResolver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ArcResolver(...)")
    }
}

impl<R: Resolver> From<R> for ArcResolver {
    fn from(resolver: R) -> Self {
        ArcResolver(Arc::new(resolver))
    }
}

impl ArcResolver {
    /// Resolve to the first address, honoring the deadline around the
    /// (blocking) system call.
    pub(crate) fn lookup(&self, host: &str, port: u16, deadline: &Deadline) -> Result<SocketAddr, Error> {
        deadline.check()?;
        let netloc = format!("{}:{}", host, port);
        let addrs = self
            .0
            .resolve(&netloc)
            .map_err(|e| Error::DnsFailed(format!("{}: {}", netloc, e)))?;
        deadline.check()?;
        addrs
            .into_iter()
            .next()
            .ok_or_else(|| Error::DnsFailed(format!("no address for {}", netloc)))
    }
}
