//! End-to-end tests driving full sessions against local test servers.

use std::net::SocketAddr;

use crate::testserver::TestServer;
use crate::Session;

mod cookie;
mod redirect;
mod simple;

/// A session with TLS enforcement off and every hostname resolving to the
/// test server.
pub(crate) fn test_session(server: &TestServer) -> Session {
    let port = server.port;
    Session::builder()
        .enforce_tls(false)
        .resolver(move |_netloc: &str| Ok(vec![SocketAddr::from(([127, 0, 0, 1], port))]))
        .build()
}
