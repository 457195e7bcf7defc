#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(missing_docs)]
//! A session-oriented, requests-style HTTP/1.1 client.
//!
//! reqwell turns a call like "GET this URL with these headers and this
//! body" into the right sequence of network operations: connections are
//! pooled per resolved endpoint and reused under keep-alive, cookies are
//! kept in a shared RFC 6265 jar, redirects are followed under a
//! configurable scope policy, and both request and response bodies stream
//! so they never have to fit in memory.
//!
//! The crate is blocking I/O throughout. Every operation also has a
//! cancel-aware form taking a [`Deadline`], which combines a time limit
//! with a [`CancelToken`] that other threads (or timers) can trip.
//!
//! # Usage
//!
//! In its simplest form:
//!
//! ```no_run
//! # fn run() -> Result<(), reqwell::Error> {
//! let body = reqwell::get("https://example.com")
//!     .header("Example-Header", "header value")
//!     .call()?
//!     .text();
//! # Ok(()) }
//! ```
//!
//! For anything beyond one-shot calls, create a [`Session`]. A session
//! holds the connection pools, the cookie jar and the request options,
//! and can be cloned cheaply (clones share state):
//!
//! ```no_run
//! # fn run() -> Result<(), reqwell::Error> {
//! use reqwell::{RedirectMode, Session};
//!
//! let session = Session::builder()
//!     .redirect_mode(RedirectMode::Subdomain)
//!     .max_redirects(4)
//!     .build();
//!
//! let response = session
//!     .post("https://example.com/upload")
//!     .header("Authorization", "example-token")
//!     .send("some body data")?;
//!
//! // Reuses the connection from the previous request.
//! let page = session.get("https://example.com/page").call()?;
//! println!("{} {}", page.status(), page.text());
//! # Ok(()) }
//! ```
//!
//! # Streaming
//!
//! [`Session::stream`] (or [`RequestBuilder::stream`]) returns a
//! [`Stream`] instead of a buffered [`Response`]. The stream implements
//! [`std::io::Read`]; the connection goes back to the pool the moment the
//! last body byte is read, and a dropped stream drains itself so the
//! connection is not poisoned. Request bodies are [`Source`]s: in-memory
//! buffers and strings, files, JSON values, url-encoded and multipart
//! forms, or any custom implementation of the trait.
//!
//! # Errors
//!
//! Everything returns `Result<T, `[`Error`]`>`. An HTTP 4xx/5xx status is
//! *not* an error; opt in with [`Response::throw_if_error`].

#[macro_use]
extern crate log;

pub use http;
pub use url;

mod chunked;
mod conn;
mod endpoint;
mod error;
mod pool;
mod redirect;
mod request;
mod resolver;
mod response;
mod session;
mod stream;
mod sync;
#[cfg(feature = "rustls")]
mod tls;
mod transport;
mod util;
mod websocket;

pub mod cookie;
pub mod fields;
pub mod source;

#[cfg(test)]
mod testserver;
#[cfg(test)]
mod test;

pub use cookie::{Cookie, CookieJar, PublicSuffixList};
pub use endpoint::Endpoint;
pub use error::Error;
pub use fields::link::{parse_link, Link};
pub use pool::{ConnectionPool, PooledConn};
pub use redirect::RedirectMode;
pub use request::RequestBuilder;
pub use response::Response;
pub use session::{RequestOptions, Session, SessionBuilder};
pub use source::{IntoSource, Source};
pub use stream::Stream;
pub use sync::{CancelToken, Deadline};
pub use util::{basic_auth, bearer};
pub use websocket::Upgraded;

use http::Method;
use once_cell::sync::OnceCell;

static DEFAULT_SESSION: OnceCell<Session> = OnceCell::new();

/// The process-wide session used by the crate-level verbs, created lazily
/// with default options.
pub fn default_session() -> &'static Session {
    DEFAULT_SESSION.get_or_init(Session::new)
}

/// Install the session the crate-level verbs use. Fails (returning the
/// rejected session) once the default has been created or set; call this
/// early, typically from test setup.
pub fn set_default_session(session: Session) -> Result<(), Session> {
    DEFAULT_SESSION.set(session)
}

macro_rules! mk_method {
    ($f:ident, $m:ident) => {
        #[doc = concat!("Prepare a ", stringify!($m), " request on the default session.")]
        #[must_use]
        pub fn $f(url: &str) -> RequestBuilder {
            default_session().$f(url)
        }
    };
}

mk_method!(get, GET);
mk_method!(head, HEAD);
mk_method!(post, POST);
mk_method!(put, PUT);
mk_method!(delete, DELETE);
mk_method!(patch, PATCH);
mk_method!(options, OPTIONS);
mk_method!(trace, TRACE);

/// Run a request on the default session, buffering the response.
pub fn request(
    method: Method,
    url: &str,
    body: impl IntoSource,
    headers: http::HeaderMap,
) -> Result<Response, Error> {
    default_session().request(method, url, body, headers)
}

#[cfg(test)]
pub(crate) mod test_support {
    use once_cell::sync::Lazy;

    pub fn init_test_log() {
        static INIT_LOG: Lazy<()> = Lazy::new(|| {
            env_logger::builder().is_test(true).try_init().ok();
        });
        *INIT_LOG
    }

    // This doesn't need to run, just compile.
    #[allow(dead_code)]
    fn _ensure_send(_: impl Send) {}
    #[allow(dead_code)]
    fn _ensure_sync(_: impl Sync) {}

    #[allow(dead_code)]
    fn _assert_send_sync() {
        _ensure_send(crate::Session::new());
        _ensure_sync(crate::Session::new());
        _ensure_send(crate::CookieJar::new());
        _ensure_sync(crate::CookieJar::new());
    }
}
