//! Builder sugar over [`Session::request`]/[`Session::stream`].

use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::response::Response;
use crate::source::IntoSource;
use crate::stream::Stream;
use crate::sync::Deadline;
use crate::{util, Error, Session};

/// One request under construction.
///
/// ```no_run
/// # fn run() -> Result<(), reqwell::Error> {
/// let session = reqwell::Session::new();
/// let response = session
///     .get("https://httpbin.org/get")
///     .header("X-My-Header", "secret")
///     .call()?;
/// println!("{}", response.text());
/// # Ok(()) }
/// ```
pub struct RequestBuilder {
    session: Session,
    method: Method,
    url: String,
    headers: HeaderMap,
    deadline: Deadline,
    // First header error, surfaced when the request runs.
    bad_header: Option<Error>,
}

impl RequestBuilder {
    pub(crate) fn new(session: Session, method: Method, url: &str) -> Self {
        RequestBuilder {
            session,
            method,
            url: url.to_string(),
            headers: HeaderMap::new(),
            deadline: Deadline::none(),
            bad_header: None,
        }
    }

    /// Add a header. Invalid names or values fail the request when it runs.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let parsed = name
            .parse::<HeaderName>()
            .ok()
            .zip(HeaderValue::from_str(value).ok());
        match parsed {
            Some((name, value)) => {
                self.headers.append(name, value);
            }
            None => {
                if self.bad_header.is_none() {
                    self.bad_header = Some(Error::InvalidHeader("user header"));
                }
            }
        }
        self
    }

    /// `Authorization: Basic ...` from a user and password.
    pub fn basic_auth(self, user: &str, pass: &str) -> Self {
        let value = util::basic_auth(user, pass);
        self.header("authorization", &value)
    }

    /// `Authorization: Bearer ...` from a token.
    pub fn bearer(self, token: &str) -> Self {
        let value = util::bearer(token);
        self.header("authorization", &value)
    }

    /// Bound the whole request (including redirects) by a deadline.
    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Send with an empty body and buffer the response.
    pub fn call(self) -> Result<Response, Error> {
        self.send(())
    }

    /// Send with `body` and buffer the response.
    pub fn send(self, body: impl IntoSource) -> Result<Response, Error> {
        if let Some(err) = self.bad_header {
            return Err(err);
        }
        self.session
            .request_with(self.method, &self.url, body, self.headers, &self.deadline)
    }

    /// Send with an empty body; read the body from the returned stream.
    pub fn stream(self) -> Result<Stream, Error> {
        self.stream_body(())
    }

    /// Send with `body`; read the response body from the returned stream.
    pub fn stream_body(self, body: impl IntoSource) -> Result<Stream, Error> {
        if let Some(err) = self.bad_header {
            return Err(err);
        }
        self.session
            .stream_with(self.method, &self.url, body, self.headers, &self.deadline)
    }
}
