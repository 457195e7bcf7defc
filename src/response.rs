//! Buffered responses, as returned by [`Session::request`][crate::Session::request]
//! and kept in a stream's redirect history.

use http::{HeaderMap, StatusCode};

use crate::fields::link::{parse_link, Link};
use crate::Error;

/// A fully buffered response: status, headers, body bytes and the chain of
/// responses from any redirects that led here.
#[derive(Debug, Default, Clone)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Vec<u8>,
    pub(crate) history: Vec<Response>,
}

impl Response {
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

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Prior responses from redirects, oldest first.
    pub fn history(&self) -> &[Response] {
        &self.history
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::HttpParse(format!("json body: {}", e)))
    }

    /// The parsed `Link` headers (RFC 8288), e.g. for API pagination.
    /// Empty when the header is absent.
    pub fn links(&self) -> Result<Vec<Link>, Error> {
        let mut links = Vec::new();
        for value in self.headers.get_all("link") {
            let value = value
                .to_str()
                .map_err(|_| Error::HttpParse("link header not ascii".into()))?;
            links.extend(parse_link(value)?);
        }
        Ok(links)
    }

    /// The `Content-Type` without parameters, defaulting to `text/plain`.
    pub fn content_type(&self) -> &str {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
            .unwrap_or("text/plain")
    }

    /// Error out on 4xx/5xx statuses. Status errors are never raised
    /// implicitly; this is the explicit opt-in.
    pub fn throw_if_error(&self) -> Result<&Self, Error> {
        if self.status.is_client_error() || self.status.is_server_error() {
            Err(Error::Status(self.status.as_u16()))
        } else {
            Ok(self)
        }
    }
}
