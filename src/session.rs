//! The session: user-facing entry point that routes URLs to pools, keeps
//! the shared cookie jar and follows redirects by policy.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, Method};
use url::Url;

use crate::cookie::{default_list, CookieJar, PublicSuffixList};
use crate::endpoint::scheme_is_tls;
use crate::fields::location::interpret_location;
use crate::pool::{ConnectionPool, DEFAULT_POOL_LIMIT};
use crate::redirect::{should_redirect, RedirectMode};
use crate::request::RequestBuilder;
use crate::resolver::{ArcResolver, Resolver};
use crate::response::Response;
use crate::source::{Empty, IntoSource, Source};
use crate::stream::Stream;
use crate::sync::Deadline;
use crate::websocket::Upgraded;
use crate::{util, Error};

/// The options attached to every request of a session.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Refuse non-TLS URLs (and redirects to them).
    pub enforce_tls: bool,
    /// Which redirect targets are followed.
    pub redirect_mode: RedirectMode,
    /// Maximum number of redirect hops.
    pub max_redirects: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            enforce_tls: true,
            redirect_mode: RedirectMode::PrivateDomain,
            max_redirects: 12,
        }
    }
}

struct SessionState {
    pools: Mutex<HashMap<String, Arc<ConnectionPool>>>,
    jar: CookieJar,
    options: RequestOptions,
    resolver: ArcResolver,
    pool_limit: usize,
    // Sent with every request unless the request sets the same name.
    default_headers: HeaderMap,
    // None means the list embedded at build time.
    public_suffixes: Option<Arc<PublicSuffixList>>,
}

/// Sessions keep state between requests: a pool of connections per
/// origin, a cookie jar and the request options.
///
/// Cloning is cheap and clones share all state.
///
/// ```no_run
/// # fn run() -> Result<(), reqwell::Error> {
/// let session = reqwell::Session::builder()
///     .enforce_tls(false)
///     .build();
///
/// let body = session.get("http://example.com/page").call()?.text();
/// // Second request on the same host reuses the connection.
/// let other = session.get("http://example.com/other").call()?.text();
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Session {
    state: Arc<SessionState>,
}

/// Configuration for a [`Session`] under construction.
pub struct SessionBuilder {
    options: RequestOptions,
    resolver: ArcResolver,
    pool_limit: usize,
    default_headers: HeaderMap,
    public_suffixes: Option<Arc<PublicSuffixList>>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        SessionBuilder {
            options: RequestOptions::default(),
            resolver: ArcResolver::default(),
            pool_limit: DEFAULT_POOL_LIMIT,
            default_headers: HeaderMap::new(),
            public_suffixes: None,
        }
    }
}

impl SessionBuilder {
    /// Refuse plain-text schemes. Defaults to true.
    pub fn enforce_tls(mut self, enforce: bool) -> Self {
        self.options.enforce_tls = enforce;
        self
    }

    /// Redirect scope policy. Defaults to [`RedirectMode::PrivateDomain`].
    pub fn redirect_mode(mut self, mode: RedirectMode) -> Self {
        self.options.redirect_mode = mode;
        self
    }

    /// Maximum redirect hops. Defaults to 12.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.options.max_redirects = max;
        self
    }

    /// Live connections allowed per origin.
    pub fn pool_limit(mut self, limit: usize) -> Self {
        self.pool_limit = limit;
        self
    }

    /// A header sent on every request of the session, e.g. an API key.
    /// Requests setting the same header win. Invalid names/values are
    /// silently dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<http::header::HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.default_headers.append(name, value);
        }
        self
    }

    /// Override name resolution, e.g. to point hosts at a test server.
    pub fn resolver(mut self, resolver: impl Resolver) -> Self {
        self.resolver = resolver.into();
        self
    }

    /// Use a custom public-suffix list instead of the embedded one.
    pub fn public_suffix_list(mut self, list: PublicSuffixList) -> Self {
        self.public_suffixes = Some(Arc::new(list));
        self
    }

    pub fn build(self) -> Session {
        Session {
            state: Arc::new(SessionState {
                pools: Mutex::new(HashMap::new()),
                jar: CookieJar::new(),
                options: self.options,
                resolver: self.resolver,
                pool_limit: self.pool_limit,
                default_headers: self.default_headers,
                public_suffixes: self.public_suffixes,
            }),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    /// A session with default options.
    pub fn new() -> Self {
        SessionBuilder::default().build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn request_options(&self) -> &RequestOptions {
        &self.state.options
    }

    pub fn cookie_jar(&self) -> &CookieJar {
        &self.state.jar
    }

    fn public_suffixes(&self) -> &PublicSuffixList {
        self.state
            .public_suffixes
            .as_deref()
            .unwrap_or_else(|| default_list())
    }

    /// Perform a request and buffer the whole body.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        body: impl IntoSource,
        headers: HeaderMap,
    ) -> Result<Response, Error> {
        self.request_with(method, url, body, headers, &Deadline::none())
    }

    /// Cancel-aware form of [`Session::request`].
    pub fn request_with(
        &self,
        method: Method,
        url: &str,
        body: impl IntoSource,
        headers: HeaderMap,
        deadline: &Deadline,
    ) -> Result<Response, Error> {
        self.stream_with(method, url, body, headers, deadline)?
            .into_response()
    }

    /// Perform a request without buffering the body; read it from the
    /// returned [`Stream`].
    pub fn stream(
        &self,
        method: Method,
        url: &str,
        body: impl IntoSource,
        headers: HeaderMap,
    ) -> Result<Stream, Error> {
        self.stream_with(method, url, body, headers, &Deadline::none())
    }

    /// Cancel-aware form of [`Session::stream`].
    pub fn stream_with(
        &self,
        method: Method,
        url: &str,
        body: impl IntoSource,
        headers: HeaderMap,
        deadline: &Deadline,
    ) -> Result<Stream, Error> {
        self.perform(method, url, body.into_source(), headers, deadline)
    }

    /// GET a URL and write the body to `path`. The returned response has
    /// its headers and history; the body went to the file.
    pub fn download(
        &self,
        url: &str,
        headers: HeaderMap,
        path: impl AsRef<Path>,
    ) -> Result<Response, Error> {
        let mut stream = self.stream(Method::GET, url, (), headers)?;
        let mut file = std::fs::File::create(path).map_err(Error::Transport)?;
        std::io::copy(&mut stream, &mut file).map_err(Error::Transport)?;
        stream.into_response()
    }

    /// Upgrade the connection on `url` (websocket handshake). On success
    /// the connection leaves the pool and belongs to the returned handle.
    pub fn websocket(&self, url: &str, headers: HeaderMap) -> Result<Upgraded, Error> {
        let deadline = Deadline::none();
        let url = parse_url(url)?;
        self.check_scheme(&url)?;
        let pool = self.get_pool(&url, &deadline)?;
        pool.check_url(&url)?;
        pool.upgrade(
            &request_target(&url),
            &merge_headers(&self.state.default_headers, &headers),
            Some(&self.state.jar),
            &deadline,
        )
    }

    /// Close all pools; pending waiters abort.
    pub fn shutdown(&self) {
        let mut pools = self.state.pools.lock().unwrap();
        for pool in pools.values() {
            pool.shutdown();
        }
        pools.clear();
    }

    /// The pool serving `url`'s origin, created and resolved on first use.
    pub fn get_pool(
        &self,
        url: &Url,
        deadline: &Deadline,
    ) -> Result<Arc<ConnectionPool>, Error> {
        let key = origin_key(url)?;

        if let Some(pool) = self.state.pools.lock().unwrap().get(&key) {
            return Ok(pool.clone());
        }

        let host = url.host_str().unwrap_or("");
        let pool = ConnectionPool::new(
            host,
            scheme_is_tls(url.scheme()),
            self.state.pool_limit,
            self.state.resolver.clone(),
        );
        pool.lookup(url, deadline)?;

        let mut pools = self.state.pools.lock().unwrap();
        // Someone else may have raced us here; first insert wins.
        let entry = pools.entry(key).or_insert(pool);
        Ok(entry.clone())
    }

    // The redirect loop around single pool exchanges.
    fn perform(
        &self,
        mut method: Method,
        url: &str,
        mut source: Box<dyn Source>,
        headers: HeaderMap,
        deadline: &Deadline,
    ) -> Result<Stream, Error> {
        let options = &self.state.options;
        let mut url = parse_url(url)?;
        self.check_scheme(&url)?;

        let mut history: Vec<Response> = Vec::new();
        let mut hops = 0usize;

        loop {
            deadline.check()?;

            let pool = self.get_pool(&url, deadline)?;
            pool.check_url(&url)?;

            let mut hop_headers = merge_headers(&self.state.default_headers, &headers);
            add_userinfo_auth(&mut hop_headers, &url)?;

            let mut stream = pool.ropen(
                method.clone(),
                &request_target(&url),
                &hop_headers,
                source.as_mut(),
                Some(&self.state.jar),
                deadline,
            )?;
            stream.prepend_history(std::mem::take(&mut history));

            let status = stream.status().as_u16();
            if !matches!(status, 301 | 302 | 303 | 307 | 308) {
                return Ok(stream);
            }

            let location = stream
                .header("location")
                .ok_or(Error::InvalidRedirect("missing location"))?
                .to_string();
            let target = interpret_location(&url, &location)?;

            if !should_redirect(options.redirect_mode, &url, &target, self.public_suffixes()) {
                return Err(Error::ForbiddenRedirect);
            }
            hops += 1;
            if hops > options.max_redirects {
                return Err(Error::TooManyRedirects);
            }
            if options.enforce_tls && !scheme_is_tls(target.scheme()) {
                return Err(Error::Insecure);
            }

            info!("redirect ({}): {} -> {}", status, url, target);

            // Drain this hop into the history (kept flat: the hop's own
            // accumulated chain comes back out first). Consuming the body
            // also returns its connection before the next hop wants one.
            history = stream.take_history();
            history.push(stream.into_response()?);

            if status == 303 || (matches!(status, 301 | 302) && method == Method::POST) {
                method = Method::GET;
                source = Box::new(Empty);
            } else {
                source
                    .reset()
                    .map_err(|_| Error::InvalidRedirect("body source cannot be resent"))?;
            }

            url = target;
        }
    }

    fn check_scheme(&self, url: &Url) -> Result<(), Error> {
        match url.scheme() {
            "http" | "https" | "ws" | "wss" | "unix" => {}
            other => return Err(Error::UnknownScheme(other.to_string())),
        }
        if self.state.options.enforce_tls && !scheme_is_tls(url.scheme()) {
            return Err(Error::Insecure);
        }
        Ok(())
    }
}

macro_rules! session_method {
    ($f:ident, $m:ident) => {
        impl Session {
            #[doc = concat!("Prepare a ", stringify!($m), " request.")]
            pub fn $f(&self, url: &str) -> RequestBuilder {
                RequestBuilder::new(self.clone(), Method::$m, url)
            }
        }
    };
}

session_method!(get, GET);
session_method!(head, HEAD);
session_method!(post, POST);
session_method!(put, PUT);
session_method!(delete, DELETE);
session_method!(patch, PATCH);
session_method!(options, OPTIONS);
session_method!(trace, TRACE);

/// Parse a request URL; a missing scheme defaults to `https`.
pub(crate) fn parse_url(input: &str) -> Result<Url, Error> {
    match Url::parse(input) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{}", input)).map_err(|_| Error::BadUrl(input.to_string()))
        }
        Err(_) => Err(Error::BadUrl(input.to_string())),
    }
}

// Pool key: scheme + host + effective port, so that `http://h` and
// `http://h:80` land on the same pool.
fn origin_key(url: &Url) -> Result<String, Error> {
    if url.scheme() == "unix" {
        return Ok(format!("unix://{}", url.path()));
    }
    let host = url
        .host_str()
        .ok_or_else(|| Error::BadUrl(url.to_string()))?;
    Ok(format!(
        "{}://{}:{}",
        url.scheme(),
        host.to_ascii_lowercase(),
        crate::redirect::effective_port(url)
    ))
}

fn request_target(url: &Url) -> String {
    if url.scheme() == "unix" {
        return "/".to_string();
    }
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

// Session defaults plus the request's headers; a request header replaces
// all session values of the same name.
fn merge_headers(defaults: &HeaderMap, request: &HeaderMap) -> HeaderMap {
    if defaults.is_empty() {
        return request.clone();
    }
    let mut merged = defaults.clone();
    for name in request.keys() {
        merged.remove(name);
    }
    for (name, value) in request {
        merged.append(name.clone(), value.clone());
    }
    merged
}

fn add_userinfo_auth(headers: &mut HeaderMap, url: &Url) -> Result<(), Error> {
    if headers.contains_key(AUTHORIZATION) {
        return Ok(());
    }
    if url.username().is_empty() && url.password().is_none() {
        return Ok(());
    }
    let value = util::basic_auth(url.username(), url.password().unwrap_or(""));
    let value = HeaderValue::from_str(&value).map_err(|_| Error::InvalidHeader("authorization"))?;
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn origin_keys_elide_default_ports() {
        let a = origin_key(&Url::parse("http://h.test/x").unwrap()).unwrap();
        let b = origin_key(&Url::parse("http://h.test:80/y").unwrap()).unwrap();
        assert_eq!(a, b);

        let c = origin_key(&Url::parse("https://h.test/").unwrap()).unwrap();
        assert_ne!(a, c);

        let d = origin_key(&Url::parse("http://h.test:8080/").unwrap()).unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn missing_scheme_defaults_to_https() {
        let url = parse_url("example.com/path").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn unknown_scheme_rejected() {
        let session = Session::builder().enforce_tls(false).build();
        let err = session.request(Method::GET, "ftp://h.test/", (), HeaderMap::new());
        assert!(matches!(err, Err(Error::UnknownScheme(_))));
    }

    #[test]
    fn enforce_tls_rejects_plain_http() {
        let session = Session::new();
        let err = session.request(Method::GET, "http://h.test/", (), HeaderMap::new());
        assert!(matches!(err, Err(Error::Insecure)));
    }

    #[test]
    fn merge_headers_request_wins() {
        let mut defaults = HeaderMap::new();
        defaults.insert("x-api-key", "default".parse().unwrap());
        defaults.insert("accept", "text/plain".parse().unwrap());

        let mut request = HeaderMap::new();
        request.append("x-api-key", "override-a".parse().unwrap());
        request.append("x-api-key", "override-b".parse().unwrap());

        let merged = merge_headers(&defaults, &request);
        assert_eq!(merged.get("accept").unwrap(), "text/plain");
        let keys: Vec<&str> = merged
            .get_all("x-api-key")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["override-a", "override-b"]);
    }

    #[test]
    fn request_target_includes_query() {
        let url = Url::parse("http://h.test/a/b?x=1&y=2").unwrap();
        assert_eq!(request_target(&url), "/a/b?x=1&y=2");
        let url = Url::parse("http://h.test/").unwrap();
        assert_eq!(request_target(&url), "/");
    }
}
