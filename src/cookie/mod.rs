//! In-memory cookie jar with RFC 6265 set/retrieve semantics.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

pub mod parse;
pub mod public_suffix;

pub use parse::{parse_set_cookie, SetCookie};
pub use public_suffix::{default_list, is_public_suffix, PublicSuffixList};

use crate::util::lower;

/// A stored cookie. Uniquely identified by `(name, domain, path)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// `None` for session cookies (kept until the jar goes away).
    pub expiry: Option<SystemTime>,
    pub creation_time: SystemTime,
    pub host_only: bool,
    pub secure_only: bool,
    pub http_only: bool,
    pub persistent: bool,
}

impl Cookie {
    fn expired(&self, now: SystemTime) -> bool {
        matches!(self.expiry, Some(t) if t <= now)
    }
}

/// `full == pattern`, or `full` ends with `"." + pattern`.
/// Both sides must already be lowercase.
pub fn domain_match(full: &str, pattern: &str) -> bool {
    match full.strip_suffix(pattern) {
        None => false,
        Some("") => true,
        Some(head) => head.ends_with('.'),
    }
}

/// `full == pattern`, or `full` starts with `pattern` and the match ends on
/// a `/` boundary. Both sides must already be lowercase.
pub fn path_match(full: &str, pattern: &str) -> bool {
    match full.strip_prefix(pattern) {
        None => false,
        Some("") => true,
        Some(_) if pattern.ends_with('/') => true,
        Some(tail) => tail.starts_with('/'),
    }
}

// RFC 6265 §5.1.4: the request path up to but not including the rightmost
// `/`, or `/` when that leaves nothing.
fn default_path(request_path: &str) -> &str {
    if !request_path.starts_with('/') {
        return "/";
    }
    match request_path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &request_path[..idx],
    }
}

/// Shared, mutex-guarded cookie store.
///
/// Every request through a [`Session`][crate::Session] reads the jar when
/// building the `Cookie` header and writes it for each `Set-Cookie` in the
/// response, including on intermediate redirect hops.
#[derive(Debug, Default)]
pub struct CookieJar {
    content: Mutex<Vec<Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        CookieJar::default()
    }

    /// Store a parsed `Set-Cookie`, RFC 6265 §5.3.
    ///
    /// `from_http_api` is false for callers outside the HTTP machinery
    /// (they may neither set nor replace HttpOnly cookies). Returns whether
    /// the cookie was stored.
    pub fn set(
        &self,
        set: &SetCookie,
        request_host: &str,
        from_http_api: bool,
        request_path: &str,
        public_suffixes: &PublicSuffixList,
    ) -> bool {
        let now = SystemTime::now();
        let request_host = lower(request_host);

        // Max-Age takes precedence over Expires; either makes the cookie
        // persistent. Neither makes a session cookie.
        let (expiry, persistent) = if let Some(max_age) = set.max_age {
            let expiry = if max_age <= 0 {
                SystemTime::UNIX_EPOCH
            } else {
                now + Duration::from_secs(max_age as u64)
            };
            (Some(expiry), true)
        } else if let Some(expires) = set.expires {
            (Some(expires), true)
        } else {
            (None, false)
        };

        let (domain, host_only) = match &set.domain {
            Some(domain) => {
                let domain = lower(domain);
                if public_suffixes.is_public_suffix(&domain) {
                    // A public-suffix domain is only acceptable when it is
                    // the request host itself.
                    if request_host != domain {
                        return false;
                    }
                } else if !domain_match(&request_host, &domain) {
                    return false;
                }
                (domain, false)
            }
            None => (request_host.clone(), true),
        };

        let path = match &set.path {
            Some(p) => lower(p),
            None => lower(default_path(request_path)),
        };

        if set.http_only && !from_http_api {
            return false;
        }

        let mut content = self.content.lock().unwrap();

        let mut creation_time = now;
        if let Some(idx) = content
            .iter()
            .position(|c| c.name == set.name && c.domain == domain && c.path == path)
        {
            if content[idx].http_only && !from_http_api {
                return false;
            }
            creation_time = content[idx].creation_time;
            content.remove(idx);
        }

        if matches!(expiry, Some(t) if t <= now) {
            return false;
        }

        content.push(Cookie {
            name: set.name.clone(),
            value: set.value.clone(),
            domain,
            path,
            expiry,
            creation_time,
            host_only,
            secure_only: set.secure,
            http_only: set.http_only,
            persistent,
        });
        true
    }

    /// Build a `Cookie` request header value for the HTTP machinery.
    ///
    /// Matching cookies are ordered longest-path first, then by older
    /// creation time, and joined as `name1=value1; name2=value2`. Empty
    /// string when nothing matches.
    pub fn get(&self, request_host: &str, request_path: &str, is_tls: bool) -> String {
        self.get_with_api(request_host, request_path, is_tls, true)
    }

    /// Like [`CookieJar::get`] but for non-HTTP callers, which do not see
    /// HttpOnly cookies.
    pub fn get_non_http(&self, request_host: &str, request_path: &str, is_tls: bool) -> String {
        self.get_with_api(request_host, request_path, is_tls, false)
    }

    fn get_with_api(
        &self,
        request_host: &str,
        request_path: &str,
        is_tls: bool,
        from_http_api: bool,
    ) -> String {
        let now = SystemTime::now();
        let host = lower(request_host);
        let path = if request_path.is_empty() {
            "/".to_string()
        } else {
            lower(request_path)
        };

        let content = self.content.lock().unwrap();
        let mut matched: Vec<&Cookie> = content
            .iter()
            .filter(|c| {
                !c.expired(now)
                    && (if c.host_only {
                        host == c.domain
                    } else {
                        domain_match(&host, &c.domain)
                    })
                    && path_match(&path, &c.path)
                    && (!c.secure_only || is_tls)
                    && (!c.http_only || from_http_api)
            })
            .collect();

        matched.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then(a.creation_time.cmp(&b.creation_time))
        });

        let mut header = String::new();
        for cookie in matched {
            if !header.is_empty() {
                header.push_str("; ");
            }
            header.push_str(&cookie.name);
            header.push('=');
            header.push_str(&cookie.value);
        }
        header
    }

    /// Remove every cookie whose expiry has passed.
    pub fn drop_expired(&self, now: SystemTime) {
        self.content.lock().unwrap().retain(|c| !c.expired(now));
    }

    pub fn len(&self) -> usize {
        self.content.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.content.lock().unwrap().clear();
    }

    /// Snapshot of the stored cookies.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.content.lock().unwrap().clone()
    }
}
