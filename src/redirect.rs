//! Redirect scope policies.
//!
//! A redirect mode decides which `Location` targets a session will follow.
//! The modes are strictly ordered: everything `none` allows (nothing) is
//! allowed by `endpoint`, everything `endpoint` allows by `domain`, and so
//! on up to `any`.

use url::Url;

use crate::cookie::PublicSuffixList;

/// Which redirect targets are honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectMode {
    /// Never follow redirects.
    None,
    /// Same host and same effective port.
    Endpoint,
    /// Exact host match (or a relative target).
    Domain,
    /// The target is the current host or one of its subdomains.
    Subdomain,
    /// Current and target share a registrable suffix that is not itself a
    /// public suffix. This keeps redirects inside one organization while
    /// allowing e.g. `www.example.com` -> `api.example.com`.
    #[default]
    PrivateDomain,
    /// Follow anything.
    Any,
}

/// The port a URL addresses: an explicit port, else 80 for `http`/`ws`,
/// 443 for `https`/`wss`, 0 for anything else.
pub(crate) fn effective_port(url: &Url) -> u16 {
    if let Some(port) = url.port() {
        return port;
    }
    match url.scheme() {
        "http" | "ws" => 80,
        "https" | "wss" => 443,
        _ => 0,
    }
}

/// Evaluate `mode` for a redirect from `current` to `target`.
pub(crate) fn should_redirect(
    mode: RedirectMode,
    current: &Url,
    target: &Url,
    public_suffixes: &PublicSuffixList,
) -> bool {
    let current_host = current.host_str().unwrap_or("").to_ascii_lowercase();
    let target_host = target.host_str().unwrap_or("").to_ascii_lowercase();

    // A host-less target stays wherever we already are.
    let same_host = target_host.is_empty() || target_host == current_host;

    match mode {
        RedirectMode::None => false,
        RedirectMode::Any => true,
        RedirectMode::Endpoint => {
            let target_port = effective_port(target);
            same_host && target_port != 0 && target_port == effective_port(current)
        }
        RedirectMode::Domain => same_host,
        RedirectMode::Subdomain => same_host || is_subdomain(&target_host, &current_host),
        RedirectMode::PrivateDomain => {
            if same_host || is_subdomain(&target_host, &current_host) {
                return true;
            }
            match common_dot_suffix(&current_host, &target_host) {
                Some(common) => !public_suffixes.is_public_suffix(&common),
                None => false,
            }
        }
    }
}

fn is_subdomain(candidate: &str, parent: &str) -> bool {
    !parent.is_empty()
        && candidate
            .strip_suffix(parent)
            .map(|head| head.ends_with('.'))
            .unwrap_or(false)
}

// Longest label-aligned suffix shared by both hosts ("www.boost.org" /
// "lists.boost.org" -> "boost.org"). None when they share nothing.
fn common_dot_suffix(a: &str, b: &str) -> Option<String> {
    let mut shared: Vec<&str> = Vec::new();
    for (la, lb) in a.rsplit('.').zip(b.rsplit('.')) {
        if la != lb || la.is_empty() {
            break;
        }
        shared.push(la);
    }
    if shared.is_empty() {
        return None;
    }
    shared.reverse();
    Some(shared.join("."))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cookie::default_list;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn allowed(mode: RedirectMode, current: &str, target: &str) -> bool {
        should_redirect(mode, &u(current), &u(target), default_list())
    }

    #[test]
    fn none_never() {
        assert!(!allowed(RedirectMode::None, "https://a.test/", "https://a.test/x"));
    }

    #[test]
    fn any_always() {
        assert!(allowed(RedirectMode::Any, "https://a.test/", "https://b.other/"));
    }

    #[test]
    fn endpoint_same_host_and_port() {
        let m = RedirectMode::Endpoint;
        assert!(allowed(m, "http://h.test/", "http://h.test/x"));
        // Default port elision is transparent.
        assert!(allowed(m, "http://h.test/", "http://h.test:80/x"));
        assert!(!allowed(m, "http://h.test/", "http://h.test:8080/x"));
        assert!(!allowed(m, "http://h.test/", "https://h.test/x"));
        assert!(!allowed(m, "http://h.test/", "http://other.test/x"));
    }

    #[test]
    fn domain_ignores_port() {
        let m = RedirectMode::Domain;
        assert!(allowed(m, "http://h.test/", "http://h.test:8080/x"));
        assert!(allowed(m, "http://h.test/", "https://h.test/x"));
        assert!(!allowed(m, "https://a.example/", "https://b.other/"));
    }

    #[test]
    fn subdomain_is_one_directional() {
        let m = RedirectMode::Subdomain;
        assert!(allowed(m, "https://example.com/", "https://api.example.com/"));
        assert!(allowed(m, "https://example.com/", "https://example.com/x"));
        assert!(!allowed(m, "https://api.example.com/", "https://example.com/"));
        assert!(!allowed(m, "https://example.com/", "https://notexample.com/"));
    }

    #[test]
    fn private_domain_shares_registrable_suffix() {
        let m = RedirectMode::PrivateDomain;
        assert!(allowed(m, "https://www.boost.org/", "https://lists.boost.org/"));
        // Sibling of a subdomain, still inside the organization.
        assert!(allowed(m, "https://api.example.com/", "https://example.com/"));
        // "com" is a public suffix; crossing it is crossing organizations.
        assert!(!allowed(m, "https://a.com/", "https://b.com/"));
        assert!(!allowed(m, "https://a.example/", "https://b.other/"));
        assert!(!allowed(m, "https://a.co.uk/", "https://b.co.uk/"));
    }

    #[test]
    fn modes_are_monotonic() {
        const ORDERED: [RedirectMode; 6] = [
            RedirectMode::None,
            RedirectMode::Endpoint,
            RedirectMode::Domain,
            RedirectMode::Subdomain,
            RedirectMode::PrivateDomain,
            RedirectMode::Any,
        ];
        let pairs = [
            ("http://h.test/", "http://h.test/x"),
            ("http://h.test/", "http://h.test:8080/x"),
            ("https://example.com/", "https://api.example.com/"),
            ("https://api.example.com/", "https://www.example.com/"),
            ("https://a.com/", "https://b.com/"),
            ("https://a.example/", "https://b.other/"),
        ];
        for (current, target) in pairs {
            for win in ORDERED.windows(2) {
                let narrow = allowed(win[0], current, target);
                let wide = allowed(win[1], current, target);
                assert!(
                    !narrow || wide,
                    "{:?} allowed but {:?} denied for {} -> {}",
                    win[0],
                    win[1],
                    current,
                    target
                );
            }
        }
    }
}
