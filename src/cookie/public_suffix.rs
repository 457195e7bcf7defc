//! Public-suffix list handling.
//!
//! The list keeps cookies and `private_domain` redirects from crossing
//! organization boundaries. It is consumed as the publicsuffix.org line
//! format: one suffix per line, `!`-prefixed exceptions, `*.`-prefixed
//! wildcards, `//` comments. A snapshot is embedded at build time.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Parsed public-suffix rules.
#[derive(Debug, Default)]
pub struct PublicSuffixList {
    full_matches: HashSet<String>,
    wildcards: HashSet<String>,
    exceptions: HashSet<String>,
}

impl PublicSuffixList {
    /// Parse the publicsuffix.org line format.
    pub fn parse(text: &str) -> Self {
        let mut list = PublicSuffixList::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            // Only the part up to the first whitespace is the rule.
            let rule = line.split_whitespace().next().unwrap();
            let rule = rule.to_ascii_lowercase();
            if let Some(exception) = rule.strip_prefix('!') {
                list.exceptions.insert(exception.to_string());
            } else if let Some(wildcard) = rule.strip_prefix("*.") {
                list.wildcards.insert(wildcard.to_string());
            } else {
                list.full_matches.insert(rule);
            }
        }
        list
    }

    /// Whether `value` is a public suffix under these rules.
    pub fn is_public_suffix(&self, value: &str) -> bool {
        let host = value.to_ascii_lowercase();
        let host = host.strip_suffix('.').unwrap_or(&host);
        if host.is_empty() {
            return false;
        }
        if self.exceptions.contains(host) {
            return false;
        }
        if self.full_matches.contains(host) {
            return true;
        }
        // A `*.foo` rule makes every direct child of `foo` a suffix.
        if let Some((_, parent)) = host.split_once('.') {
            if self.wildcards.contains(parent) {
                return true;
            }
        }
        false
    }
}

static DEFAULT_LIST: Lazy<PublicSuffixList> =
    Lazy::new(|| PublicSuffixList::parse(include_str!("../../data/public_suffix_list.dat")));

/// The list embedded at build time.
pub fn default_list() -> &'static PublicSuffixList {
    &DEFAULT_LIST
}

/// Check against the embedded default list.
pub fn is_public_suffix(value: &str) -> bool {
    default_list().is_public_suffix(value)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_list_lookups() {
        assert!(is_public_suffix("com"));
        assert!(is_public_suffix("org"));
        assert!(!is_public_suffix("boost.org"));
        assert!(!is_public_suffix("city.kobe.jp"));
        assert!(is_public_suffix("xyz.bd"));
        assert!(!is_public_suffix("x.yz.bd"));
    }

    #[test]
    fn wildcard_and_exception() {
        let list = PublicSuffixList::parse(
            "// comment\n\
             com\n\
             *.kobe.jp\n\
             !city.kobe.jp\n",
        );
        assert!(list.is_public_suffix("com"));
        assert!(list.is_public_suffix("foo.kobe.jp"));
        assert!(!list.is_public_suffix("city.kobe.jp"));
        assert!(!list.is_public_suffix("kobe.jp"));
        assert!(!list.is_public_suffix("a.foo.kobe.jp"));
    }

    #[test]
    fn case_and_trailing_dot() {
        assert!(is_public_suffix("COM"));
        assert!(is_public_suffix("com."));
    }

    #[test]
    fn common_second_level() {
        assert!(is_public_suffix("co.uk"));
        assert!(is_public_suffix("co.jp"));
        assert!(!is_public_suffix("example.co.uk"));
    }
}
