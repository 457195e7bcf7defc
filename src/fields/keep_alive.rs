//! `Keep-Alive` response header parsing.

use std::time::{Duration, SystemTime};

use crate::Error;

/// Connection reuse limits announced by the server.
///
/// `timeout` is converted to an absolute instant against the supplied
/// "now" so pools can compare it at return time. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeepAlive {
    pub timeout: Option<SystemTime>,
    pub max: Option<u64>,
}

/// Parse a `Keep-Alive` header value, e.g. `timeout=5, max=100`.
///
/// Recognized parameters are `timeout` (seconds) and `max` (request
/// count); unknown `token=token` pairs are ignored. Anything that does not
/// fit the `token=token` list shape is an error, which callers treat as
/// "close the connection after this response".
pub fn parse_keep_alive(value: &str, now: SystemTime) -> Result<KeepAlive, Error> {
    let mut out = KeepAlive::default();

    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(Error::HttpParse("empty keep-alive parameter".into()));
        }
        let (key, val) = part
            .split_once('=')
            .ok_or_else(|| Error::HttpParse("keep-alive parameter without =".into()))?;
        let (key, val) = (key.trim(), val.trim());
        if key.is_empty() || val.is_empty() {
            return Err(Error::HttpParse("malformed keep-alive parameter".into()));
        }
        if key.eq_ignore_ascii_case("timeout") {
            let secs: u64 = val
                .parse()
                .map_err(|_| Error::HttpParse("keep-alive timeout not a number".into()))?;
            out.timeout = Some(now + Duration::from_secs(secs));
        } else if key.eq_ignore_ascii_case("max") {
            let max: u64 = val
                .parse()
                .map_err(|_| Error::HttpParse("keep-alive max not a number".into()))?;
            out.max = Some(max);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn max_only() {
        let ka = parse_keep_alive("max=42", SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(ka.max, Some(42));
        assert_eq!(ka.timeout, None);
    }

    #[test]
    fn timeout_only() {
        let ka = parse_keep_alive("timeout=23", SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(ka.max, None);
        assert_eq!(ka.timeout, Some(at(23)));
    }

    #[test]
    fn both_either_order() {
        let ka = parse_keep_alive("max=12, timeout=34", SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(ka.max, Some(12));
        assert_eq!(ka.timeout, Some(at(34)));

        let ka = parse_keep_alive("timeout=12, max=34", SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(ka.max, Some(34));
        assert_eq!(ka.timeout, Some(at(12)));
    }

    #[test]
    fn unknown_params_ignored() {
        let ka = parse_keep_alive("timeout=5, foo=bar", SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(ka.timeout, Some(at(5)));
        assert_eq!(ka.max, None);
    }

    #[test]
    fn malformed_rejected() {
        assert!(parse_keep_alive("timeout", SystemTime::UNIX_EPOCH).is_err());
        assert!(parse_keep_alive("timeout=abc", SystemTime::UNIX_EPOCH).is_err());
        assert!(parse_keep_alive("max=1,,timeout=2", SystemTime::UNIX_EPOCH).is_err());
        assert!(parse_keep_alive("", SystemTime::UNIX_EPOCH).is_err());
    }
}
