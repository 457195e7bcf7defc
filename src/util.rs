use base64::prelude::BASE64_STANDARD;
use base64::Engine;

use crate::Error;

/// Produce the value for an `Authorization: Basic ...` header.
///
/// A `:` in the user name is truncated away, since the wire format cannot
/// represent it.
pub fn basic_auth(user: &str, pass: &str) -> String {
    let safe = match user.find(':') {
        Some(idx) => &user[..idx],
        None => user,
    };
    format!("Basic {}", BASE64_STANDARD.encode(format!("{}:{}", safe, pass)))
}

/// Produce the value for an `Authorization: Bearer ...` header.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Validate a hostname for use in SNI and the `Host` header.
///
/// Accepts DNS names, IPv4 literals and bracketed IPv6 literals. This is
/// not a full RFC 1123 check, it rejects what would corrupt the request
/// head or the TLS client hello.
pub(crate) fn validate_hostname(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.len() > 253 {
        return Err(Error::InvalidHeader("host name length"));
    }
    let ok = name.bytes().all(|b| {
        b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b':' | b'[' | b']')
    });
    if !ok {
        return Err(Error::InvalidHeader("host name characters"));
    }
    Ok(())
}

/// Lowercase an ASCII host for comparisons and cookie storage.
pub(crate) fn lower(s: &str) -> String {
    s.to_ascii_lowercase()
}
