//! `Set-Cookie` header parsing, RFC 6265 §5.2.

use std::time::SystemTime;

use crate::fields::date::parse_http_date;
use crate::Error;

/// A parsed `Set-Cookie` header, before jar processing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub expires: Option<SystemTime>,
    /// Seconds; may be zero or negative, which expires the cookie at once.
    pub max_age: Option<i64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    /// Attributes this client does not act on, retained as given.
    pub extensions: Vec<(String, String)>,
}

fn err() -> Error {
    Error::HttpParse("malformed set-cookie".into())
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

// cookie-octet per RFC 6265: printable US-ASCII except DQUOTE, comma,
// semicolon and backslash.
fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2b | 0x2d..=0x3a | 0x3c..=0x5b | 0x5d..=0x7e)
}

/// Parse one `Set-Cookie` value: `name=value *( "; " attribute )`.
pub fn parse_set_cookie(input: &str) -> Result<SetCookie, Error> {
    let (pair, attrs) = match input.split_once(';') {
        Some((p, a)) => (p, Some(a)),
        None => (input, None),
    };

    let (name, value) = pair.split_once('=').ok_or_else(err)?;
    let name = name.trim();
    let mut value = value.trim();
    if name.is_empty() || !name.bytes().all(is_tchar) {
        return Err(err());
    }
    // A DQUOTE-wrapped value is allowed; the quotes are not part of it.
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value = &value[1..value.len() - 1];
    }
    if !value.bytes().all(is_cookie_octet) {
        return Err(err());
    }

    let mut out = SetCookie {
        name: name.to_string(),
        value: value.to_string(),
        ..Default::default()
    };

    for attr in attrs.map(|a| a.split(';')).into_iter().flatten() {
        let attr = attr.trim();
        if attr.is_empty() {
            continue;
        }
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr, ""),
        };

        if key.eq_ignore_ascii_case("secure") {
            out.secure = true;
        } else if key.eq_ignore_ascii_case("httponly") {
            out.http_only = true;
        } else if key.eq_ignore_ascii_case("expires") {
            // An unparsable date means the attribute is ignored, not the
            // whole cookie (RFC 6265 §5.2.1).
            if let Ok(t) = parse_http_date(val) {
                out.expires = Some(t);
            }
        } else if key.eq_ignore_ascii_case("max-age") {
            let ok = !val.is_empty()
                && val
                    .strip_prefix('-')
                    .unwrap_or(val)
                    .bytes()
                    .all(|b| b.is_ascii_digit());
            if ok {
                if let Ok(secs) = val.parse::<i64>() {
                    out.max_age = Some(secs);
                }
            }
        } else if key.eq_ignore_ascii_case("domain") {
            // A leading dot is ignored (RFC 6265 §5.2.3).
            let dom = val.strip_prefix('.').unwrap_or(val);
            if !dom.is_empty() {
                out.domain = Some(dom.to_ascii_lowercase());
            }
        } else if key.eq_ignore_ascii_case("path") {
            if val.starts_with('/') && val.bytes().all(|b| !b.is_ascii_control() && b != b';') {
                out.path = Some(val.to_string());
            }
        } else {
            out.extensions.push((key.to_string(), val.to_string()));
        }
    }

    Ok(out)
}
