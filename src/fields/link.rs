//! `Link` response header parsing (RFC 8288 syntax, to the depth the
//! client uses it: target URI plus attributes, with `rel` split into
//! relation types).

use crate::Error;

/// One `<target>; attr; attr=value` element of a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The URI-reference between `<` and `>`, unresolved.
    pub target: String,
    /// Attributes in order of appearance. Values are unquoted; an attribute
    /// without `=` has an empty value. Unknown attributes are retained.
    pub params: Vec<LinkParam>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParam {
    pub key: String,
    pub value: String,
}

impl Link {
    /// The relation types of this link: the `rel` attribute either as a
    /// single token or as a quoted, space-separated list.
    pub fn rel(&self) -> Vec<&str> {
        self.param("rel")
            .map(|v| v.split_ascii_whitespace().collect())
            .unwrap_or_default()
    }

    /// First attribute value for `key`, case-insensitive.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .map(|p| p.value.as_str())
    }
}

/// Parse a full `Link` header value into its comma-separated links.
pub fn parse_link(value: &str) -> Result<Vec<Link>, Error> {
    let mut links = Vec::new();
    let mut c = value.as_bytes();
    loop {
        c = skip_ws(c);
        if c.is_empty() {
            break;
        }
        let (link, rest) = parse_one(c)?;
        links.push(link);
        c = skip_ws(rest);
        match c.first() {
            None => break,
            Some(b',') => c = &c[1..],
            Some(_) => return Err(err()),
        }
    }
    if links.is_empty() {
        return Err(err());
    }
    Ok(links)
}

fn err() -> Error {
    Error::HttpParse("malformed link header".into())
}

fn skip_ws(s: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < s.len() && (s[i] == b' ' || s[i] == b'\t') {
        i += 1;
    }
    &s[i..]
}

fn parse_one(s: &[u8]) -> Result<(Link, &[u8]), Error> {
    let (target, mut rest) = parse_uri_ref(s)?;
    let mut params = Vec::new();

    loop {
        rest = skip_ws(rest);
        match rest.first() {
            Some(b';') => rest = skip_ws(&rest[1..]),
            _ => break,
        }
        let (key, after_key) = parse_token(rest)?;
        rest = skip_ws(after_key);
        let value;
        if rest.first() == Some(&b'=') {
            rest = skip_ws(&rest[1..]);
            let (v, after_val) = match rest.first() {
                Some(b'"') => parse_quoted(rest)?,
                Some(b'<') => {
                    let (u, r) = parse_uri_ref(rest)?;
                    (u, r)
                }
                _ => parse_token(rest)?,
            };
            value = v;
            rest = after_val;
        } else {
            value = String::new();
        }
        params.push(LinkParam { key, value });
    }

    Ok((Link { target, params }, rest))
}

// `<` URI-ref `>`
fn parse_uri_ref(s: &[u8]) -> Result<(String, &[u8]), Error> {
    if s.first() != Some(&b'<') {
        return Err(err());
    }
    let end = s.iter().position(|b| *b == b'>').ok_or_else(err)?;
    let uri = std::str::from_utf8(&s[1..end]).map_err(|_| err())?;
    Ok((uri.to_string(), &s[end + 1..]))
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

fn parse_token(s: &[u8]) -> Result<(String, &[u8]), Error> {
    let end = s.iter().position(|b| !is_tchar(*b)).unwrap_or(s.len());
    if end == 0 {
        return Err(err());
    }
    Ok((
        std::str::from_utf8(&s[..end]).map_err(|_| err())?.to_string(),
        &s[end..],
    ))
}

// `"` *( qdtext | "\" char ) `"`, with escapes removed.
fn parse_quoted(s: &[u8]) -> Result<(String, &[u8]), Error> {
    debug_assert_eq!(s.first(), Some(&b'"'));
    let mut out = Vec::new();
    let mut i = 1;
    while i < s.len() {
        match s[i] {
            b'"' => {
                let text = String::from_utf8(out).map_err(|_| err())?;
                return Ok((text, &s[i + 1..]));
            }
            b'\\' if i + 1 < s.len() => {
                out.push(s[i + 1]);
                i += 2;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Err(err())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single() {
        let lst = parse_link("<https://one.example.com>").unwrap();
        assert_eq!(lst.len(), 1);
        assert_eq!(lst[0].target, "https://one.example.com");
        assert!(lst[0].params.is_empty());
    }

    #[test]
    fn multiple() {
        let lst = parse_link("<https://one.example.com>, <https://two.example.com>").unwrap();
        assert_eq!(lst.len(), 2);
        assert_eq!(lst[0].target, "https://one.example.com");
        assert_eq!(lst[1].target, "https://two.example.com");
    }

    #[test]
    fn param_without_value() {
        let lst = parse_link("<https://one.example.com>; foobar").unwrap();
        assert_eq!(lst[0].params.len(), 1);
        assert_eq!(lst[0].params[0].key, "foobar");
        assert_eq!(lst[0].params[0].value, "");
    }

    #[test]
    fn param_with_token_value() {
        let lst = parse_link("<https://one.example.com>; xyz=ctl").unwrap();
        assert_eq!(lst[0].param("xyz"), Some("ctl"));
    }

    #[test]
    fn param_with_quoted_value() {
        let lst = parse_link(r#"<https://x.test>; title="a \"quoted\" title""#).unwrap();
        assert_eq!(lst[0].param("title"), Some(r#"a "quoted" title"#));
    }

    #[test]
    fn param_with_uri_ref_value() {
        let lst = parse_link("<https://x.test>; anchor=<https://y.test/#frag>").unwrap();
        assert_eq!(lst[0].param("anchor"), Some("https://y.test/#frag"));
    }

    #[test]
    fn rel_single_and_list() {
        let lst = parse_link("<https://x.test/next>; rel=next").unwrap();
        assert_eq!(lst[0].rel(), vec!["next"]);

        let lst = parse_link(r#"<https://x.test/a>; rel="prev first""#).unwrap();
        assert_eq!(lst[0].rel(), vec!["prev", "first"]);
    }

    #[test]
    fn pagination_header() {
        // The shape GitHub-style APIs send.
        let value = r#"<https://api.test/items?page=2>; rel="next", <https://api.test/items?page=9>; rel="last""#;
        let lst = parse_link(value).unwrap();
        assert_eq!(lst.len(), 2);
        assert_eq!(lst[0].rel(), vec!["next"]);
        assert_eq!(lst[1].target, "https://api.test/items?page=9");
    }

    #[test]
    fn malformed() {
        assert!(parse_link("").is_err());
        assert!(parse_link("https://no.angle.brackets").is_err());
        assert!(parse_link("<https://x.test> garbage").is_err());
        assert!(parse_link(r#"<https://x.test>; t="unterminated"#).is_err());
    }
}
