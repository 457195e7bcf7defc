//! Redirect `Location` resolution.

use url::Url;

use crate::Error;

/// Resolve a `Location` header value against the current request target.
///
/// The value is taken as a URI-reference and resolved per RFC 3986
/// (including `.`/`..` normalization). Per RFC 7231 §7.1.2, when the
/// reference carries no fragment of its own, the current target's fragment
/// is carried over to the result.
pub fn interpret_location(current: &Url, location: &str) -> Result<Url, Error> {
    if location.is_empty() {
        return Err(Error::InvalidRedirect("empty location"));
    }

    let mut resolved = current
        .join(location)
        .map_err(|_| Error::InvalidRedirect("unparsable location"))?;

    if !location.contains('#') {
        if let Some(fragment) = current.fragment() {
            resolved.set_fragment(Some(fragment));
        }
    }

    Ok(resolved)
}
