//! `Authorization: OAuth ...` header parsing.
//!
//! The header has the format:
//!
//! ```text
//! OAuth realm="Example", oauth_consumer_key="ck", oauth_signature="s%3D"
//! ```
//!
//! Values may be quoted or bare and are percent-decoded. The `realm`
//! parameter is never treated as a protocol parameter.

use std::sync::LazyLock;

use regex::Regex;

use crate::encoding::{Parameters, percent_decode};

/// The authorization scheme name.
pub const OAUTH_SCHEME: &str = "OAuth";

/// Matches one `name="value"` or `name=value` pair.
static HEADER_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([-_a-z]*)=(?:"([^"]*)"|([^,]*)),?"#).expect("header parameter regex is valid")
});

/// Check whether an `Authorization` header value uses the OAuth scheme.
///
/// # Examples
///
/// ```
/// use oauth1_auth::header::is_oauth_scheme;
///
/// assert!(is_oauth_scheme(r#"OAuth oauth_nonce="n""#));
/// assert!(is_oauth_scheme("OAuth"));
/// assert!(!is_oauth_scheme("OAuthX"));
/// assert!(!is_oauth_scheme("Bearer abc"));
/// ```
#[must_use]
pub fn is_oauth_scheme(header: &str) -> bool {
    header.strip_prefix(OAUTH_SCHEME).is_some_and(|rest| {
        rest.chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
    })
}

/// Split an `Authorization` header into its parameters.
///
/// With `only_oauth` set, only names starting with `oauth_` are kept. The
/// `realm` parameter is always dropped. A repeated name keeps its last value.
///
/// # Examples
///
/// ```
/// use oauth1_auth::header::split_header;
///
/// let params = split_header(
///     r#"OAuth realm="Photos", oauth_consumer_key="dpf43f3p2l4k3l03", oauth_signature="tR3%2BTy81""#,
///     true,
/// );
/// assert_eq!(params.len(), 2);
/// assert_eq!(params.get("oauth_signature").unwrap().as_single(), Some("tR3+Ty81"));
/// ```
#[must_use]
pub fn split_header(header: &str, only_oauth: bool) -> Parameters {
    let mut params = Parameters::new();

    for captures in HEADER_PARAM.captures_iter(header) {
        let name = captures.get(1).map_or("", |m| m.as_str());
        if only_oauth && !name.starts_with("oauth_") {
            continue;
        }
        let raw = captures
            .get(3)
            .or_else(|| captures.get(2))
            .map_or("", |m| m.as_str());
        params.insert(name, percent_decode(raw));
    }

    params.remove("realm");
    params
}
