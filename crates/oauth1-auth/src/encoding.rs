//! Canonical parameter encoding for OAuth 1.0a signature base strings.
//!
//! This module implements the normalization rules used to build the
//! parameter component of the signature base string:
//!
//! ```text
//! encode(k1)=encode(v1)&encode(k2)=encode(v2)...
//! ```
//!
//! Keys are sorted by byte value. When a key carries several values, those
//! values are sorted with a natural-order comparison, so `2` sorts before
//! `10`. Both rules are applied to the *encoded* strings.

use std::cmp::Ordering;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters that must be percent-encoded in OAuth parameters.
///
/// Everything except the RFC 3986 unreserved characters
/// (A-Z, a-z, 0-9, `-`, `.`, `_`, `~`) is encoded.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A parameter value: OAuth allows the same name to appear more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// The name appeared once.
    Single(String),
    /// The name appeared several times, values kept in arrival order.
    Multiple(Vec<String>),
}

impl ParamValue {
    /// The value if the parameter appeared exactly once.
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(_) => None,
        }
    }

    /// All values in arrival order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multiple(values) => values,
        }
    }

    /// Add another occurrence, turning a single value into a list.
    fn push(&mut self, value: String) {
        match self {
            Self::Single(first) => {
                let first = std::mem::take(first);
                *self = Self::Multiple(vec![first, value]);
            }
            Self::Multiple(values) => values.push(value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

/// Insertion-ordered, multi-valued parameter map.
///
/// # Examples
///
/// ```
/// use oauth1_auth::encoding::{ParamValue, Parameters};
///
/// let mut params = Parameters::new();
/// params.append("a", "1");
/// params.append("a", "2");
/// params.insert("b", "3");
/// assert_eq!(params.get("a").unwrap().values(), ["1", "2"]);
/// assert_eq!(params.get("b"), Some(&ParamValue::Single("3".to_owned())));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: Vec<(String, ParamValue)>,
}

impl Parameters {
    /// Create an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Whether a parameter with this name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a parameter, replacing any previous value(s) in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Add an occurrence of a parameter, keeping earlier occurrences.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => existing.push(value),
            None => self.entries.push((name, ParamValue::Single(value))),
        }
    }

    /// Remove a parameter and return its value(s).
    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Merge `other` into `self`; a name present in both takes `other`'s value.
    pub fn merge(&mut self, other: Self) {
        for (name, value) in other.entries {
            self.insert(name, value);
        }
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Number of distinct parameter names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.append(name, value);
        }
        params
    }
}

/// Percent-encode a single value using the OAuth (RFC 3986) rules.
///
/// After encoding, any `%7E` is turned back into `~` and any literal `+` into
/// a space. Neither rewrite changes the output of this encoder; they are kept
/// so signatures stay byte-compatible with existing peers.
///
/// # Examples
///
/// ```
/// use oauth1_auth::encoding::percent_encode;
///
/// assert_eq!(percent_encode("a b&c~"), "a%20b%26c~");
/// assert_eq!(percent_encode("caf\u{e9}"), "caf%C3%A9");
/// ```
#[must_use]
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET)
        .to_string()
        .replace("%7E", "~")
        .replace('+', " ")
}

/// Percent-encode every value of a sequence.
#[must_use]
pub fn percent_encode_all<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values
        .iter()
        .map(|value| percent_encode(value.as_ref()))
        .collect()
}

/// Decode a form-style encoded value (`+` is a space, `%XX` is a byte).
#[must_use]
pub fn percent_decode(value: &str) -> String {
    percent_decode_str(&value.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Parse `a=b&a=c&d=e` into a [`Parameters`] map.
///
/// Each pair is split on its first `=`; a pair without `=` gets an empty
/// value, and an empty segment (`a=1&&b=2`, a trailing `&`) becomes an empty
/// name with an empty value. Repeated names are collected in arrival order.
///
/// # Examples
///
/// ```
/// use oauth1_auth::encoding::parse_query_like;
///
/// let params = parse_query_like("a=b&a=c&d=e%20f");
/// assert_eq!(params.get("a").unwrap().values(), ["b", "c"]);
/// assert_eq!(params.get("d").unwrap().as_single(), Some("e f"));
/// ```
#[must_use]
pub fn parse_query_like(input: &str) -> Parameters {
    if input.is_empty() {
        return Parameters::new();
    }

    input
        .split('&')
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(name), percent_decode(value))
        })
        .collect()
}

/// Serialize parameters into the normalized `k=v&k=v` form.
///
/// Keys and values are percent-encoded first. Keys are then sorted by byte
/// value, and the values of a repeated key are sorted with
/// [`natural_cmp`].
///
/// # Examples
///
/// ```
/// use oauth1_auth::encoding::{Parameters, serialize_query};
///
/// let params: Parameters = [("b", "2"), ("a", "10"), ("a", "9")].into_iter().collect();
/// assert_eq!(serialize_query(&params), "a=9&a=10&b=2");
/// ```
#[must_use]
pub fn serialize_query(params: &Parameters) -> String {
    if params.is_empty() {
        return String::new();
    }

    let mut encoded: Vec<(String, Vec<String>)> = params
        .iter()
        .map(|(name, value)| (percent_encode(name), percent_encode_all(value.values())))
        .collect();

    encoded.sort_by(|a, b| a.0.cmp(&b.0));

    let mut pairs = Vec::with_capacity(encoded.len());
    for (name, mut values) in encoded {
        values.sort_by(|a, b| natural_cmp(a, b));
        for value in values {
            pairs.push(format!("{name}={value}"));
        }
    }

    pairs.join("&")
}

/// Compare two strings in natural order.
///
/// Digit runs are compared as numbers (`img2` < `img10`), everything else by
/// byte value. Leading zeros of the whole string are ignored; a digit run
/// elsewhere that starts with `0` is compared left-aligned as a fraction, so
/// `a05` sorts before `a1`. Strings that are equal under these rules fall back
/// to a byte-wise comparison.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use oauth1_auth::encoding::natural_cmp;
///
/// assert_eq!(natural_cmp("img2", "img10"), Ordering::Less);
/// assert_eq!(natural_cmp("a05", "a1"), Ordering::Less);
/// assert_eq!(natural_cmp("b", "a"), Ordering::Greater);
/// ```
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut x, mut y) = (skip_leading_zeros(a.as_bytes()), skip_leading_zeros(b.as_bytes()));

    let ord = loop {
        match (x.first(), y.first()) {
            (None, None) => break Ordering::Equal,
            (None, Some(_)) => break Ordering::Less,
            (Some(_), None) => break Ordering::Greater,
            (Some(&cx), Some(&cy)) if cx.is_ascii_digit() && cy.is_ascii_digit() => {
                let (digits_x, rest_x) = split_digits(x);
                let (digits_y, rest_y) = split_digits(y);
                let ord = if cx == b'0' || cy == b'0' {
                    digits_x.cmp(digits_y)
                } else {
                    digits_x
                        .len()
                        .cmp(&digits_y.len())
                        .then_with(|| digits_x.cmp(digits_y))
                };
                if ord != Ordering::Equal {
                    break ord;
                }
                x = rest_x;
                y = rest_y;
            }
            (Some(cx), Some(cy)) => {
                if cx != cy {
                    break cx.cmp(cy);
                }
                x = &x[1..];
                y = &y[1..];
            }
        }
    };

    ord.then_with(|| a.cmp(b))
}

/// Drop zeros at the start of a string when a digit follows them.
fn skip_leading_zeros(mut s: &[u8]) -> &[u8] {
    while s.len() > 1 && s[0] == b'0' && s[1].is_ascii_digit() {
        s = &s[1..];
    }
    s
}

/// Split a leading run of ASCII digits off a byte slice.
fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s
        .iter()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(s.len());
    s.split_at(end)
}
