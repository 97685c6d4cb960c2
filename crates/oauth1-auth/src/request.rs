//! The OAuth request model and its signature base string.
//!
//! The signature base string is built as:
//!
//! ```text
//! encode(UPPER(method)) & encode(normalized URL) & encode(normalized parameters)
//! ```
//!
//! where the normalized URL is `scheme://host[:port]/path` (the port only when
//! it is not the scheme default) and the normalized parameters are every
//! request parameter except `oauth_signature` and explicitly excluded names,
//! serialized by [`serialize_query`].

use std::fmt;

use chrono::Utc;
use http::Uri;
use tracing::debug;

use crate::credentials::{Consumer, Token};
use crate::encoding::{ParamValue, Parameters, parse_query_like, percent_encode, serialize_query};
use crate::error::AuthError;
use crate::header::{OAUTH_SCHEME, is_oauth_scheme, split_header};
use crate::token::generate_nonce;

/// The only protocol version this crate speaks.
pub const OAUTH_VERSION: &str = "1.0";

/// Parameter carrying the signature; never part of its own base string.
pub const SIGNATURE_PARAM: &str = "oauth_signature";

/// Content type whose body contributes signed parameters.
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An HTTP request as seen by the OAuth signing rules.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    uri: Uri,
    parameters: Parameters,
    excluded: Vec<String>,
    remote_address: Option<String>,
}

impl Request {
    /// Create a request from a method, an absolute URL and extra parameters.
    ///
    /// Parameters in the URL query are merged in first; `parameters` override
    /// them by name.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidUrl`] if `url` is not an absolute URL.
    pub fn new(
        method: impl Into<String>,
        url: &str,
        parameters: Parameters,
    ) -> Result<Self, AuthError> {
        let uri: Uri = url
            .parse()
            .map_err(|_| AuthError::InvalidUrl(url.to_owned()))?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(AuthError::InvalidUrl(url.to_owned()));
        }

        let mut merged = parse_query_like(uri.query().unwrap_or(""));
        merged.merge(parameters);

        Ok(Self {
            method: method.into(),
            uri,
            parameters: merged,
            excluded: Vec::new(),
            remote_address: None,
        })
    }

    /// Create an outgoing request pre-populated with the protocol parameters.
    ///
    /// Sets `oauth_version`, a fresh `oauth_nonce`, the current
    /// `oauth_timestamp`, `oauth_consumer_key` and, when a token is given,
    /// `oauth_token`. Entries in `parameters` override these defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidUrl`] if `url` is not an absolute URL.
    pub fn from_consumer_and_token(
        consumer: &Consumer,
        token: Option<&Token>,
        method: impl Into<String>,
        url: &str,
        parameters: Parameters,
    ) -> Result<Self, AuthError> {
        let mut defaults = Parameters::new();
        defaults.insert("oauth_version", OAUTH_VERSION);
        defaults.insert("oauth_nonce", generate_nonce());
        defaults.insert("oauth_timestamp", Utc::now().timestamp().to_string());
        defaults.insert("oauth_consumer_key", consumer.key.as_str());
        if let Some(token) = token {
            defaults.insert("oauth_token", token.key.as_str());
        }
        defaults.merge(parameters);

        Self::new(method, url, defaults)
    }

    /// Build a request from incoming HTTP request parts and the raw body.
    ///
    /// Parameters are merged in this order, later sources overriding earlier
    /// ones by name: the URL query, the body (POST with a form content type
    /// only), and the `Authorization: OAuth` header. When the URI is not
    /// absolute the URL is rebuilt from the `Host` header, using the
    /// `X-Forwarded-Proto` header or `http` as the scheme.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidUrl`] if no absolute URL can be formed.
    pub fn from_http_parts(parts: &http::request::Parts, body: &[u8]) -> Result<Self, AuthError> {
        let url = absolute_url(parts)?;
        let mut parameters = Parameters::new();

        if parts.method == http::Method::POST && has_form_body(&parts.headers) {
            parameters.merge(parse_query_like(&String::from_utf8_lossy(body)));
        }

        if let Some(auth) = header_str(&parts.headers, http::header::AUTHORIZATION.as_str()) {
            if is_oauth_scheme(auth) {
                parameters.merge(split_header(auth, true));
            }
        }

        Self::new(parts.method.as_str(), &url, parameters)
    }

    /// Attach the caller's network address.
    #[must_use]
    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    /// The caller's network address, if known.
    #[must_use]
    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    /// The HTTP method as given.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// All request parameters.
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Look up a single parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    /// Set a parameter.
    ///
    /// With `allow_duplicates` an existing value is kept and the new one is
    /// added after it; otherwise the value replaces any existing one.
    pub fn set_parameter(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        allow_duplicates: bool,
    ) {
        if allow_duplicates {
            self.parameters.append(name, value);
        } else {
            self.parameters.insert(name, value.into());
        }
    }

    /// Remove a parameter entirely.
    pub fn unset_parameter(&mut self, name: &str) {
        self.parameters.remove(name);
    }

    /// Leave a parameter out of the signature base string.
    ///
    /// Used for parameters injected after signing, such as routing
    /// parameters added by URL rewriting.
    pub fn exclude_parameter(&mut self, name: impl Into<String>) {
        self.excluded.push(name.into());
    }

    /// The normalized parameter string that is signed.
    #[must_use]
    pub fn signable_parameters(&self) -> String {
        let mut params = self.parameters.clone();
        params.remove(SIGNATURE_PARAM);
        for name in &self.excluded {
            params.remove(name);
        }
        serialize_query(&params)
    }

    /// The signature base string for this request.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauth1_auth::Request;
    /// use oauth1_auth::encoding::Parameters;
    ///
    /// let request = Request::new("get", "http://example.com:80/a?b=1", Parameters::new()).unwrap();
    /// assert_eq!(request.signature_base_string(), "GET&http%3A%2F%2Fexample.com%2Fa&b%3D1");
    /// ```
    #[must_use]
    pub fn signature_base_string(&self) -> String {
        [
            self.normalized_method(),
            self.normalized_url(),
            self.signable_parameters(),
        ]
        .iter()
        .map(|part| percent_encode(part))
        .collect::<Vec<_>>()
        .join("&")
    }

    /// The upper-cased HTTP method.
    #[must_use]
    pub fn normalized_method(&self) -> String {
        self.method.to_uppercase()
    }

    /// `scheme://host[:port]/path`, with the port only when non-default.
    ///
    /// An empty path is normalized to `/` (`http://example.com` becomes
    /// `http://example.com/`), as RFC 5849 section 3.4.1.2 requires. Clients
    /// that sign the bare authority without the slash will not verify.
    #[must_use]
    pub fn normalized_url(&self) -> String {
        let scheme = self.uri.scheme_str().unwrap_or("http");
        let host = self.uri.host().unwrap_or("");
        let default_port = if scheme == "https" { 443 } else { 80 };

        match self.uri.port_u16() {
            Some(port) if port != default_port => {
                format!("{scheme}://{host}:{port}{}", self.uri.path())
            }
            _ => format!("{scheme}://{host}{}", self.uri.path()),
        }
    }

    /// A URL carrying every parameter in its query, for GET requests.
    #[must_use]
    pub fn to_url(&self) -> String {
        let post_data = self.to_post_data();
        let url = self.normalized_url();
        if post_data.is_empty() {
            url
        } else {
            format!("{url}?{post_data}")
        }
    }

    /// Every parameter serialized as a form body, for POST requests.
    #[must_use]
    pub fn to_post_data(&self) -> String {
        serialize_query(&self.parameters)
    }

    /// The `Authorization` header value carrying the `oauth`-prefixed parameters.
    ///
    /// An empty realm is omitted.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MultiValuedHeaderParameter`] if an `oauth`
    /// parameter has several values.
    pub fn to_header(&self, realm: Option<&str>) -> Result<String, AuthError> {
        let mut fields = Vec::new();
        if let Some(realm) = realm.filter(|r| !r.is_empty()) {
            fields.push(format!("realm=\"{}\"", percent_encode(realm)));
        }

        for (name, value) in self.parameters.iter() {
            if !name.starts_with("oauth") {
                continue;
            }
            let value = value
                .as_single()
                .ok_or_else(|| AuthError::MultiValuedHeaderParameter(name.to_owned()))?;
            fields.push(format!(
                "{}=\"{}\"",
                percent_encode(name),
                percent_encode(value)
            ));
        }

        if fields.is_empty() {
            Ok(OAUTH_SCHEME.to_owned())
        } else {
            Ok(format!("{OAUTH_SCHEME} {}", fields.join(",")))
        }
    }

    /// Sign the request with the consumer's bound signature method.
    ///
    /// Sets `oauth_signature_method` and `oauth_signature`, replacing any
    /// previous values.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKey`] if the consumer's key material
    /// cannot be used by its signature method.
    pub fn sign(&mut self, consumer: &Consumer, token: Option<&Token>) -> Result<(), AuthError> {
        let method = &consumer.signature_method;
        self.set_parameter("oauth_signature_method", method.name(), false);
        let signature = method.build_signature(self, consumer, token)?;
        debug!(
            consumer_key = %consumer.key,
            signature_method = method.name(),
            "signed outgoing request"
        );
        self.set_parameter(SIGNATURE_PARAM, signature, false);
        Ok(())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

/// Rebuild the absolute request URL from the request parts.
fn absolute_url(parts: &http::request::Parts) -> Result<String, AuthError> {
    if parts.uri.scheme().is_some() && parts.uri.authority().is_some() {
        return Ok(parts.uri.to_string());
    }

    let host = header_str(&parts.headers, http::header::HOST.as_str())
        .ok_or_else(|| AuthError::InvalidUrl(parts.uri.to_string()))?;
    // Proxy chains append hops; the first entry is the client-facing scheme.
    let scheme = header_str(&parts.headers, "x-forwarded-proto")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", http::uri::PathAndQuery::as_str);

    Ok(format!("{scheme}://{host}{path_and_query}"))
}

/// Whether the request body is form-encoded.
fn has_form_body(headers: &http::HeaderMap) -> bool {
    header_str(headers, http::header::CONTENT_TYPE.as_str())
        .is_some_and(|ct| ct.contains(FORM_CONTENT_TYPE))
}

/// Extract a header value as a string, if present and valid.
fn header_str<'a>(headers: &'a http::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{HmacAlgorithm, SignatureMethod};

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_should_build_rfc5849_base_string() {
        // RFC 5849 section 3.4.1.1 example.
        let request = Request::new(
            "POST",
            "http://example.com/request?b5=%3D%253D&a3=a&c%40=&a2=r%20b",
            params(&[
                ("oauth_consumer_key", "9djdj82h48djs9d2"),
                ("oauth_token", "kkk9d7dh3k39sjv7"),
                ("oauth_signature_method", "HMAC-SHA1"),
                ("oauth_timestamp", "137131201"),
                ("oauth_nonce", "7d8f3e4a"),
                ("oauth_signature", "djosJKDKJSD8743243%2Fjdk33klY%3D"),
                ("c2", ""),
                ("a3", "2 q"),
            ]),
        )
        .unwrap();

        // The body `a3` overrides the query `a3` by name, so only one value remains.
        assert_eq!(
            request.signature_base_string(),
            "POST&http%3A%2F%2Fexample.com%2Frequest&a2%3Dr%2520b%26a3%3D2%2520q\
             %26b5%3D%253D%25253D%26c%2540%3D%26c2%3D%26oauth_consumer_key%3D9dj\
             dj82h48djs9d2%26oauth_nonce%3D7d8f3e4a%26oauth_signature_method%3DHM\
             AC-SHA1%26oauth_timestamp%3D137131201%26oauth_token%3Dkkk9d7dh3k39sj\
             v7"
        );
    }

    #[test]
    fn test_should_keep_repeated_values_when_appending() {
        let mut request =
            Request::new("POST", "http://example.com/request?a3=a", Parameters::new()).unwrap();
        request.set_parameter("a3", "2 q", true);
        assert_eq!(
            request.parameter("a3").unwrap().values(),
            ["a".to_owned(), "2 q".to_owned()]
        );
        assert!(request.signable_parameters().starts_with("a3=2%20q&a3=a"));
    }

    #[test]
    fn test_should_normalize_url_ports() {
        let cases = [
            ("http://example.com:80/p", "http://example.com/p"),
            ("https://example.com:443/p", "https://example.com/p"),
            ("http://example.com:8080/p", "http://example.com:8080/p"),
            ("https://example.com:80/p", "https://example.com:80/p"),
            ("http://example.com/p?q=1#frag", "http://example.com/p"),
            ("http://example.com", "http://example.com/"),
        ];
        for (url, expected) in cases {
            let request = Request::new("GET", url, Parameters::new()).unwrap();
            assert_eq!(request.normalized_url(), expected, "url: {url}");
        }
    }

    #[test]
    fn test_should_reject_relative_urls() {
        assert!(matches!(
            Request::new("GET", "/relative", Parameters::new()),
            Err(AuthError::InvalidUrl(_))
        ));
        assert!(matches!(
            Request::new("GET", "not a url", Parameters::new()),
            Err(AuthError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_should_exclude_signature_and_excluded_parameters() {
        let mut request = Request::new(
            "GET",
            "http://example.com/photos?route=photos/list",
            params(&[("oauth_signature", "sig"), ("size", "original")]),
        )
        .unwrap();
        request.exclude_parameter("route");

        assert_eq!(request.signable_parameters(), "size=original");
        assert!(request.to_post_data().contains("oauth_signature=sig"));
        assert!(request.to_post_data().contains("route=photos%2Flist"));
    }

    #[test]
    fn test_should_unset_parameters() {
        let mut request =
            Request::new("GET", "http://example.com/?a=1&b=2", Parameters::new()).unwrap();
        request.unset_parameter("a");
        assert_eq!(request.to_post_data(), "b=2");
    }

    #[test]
    fn test_should_build_url_with_all_parameters() {
        let request = Request::new(
            "GET",
            "http://example.com:8080/path?z=1",
            params(&[("a", "x y")]),
        )
        .unwrap();
        assert_eq!(request.to_url(), "http://example.com:8080/path?a=x%20y&z=1");
        assert_eq!(request.to_string(), request.to_url());

        let bare = Request::new("GET", "http://example.com/path", Parameters::new()).unwrap();
        assert_eq!(bare.to_url(), "http://example.com/path");
    }

    #[test]
    fn test_should_render_header_with_oauth_parameters_only() {
        let request = Request::new(
            "GET",
            "http://example.com/",
            params(&[
                ("oauth_consumer_key", "ck"),
                ("file", "vacation.jpg"),
                ("oauth_nonce", "a b"),
            ]),
        )
        .unwrap();

        assert_eq!(
            request.to_header(Some("http://sp.example.com/")).unwrap(),
            "OAuth realm=\"http%3A%2F%2Fsp.example.com%2F\",oauth_consumer_key=\"ck\",oauth_nonce=\"a%20b\""
        );
        assert_eq!(
            request.to_header(None).unwrap(),
            "OAuth oauth_consumer_key=\"ck\",oauth_nonce=\"a%20b\""
        );
        assert_eq!(
            request.to_header(Some("")).unwrap(),
            request.to_header(None).unwrap()
        );
    }

    #[test]
    fn test_should_reject_multi_valued_header_parameter() {
        let request = Request::new(
            "GET",
            "http://example.com/?oauth_nonce=a&oauth_nonce=b",
            Parameters::new(),
        )
        .unwrap();
        let err = request.to_header(None).unwrap_err();
        assert!(matches!(err, AuthError::MultiValuedHeaderParameter(ref n) if n == "oauth_nonce"));
        assert_eq!(err.kind(), crate::error::ErrorKind::BadRequest);
    }

    #[test]
    fn test_should_populate_protocol_defaults() {
        let consumer = Consumer::new("ck", "cs", SignatureMethod::Hmac(HmacAlgorithm::Sha1));
        let token = Token::new("tk", "ts");
        let request = Request::from_consumer_and_token(
            &consumer,
            Some(&token),
            "GET",
            "http://example.com/",
            params(&[("oauth_version", "1.0"), ("extra", "1")]),
        )
        .unwrap();

        let get = |name: &str| request.parameter(name).and_then(ParamValue::as_single);
        assert_eq!(get("oauth_consumer_key"), Some("ck"));
        assert_eq!(get("oauth_token"), Some("tk"));
        assert_eq!(get("oauth_version"), Some("1.0"));
        assert_eq!(get("extra"), Some("1"));
        assert!(get("oauth_nonce").is_some_and(|n| !n.is_empty()));
        assert!(
            get("oauth_timestamp")
                .and_then(|t| t.parse::<i64>().ok())
                .is_some()
        );
    }

    #[test]
    fn test_should_sign_and_replace_signature_parameters() {
        let consumer = Consumer::new("ck", "cs", SignatureMethod::Plaintext);
        let mut request = Request::new(
            "GET",
            "http://example.com/",
            params(&[("oauth_signature_method", "HMAC-SHA1")]),
        )
        .unwrap();

        request.sign(&consumer, None).unwrap();
        request.sign(&consumer, None).unwrap();

        assert_eq!(
            request.parameter("oauth_signature_method"),
            Some(&ParamValue::Single("PLAINTEXT".to_owned()))
        );
        assert_eq!(
            request.parameter("oauth_signature"),
            Some(&ParamValue::Single("cs&".to_owned()))
        );
    }

    #[test]
    fn test_should_build_from_http_parts_with_precedence() {
        let (parts, ()) = http::Request::builder()
            .method("POST")
            .uri("/photos?size=small&oauth_nonce=query")
            .header("host", "photos.example.net:8080")
            .header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
            .header(
                "authorization",
                r#"OAuth realm="x", oauth_nonce="header", oauth_consumer_key="ck""#,
            )
            .body(())
            .unwrap()
            .into_parts();

        let request =
            Request::from_http_parts(&parts, b"size=large&file=vacation.jpg").unwrap();

        let get = |name: &str| request.parameter(name).and_then(ParamValue::as_single);
        assert_eq!(get("size"), Some("large"));
        assert_eq!(get("file"), Some("vacation.jpg"));
        assert_eq!(get("oauth_nonce"), Some("header"));
        assert_eq!(get("oauth_consumer_key"), Some("ck"));
        assert!(request.parameter("realm").is_none());
        assert_eq!(request.normalized_url(), "http://photos.example.net:8080/photos");
    }

    #[test]
    fn test_should_ignore_body_without_form_content_type() {
        let (parts, ()) = http::Request::builder()
            .method("POST")
            .uri("https://api.example.com/upload")
            .header("content-type", "application/json")
            .body(())
            .unwrap()
            .into_parts();

        let request = Request::from_http_parts(&parts, b"a=1").unwrap();
        assert!(request.parameters().is_empty());
        assert_eq!(request.normalized_url(), "https://api.example.com/upload");
    }

    #[test]
    fn test_should_ignore_non_oauth_authorization_header() {
        let (parts, ()) = http::Request::builder()
            .uri("http://example.com/")
            .header("authorization", "Bearer oauth_token=abc")
            .body(())
            .unwrap()
            .into_parts();

        let request = Request::from_http_parts(&parts, b"").unwrap();
        assert!(request.parameters().is_empty());
    }

    #[test]
    fn test_should_honor_forwarded_proto() {
        let (parts, ()) = http::Request::builder()
            .uri("/secure")
            .header("host", "example.com")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap()
            .into_parts();

        let request = Request::from_http_parts(&parts, b"").unwrap();
        assert_eq!(request.normalized_url(), "https://example.com/secure");
    }

    #[test]
    fn test_should_use_first_forwarded_proto_hop() {
        let (parts, ()) = http::Request::builder()
            .uri("/secure")
            .header("host", "example.com")
            .header("x-forwarded-proto", " https , http")
            .body(())
            .unwrap()
            .into_parts();

        let request = Request::from_http_parts(&parts, b"").unwrap();
        assert_eq!(request.normalized_url(), "https://example.com/secure");
    }

    #[test]
    fn test_should_sign_empty_query_segments_as_empty_pairs() {
        let request = Request::new("GET", "http://example.com/p?a=1&", Parameters::new()).unwrap();
        assert_eq!(
            request.signature_base_string(),
            "GET&http%3A%2F%2Fexample.com%2Fp&%3D%26a%3D1"
        );
    }

    #[test]
    fn test_should_fail_without_host() {
        let (parts, ()) = http::Request::builder()
            .uri("/no-host")
            .body(())
            .unwrap()
            .into_parts();

        assert!(matches!(
            Request::from_http_parts(&parts, b""),
            Err(AuthError::InvalidUrl(_))
        ));
    }
}
