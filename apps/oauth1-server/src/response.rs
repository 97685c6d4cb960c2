//! HTTP response rendering.

use bytes::Bytes;
use http_body_util::Full;
use oauth1_auth::{AuthError, ErrorKind};

/// Response body used by every endpoint.
pub type ResponseBody = Full<Bytes>;

/// Content type of token endpoint responses.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Content type of JSON responses.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Render an authentication failure.
///
/// Unauthorized responses carry an OAuth challenge for `realm`.
#[must_use]
pub fn error_to_response(error: &AuthError, realm: &str) -> http::Response<ResponseBody> {
    let mut builder = http::Response::builder()
        .status(error.status_code())
        .header("content-type", "text/plain; charset=utf-8");

    if error.kind() == ErrorKind::Unauthorized {
        builder = builder.header("www-authenticate", challenge(realm));
    }

    let message = match error.kind() {
        ErrorKind::Internal => "internal error".to_owned(),
        _ => error.to_string(),
    };

    builder
        .body(Full::new(Bytes::from(message)))
        .expect("valid error response")
}

/// Render a plain-text response with an arbitrary status.
#[must_use]
pub fn text_response(status: http::StatusCode, message: &str) -> http::Response<ResponseBody> {
    http::Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::copy_from_slice(message.as_bytes())))
        .expect("valid text response")
}

/// Render a form-encoded success response.
#[must_use]
pub fn form_response(body: String) -> http::Response<ResponseBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("content-type", FORM_CONTENT_TYPE)
        .body(Full::new(Bytes::from(body)))
        .expect("valid form response")
}

/// Render a JSON success response.
#[must_use]
pub fn json_response(value: &serde_json::Value) -> http::Response<ResponseBody> {
    let json = serde_json::to_vec(value).expect("JSON serialization of a Value cannot fail");
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("content-type", JSON_CONTENT_TYPE)
        .body(Full::new(Bytes::from(json)))
        .expect("valid JSON response")
}

/// The `WWW-Authenticate` challenge value.
fn challenge(realm: &str) -> String {
    format!("OAuth realm=\"{}\"", realm.replace('"', "'"))
}

#[cfg(test)]
mod tests {
    use oauth1_auth::StoreError;

    use super::*;

    #[test]
    fn test_should_challenge_unauthorized_requests() {
        let resp = error_to_response(&AuthError::InvalidSignature, "Photos");
        assert_eq!(resp.status(), http::StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok()),
            Some("OAuth realm=\"Photos\"")
        );
    }

    #[test]
    fn test_should_not_challenge_bad_requests() {
        let resp = error_to_response(&AuthError::MissingParameter("oauth_nonce"), "Photos");
        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
        assert!(resp.headers().get("www-authenticate").is_none());
    }

    #[test]
    fn test_should_hide_internal_error_details() {
        let err = AuthError::from(StoreError::Unavailable("db at 10.1.1.1 down".to_owned()));
        let resp = error_to_response(&err, "");
        assert_eq!(resp.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_should_set_form_content_type() {
        let resp = form_response("oauth_token=a&oauth_token_secret=b".to_owned());
        assert_eq!(
            resp.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some(FORM_CONTENT_TYPE)
        );
    }
}
