//! Authentication error types.
//!
//! Every failure the engine can produce is an [`AuthError`] variant. Callers
//! usually only care about the coarse [`ErrorKind`]: malformed requests are
//! [`ErrorKind::BadRequest`], well-formed but untrusted requests are
//! [`ErrorKind::Unauthorized`], and credential store failures are
//! [`ErrorKind::Internal`].

use http::StatusCode;

/// Coarse classification of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request is malformed (HTTP 400).
    BadRequest,
    /// The request is well-formed but not trusted (HTTP 401).
    Unauthorized,
    /// The credential store failed (HTTP 500).
    Internal,
}

/// Errors raised by the credential store boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store refused the operation, e.g. a wrong verifier.
    #[error("credential store rejected the request: {0}")]
    Rejected(String),

    /// The store backend is unavailable or failed.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while verifying or signing an OAuth request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The declared `oauth_version` is not supported.
    #[error("OAuth version '{0}' not supported")]
    UnsupportedVersion(String),

    /// A required protocol parameter is missing.
    #[error("Parameter missing- {0}")]
    MissingParameter(&'static str),

    /// A protocol parameter that must be single-valued was repeated.
    #[error("Parameter {0} must not be repeated")]
    DuplicateParameter(String),

    /// The declared signature method differs from the consumer's bound method.
    #[error("Signature method '{requested}' is not supported for this consumer")]
    SignatureMethodMismatch {
        /// The method named in the request.
        requested: String,
        /// The method the consumer is bound to.
        expected: &'static str,
    },

    /// The signature method name is not one this crate implements.
    #[error("Signature method '{0}' is not supported")]
    UnsupportedSignatureMethod(String),

    /// The request URL could not be parsed as an absolute URL.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    /// A multi-valued parameter cannot be carried in the Authorization header.
    #[error("Arrays not supported in headers: {0}")]
    MultiValuedHeaderParameter(String),

    /// The consumer's key material could not be used for signing.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The consumer key is unknown.
    #[error("Invalid consumer")]
    InvalidConsumer,

    /// The consumer may not use the requested entry point.
    #[error("The provided consumer does not have token access")]
    TokenAccessDenied,

    /// The token key is unknown or not bound to the consumer.
    #[error("Invalid {kind} token: {key}")]
    InvalidToken {
        /// The token kind that was looked up.
        kind: &'static str,
        /// The token key from the request.
        key: String,
    },

    /// The caller's address does not satisfy the consumer's host restriction.
    #[error("Access not allowed from host {address}")]
    HostNotAllowed {
        /// The remote address that was rejected.
        address: String,
        /// Whether the failure is reported as a malformed request.
        bad_request: bool,
    },

    /// The request timestamp is outside the accepted window.
    #[error("Expired timestamp, yours {timestamp}, ours {now}")]
    ExpiredTimestamp {
        /// The timestamp from the request.
        timestamp: String,
        /// The server's current time.
        now: i64,
    },

    /// The nonce was already used with this consumer and token.
    #[error("Nonce already used: {0}")]
    NonceReused(String),

    /// The signature does not match.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The credential store failed or refused the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedVersion(_)
            | Self::MissingParameter(_)
            | Self::DuplicateParameter(_)
            | Self::SignatureMethodMismatch { .. }
            | Self::UnsupportedSignatureMethod(_)
            | Self::InvalidUrl(_)
            | Self::MultiValuedHeaderParameter(_)
            | Self::HostNotAllowed {
                bad_request: true, ..
            } => ErrorKind::BadRequest,
            Self::InvalidConsumer
            | Self::TokenAccessDenied
            | Self::InvalidToken { .. }
            | Self::HostNotAllowed {
                bad_request: false,
                ..
            }
            | Self::ExpiredTimestamp { .. }
            | Self::NonceReused(_)
            | Self::InvalidSignature
            | Self::Store(StoreError::Rejected(_)) => ErrorKind::Unauthorized,
            Self::InvalidKey(_) | Self::Store(StoreError::Unavailable(_)) => ErrorKind::Internal,
        }
    }

    /// The HTTP status code a transport should answer with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
