//! The OAuth 1.0a provider state machine.
//!
//! Every entry point runs the same preconditions in order:
//!
//! 1. protocol version check (`oauth_version` absent or `1.0`);
//! 2. consumer resolution through the [`DataStore`];
//! 3. host restriction, when the request carries a remote address;
//! 4. signature verification: timestamp freshness, nonce replay, method
//!    pinning, then the cryptographic check.
//!
//! A host failure is a bad request when issuing request tokens and
//! unauthorized everywhere else.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::config::ServerConfig;
use crate::credentials::{Consumer, Token, TokenKind, TrustMode};
use crate::encoding::ParamValue;
use crate::error::AuthError;
use crate::request::{OAUTH_VERSION, Request, SIGNATURE_PARAM};
use crate::store::DataStore;

/// Source of the current Unix time in seconds.
pub type Clock = fn() -> i64;

fn system_clock() -> i64 {
    Utc::now().timestamp()
}

/// The outcome of a successful resource request verification.
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// The authenticated consumer.
    pub consumer: Consumer,
    /// The access token, for delegated consumers.
    pub token: Option<Token>,
}

impl AuthResult {
    /// The user the request acts for, if known.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self.consumer.trust_mode() {
            TrustMode::FixedIdentity { user_id } => Some(user_id),
            TrustMode::Delegated => self.token.as_ref().and_then(|t| t.user_id.as_deref()),
        }
    }
}

/// Verifies signed requests and drives the token exchange.
pub struct Server {
    store: Arc<dyn DataStore>,
    config: ServerConfig,
    clock: Clock,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Create a server over a credential store.
    #[must_use]
    pub fn new(store: Arc<dyn DataStore>, config: ServerConfig) -> Self {
        Self {
            store,
            config,
            clock: system_clock,
        }
    }

    /// Replace the clock used for timestamp checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Issue a request token (first step of the exchange).
    ///
    /// Only delegated consumers may obtain request tokens. The request is
    /// signed with the consumer secret alone and must carry
    /// `oauth_callback`.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing the first failed check.
    pub fn fetch_request_token(&self, request: &Request) -> Result<Token, AuthError> {
        self.issue_request_token(request).inspect_err(log_rejection)
    }

    /// Exchange an authorized request token for an access token (third step).
    ///
    /// The request must be signed with the request token and carry
    /// `oauth_verifier`.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing the first failed check.
    pub fn fetch_access_token(&self, request: &Request) -> Result<Token, AuthError> {
        self.issue_access_token(request).inspect_err(log_rejection)
    }

    /// Verify a signed resource request.
    ///
    /// Delegated consumers must present an access token; fixed-identity
    /// consumers sign without one.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] describing the first failed check.
    pub fn verify_request(&self, request: &Request) -> Result<AuthResult, AuthError> {
        self.verify_resource(request).inspect_err(log_rejection)
    }

    fn issue_request_token(&self, request: &Request) -> Result<Token, AuthError> {
        check_version(request)?;
        let consumer = self.get_consumer(request)?;
        if !consumer.requires_token() {
            return Err(AuthError::TokenAccessDenied);
        }
        check_host(request, &consumer, true)?;

        self.check_signature(request, &consumer, None)?;

        let callback = single_param(request, "oauth_callback")?
            .ok_or(AuthError::MissingParameter("oauth_callback"))?;
        let token = self.store.new_request_token(&consumer, Some(callback))?;
        debug!(consumer_key = %consumer.key, token = %token.key, "issued request token");
        Ok(token)
    }

    fn issue_access_token(&self, request: &Request) -> Result<Token, AuthError> {
        check_version(request)?;
        let consumer = self.get_consumer(request)?;
        check_host(request, &consumer, false)?;

        let request_token = self.get_token(request, &consumer, TokenKind::Request)?;
        self.check_signature(request, &consumer, Some(&request_token))?;

        let verifier = single_param(request, "oauth_verifier")?
            .ok_or(AuthError::MissingParameter("oauth_verifier"))?;
        let token = self
            .store
            .new_access_token(&request_token, &consumer, Some(verifier))?;
        debug!(consumer_key = %consumer.key, token = %token.key, "issued access token");
        Ok(token)
    }

    fn verify_resource(&self, request: &Request) -> Result<AuthResult, AuthError> {
        check_version(request)?;
        let consumer = self.get_consumer(request)?;
        check_host(request, &consumer, false)?;

        let token = match consumer.trust_mode() {
            TrustMode::Delegated => Some(self.get_token(request, &consumer, TokenKind::Access)?),
            TrustMode::FixedIdentity { .. } => None,
        };
        self.check_signature(request, &consumer, token.as_ref())?;

        debug!(consumer_key = %consumer.key, "request verified");
        Ok(AuthResult { consumer, token })
    }

    fn get_consumer(&self, request: &Request) -> Result<Consumer, AuthError> {
        let key = required_param(request, "oauth_consumer_key")?;
        self.store
            .lookup_consumer(key)?
            .ok_or(AuthError::InvalidConsumer)
    }

    fn get_token(
        &self,
        request: &Request,
        consumer: &Consumer,
        kind: TokenKind,
    ) -> Result<Token, AuthError> {
        let key = required_param(request, "oauth_token")?;
        self.store
            .lookup_token(consumer, kind, key)?
            .ok_or_else(|| AuthError::InvalidToken {
                kind: kind.as_str(),
                key: key.to_owned(),
            })
    }

    fn check_signature(
        &self,
        request: &Request,
        consumer: &Consumer,
        token: Option<&Token>,
    ) -> Result<(), AuthError> {
        let timestamp = required_param(request, "oauth_timestamp")?;
        let nonce = required_param(request, "oauth_nonce")?;

        let timestamp = self.check_timestamp(timestamp)?;
        if self.store.lookup_nonce(consumer, token, nonce, timestamp)? {
            return Err(AuthError::NonceReused(nonce.to_owned()));
        }

        let method = consumer.signature_method;
        let requested = required_param(request, "oauth_signature_method")?;
        if requested != method.name() {
            return Err(AuthError::SignatureMethodMismatch {
                requested: requested.to_owned(),
                expected: method.name(),
            });
        }

        debug!(
            consumer_key = %consumer.key,
            signature_method = method.name(),
            base_string = %request.signature_base_string(),
            "Verifying OAuth signature"
        );

        let signature = single_param(request, SIGNATURE_PARAM)?.unwrap_or_default();
        if method.verify(request, consumer, token, signature) {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    /// Parse a timestamp and check it against the freshness window.
    fn check_timestamp(&self, raw: &str) -> Result<i64, AuthError> {
        let now = (self.clock)();
        let expired = || AuthError::ExpiredTimestamp {
            timestamp: raw.to_owned(),
            now,
        };

        let timestamp = raw.trim().parse::<i64>().map_err(|_| expired())?;
        if now.abs_diff(timestamp) > self.config.timestamp_threshold_secs {
            return Err(expired());
        }
        Ok(timestamp)
    }
}

fn log_rejection(err: &AuthError) {
    debug!(error = %err, kind = ?err.kind(), "OAuth request rejected");
}

/// Reject any `oauth_version` other than `1.0`; absence means `1.0`.
fn check_version(request: &Request) -> Result<(), AuthError> {
    match single_param(request, "oauth_version")? {
        Some(version) if !version.is_empty() && version != OAUTH_VERSION => {
            Err(AuthError::UnsupportedVersion(version.to_owned()))
        }
        _ => Ok(()),
    }
}

fn check_host(request: &Request, consumer: &Consumer, bad_request: bool) -> Result<(), AuthError> {
    match request.remote_address() {
        Some(address) if !consumer.check_host(address) => Err(AuthError::HostNotAllowed {
            address: address.to_owned(),
            bad_request,
        }),
        _ => Ok(()),
    }
}

/// A protocol parameter that may appear at most once.
fn single_param<'a>(request: &'a Request, name: &str) -> Result<Option<&'a str>, AuthError> {
    match request.parameter(name) {
        None => Ok(None),
        Some(ParamValue::Single(value)) => Ok(Some(value)),
        Some(ParamValue::Multiple(_)) => Err(AuthError::DuplicateParameter(name.to_owned())),
    }
}

/// A protocol parameter that must be present and non-empty.
fn required_param<'a>(request: &'a Request, name: &'static str) -> Result<&'a str, AuthError> {
    single_param(request, name)?
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::MissingParameter(name))
}
