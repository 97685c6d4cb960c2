//! In-memory [`DataStore`] backed by `DashMap`.
//!
//! Suitable for tests, development and single-process deployments. Nothing
//! survives a restart.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::credentials::{Consumer, Token, TokenKind};
use crate::error::StoreError;
use crate::store::DataStore;
use crate::token::{generate_token, generate_verifier, token_kind_of};

/// A request token waiting for, or holding, user authorization.
#[derive(Debug, Clone)]
struct PendingToken {
    consumer_key: String,
    token: Token,
    callback: Option<String>,
    verifier: Option<String>,
}

/// An issued access token and the consumer it belongs to.
#[derive(Debug, Clone)]
struct IssuedToken {
    consumer_key: String,
    token: Token,
}

/// Key under which a used nonce is recorded.
type NonceKey = (String, String, String);

/// A `DashMap`-backed credential store.
///
/// # Examples
///
/// ```
/// use oauth1_auth::{Consumer, DataStore, HmacAlgorithm, InMemoryDataStore, SignatureMethod};
///
/// let store = InMemoryDataStore::new();
/// store.register_consumer(Consumer::new("ck", "cs", SignatureMethod::Hmac(HmacAlgorithm::Sha1)));
///
/// let consumer = store.lookup_consumer("ck").unwrap().unwrap();
/// let token = store.new_request_token(&consumer, Some("oob")).unwrap();
/// let verifier = store.authorize_request_token(&token.key, "alice").unwrap();
/// let access = store.new_access_token(&token, &consumer, Some(&verifier)).unwrap();
/// assert_eq!(access.user_id.as_deref(), Some("alice"));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    consumers: DashMap<String, Consumer>,
    request_tokens: DashMap<String, PendingToken>,
    access_tokens: DashMap<String, IssuedToken>,
    nonces: DashMap<NonceKey, i64>,
}

impl InMemoryDataStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a consumer.
    pub fn register_consumer(&self, consumer: Consumer) {
        self.consumers.insert(consumer.key.clone(), consumer);
    }

    /// Install an access token directly, bypassing the token exchange.
    ///
    /// Used to seed long-lived credentials provisioned out of band.
    pub fn register_access_token(&self, consumer_key: impl Into<String>, token: Token) {
        self.access_tokens.insert(
            token.key.clone(),
            IssuedToken {
                consumer_key: consumer_key.into(),
                token,
            },
        );
    }

    /// Record that `user_id` approved a request token and return its verifier.
    ///
    /// Authorizing the same token again issues a new verifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Rejected`] if the request token is unknown.
    pub fn authorize_request_token(
        &self,
        token_key: &str,
        user_id: &str,
    ) -> Result<String, StoreError> {
        let mut pending = self
            .request_tokens
            .get_mut(token_key)
            .ok_or_else(|| StoreError::Rejected(format!("unknown request token {token_key}")))?;

        let verifier = generate_verifier();
        pending.verifier = Some(verifier.clone());
        pending.token.user_id = Some(user_id.to_owned());
        debug!(token = %token_key, user_id = %user_id, "request token authorized");
        Ok(verifier)
    }

    /// The callback registered with a pending request token.
    #[must_use]
    pub fn callback(&self, token_key: &str) -> Option<String> {
        self.request_tokens
            .get(token_key)
            .and_then(|pending| pending.callback.clone())
    }

    /// Drop recorded nonces whose timestamp is older than `before`.
    ///
    /// Nonces only need to be kept for as long as their timestamp would pass
    /// the freshness check.
    pub fn prune_nonces(&self, before: i64) {
        self.nonces.retain(|_, timestamp| *timestamp >= before);
    }

    /// Number of recorded nonces.
    #[must_use]
    pub fn nonce_count(&self) -> usize {
        self.nonces.len()
    }
}

impl DataStore for InMemoryDataStore {
    fn lookup_consumer(&self, consumer_key: &str) -> Result<Option<Consumer>, StoreError> {
        Ok(self.consumers.get(consumer_key).map(|c| c.value().clone()))
    }

    fn lookup_token(
        &self,
        consumer: &Consumer,
        kind: TokenKind,
        token_key: &str,
    ) -> Result<Option<Token>, StoreError> {
        // Generated keys carry their kind; externally registered keys may not.
        if token_kind_of(token_key).is_some_and(|tagged| tagged != kind) {
            return Ok(None);
        }

        let token = match kind {
            TokenKind::Request => self
                .request_tokens
                .get(token_key)
                .filter(|pending| pending.consumer_key == consumer.key)
                .map(|pending| pending.token.clone()),
            TokenKind::Access => self
                .access_tokens
                .get(token_key)
                .filter(|issued| issued.consumer_key == consumer.key)
                .map(|issued| issued.token.clone()),
        };
        Ok(token)
    }

    fn lookup_nonce(
        &self,
        consumer: &Consumer,
        token: Option<&Token>,
        nonce: &str,
        timestamp: i64,
    ) -> Result<bool, StoreError> {
        let key = (
            consumer.key.clone(),
            token.map(|t| t.key.clone()).unwrap_or_default(),
            nonce.to_owned(),
        );

        // Entry API keeps check-and-record atomic per shard.
        match self.nonces.entry(key) {
            Entry::Occupied(_) => Ok(true),
            Entry::Vacant(entry) => {
                entry.insert(timestamp);
                Ok(false)
            }
        }
    }

    fn new_request_token(
        &self,
        consumer: &Consumer,
        callback: Option<&str>,
    ) -> Result<Token, StoreError> {
        let token = generate_token(TokenKind::Request);
        self.request_tokens.insert(
            token.key.clone(),
            PendingToken {
                consumer_key: consumer.key.clone(),
                token: token.clone(),
                callback: callback.map(str::to_owned),
                verifier: None,
            },
        );
        Ok(token)
    }

    fn new_access_token(
        &self,
        request_token: &Token,
        consumer: &Consumer,
        verifier: Option<&str>,
    ) -> Result<Token, StoreError> {
        // Any exchange attempt consumes the request token.
        let (_, pending) = self
            .request_tokens
            .remove(&request_token.key)
            .ok_or_else(|| StoreError::Rejected("request token already used".to_owned()))?;

        if pending.consumer_key != consumer.key {
            return Err(StoreError::Rejected(
                "request token issued to another consumer".to_owned(),
            ));
        }
        let (Some(expected), Some(user_id)) = (pending.verifier, pending.token.user_id) else {
            return Err(StoreError::Rejected(
                "request token not authorized".to_owned(),
            ));
        };
        if verifier != Some(expected.as_str()) {
            return Err(StoreError::Rejected("verifier mismatch".to_owned()));
        }

        let token = generate_token(TokenKind::Access).with_user_id(user_id);
        self.access_tokens.insert(
            token.key.clone(),
            IssuedToken {
                consumer_key: consumer.key.clone(),
                token: token.clone(),
            },
        );
        Ok(token)
    }
}
