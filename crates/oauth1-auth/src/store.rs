//! The credential store boundary.
//!
//! The engine never persists anything itself. Consumers, tokens and seen
//! nonces live behind [`DataStore`], which a deployment backs with whatever
//! storage it has. [`crate::memory::InMemoryDataStore`] is a reference
//! implementation.

use crate::credentials::{Consumer, Token, TokenKind};
use crate::error::StoreError;

/// Trait for resolving and minting OAuth credentials.
///
/// Implementations must make [`DataStore::lookup_nonce`] an atomic
/// check-and-record: two concurrent calls with the same consumer, token and
/// nonce must not both report the nonce as unused.
pub trait DataStore: Send + Sync {
    /// Resolve a consumer by its key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend fails.
    fn lookup_consumer(&self, consumer_key: &str) -> Result<Option<Consumer>, StoreError>;

    /// Resolve a token of the given kind that belongs to `consumer`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend fails.
    fn lookup_token(
        &self,
        consumer: &Consumer,
        kind: TokenKind,
        token_key: &str,
    ) -> Result<Option<Token>, StoreError>;

    /// Check whether a nonce was already used, recording it if not.
    ///
    /// Returns `true` when the nonce has been seen before.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend fails.
    fn lookup_nonce(
        &self,
        consumer: &Consumer,
        token: Option<&Token>,
        nonce: &str,
        timestamp: i64,
    ) -> Result<bool, StoreError>;

    /// Mint a request token for `consumer`, remembering the callback.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the token cannot be issued.
    fn new_request_token(
        &self,
        consumer: &Consumer,
        callback: Option<&str>,
    ) -> Result<Token, StoreError>;

    /// Exchange an authorized request token for an access token.
    ///
    /// Implementations must invalidate `request_token`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Rejected`] if the request token was not
    /// authorized or the verifier does not match.
    fn new_access_token(
        &self,
        request_token: &Token,
        consumer: &Consumer,
        verifier: Option<&str>,
    ) -> Result<Token, StoreError>;
}
