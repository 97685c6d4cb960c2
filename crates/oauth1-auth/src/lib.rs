//! OAuth 1.0a request signing and verification.
//!
//! This crate implements the service-provider side of OAuth 1.0a (RFC 5849):
//! canonicalizing a request into its signature base string, signing and
//! verifying it with HMAC-SHA*, PLAINTEXT or RSA-SHA1, and driving the
//! three-step token exchange (request token, user authorization, access
//! token) plus verification of signed resource requests.
//!
//! # Overview
//!
//! A transport turns an incoming HTTP request into a [`Request`], either
//! directly or with [`Request::from_http_parts`]. The [`Server`] resolves the
//! consumer and token through a [`DataStore`], checks the timestamp and nonce,
//! pins the signature method to the one the consumer is registered with, and
//! verifies the signature. Every failure is an [`AuthError`] whose
//! [`ErrorKind`] maps onto an HTTP status.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use oauth1_auth::encoding::Parameters;
//! use oauth1_auth::{
//!     Consumer, HmacAlgorithm, InMemoryDataStore, Request, Server, ServerConfig,
//!     SignatureMethod, Token,
//! };
//!
//! let consumer = Consumer::new("ck", "cs", SignatureMethod::Hmac(HmacAlgorithm::Sha1));
//! let token = Token::new("tk", "ts").with_user_id("alice");
//!
//! let store = Arc::new(InMemoryDataStore::new());
//! store.register_consumer(consumer.clone());
//! store.register_access_token("ck", token.clone());
//! let server = Server::new(store, ServerConfig::default());
//!
//! let mut request = Request::from_consumer_and_token(
//!     &consumer,
//!     Some(&token),
//!     "GET",
//!     "https://api.example.com/photos?size=original",
//!     Parameters::new(),
//! )
//! .unwrap();
//! request.sign(&consumer, Some(&token)).unwrap();
//!
//! let result = server.verify_request(&request).unwrap();
//! assert_eq!(result.user_id(), Some("alice"));
//! ```
//!
//! # Modules
//!
//! - [`config`] - Verification settings
//! - [`credentials`] - Consumer and token records
//! - [`encoding`] - Percent-encoding and parameter normalization
//! - [`error`] - Authentication error types
//! - [`header`] - `Authorization: OAuth` header parsing
//! - [`host`] - IPv4/CIDR host restriction matching
//! - [`memory`] - In-memory credential store
//! - [`request`] - Request model and signature base string
//! - [`server`] - Token exchange and request verification
//! - [`signature`] - Signature methods
//! - [`store`] - Credential store trait
//! - [`token`] - Token, secret and nonce generation

pub mod config;
pub mod credentials;
pub mod encoding;
pub mod error;
pub mod header;
pub mod host;
pub mod memory;
pub mod request;
pub mod server;
pub mod signature;
pub mod store;
pub mod token;

pub use config::ServerConfig;
pub use credentials::{Consumer, Token, TokenKind, TrustMode};
pub use error::{AuthError, ErrorKind, StoreError};
pub use memory::InMemoryDataStore;
pub use request::Request;
pub use server::{AuthResult, Server};
pub use signature::{HmacAlgorithm, SignatureMethod};
pub use store::DataStore;
