//! Token and secret generation.
//!
//! Token keys are self-describing so a store can tell kinds apart without a
//! lookup:
//!
//! ```text
//! base64url( version:u16be=1 | kind:u8 ('r' or 'a') | random[32] )
//! ```
//!
//! Secrets are 64 random bytes, base64url-encoded without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::credentials::{Token, TokenKind};

/// Current token key format version.
pub const TOKEN_FORMAT_VERSION: u16 = 1;

/// Number of random bytes in a token key.
pub const TOKEN_LENGTH: usize = 32;

/// Number of random bytes in a token secret.
pub const SECRET_LENGTH: usize = 64;

/// Generate a fresh token of the given kind.
///
/// # Examples
///
/// ```
/// use oauth1_auth::TokenKind;
/// use oauth1_auth::token::generate_token;
///
/// let token = generate_token(TokenKind::Request);
/// assert_eq!(token.key.len(), 47);
/// assert_eq!(token.secret.len(), 86);
/// ```
#[must_use]
pub fn generate_token(kind: TokenKind) -> Token {
    let mut key = Vec::with_capacity(3 + TOKEN_LENGTH);
    key.extend_from_slice(&TOKEN_FORMAT_VERSION.to_be_bytes());
    key.push(kind.tag());
    key.extend_from_slice(&random_bytes::<TOKEN_LENGTH>());

    Token::new(
        URL_SAFE_NO_PAD.encode(key),
        URL_SAFE_NO_PAD.encode(random_bytes::<SECRET_LENGTH>()),
    )
}

/// Read the kind tag back out of a generated token key.
///
/// Returns `None` for keys that were not produced by [`generate_token`].
#[must_use]
pub fn token_kind_of(key: &str) -> Option<TokenKind> {
    let bytes = URL_SAFE_NO_PAD.decode(key).ok()?;
    if bytes.len() != 3 + TOKEN_LENGTH || bytes[..2] != TOKEN_FORMAT_VERSION.to_be_bytes() {
        return None;
    }
    match bytes[2] {
        b'r' => Some(TokenKind::Request),
        b'a' => Some(TokenKind::Access),
        _ => None,
    }
}

/// Generate a random nonce for outgoing requests.
#[must_use]
pub fn generate_nonce() -> String {
    hex::encode(random_bytes::<16>())
}

/// Generate the verifier handed to a user who authorizes a request token.
#[must_use]
pub fn generate_verifier() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<16>())
}

/// Fill an array from the operating system's CSPRNG.
fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}
