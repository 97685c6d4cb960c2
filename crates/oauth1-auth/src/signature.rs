//! Signature methods: HMAC-SHA*, PLAINTEXT and RSA-SHA1.
//!
//! Every method produces a string from a [`Request`], a [`Consumer`] and an
//! optional [`Token`], and can check a candidate signature against the same
//! inputs. The shared-secret methods key on:
//!
//! ```text
//! encode(consumer_secret) & encode(token_secret or "")
//! ```

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

use crate::credentials::{Consumer, Token};
use crate::encoding::percent_encode;
use crate::error::AuthError;
use crate::request::Request;

/// Digest used by an `HMAC-*` signature method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HmacAlgorithm {
    /// `HMAC-SHA1`, the method defined by RFC 5849.
    Sha1,
    /// `HMAC-SHA224`.
    Sha224,
    /// `HMAC-SHA256`.
    Sha256,
    /// `HMAC-SHA384`.
    Sha384,
    /// `HMAC-SHA512`.
    Sha512,
}

impl HmacAlgorithm {
    /// Compute the raw MAC of `data` under `key`.
    fn mac(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => mac_with::<Hmac<Sha1>>(key, data),
            Self::Sha224 => mac_with::<Hmac<Sha224>>(key, data),
            Self::Sha256 => mac_with::<Hmac<Sha256>>(key, data),
            Self::Sha384 => mac_with::<Hmac<Sha384>>(key, data),
            Self::Sha512 => mac_with::<Hmac<Sha512>>(key, data),
        }
    }
}

fn mac_with<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <M as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// A signature method a consumer is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureMethod {
    /// Keyed hash over the signature base string.
    Hmac(HmacAlgorithm),
    /// The signing key itself; only safe over TLS.
    Plaintext,
    /// RSASSA-PKCS1-v1_5 with SHA-1; the consumer secret holds PEM keys.
    RsaSha1,
}

impl SignatureMethod {
    /// Every supported method.
    pub const ALL: [Self; 7] = [
        Self::Hmac(HmacAlgorithm::Sha1),
        Self::Hmac(HmacAlgorithm::Sha224),
        Self::Hmac(HmacAlgorithm::Sha256),
        Self::Hmac(HmacAlgorithm::Sha384),
        Self::Hmac(HmacAlgorithm::Sha512),
        Self::Plaintext,
        Self::RsaSha1,
    ];

    /// The `oauth_signature_method` wire name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Hmac(HmacAlgorithm::Sha1) => "HMAC-SHA1",
            Self::Hmac(HmacAlgorithm::Sha224) => "HMAC-SHA224",
            Self::Hmac(HmacAlgorithm::Sha256) => "HMAC-SHA256",
            Self::Hmac(HmacAlgorithm::Sha384) => "HMAC-SHA384",
            Self::Hmac(HmacAlgorithm::Sha512) => "HMAC-SHA512",
            Self::Plaintext => "PLAINTEXT",
            Self::RsaSha1 => "RSA-SHA1",
        }
    }

    /// Look a method up by its wire name (case-sensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.name() == name)
    }

    /// Produce the signature for a request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKey`] when RSA key material cannot be
    /// parsed. The shared-secret methods never fail.
    pub fn build_signature(
        self,
        request: &Request,
        consumer: &Consumer,
        token: Option<&Token>,
    ) -> Result<String, AuthError> {
        match self {
            Self::Hmac(algorithm) => {
                let base_string = request.signature_base_string();
                let key = signing_key(consumer, token);
                Ok(BASE64.encode(algorithm.mac(key.as_bytes(), base_string.as_bytes())))
            }
            Self::Plaintext => Ok(signing_key(consumer, token)),
            Self::RsaSha1 => {
                let private_key = parse_private_key(&consumer.secret)?;
                let signing_key = SigningKey::<Sha1>::new(private_key);
                let base_string = request.signature_base_string();
                let signature = signing_key.sign(base_string.as_bytes());
                Ok(BASE64.encode(signature.to_bytes()))
            }
        }
    }

    /// Check a candidate signature.
    ///
    /// Shared-secret methods compare in constant time. Any malformed input
    /// (bad base64, unusable key) yields `false`.
    #[must_use]
    pub fn verify(
        self,
        request: &Request,
        consumer: &Consumer,
        token: Option<&Token>,
        candidate: &str,
    ) -> bool {
        match self {
            Self::Hmac(_) | Self::Plaintext => {
                let Ok(expected) = self.build_signature(request, consumer, token) else {
                    return false;
                };
                expected.as_bytes().ct_eq(candidate.as_bytes()).into()
            }
            Self::RsaSha1 => verify_rsa(request, consumer, candidate),
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| AuthError::UnsupportedSignatureMethod(s.to_owned()))
    }
}

/// The shared-secret signing key.
fn signing_key(consumer: &Consumer, token: Option<&Token>) -> String {
    let token_secret = token.map_or("", |t| t.secret.as_str());
    format!(
        "{}&{}",
        percent_encode(&consumer.secret),
        percent_encode(token_secret)
    )
}

fn verify_rsa(request: &Request, consumer: &Consumer, candidate: &str) -> bool {
    let Some(public_key) = parse_public_key(&consumer.secret) else {
        return false;
    };
    let Ok(raw) = BASE64.decode(candidate) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(raw.as_slice()) else {
        return false;
    };

    VerifyingKey::<Sha1>::new(public_key)
        .verify(request.signature_base_string().as_bytes(), &signature)
        .is_ok()
}

/// Parse a PKCS#8 or PKCS#1 PEM private key.
fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, AuthError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| AuthError::InvalidKey(e.to_string()))
}

/// Find a public key in the PEM material, deriving it from a private key if
/// that is all there is.
fn parse_public_key(pem: &str) -> Option<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .ok()
        .or_else(|| parse_private_key(pem).ok().map(|key| key.to_public_key()))
}
