//! Consumer and token credential records.
//!
//! A [`Consumer`] is a registered client application, permanently bound to
//! one [`SignatureMethod`]. A [`Token`] is a request or access credential
//! minted by the credential store during the token exchange.

use std::fmt;

use crate::encoding::percent_encode;
use crate::host::network_match;
use crate::signature::SignatureMethod;

/// The two kinds of token in the OAuth 1.0a exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A short-lived token issued before the user authorizes the consumer.
    Request,
    /// A long-lived token bound to an authorizing user.
    Access,
}

impl TokenKind {
    /// Lowercase name used in messages and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Access => "access",
        }
    }

    /// The one-byte tag embedded in generated token keys.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Request => b'r',
            Self::Access => b'a',
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a consumer obtains the identity it acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustMode<'a> {
    /// The consumer acts directly as a fixed user and needs no token.
    FixedIdentity {
        /// The user the consumer acts as.
        user_id: &'a str,
    },
    /// The consumer must obtain a user-authorized access token.
    Delegated,
}

/// A registered OAuth consumer.
///
/// For the RSA signature method `secret` holds PEM key material rather than a
/// shared secret.
#[derive(Clone)]
pub struct Consumer {
    /// Public consumer key.
    pub key: String,
    /// Shared secret, or PEM key material for RSA.
    pub secret: String,
    /// The one signature method this consumer may use.
    pub signature_method: SignatureMethod,
    /// Fixed user identity; when set, no token exchange is required.
    pub user_id: Option<String>,
    /// Optional IPv4 address or CIDR network the consumer must call from.
    pub host: Option<String>,
}

impl Consumer {
    /// Create a delegated-mode consumer with no host restriction.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        secret: impl Into<String>,
        signature_method: SignatureMethod,
    ) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            signature_method,
            user_id: None,
            host: None,
        }
    }

    /// Bind the consumer to a fixed user identity.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restrict the consumer to an IPv4 address or CIDR network.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// The consumer's trust mode. An empty user id counts as absent.
    #[must_use]
    pub fn trust_mode(&self) -> TrustMode<'_> {
        match self.user_id.as_deref() {
            Some(user_id) if !user_id.is_empty() => TrustMode::FixedIdentity { user_id },
            _ => TrustMode::Delegated,
        }
    }

    /// Whether the consumer must go through the token exchange.
    #[must_use]
    pub fn requires_token(&self) -> bool {
        self.trust_mode() == TrustMode::Delegated
    }

    /// Whether a request from `address` satisfies the host restriction.
    #[must_use]
    pub fn check_host(&self, address: &str) -> bool {
        self.host
            .as_deref()
            .is_none_or(|network| network_match(network, address))
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("key", &self.key)
            .field("secret", &"***")
            .field("signature_method", &self.signature_method.name())
            .field("user_id", &self.user_id)
            .field("host", &self.host)
            .finish()
    }
}

/// A request or access token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    /// Public token key.
    pub key: String,
    /// Token secret, mixed into the signing key.
    pub secret: String,
    /// The authorizing user, once known.
    pub user_id: Option<String>,
}

impl Token {
    /// Create a token without a user.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            user_id: None,
        }
    }

    /// Attach the authorizing user.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// The form-encoded body returned from token endpoints.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauth1_auth::Token;
    ///
    /// let token = Token::new("key one", "s&cret");
    /// assert_eq!(
    ///     token.to_form_string(),
    ///     "oauth_token=key%20one&oauth_token_secret=s%26cret"
    /// );
    /// ```
    #[must_use]
    pub fn to_form_string(&self) -> String {
        format!(
            "oauth_token={}&oauth_token_secret={}",
            percent_encode(&self.key),
            percent_encode(&self.secret)
        )
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("key", &self.key)
            .field("secret", &"***")
            .field("user_id", &self.user_id)
            .finish()
    }
}
