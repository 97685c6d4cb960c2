//! Application configuration loaded from the environment.

use anyhow::{Context, Result};
use oauth1_auth::{Consumer, ServerConfig, SignatureMethod};
use serde::{Deserialize, Serialize};

/// Default bind address.
const DEFAULT_LISTEN: &str = "0.0.0.0:4580";

/// A consumer provisioned from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerSettings {
    /// Consumer key.
    pub key: String,
    /// Shared secret, or PEM key material for `RSA-SHA1`.
    pub secret: String,
    /// Wire name of the bound signature method.
    pub signature_method: String,
    /// Fixed user identity, for consumers that skip the token exchange.
    pub user_id: Option<String>,
    /// IPv4 address or CIDR network the consumer must call from.
    pub host: Option<String>,
}

impl ConsumerSettings {
    /// Build the [`Consumer`] record.
    pub fn to_consumer(&self) -> Result<Consumer> {
        let method: SignatureMethod = self
            .signature_method
            .parse()
            .with_context(|| format!("invalid OAUTH_SIGNATURE_METHOD: {}", self.signature_method))?;

        let mut consumer = Consumer::new(self.key.clone(), self.secret.clone(), method);
        if let Some(user_id) = self.user_id.as_deref().filter(|u| !u.is_empty()) {
            consumer = consumer.with_user_id(user_id);
        }
        if let Some(host) = self.host.as_deref().filter(|h| !h.is_empty()) {
            consumer = consumer.with_host(host);
        }
        Ok(consumer)
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Bind address (e.g. `"0.0.0.0:4580"`).
    pub gateway_listen: String,
    /// Log level filter string.
    pub log_level: String,
    /// Realm advertised in `WWW-Authenticate` challenges.
    pub realm: String,
    /// Secret required by the approval hook; loopback-only when unset.
    pub admin_token: Option<String>,
    /// Consumer to register at startup, if configured.
    pub consumer: Option<ConsumerSettings>,
    /// Verification settings for the engine.
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway_listen: DEFAULT_LISTEN.to_owned(),
            log_level: "info".to_owned(),
            realm: String::new(),
            admin_token: None,
            consumer: None,
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:4580` |
    /// | `LOG_LEVEL` | `info` |
    /// | `OAUTH_REALM` | *(empty)* |
    /// | `OAUTH_ADMIN_TOKEN` | *(unset)* |
    /// | `OAUTH_TIMESTAMP_THRESHOLD` | `300` |
    /// | `OAUTH_CONSUMER_KEY` | *(unset)* |
    /// | `OAUTH_CONSUMER_SECRET` | *(unset)* |
    /// | `OAUTH_SIGNATURE_METHOD` | `HMAC-SHA1` |
    /// | `OAUTH_CONSUMER_USER_ID` | *(unset)* |
    /// | `OAUTH_CONSUMER_HOST` | *(unset)* |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("OAUTH_REALM") {
            config.realm = v;
        }
        if let Some(v) = lookup("OAUTH_ADMIN_TOKEN").filter(|v| !v.is_empty()) {
            config.admin_token = Some(v);
        }
        config.server = ServerConfig::from_lookup(&lookup);

        if let (Some(key), Some(secret)) = (
            lookup("OAUTH_CONSUMER_KEY"),
            lookup("OAUTH_CONSUMER_SECRET"),
        ) {
            config.consumer = Some(ConsumerSettings {
                key,
                secret,
                signature_method: lookup("OAUTH_SIGNATURE_METHOD")
                    .unwrap_or_else(|| "HMAC-SHA1".to_owned()),
                user_id: lookup("OAUTH_CONSUMER_USER_ID"),
                host: lookup("OAUTH_CONSUMER_HOST"),
            });
        }

        config
    }
}
