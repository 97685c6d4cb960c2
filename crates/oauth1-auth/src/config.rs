//! Verification settings.
//!
//! Provides [`ServerConfig`] for tuning the [`crate::Server`]. Values can be
//! loaded from environment variables.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Default freshness window for `oauth_timestamp`, in seconds.
pub const DEFAULT_TIMESTAMP_THRESHOLD_SECS: u64 = 300;

/// Server verification configuration.
///
/// # Examples
///
/// ```
/// use oauth1_auth::ServerConfig;
///
/// let config = ServerConfig::builder().timestamp_threshold_secs(60).build();
/// assert_eq!(config.timestamp_threshold_secs, 60);
/// assert_eq!(ServerConfig::default().timestamp_threshold_secs, 300);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Maximum distance between a request timestamp and the server clock.
    #[builder(default = DEFAULT_TIMESTAMP_THRESHOLD_SECS)]
    #[serde(default = "default_timestamp_threshold")]
    pub timestamp_threshold_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timestamp_threshold_secs: DEFAULT_TIMESTAMP_THRESHOLD_SECS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OAUTH_TIMESTAMP_THRESHOLD` | `300` |
    ///
    /// Unparsable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("OAUTH_TIMESTAMP_THRESHOLD") {
            if let Some(n) = parse_secs(&v) {
                config.timestamp_threshold_secs = n;
            }
        }

        config
    }
}

fn default_timestamp_threshold() -> u64 {
    DEFAULT_TIMESTAMP_THRESHOLD_SECS
}

/// Parse a whole number of seconds, tolerating surrounding whitespace.
fn parse_secs(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_default_to_five_minute_window() {
        assert_eq!(ServerConfig::default().timestamp_threshold_secs, 300);
        assert_eq!(ServerConfig::builder().build(), ServerConfig::default());
    }

    #[test]
    fn test_should_deserialize_camel_case_with_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"timestampThresholdSecs": 30}"#).unwrap();
        assert_eq!(config.timestamp_threshold_secs, 30);

        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_should_read_threshold_from_lookup() {
        let config = ServerConfig::from_lookup(|name| {
            (name == "OAUTH_TIMESTAMP_THRESHOLD").then(|| " 90 ".to_owned())
        });
        assert_eq!(config.timestamp_threshold_secs, 90);

        let config = ServerConfig::from_lookup(|_| Some("later".to_owned()));
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_should_parse_seconds_leniently() {
        assert_eq!(parse_secs(" 120 "), Some(120));
        assert_eq!(parse_secs("-1"), None);
        assert_eq!(parse_secs("soon"), None);
    }
}
