//! Runtime configuration for the ingest pipeline.
//!
//! [`IngestConfig`] is an explicit value handed to the orchestrator at
//! construction; nothing reads the environment behind its back. The binary
//! builds it with [`IngestConfig::from_env`], tests with
//! [`IngestConfig::from_lookup`] over a map.

use std::time::Duration;

use crate::{ConfigError, SigningSecret};

/// Environment variable toggling the ingest endpoint.
pub const ENV_INGEST_ENABLED: &str = "BOT_INGEST_ENABLED";
/// Environment variable requiring signatures from agents that have a secret.
pub const ENV_REQUIRE_SIGNATURE: &str = "REQUIRE_HMAC";
/// Environment variable holding the per-agent per-minute ceiling.
pub const ENV_RATE_LIMIT_PER_MIN: &str = "INGEST_RATE_LIMIT_PER_MIN";
/// Environment variable holding the global fallback signing secret.
pub const ENV_GLOBAL_SIGNING_SECRET: &str = "GLOBAL_HMAC_SECRET";

/// Default per-agent ceiling when none is configured.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 120;

/// Length of one rate window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Settings consumed by the admission pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// When `false` every request is rejected with 503 before authentication.
    pub ingest_enabled: bool,
    /// When `true`, agents with a signing secret must sign their bodies.
    pub require_signature: bool,
    /// Maximum accepted requests per agent per window.
    pub rate_limit_per_minute: u32,
    /// Window length for the rate ceiling.
    pub rate_window: Duration,
    /// Deployment-wide secret, accepted for compatibility with existing
    /// deployments. Request verification only ever uses the agent's own
    /// secret.
    pub global_signing_secret: Option<SigningSecret>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ingest_enabled: false,
            require_signature: false,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            rate_window: RATE_WINDOW,
            global_signing_secret: None,
        }
    }
}

impl IngestConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is present but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Missing keys fall back to [`IngestConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first key that fails to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ingest_enabled = match lookup(ENV_INGEST_ENABLED) {
            Some(raw) => parse_flag(ENV_INGEST_ENABLED, &raw)?,
            None => defaults.ingest_enabled,
        };
        let require_signature = match lookup(ENV_REQUIRE_SIGNATURE) {
            Some(raw) => parse_flag(ENV_REQUIRE_SIGNATURE, &raw)?,
            None => defaults.require_signature,
        };
        let rate_limit_per_minute = match lookup(ENV_RATE_LIMIT_PER_MIN) {
            Some(raw) => parse_ceiling(&raw)?,
            None => defaults.rate_limit_per_minute,
        };
        let global_signing_secret = lookup(ENV_GLOBAL_SIGNING_SECRET).and_then(SigningSecret::new);

        Ok(Self {
            ingest_enabled,
            require_signature,
            rate_limit_per_minute,
            rate_window: defaults.rate_window,
            global_signing_secret,
        })
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "" | "0" | "false" => Ok(false),
        other => Err(ConfigError {
            key: key.to_string(),
            message: format!("expected 1/0 or true/false, got {other:?}"),
        }),
    }
}

fn parse_ceiling(raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError {
            key: ENV_RATE_LIMIT_PER_MIN.to_string(),
            message: format!("expected a positive integer, got {raw:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<IngestConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IngestConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert!(!config.ingest_enabled);
        assert!(!config.require_signature);
        assert_eq!(config.rate_limit_per_minute, 120);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert!(config.global_signing_secret.is_none());
    }

    #[test]
    fn flags_and_ceiling_are_parsed() {
        let config = load(&[
            ("BOT_INGEST_ENABLED", "1"),
            ("REQUIRE_HMAC", "true"),
            ("INGEST_RATE_LIMIT_PER_MIN", "30"),
            ("GLOBAL_HMAC_SECRET", "fallback"),
        ])
        .unwrap();
        assert!(config.ingest_enabled);
        assert!(config.require_signature);
        assert_eq!(config.rate_limit_per_minute, 30);
        assert!(config.global_signing_secret.is_some());
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = load(&[("INGEST_RATE_LIMIT_PER_MIN", "0")]).unwrap_err();
        assert_eq!(err.key, "INGEST_RATE_LIMIT_PER_MIN");

        let err = load(&[("REQUIRE_HMAC", "yes please")]).unwrap_err();
        assert_eq!(err.key, "REQUIRE_HMAC");
    }

    #[test]
    fn empty_global_secret_is_treated_as_unset() {
        let config = load(&[("GLOBAL_HMAC_SECRET", "")]).unwrap();
        assert!(config.global_signing_secret.is_none());
    }
}
