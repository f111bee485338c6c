//! Engine and RPC configuration.
//!
//! Retry counts and timeouts are explicit dependencies of the engine rather
//! than module-level state; everything here has a serde form so deployments
//! can ship one JSON document. Values may reference environment variables
//! with `$VAR` / `${VAR}` syntax via [`LiteralOrEnv`], which keeps secrets
//! (RPC URLs with embedded keys, signer keys) out of configuration files.

use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default bound on chain-read retries.
pub const DEFAULT_ETH_READER_MAX_RETRIES: u32 = 5;
/// Default bound on chain-write retries.
pub const DEFAULT_TX_RETRIES: u32 = 1;
/// Default protocol message timeout, used before a channel (and its own
/// timeout) exists.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default capacity of the engine event bus.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// RPC provider configuration for a single endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    /// HTTP URL for the RPC endpoint.
    pub http: LiteralOrEnv<Url>,
    /// Rate limit in requests per second (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

/// Tunables of the update engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Bounded retry count for chain reads.
    pub eth_reader_max_retries: u32,
    /// Bounded retry count for chain writes.
    pub default_tx_retries: u32,
    /// Protocol message timeout when no channel timeout applies yet, seconds.
    pub default_message_timeout_secs: u64,
    /// Capacity of the engine event bus.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            eth_reader_max_retries: DEFAULT_ETH_READER_MAX_RETRIES,
            default_tx_retries: DEFAULT_TX_RETRIES,
            default_message_timeout_secs: DEFAULT_MESSAGE_TIMEOUT.as_secs(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl EngineConfig {
    pub fn default_message_timeout(&self) -> Duration {
        Duration::from_secs(self.default_message_timeout_secs)
    }

    /// The protocol message timeout (and per-channel lock TTL) for a channel
    /// with the given dispute window: a tenth of the window, floored at one
    /// second.
    pub fn message_timeout_for(&self, channel_timeout_secs: u64) -> Duration {
        Duration::from_secs((channel_timeout_secs / 10).max(1))
    }
}

/// A wrapper that resolves environment variables during deserialization.
///
/// Supports literal values, `$VAR`, and `${VAR}` forms. Derefs to the inner
/// type for transparent access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    fn parse_env_var_syntax(s: &str) -> Option<String> {
        if let Some(inner) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
            Some(inner.to_string())
        } else if let Some(name) = s.strip_prefix('$') {
            (!name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_'))
                .then(|| name.to_string())
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(&var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?
        } else {
            s
        };
        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse value: {e}")))?;
        Ok(LiteralOrEnv(parsed))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.eth_reader_max_retries, 5);
        assert_eq!(config.default_tx_retries, 1);
        assert_eq!(config.message_timeout_for(600), Duration::from_secs(60));
        assert_eq!(config.message_timeout_for(3), Duration::from_secs(1));
    }

    #[test]
    fn test_literal_rpc_config() {
        let config: RpcConfig =
            serde_json::from_str(r#"{"http": "http://localhost:8545", "rate_limit": 10}"#)
                .unwrap();
        assert_eq!(config.http.as_str(), "http://localhost:8545/");
        assert_eq!(config.rate_limit, Some(10));
    }

    #[test]
    fn test_env_var_resolution() {
        // SAFETY: test-local variable name, no concurrent reader.
        unsafe { std::env::set_var("STRAND_TEST_RPC_URL", "http://example.com:8545") };
        let config: RpcConfig =
            serde_json::from_str(r#"{"http": "${STRAND_TEST_RPC_URL}"}"#).unwrap();
        assert_eq!(config.http.as_str(), "http://example.com:8545/");
    }

    #[test]
    fn test_missing_env_var_errors() {
        let result =
            serde_json::from_str::<RpcConfig>(r#"{"http": "$STRAND_TEST_UNSET_VAR"}"#);
        assert!(result.is_err());
    }
}
