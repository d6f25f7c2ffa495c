// =============================================================================
// Feed Configuration — endpoints and cadences
// =============================================================================
//
// All tunables for the feed subsystem live here.  Loading follows the usual
// pattern: JSON file if present, defaults otherwise, environment variables
// override both.  Every field carries `#[serde(default)]` so that adding new
// fields never breaks loading an older config file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_ws_base_url() -> String {
    "wss://fstream.binance.com".to_string()
}

fn default_rest_base_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_flip_interval_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_ratio_period() -> String {
    "5m".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

// =============================================================================
// FeedConfig
// =============================================================================

/// Configuration for the feed supervisor and its periodic tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the futures WebSocket endpoint.
    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    /// Base URL of the futures REST endpoint (reference data).
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    /// Seconds between taker-volume window flips.
    #[serde(default = "default_flip_interval_secs")]
    pub flip_interval_secs: u64,

    /// Seconds between reference-data polls (open interest, long/short ratio).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds to wait before re-dialling after a dropped connection.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Lookback period parameter for the long/short account ratio endpoint.
    #[serde(default = "default_ratio_period")]
    pub ratio_period: String,

    /// Timeout for reference-data HTTP requests.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        // Round-trips through serde so the default helpers stay the single
        // source of truth.
        serde_json::from_str("{}").expect("default FeedConfig must deserialize")
    }
}

impl FeedConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        info!(path = %path.display(), "feed config loaded");
        Ok(config)
    }

    /// Apply environment variable overrides (used after `load` or `default`).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PULSEFEED_WS_BASE") {
            self.ws_base_url = v;
        }
        if let Ok(v) = std::env::var("PULSEFEED_REST_BASE") {
            self.rest_base_url = v;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cadences() {
        let c = FeedConfig::default();
        assert_eq!(c.flip_interval_secs, 5);
        assert_eq!(c.poll_interval_secs, 30);
        assert_eq!(c.reconnect_delay_secs, 5);
        assert_eq!(c.ratio_period, "5m");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: FeedConfig =
            serde_json::from_str(r#"{"flip_interval_secs": 2}"#).unwrap();
        assert_eq!(c.flip_interval_secs, 2);
        assert_eq!(c.poll_interval_secs, 30);
        assert_eq!(c.ws_base_url, "wss://fstream.binance.com");
    }
}
