// =============================================================================
// Reference Poller — open interest and top-trader long/short ratio
// =============================================================================
//
// Slow-cadence companion to the stream: every poll tick it issues two
// read-only fetches against the futures REST surface and derives the
// long/short percentage split from the account ratio.  Fetch failures are
// logged and retried at the next cadence; the store keeps the previous
// values (stale-but-valid beats blank).

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::FeedConfig;

/// One successful reference-data fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSample {
    /// Outstanding open interest in contracts.
    pub open_interest: f64,
    /// Top-trader long/short account ratio over the configured lookback.
    pub long_short_ratio: f64,
    /// Share of accounts net long, 0–100, derived from the ratio.
    pub long_pct: f64,
    /// Share of accounts net short, 0–100.
    pub short_pct: f64,
}

/// Fetches reference data from the futures REST API.
pub struct ReferencePoller {
    client: reqwest::Client,
    rest_base_url: String,
    ratio_period: String,
}

impl ReferencePoller {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("failed to build reqwest client for ReferencePoller")?;
        Ok(Self {
            client,
            rest_base_url: config.rest_base_url.clone(),
            ratio_period: config.ratio_period.clone(),
        })
    }

    /// Fetch both reference values for `symbol` concurrently.
    pub async fn fetch(&self, symbol: &str) -> Result<ReferenceSample> {
        let (open_interest, ratio) = tokio::join!(
            self.fetch_open_interest(symbol),
            self.fetch_long_short_ratio(symbol),
        );
        let open_interest = open_interest?;
        let long_short_ratio = ratio?;
        let (long_pct, short_pct) = split_ratio(long_short_ratio);

        let sample = ReferenceSample {
            open_interest,
            long_short_ratio,
            long_pct,
            short_pct,
        };

        debug!(
            symbol,
            open_interest,
            ratio = long_short_ratio,
            long_pct = format!("{:.1}", long_pct),
            "reference data fetched"
        );

        Ok(sample)
    }

    /// `GET /fapi/v1/openInterest?symbol=S`
    async fn fetch_open_interest(&self, symbol: &str) -> Result<f64> {
        let url = format!(
            "{}/fapi/v1/openInterest?symbol={}",
            self.rest_base_url, symbol
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET open interest for {symbol}"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse open interest response")?;

        if !status.is_success() {
            anyhow::bail!("open interest API returned {}: {}", status, body);
        }

        body["openInterest"]
            .as_str()
            .context("open interest response missing openInterest")?
            .parse()
            .context("open interest is not a valid number")
    }

    /// `GET /futures/data/topLongShortAccountRatio?symbol=S&period=P&limit=1`
    async fn fetch_long_short_ratio(&self, symbol: &str) -> Result<f64> {
        let url = format!(
            "{}/futures/data/topLongShortAccountRatio?symbol={}&period={}&limit=1",
            self.rest_base_url, symbol, self.ratio_period
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET long/short ratio for {symbol}"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse long/short ratio response")?;

        if !status.is_success() {
            anyhow::bail!("long/short ratio API returned {}: {}", status, body);
        }

        let entry = body
            .as_array()
            .and_then(|arr| arr.first())
            .context("long/short ratio response is empty")?;

        entry["longShortRatio"]
            .as_str()
            .context("long/short ratio response missing longShortRatio")?
            .parse()
            .context("long/short ratio is not a valid number")
    }
}

/// Derive the long/short percentage split from the account ratio.
///
/// Given ratio r = longAccounts / shortAccounts:
/// long% = 100·r/(1+r), short% = 100 − long%.
pub fn split_ratio(ratio: f64) -> (f64, f64) {
    let long_pct = 100.0 * ratio / (1.0 + ratio);
    (long_pct, 100.0 - long_pct)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_splits_into_percentages() {
        // 60 long accounts vs 40 short accounts => r = 1.5
        let (long_pct, short_pct) = split_ratio(1.5);
        assert!((long_pct - 60.0).abs() < 1e-9);
        assert!((short_pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn balanced_ratio_is_fifty_fifty() {
        let (long_pct, short_pct) = split_ratio(1.0);
        assert!((long_pct - 50.0).abs() < 1e-9);
        assert!((short_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn extreme_ratio_stays_in_bounds() {
        let (long_pct, short_pct) = split_ratio(99.0);
        assert!((long_pct - 99.0).abs() < 1e-9);
        assert!((short_pct - 1.0).abs() < 1e-9);
    }
}
