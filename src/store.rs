// =============================================================================
// Snapshot Store — last known merged market snapshot per symbol
// =============================================================================
//
// The only state shared between the feed's internal tasks and external
// readers.  Writers (window flips, reference polls, stream ticks) merge
// field-wise through `upsert`; a writer can never clobber fields it does not
// own because untouched fields stay `None` in the patch.
//
// `None` in a snapshot field means "never observed" — distinct from an
// observed zero (e.g. a windowed delta of 0.0 after a quiet window).

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

// =============================================================================
// Snapshot
// =============================================================================

/// Externally visible record for one symbol, immutable at read time.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub symbol: String,

    // ── Stream-fed fields ───────────────────────────────────────────────
    /// Last mark price.
    pub price: Option<f64>,
    /// Rolling 24h traded base volume.
    pub volume_24h: Option<f64>,
    /// Funding rate as a fraction (0.0001 == 0.01%).
    pub funding_rate: Option<f64>,

    // ── Reference-poll fields ───────────────────────────────────────────
    pub open_interest: Option<f64>,
    pub long_short_ratio: Option<f64>,
    /// Share of accounts net long, 0–100.
    pub long_pct: Option<f64>,
    /// Share of accounts net short, 0–100.
    pub short_pct: Option<f64>,

    // ── Windowed taker-flow fields ──────────────────────────────────────
    pub taker_buy: Option<f64>,
    pub taker_sell: Option<f64>,
    /// taker_buy − taker_sell for the last closed window.
    pub delta: Option<f64>,

    /// ISO 8601 timestamp of the last field update.
    pub updated_at: String,
}

impl Snapshot {
    /// An all-unavailable snapshot for a symbol that was never started.
    pub fn unavailable(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: None,
            volume_24h: None,
            funding_rate: None,
            open_interest: None,
            long_short_ratio: None,
            long_pct: None,
            short_pct: None,
            taker_buy: None,
            taker_sell: None,
            delta: None,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    /// Render the snapshot with the dashboard's fixed string formatting.
    pub fn display(&self) -> SnapshotDisplay {
        SnapshotDisplay {
            symbol: self.symbol.clone(),
            price: fmt2(self.price),
            volume_24h: fmt2(self.volume_24h),
            funding_rate: self
                .funding_rate
                .map(|r| format!("{:.4}%", r * 100.0))
                .unwrap_or_else(na),
            open_interest: self
                .open_interest
                .map(|oi| format!("{oi:.2} USDT"))
                .unwrap_or_else(na),
            long_short_ratio: self
                .long_short_ratio
                .map(|r| format!("{r:.2}"))
                .unwrap_or_else(na),
            long_pct: fmt_pct1(self.long_pct),
            short_pct: fmt_pct1(self.short_pct),
            taker_buy: fmt2(self.taker_buy),
            taker_sell: fmt2(self.taker_sell),
            delta: fmt2(self.delta),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// String-formatted snapshot for display surfaces; unavailable fields render
/// as "N/A".
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDisplay {
    pub symbol: String,
    pub price: String,
    pub volume_24h: String,
    pub funding_rate: String,
    pub open_interest: String,
    pub long_short_ratio: String,
    pub long_pct: String,
    pub short_pct: String,
    pub taker_buy: String,
    pub taker_sell: String,
    pub delta: String,
    pub updated_at: String,
}

fn na() -> String {
    "N/A".to_string()
}

fn fmt2(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(na)
}

fn fmt_pct1(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.1}%")).unwrap_or_else(na)
}

// =============================================================================
// SnapshotPatch
// =============================================================================

/// Field-wise update applied through [`SnapshotStore::upsert`].  `Some`
/// overwrites, `None` leaves the stored value in place.
#[derive(Debug, Clone, Default)]
pub struct SnapshotPatch {
    pub price: Option<f64>,
    pub volume_24h: Option<f64>,
    pub funding_rate: Option<f64>,
    pub open_interest: Option<f64>,
    pub long_short_ratio: Option<f64>,
    pub long_pct: Option<f64>,
    pub short_pct: Option<f64>,
    pub taker_buy: Option<f64>,
    pub taker_sell: Option<f64>,
    pub delta: Option<f64>,
}

// =============================================================================
// SnapshotStore
// =============================================================================

/// Thread-safe mapping from symbol to its last known [`Snapshot`].
///
/// Snapshots for a stopped symbol stay readable (last known good) until
/// explicitly cleared.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `patch` into the snapshot for `symbol`, creating it if absent.
    /// Stamps `updated_at` with the current time.
    pub fn upsert(&self, symbol: &str, patch: SnapshotPatch) {
        let mut map = self.snapshots.write();
        let snapshot = map
            .entry(symbol.to_string())
            .or_insert_with(|| Snapshot::unavailable(symbol));

        merge(&mut snapshot.price, patch.price);
        merge(&mut snapshot.volume_24h, patch.volume_24h);
        merge(&mut snapshot.funding_rate, patch.funding_rate);
        merge(&mut snapshot.open_interest, patch.open_interest);
        merge(&mut snapshot.long_short_ratio, patch.long_short_ratio);
        merge(&mut snapshot.long_pct, patch.long_pct);
        merge(&mut snapshot.short_pct, patch.short_pct);
        merge(&mut snapshot.taker_buy, patch.taker_buy);
        merge(&mut snapshot.taker_sell, patch.taker_sell);
        merge(&mut snapshot.delta, patch.delta);

        snapshot.updated_at = Utc::now().to_rfc3339();
    }

    /// Last known snapshot for `symbol`, or an all-unavailable default if the
    /// symbol was never started.  Never fails, never blocks on I/O.
    pub fn read(&self, symbol: &str) -> Snapshot {
        self.snapshots
            .read()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Snapshot::unavailable(symbol))
    }

    /// Drop the stored snapshot for `symbol`, if any.
    pub fn clear(&self, symbol: &str) {
        self.snapshots.write().remove(symbol);
    }

    /// Drop all stored snapshots.
    pub fn clear_all(&self) {
        self.snapshots.write().clear();
    }
}

fn merge(field: &mut Option<f64>, update: Option<f64>) {
    if update.is_some() {
        *field = update;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_unknown_symbol_is_unavailable_default() {
        let store = SnapshotStore::new();
        let snap = store.read("BTCUSDT");
        assert_eq!(snap.symbol, "BTCUSDT");
        assert!(snap.price.is_none());
        assert!(snap.delta.is_none());
        assert_eq!(snap.display().price, "N/A");
    }

    #[test]
    fn upsert_merges_field_wise() {
        let store = SnapshotStore::new();
        store.upsert(
            "BTCUSDT",
            SnapshotPatch {
                open_interest: Some(5000.0),
                long_short_ratio: Some(1.5),
                ..Default::default()
            },
        );
        store.upsert(
            "BTCUSDT",
            SnapshotPatch {
                taker_buy: Some(150.0),
                taker_sell: Some(30.0),
                delta: Some(120.0),
                ..Default::default()
            },
        );

        // The flip must not clobber reference fields and vice versa.
        let snap = store.read("BTCUSDT");
        assert_eq!(snap.open_interest, Some(5000.0));
        assert_eq!(snap.long_short_ratio, Some(1.5));
        assert_eq!(snap.taker_buy, Some(150.0));
        assert_eq!(snap.taker_sell, Some(30.0));
        assert_eq!(snap.delta, Some(120.0));
    }

    #[test]
    fn skipped_poll_leaves_previous_reference_fields() {
        let store = SnapshotStore::new();
        store.upsert(
            "BTCUSDT",
            SnapshotPatch {
                open_interest: Some(5000.0),
                ..Default::default()
            },
        );
        // A failed poll performs no upsert; a later flip must not blank OI.
        store.upsert(
            "BTCUSDT",
            SnapshotPatch {
                delta: Some(-3.0),
                ..Default::default()
            },
        );
        assert_eq!(store.read("BTCUSDT").open_interest, Some(5000.0));
    }

    #[test]
    fn observed_zero_is_not_unavailable() {
        let store = SnapshotStore::new();
        store.upsert(
            "BTCUSDT",
            SnapshotPatch {
                taker_buy: Some(0.0),
                taker_sell: Some(0.0),
                delta: Some(0.0),
                ..Default::default()
            },
        );
        let display = store.read("BTCUSDT").display();
        assert_eq!(display.taker_buy, "0.00");
        assert_eq!(display.delta, "0.00");
    }

    #[test]
    fn display_formatting_matches_dashboard_contract() {
        let store = SnapshotStore::new();
        store.upsert(
            "BTCUSDT",
            SnapshotPatch {
                price: Some(37001.256),
                funding_rate: Some(0.0001),
                open_interest: Some(5000.0),
                long_pct: Some(60.0),
                short_pct: Some(40.0),
                taker_buy: Some(150.0),
                taker_sell: Some(30.0),
                delta: Some(120.0),
                ..Default::default()
            },
        );
        let d = store.read("BTCUSDT").display();
        assert_eq!(d.price, "37001.26");
        assert_eq!(d.funding_rate, "0.0100%");
        assert_eq!(d.open_interest, "5000.00 USDT");
        assert_eq!(d.long_pct, "60.0%");
        assert_eq!(d.short_pct, "40.0%");
        assert_eq!(d.taker_buy, "150.00");
        assert_eq!(d.taker_sell, "30.00");
        assert_eq!(d.delta, "120.00");
    }

    #[test]
    fn clear_removes_last_known_good() {
        let store = SnapshotStore::new();
        store.upsert(
            "BTCUSDT",
            SnapshotPatch {
                price: Some(100.0),
                ..Default::default()
            },
        );
        store.clear("BTCUSDT");
        assert!(store.read("BTCUSDT").price.is_none());
    }

    #[test]
    fn clear_all_removes_every_symbol() {
        let store = SnapshotStore::new();
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            store.upsert(
                symbol,
                SnapshotPatch {
                    price: Some(100.0),
                    ..Default::default()
                },
            );
        }
        store.clear_all();
        assert!(store.read("BTCUSDT").price.is_none());
        assert!(store.read("ETHUSDT").price.is_none());
    }
}
