// =============================================================================
// Feed Supervisor — session lifecycle for the active symbol's stream
// =============================================================================
//
// Owns the single active feed session: dialling the multiplexed stream,
// routing inbound messages through the decoder, driving the two periodic
// tasks (window flip, reference poll), and reconnecting after drops.  At most
// one session is live system-wide; starting a new symbol tears down the
// previous session before the new one begins connecting.
//
// Every task spawned for a session is tied to that session's cancellation
// token, so a stop or a symbol switch cancels the message loop and both tick
// loops together.  A tick already in flight at cancellation time completes
// but discards its result instead of writing to the store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregator::WindowAggregator;
use crate::config::FeedConfig;
use crate::decoder::{self, StreamEvent};
use crate::error::StartError;
use crate::poller::ReferencePoller;
use crate::store::{Snapshot, SnapshotPatch, SnapshotStore};

// =============================================================================
// FeedState
// =============================================================================

/// Lifecycle state of the active feed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedState {
    /// No session exists.
    Idle,
    /// A session exists and is dialling the stream.
    Connecting,
    /// The stream is up and messages are flowing.
    Live,
    /// The stream dropped; waiting out the fixed delay before re-dialling.
    Reconnecting,
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Live => write!(f, "Live"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

// =============================================================================
// Session registry
// =============================================================================

/// Handle for one live session.  Dropping the handle does not stop the tasks;
/// cancellation does.
struct Session {
    symbol: String,
    state: Arc<RwLock<FeedState>>,
    cancel: CancellationToken,
}

/// Supervises the single active feed session and owns the snapshot store.
pub struct FeedSupervisor {
    config: FeedConfig,
    store: Arc<SnapshotStore>,
    poller: Arc<ReferencePoller>,
    session: Mutex<Option<Session>>,
}

impl FeedSupervisor {
    pub fn new(config: FeedConfig, store: Arc<SnapshotStore>) -> Result<Self> {
        let poller = Arc::new(ReferencePoller::new(&config)?);
        Ok(Self {
            config,
            store,
            poller,
            session: Mutex::new(None),
        })
    }

    /// Begin (or retarget) the single active feed session.
    ///
    /// Idempotent: a start request for the symbol that is already active is a
    /// no-op.  A start request for a different symbol tears the previous
    /// session down first.  Must be called from within a Tokio runtime.
    pub fn start_feed(&self, symbol: &str) -> Result<(), StartError> {
        let symbol = normalize_symbol(symbol)?;
        let mut slot = self.session.lock();

        if let Some(current) = slot.as_ref() {
            if current.symbol == symbol && !current.cancel.is_cancelled() {
                debug!(symbol = %symbol, "feed already active; start is a no-op");
                return Ok(());
            }
        }

        // Tear the previous session down before the new one starts
        // connecting.  Its message loop and both tick loops share the token.
        if let Some(old) = slot.take() {
            info!(old = %old.symbol, new = %symbol, "superseding active session");
            old.cancel.cancel();
            *old.state.write() = FeedState::Idle;
        }

        let state = Arc::new(RwLock::new(FeedState::Connecting));
        let cancel = CancellationToken::new();

        tokio::spawn(run_session(
            self.config.clone(),
            symbol.clone(),
            self.store.clone(),
            self.poller.clone(),
            state.clone(),
            cancel.clone(),
        ));

        info!(symbol = %symbol, "feed session started");
        *slot = Some(Session {
            symbol,
            state,
            cancel,
        });
        Ok(())
    }

    /// Stop the named symbol's session, or whatever session is active when
    /// `symbol` is `None`.  Stopping a symbol that is not active (or stopping
    /// while idle) is a no-op.  The last known snapshot stays readable.
    pub fn stop_feed(&self, symbol: Option<&str>) {
        let mut slot = self.session.lock();

        let matches = match (slot.as_ref(), symbol) {
            (Some(_), None) => true,
            (Some(current), Some(requested)) => {
                current.symbol == requested.trim().to_ascii_uppercase()
            }
            (None, _) => false,
        };

        if !matches {
            debug!(symbol = ?symbol, "stop request does not match active session; no-op");
            return;
        }

        if let Some(session) = slot.take() {
            info!(symbol = %session.symbol, "stopping feed session");
            session.cancel.cancel();
            *session.state.write() = FeedState::Idle;
        }
    }

    /// Symbol of the active session, if any.
    pub fn active_symbol(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.symbol.clone())
    }

    /// Current lifecycle state ([`FeedState::Idle`] when no session exists).
    pub fn state(&self) -> FeedState {
        self.session
            .lock()
            .as_ref()
            .map(|s| *s.state.read())
            .unwrap_or(FeedState::Idle)
    }

    /// Last known snapshot for `symbol` (never fails, never blocks on I/O).
    pub fn snapshot(&self, symbol: &str) -> Snapshot {
        self.store.read(&symbol.trim().to_ascii_uppercase())
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    #[cfg(test)]
    fn session_token(&self) -> Option<CancellationToken> {
        self.session.lock().as_ref().map(|s| s.cancel.clone())
    }
}

/// Uppercase-normalize and validate a venue symbol (e.g. "btcusdt" ->
/// "BTCUSDT").  Rejects anything that is not 5–20 ASCII alphanumerics.
fn normalize_symbol(raw: &str) -> Result<String, StartError> {
    let symbol = raw.trim().to_ascii_uppercase();
    let valid = (5..=20).contains(&symbol.len())
        && symbol.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(symbol)
    } else {
        Err(StartError::InvalidSymbol(raw.to_string()))
    }
}

// =============================================================================
// Session task
// =============================================================================

/// Top-level task for one session: connect, stream, reconnect — until the
/// session's token is cancelled.  The two periodic tasks run alongside for
/// the whole session lifetime, across reconnects.
async fn run_session(
    config: FeedConfig,
    symbol: String,
    store: Arc<SnapshotStore>,
    poller: Arc<ReferencePoller>,
    state: Arc<RwLock<FeedState>>,
    cancel: CancellationToken,
) {
    let aggregator = Arc::new(WindowAggregator::new());

    tokio::spawn(flip_loop(
        symbol.clone(),
        aggregator.clone(),
        store.clone(),
        cancel.clone(),
        config.flip_interval_secs,
    ));
    tokio::spawn(poll_loop(
        symbol.clone(),
        poller,
        store.clone(),
        cancel.clone(),
        config.poll_interval_secs,
    ));

    loop {
        if cancel.is_cancelled() {
            break;
        }
        *state.write() = FeedState::Connecting;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = run_stream(&config, &symbol, &aggregator, &store, &state) => {
                match result {
                    Ok(()) => warn!(symbol = %symbol, "stream closed by upstream"),
                    Err(e) => error!(symbol = %symbol, error = %e, "stream error"),
                }
                *state.write() = FeedState::Reconnecting;
                info!(
                    symbol = %symbol,
                    delay_secs = config.reconnect_delay_secs,
                    "reconnecting after delay"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(config.reconnect_delay_secs)) => {}
                }
            }
        }
    }

    *state.write() = FeedState::Idle;
    debug!(symbol = %symbol, "session task exited");
}

/// One connection attempt: dial the multiplexed stream and pump messages
/// until the stream errors or ends.
async fn run_stream(
    config: &FeedConfig,
    symbol: &str,
    aggregator: &WindowAggregator,
    store: &SnapshotStore,
    state: &RwLock<FeedState>,
) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!(
        "{}/stream?streams={lower}@aggTrade/{lower}@markPrice@1s/{lower}@ticker",
        config.ws_base_url
    );
    info!(symbol = %symbol, url = %url, "connecting multiplexed stream");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to combined stream")?;

    *state.write() = FeedState::Live;
    info!(symbol = %symbol, "stream connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match decoder::decode(&text) {
                Ok(StreamEvent::Trade {
                    price,
                    quantity,
                    buyer_is_maker,
                }) => {
                    aggregator.record_trade(price, quantity, buyer_is_maker);
                }
                Ok(StreamEvent::MarkPrice {
                    mark_price,
                    funding_rate,
                }) => {
                    store.upsert(
                        symbol,
                        SnapshotPatch {
                            price: Some(mark_price),
                            funding_rate: Some(funding_rate),
                            ..Default::default()
                        },
                    );
                }
                Ok(StreamEvent::Ticker { volume_24h }) => {
                    store.upsert(
                        symbol,
                        SnapshotPatch {
                            volume_24h: Some(volume_24h),
                            ..Default::default()
                        },
                    );
                }
                Err(e) => {
                    // A corrupt message is dropped; the stream keeps running.
                    warn!(symbol = %symbol, error = %e, "dropping undecodable message");
                }
            },
            Some(Ok(_)) => {} // ping/pong/binary frames
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        }
    }
}

/// Periodic window flip: capture-and-reset the taker counters and publish
/// the closed window into the store.
async fn flip_loop(
    symbol: String,
    aggregator: Arc<WindowAggregator>,
    store: Arc<SnapshotStore>,
    cancel: CancellationToken,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let flip = aggregator.flip();
                // A tick that raced cancellation discards its result.
                if cancel.is_cancelled() {
                    break;
                }
                debug!(
                    symbol = %symbol,
                    taker_buy = flip.taker_buy,
                    taker_sell = flip.taker_sell,
                    delta = flip.delta,
                    "window flipped"
                );
                store.upsert(
                    &symbol,
                    SnapshotPatch {
                        taker_buy: Some(flip.taker_buy),
                        taker_sell: Some(flip.taker_sell),
                        delta: Some(flip.delta),
                        ..Default::default()
                    },
                );
            }
        }
    }
    debug!(symbol = %symbol, "flip loop exited");
}

/// Periodic reference poll: open interest and long/short ratio.  On failure
/// the previous values stay in the store untouched.
async fn poll_loop(
    symbol: String,
    poller: Arc<ReferencePoller>,
    store: Arc<SnapshotStore>,
    cancel: CancellationToken,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match poller.fetch(&symbol).await {
                    Ok(sample) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        store.upsert(
                            &symbol,
                            SnapshotPatch {
                                open_interest: Some(sample.open_interest),
                                long_short_ratio: Some(sample.long_short_ratio),
                                long_pct: Some(sample.long_pct),
                                short_pct: Some(sample.short_pct),
                                ..Default::default()
                            },
                        );
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "reference poll failed; keeping previous values");
                    }
                }
            }
        }
    }
    debug!(symbol = %symbol, "poll loop exited");
}

// =============================================================================
// Tests
// =============================================================================
