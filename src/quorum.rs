//! Quorum notification.
//!
//! The server pushes quorum counts over a channel as text messages of the
//! form `quorum:{"n": 2, "q": 5}`. The monitor turns that stream into two
//! things: a progress-indicator update per message, and a one-shot completion
//! signal the first time `n` equals `q`. Messages after completion keep the
//! indicator fresh but never re-signal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

#[cfg(feature = "websocket")]
use crate::error::Error;
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::types::Quorum;

/// Prefix identifying quorum updates on the push channel.
pub const QUORUM_PREFIX: &str = "quorum:";

/// Parse a raw channel message as a quorum update.
///
/// Messages without the prefix belong to other traffic and yield `None`
/// silently; messages with the prefix but an unparseable remainder are
/// logged and dropped.
pub fn parse_update(raw: &str) -> Option<Quorum> {
    let rest = raw.strip_prefix(QUORUM_PREFIX)?;
    match serde_json::from_str(rest) {
        Ok(update) => Some(update),
        Err(err) => {
            tracing::warn!(error = %err, "unparseable quorum update");
            None
        },
    }
}

/// Tracks quorum updates and fires a one-shot signal when quorum is met.
pub struct QuorumMonitor {
    progress: Arc<dyn ProgressReporter>,
    reached: Option<oneshot::Sender<()>>,
}

impl QuorumMonitor {
    /// Create a monitor and the receiver that completes on the first
    /// `n == q` update.
    pub fn new(progress: Arc<dyn ProgressReporter>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                progress,
                reached: Some(tx),
            },
            rx,
        )
    }

    /// Apply one quorum state: update the indicator, and signal completion
    /// if this is the first time quorum is met.
    pub async fn observe(&mut self, state: &Quorum) {
        self.progress.report_count(state.n, state.q).await;
        if state.is_met() {
            if let Some(tx) = self.reached.take() {
                let _ = tx.send(());
            }
        }
    }

    /// Apply one raw channel message, ignoring non-quorum traffic.
    pub async fn handle_message(&mut self, raw: &str) {
        if let Some(state) = parse_update(raw) {
            self.observe(&state).await;
        }
    }
}

impl std::fmt::Debug for QuorumMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuorumMonitor")
            .field("signalled", &self.reached.is_none())
            .finish()
    }
}

/// Blocks bootstrap progression until quorum is met.
///
/// The initial state comes from the bootstrap response; implementations wait
/// for the channel to report `n == q`. The wait is unbounded.
#[async_trait]
pub trait QuorumWaiter: Send + Sync {
    /// Wait until quorum is reached.
    async fn wait(&self, initial: Quorum) -> Result<()>;
}

/// [`QuorumWaiter`] backed by the server's websocket push channel.
#[cfg(feature = "websocket")]
pub struct WebSocketQuorumWaiter {
    channel: crate::shared::ws::QuorumChannel,
    progress: Arc<dyn ProgressReporter>,
}

#[cfg(feature = "websocket")]
impl WebSocketQuorumWaiter {
    /// Create a waiter subscribed to the quorum channel of the server at
    /// `base`.
    pub fn new(base: &url::Url, progress: Arc<dyn ProgressReporter>) -> Result<Self> {
        let channel =
            crate::shared::ws::QuorumChannel::from_http_base(base, crate::QUORUM_CHANNEL)?;
        Ok(Self { channel, progress })
    }
}

#[cfg(feature = "websocket")]
#[async_trait]
impl QuorumWaiter for WebSocketQuorumWaiter {
    async fn wait(&self, _initial: Quorum) -> Result<()> {
        let (mut monitor, reached) = QuorumMonitor::new(self.progress.clone());
        let mut messages = self.channel.subscribe();

        // The monitor keeps consuming updates after completion so the
        // indicator stays current for the rest of the page's lifetime.
        tokio::spawn(async move {
            while let Some(raw) = messages.recv().await {
                monitor.handle_message(&raw).await;
            }
        });

        reached.await.map_err(|_| Error::QuorumChannelClosed)
    }
}
