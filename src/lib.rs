//! Async client SDK for the Dallinger experiment platform.
//!
//! This crate wraps the participant-facing surface of an experiment server:
//! resolving the participant's identity, creating or resuming the
//! participant record, waiting on quorum over the server's push channel,
//! and the per-trial request cycle (nodes, infos, questionnaire,
//! completion). Failed requests resolve into a uniform [`Rejection`] that
//! can be rendered or reported back to the server; no failure is silently
//! dropped.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dallinger_client::{
//!     DallingerClient, MemoryStore, ParticipantBootstrap, StaticFingerprint,
//! };
//! use dallinger_client::progress::LogProgressReporter;
//! use url::Url;
//!
//! # async fn example() -> dallinger_client::Result<()> {
//! let base = Url::parse("http://localhost:5000/")?;
//! let page = Url::parse("http://localhost:5000/ad?worker_id=W1&hit_id=H1&assignment_id=A1&mode=debug")?;
//!
//! let store = Arc::new(MemoryStore::new());
//! let client = Arc::new(DallingerClient::from_page_url(base, &page, store));
//!
//! let bootstrap = ParticipantBootstrap::with_websocket_waiter(
//!     client.clone(),
//!     Arc::new(StaticFingerprint::new("fp-hash")),
//!     Arc::new(LogProgressReporter),
//! )?;
//! let outcome = bootstrap.run().await?;
//! tracing::info!(participant_id = %outcome.participant_id, "ready");
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! - `websocket` (default): the quorum wait over the server's websocket
//!   push channel (`tokio-tungstenite`).
//! - `logging` (default): the [`init_logging`] helper
//!   (`tracing-subscriber`); the library itself only emits `tracing`
//!   events.

pub mod bootstrap;
pub mod client;
pub mod error;
pub mod experiment;
pub mod fingerprint;
pub mod identity;
pub mod progress;
pub mod quorum;
pub mod shared;
pub mod storage;
pub mod types;
pub mod ui;

pub use bootstrap::{BootstrapOutcome, BootstrapState, ParticipantBootstrap};
pub use client::DallingerClient;
pub use error::{Error, Rejection, Result};
pub use experiment::TrialSession;
pub use fingerprint::{FingerprintProvider, NoFingerprint, StaticFingerprint};
pub use identity::Identity;
pub use progress::{percent_label, NoopProgressReporter, ProgressReporter};
pub use quorum::{QuorumMonitor, QuorumWaiter};
#[cfg(feature = "websocket")]
pub use quorum::WebSocketQuorumWaiter;
pub use storage::{IdentityStore, MemoryStore};
pub use types::Quorum;

/// Channel name the server publishes quorum counts on.
pub const QUORUM_CHANNEL: &str = "quorum";

/// Install a `tracing` subscriber reading the `RUST_LOG` environment
/// variable, falling back to the given default filter. Safe to call more
/// than once; later calls are no-ops.
#[cfg(feature = "logging")]
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
