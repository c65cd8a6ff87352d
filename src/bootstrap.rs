//! Participant bootstrap.
//!
//! Creates or resumes the participant record and gates page progression on
//! quorum. The flow is a small state machine:
//!
//! ```text
//! NotStarted -> AwaitingServer -> Resolved
//!                              -> AwaitingQuorum -> Resolved
//! ```
//!
//! A resumed session (usable participant id already present) goes straight
//! to `Resolved` without a server round trip. A missing fingerprinting
//! capability halts the flow permanently in `FingerprintMissing`, terminal
//! and distinct from `Resolved`; the user must disable the blocking
//! extension and reload.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::DallingerClient;
use crate::error::{Error, Result};
use crate::fingerprint::FingerprintProvider;
use crate::progress::ProgressReporter;
use crate::quorum::QuorumWaiter;
use crate::storage::keys;
use crate::types::Quorum;

/// Bootstrap lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// No attempt has been made yet.
    NotStarted,
    /// The create-participant request is in flight. UI controls that could
    /// trigger a duplicate request should stay disabled.
    AwaitingServer,
    /// Waiting for the quorum channel to report the required count.
    AwaitingQuorum,
    /// The participant exists and the experiment may proceed.
    Resolved,
    /// Terminal halt: the fingerprinting capability is missing.
    FingerprintMissing,
}

/// What a completed bootstrap produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    /// The stable participant id for this session.
    pub participant_id: String,
    /// True when the participant was admitted past quorum and should run in
    /// observer capacity.
    pub over_recruited: bool,
    /// True when this attempt actually waited on the quorum channel.
    pub waited_for_quorum: bool,
    /// True when an existing session was resumed without a create request.
    pub resumed: bool,
}

/// How a create-participant response resolves.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    /// No quorum configured, or quorum already met.
    Ready,
    /// Quorum not met, but this participant was over-recruited past it.
    Observer,
    /// Quorum not met; wait for the notifier.
    Wait(Quorum),
}

fn disposition(quorum: Option<Quorum>) -> Disposition {
    match quorum {
        None => Disposition::Ready,
        Some(q) if q.is_met() => Disposition::Ready,
        Some(q) if q.overrecruited => Disposition::Observer,
        Some(q) => Disposition::Wait(q),
    }
}

/// Orchestrates participant creation and the quorum wait.
pub struct ParticipantBootstrap {
    client: Arc<DallingerClient>,
    fingerprint: Arc<dyn FingerprintProvider>,
    progress: Arc<dyn ProgressReporter>,
    waiter: Arc<dyn QuorumWaiter>,
    state: Mutex<BootstrapState>,
}

impl ParticipantBootstrap {
    /// Create a bootstrap with an explicit quorum waiter.
    pub fn new(
        client: Arc<DallingerClient>,
        fingerprint: Arc<dyn FingerprintProvider>,
        progress: Arc<dyn ProgressReporter>,
        waiter: Arc<dyn QuorumWaiter>,
    ) -> Self {
        Self {
            client,
            fingerprint,
            progress,
            waiter,
            state: Mutex::new(BootstrapState::NotStarted),
        }
    }

    /// Create a bootstrap whose quorum wait rides the server's websocket
    /// push channel.
    #[cfg(feature = "websocket")]
    pub fn with_websocket_waiter(
        client: Arc<DallingerClient>,
        fingerprint: Arc<dyn FingerprintProvider>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<Self> {
        let waiter = crate::quorum::WebSocketQuorumWaiter::new(
            client.gateway().base(),
            progress.clone(),
        )?;
        Ok(Self::new(client, fingerprint, progress, Arc::new(waiter)))
    }

    /// The current lifecycle state.
    pub fn state(&self) -> BootstrapState {
        *self.state.lock()
    }

    /// Run the bootstrap to completion.
    ///
    /// At most one attempt runs at a time, and a quorum wait is entered at
    /// most once per attempt. On a server failure the machine returns to
    /// `NotStarted` and surfaces the rejection; the platform's retry policy
    /// is a user-initiated reload.
    pub async fn run(&self) -> Result<BootstrapOutcome> {
        {
            let mut state = self.state.lock();
            match *state {
                BootstrapState::NotStarted => {},
                BootstrapState::FingerprintMissing => return Err(Error::FingerprintUnavailable),
                _ => return Err(Error::BootstrapBusy),
            }

            let identity = self.client.identity();
            if let Some(id) = identity.participant_id() {
                tracing::debug!(participant_id = %id, "resuming existing session");
                *state = BootstrapState::Resolved;
                return Ok(BootstrapOutcome {
                    participant_id: id.to_string(),
                    over_recruited: false,
                    waited_for_quorum: false,
                    resumed: true,
                });
            }

            if !self.fingerprint.is_available() {
                tracing::error!(
                    "fingerprinting capability missing; an ad blocker is likely interfering"
                );
                *state = BootstrapState::FingerprintMissing;
                return Err(Error::FingerprintUnavailable);
            }

            *state = BootstrapState::AwaitingServer;
        }

        let result = self.create_and_resolve().await;
        if result.is_err() {
            let mut state = self.state.lock();
            if *state != BootstrapState::Resolved && *state != BootstrapState::FingerprintMissing {
                *state = BootstrapState::NotStarted;
            }
        }
        result
    }

    async fn create_and_resolve(&self) -> Result<BootstrapOutcome> {
        let hash = self.fingerprint.compute().await?;
        self.client.store().set(keys::FINGERPRINT_HASH, &hash);

        let resp = self.client.create_participant(&hash).await?;
        let participant_id = resp.participant.id;
        self.client.set_participant_id(participant_id);
        tracing::debug!(participant_id, "participant created");

        match disposition(resp.quorum) {
            Disposition::Ready => {
                self.set_state(BootstrapState::Resolved);
                Ok(self.outcome(participant_id, false, false))
            },
            Disposition::Observer => {
                tracing::info!(participant_id, "over-recruited; running as observer");
                self.set_state(BootstrapState::Resolved);
                Ok(self.outcome(participant_id, true, false))
            },
            Disposition::Wait(quorum) => {
                tracing::info!(n = quorum.n, q = quorum.q, "waiting for quorum");
                self.set_state(BootstrapState::AwaitingQuorum);
                self.progress.report_count(quorum.n, quorum.q).await;
                self.waiter.wait(quorum).await?;
                self.set_state(BootstrapState::Resolved);
                Ok(self.outcome(participant_id, false, true))
            },
        }
    }

    fn set_state(&self, state: BootstrapState) {
        *self.state.lock() = state;
    }

    fn outcome(
        &self,
        participant_id: u64,
        over_recruited: bool,
        waited_for_quorum: bool,
    ) -> BootstrapOutcome {
        BootstrapOutcome {
            participant_id: participant_id.to_string(),
            over_recruited,
            waited_for_quorum,
            resumed: false,
        }
    }
}

impl std::fmt::Debug for ParticipantBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantBootstrap")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{NoFingerprint, StaticFingerprint};
    use crate::identity::Identity;
    use crate::progress::NoopProgressReporter;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use url::Url;

    /// Waiter that must never be consulted.
    struct UnreachableWaiter;

    #[async_trait]
    impl QuorumWaiter for UnreachableWaiter {
        async fn wait(&self, _initial: Quorum) -> Result<()> {
            panic!("quorum waiter must not be consulted");
        }
    }

    fn bootstrap_for(identity: Identity, provider: Arc<dyn FingerprintProvider>) -> ParticipantBootstrap {
        let client = Arc::new(DallingerClient::new(
            Url::parse("http://127.0.0.1:1/").unwrap(),
            identity,
            Arc::new(MemoryStore::new()),
        ));
        ParticipantBootstrap::new(
            client,
            provider,
            Arc::new(NoopProgressReporter),
            Arc::new(UnreachableWaiter),
        )
    }

    fn quorum(n: u64, q: u64, overrecruited: bool) -> Quorum {
        Quorum { n, q, overrecruited }
    }

    #[test]
    fn disposition_table() {
        assert_eq!(disposition(None), Disposition::Ready);
        assert_eq!(disposition(Some(quorum(1, 1, false))), Disposition::Ready);
        assert_eq!(disposition(Some(quorum(1, 3, true))), Disposition::Observer);
        assert_eq!(
            disposition(Some(quorum(1, 3, false))),
            Disposition::Wait(quorum(1, 3, false))
        );
    }

    #[tokio::test]
    async fn resumed_session_skips_the_create_request() {
        let identity = Identity {
            participant_id: Some("7".into()),
            ..Identity::default()
        };
        let bootstrap = bootstrap_for(identity, Arc::new(StaticFingerprint::new("h")));

        let outcome = bootstrap.run().await.unwrap();
        assert!(outcome.resumed);
        assert_eq!(outcome.participant_id, "7");
        assert_eq!(bootstrap.state(), BootstrapState::Resolved);
    }

    #[tokio::test]
    async fn undefined_participant_id_is_not_a_resumed_session() {
        // The client base points at a closed port, so a create attempt fails
        // in transport; what matters is that it was attempted at all.
        let identity = Identity {
            participant_id: Some("undefined".into()),
            worker_id: Some("W1".into()),
            hit_id: Some("H1".into()),
            assignment_id: Some("A1".into()),
            mode: Some("live".into()),
            ..Identity::default()
        };
        let bootstrap = bootstrap_for(identity, Arc::new(StaticFingerprint::new("h")));

        let err = bootstrap.run().await.unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));
        assert_eq!(bootstrap.state(), BootstrapState::NotStarted);
    }

    #[tokio::test]
    async fn missing_fingerprint_halts_permanently() {
        let bootstrap = bootstrap_for(Identity::default(), Arc::new(NoFingerprint));

        assert!(matches!(
            bootstrap.run().await,
            Err(Error::FingerprintUnavailable)
        ));
        assert_eq!(bootstrap.state(), BootstrapState::FingerprintMissing);

        // Still halted on a second attempt.
        assert!(matches!(
            bootstrap.run().await,
            Err(Error::FingerprintUnavailable)
        ));
    }

    #[tokio::test]
    async fn second_run_after_resolution_is_rejected() {
        let identity = Identity {
            participant_id: Some("7".into()),
            ..Identity::default()
        };
        let bootstrap = bootstrap_for(identity, Arc::new(StaticFingerprint::new("h")));

        bootstrap.run().await.unwrap();
        assert!(matches!(bootstrap.run().await, Err(Error::BootstrapBusy)));
    }
}
