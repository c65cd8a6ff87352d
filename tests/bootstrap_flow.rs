//! Integration tests for the participant bootstrap against a mock server.
//!
//! Exercises the resolution truth table: no quorum, quorum already met,
//! over-recruited, and the genuine wait path, plus the resumed-session
//! short-circuit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dallinger_client::progress::ProgressReporter;
use dallinger_client::storage::MemoryStore;
use dallinger_client::{
    DallingerClient, Identity, ParticipantBootstrap, Quorum, QuorumWaiter, Result,
    StaticFingerprint,
};
use mockito::Matcher;
use parking_lot::Mutex;
use url::Url;

/// Waiter that records what it was asked to wait on and resolves at once.
#[derive(Default)]
struct InstantWaiter {
    calls: AtomicUsize,
    initial: Mutex<Option<Quorum>>,
}

#[async_trait]
impl QuorumWaiter for InstantWaiter {
    async fn wait(&self, initial: Quorum) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.initial.lock() = Some(initial);
        Ok(())
    }
}

#[derive(Default)]
struct CountingReporter {
    calls: AtomicUsize,
}

#[async_trait]
impl ProgressReporter for CountingReporter {
    async fn report_count(&self, _current: u64, _total: u64) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn recruited_identity() -> Identity {
    Identity {
        worker_id: Some("W1".into()),
        hit_id: Some("H1".into()),
        assignment_id: Some("A1".into()),
        mode: Some("live".into()),
        recruiter: Some("hotair".into()),
        ..Identity::default()
    }
}

struct Fixture {
    bootstrap: ParticipantBootstrap,
    client: Arc<DallingerClient>,
    waiter: Arc<InstantWaiter>,
    progress: Arc<CountingReporter>,
}

fn fixture(server: &mockito::Server, identity: Identity) -> Fixture {
    let client = Arc::new(DallingerClient::new(
        Url::parse(&server.url()).unwrap(),
        identity,
        Arc::new(MemoryStore::new()),
    ));
    let waiter = Arc::new(InstantWaiter::default());
    let progress = Arc::new(CountingReporter::default());
    let bootstrap = ParticipantBootstrap::new(
        client.clone(),
        Arc::new(StaticFingerprint::new("fp1")),
        progress.clone(),
        waiter.clone(),
    );
    Fixture {
        bootstrap,
        client,
        waiter,
        progress,
    }
}

fn participant_mock(server: &mut mockito::Server, body: &str) -> mockito::Mock {
    server
        .mock("POST", "/participant/W1/H1/A1/live")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("fingerprint_hash".into(), "fp1".into()),
            Matcher::UrlEncoded("recruiter".into(), "hotair".into()),
        ]))
        .with_status(200)
        .with_body(body.to_string())
}

#[tokio::test]
async fn resolves_immediately_without_quorum() {
    let mut server = mockito::Server::new_async().await;
    let mock = participant_mock(&mut server, r#"{"participant": {"id": 1}}"#)
        .create_async()
        .await;

    let fx = fixture(&server, recruited_identity());
    let outcome = fx.bootstrap.run().await.unwrap();

    assert_eq!(outcome.participant_id, "1");
    assert!(!outcome.over_recruited);
    assert!(!outcome.waited_for_quorum);
    assert!(!outcome.resumed);
    assert_eq!(fx.waiter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.client.participant_id().unwrap(), "1");
    mock.assert_async().await;
}

#[tokio::test]
async fn met_quorum_resolves_without_waiting() {
    let mut server = mockito::Server::new_async().await;
    let _mock = participant_mock(
        &mut server,
        r#"{"participant": {"id": 2}, "quorum": {"n": 1, "q": 1}}"#,
    )
    .create_async()
    .await;

    let fx = fixture(&server, recruited_identity());
    let outcome = fx.bootstrap.run().await.unwrap();

    assert!(!outcome.waited_for_quorum);
    assert_eq!(fx.waiter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn overrecruited_participant_becomes_observer() {
    let mut server = mockito::Server::new_async().await;
    let _mock = participant_mock(
        &mut server,
        r#"{"participant": {"id": 3}, "quorum": {"n": 1, "q": 3, "overrecruited": true}}"#,
    )
    .create_async()
    .await;

    let fx = fixture(&server, recruited_identity());
    let outcome = fx.bootstrap.run().await.unwrap();

    assert!(outcome.over_recruited);
    assert!(!outcome.waited_for_quorum);
    assert_eq!(fx.waiter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unmet_quorum_waits_on_the_notifier() {
    let mut server = mockito::Server::new_async().await;
    let _mock = participant_mock(
        &mut server,
        r#"{"participant": {"id": 4}, "quorum": {"n": 1, "q": 3}}"#,
    )
    .create_async()
    .await;

    let fx = fixture(&server, recruited_identity());
    let outcome = fx.bootstrap.run().await.unwrap();

    assert!(outcome.waited_for_quorum);
    assert_eq!(fx.waiter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        fx.waiter.initial.lock().clone(),
        Some(Quorum {
            n: 1,
            q: 3,
            overrecruited: false
        })
    );
    // The indicator was initialized from the bootstrap response.
    assert!(fx.progress.calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn resumed_session_issues_no_create_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Regex("^/participant/.*".into()))
        .expect(0)
        .create_async()
        .await;

    let identity = Identity {
        participant_id: Some("7".into()),
        ..recruited_identity()
    };
    let fx = fixture(&server, identity);
    let outcome = fx.bootstrap.run().await.unwrap();

    assert!(outcome.resumed);
    assert_eq!(outcome.participant_id, "7");
    mock.assert_async().await;
}
