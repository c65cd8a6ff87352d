//! Trial-cycle session controller.
//!
//! Per-experiment glue for a linear read-then-respond experiment: consent,
//! then repeated rounds of (create node, fetch stimulus, submit response)
//! until the server signals the end of the experiment, then the
//! questionnaire. The session carries all its state (client, current
//! node, UI seams) explicitly rather than through page globals.
//!
//! The server uses a 403 from node creation as the in-band signal that this
//! participant's run is over. That is a deliberate platform convention, not
//! an authorization failure, and the session preserves it exactly: 403 means
//! "go to the questionnaire", every other failure is a true error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::bootstrap::BootstrapOutcome;
use crate::client::DallingerClient;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::storage::keys;
use crate::ui::{ErrorPageSink, ExitGuard, PageNavigator, StimulusUi};

/// One participant's pass through a read-then-respond experiment.
pub struct TrialSession {
    client: Arc<DallingerClient>,
    ui: Arc<dyn StimulusUi>,
    navigator: Arc<dyn PageNavigator>,
    error_page: Arc<dyn ErrorPageSink>,
    exit_guard: ExitGuard,
    node_id: Mutex<Option<u64>>,
    submitting: AtomicBool,
    skip_experiment: bool,
}

impl TrialSession {
    /// Create a session. The exit guard starts active: mid-experiment
    /// departures require confirmation until the session lifts it.
    pub fn new(
        client: Arc<DallingerClient>,
        ui: Arc<dyn StimulusUi>,
        navigator: Arc<dyn PageNavigator>,
        error_page: Arc<dyn ErrorPageSink>,
    ) -> Self {
        let exit_guard = ExitGuard::new();
        exit_guard.prevent_exit();
        Self {
            client,
            ui,
            navigator,
            error_page,
            exit_guard,
            node_id: Mutex::new(None),
            submitting: AtomicBool::new(false),
            skip_experiment: false,
        }
    }

    /// Create a session from a bootstrap outcome. An over-recruited
    /// participant runs as an observer and skips primary interaction.
    pub fn from_bootstrap(
        client: Arc<DallingerClient>,
        ui: Arc<dyn StimulusUi>,
        navigator: Arc<dyn PageNavigator>,
        error_page: Arc<dyn ErrorPageSink>,
        outcome: &BootstrapOutcome,
    ) -> Self {
        let mut session = Self::new(client, ui, navigator, error_page);
        session.skip_experiment = outcome.over_recruited;
        session
    }

    /// The leave-confirmation guard for this session.
    pub fn exit_guard(&self) -> &ExitGuard {
        &self.exit_guard
    }

    /// The currently active node, when one exists.
    pub fn node_id(&self) -> Option<u64> {
        *self.node_id.lock()
    }

    /// Whether this session runs in observer capacity.
    pub fn is_observer(&self) -> bool {
        self.skip_experiment
    }

    /// Record consent: copy the recruitment parameters from the page URL
    /// into the persisted store (they survive the navigation that drops
    /// query parameters), then move on to the instructions page.
    pub fn consent(&self, page_url: &Url) {
        let from_url = Identity::from_url(page_url);
        let store = self.client.store();
        let checkpoint: [(&str, &Option<String>); 5] = [
            (keys::RECRUITER, &from_url.recruiter),
            (keys::HIT_ID, &from_url.hit_id),
            (keys::WORKER_ID, &from_url.worker_id),
            (keys::ASSIGNMENT_ID, &from_url.assignment_id),
            (keys::MODE, &from_url.mode),
        ];
        for (key, value) in checkpoint {
            if let Some(v) = value {
                store.set(key, v);
            }
        }

        self.exit_guard.allow_exit();
        self.navigator.go_to("/instructions");
    }

    /// Decline consent and close the page.
    pub fn decline(&self) {
        self.exit_guard.allow_exit();
        self.navigator.close();
    }

    /// Advance to the next trial: create a node and show its stimulus.
    ///
    /// A 403 from node creation is the normal end-of-experiment signal and
    /// routes to the questionnaire. Observers skip straight there.
    pub async fn advance(&self) -> Result<()> {
        if self.skip_experiment {
            tracing::info!("observer session; skipping to questionnaire");
            self.go_to_questionnaire();
            return Ok(());
        }

        match self.client.create_node().await {
            Ok(resp) => {
                *self.node_id.lock() = Some(resp.node.id);
                self.show_stimulus(resp.node.id).await
            },
            Err(err) if err.is_status(403) => {
                tracing::info!("node creation refused; experiment round is over");
                self.go_to_questionnaire();
                Ok(())
            },
            Err(err) => self.fail(err).await,
        }
    }

    async fn show_stimulus(&self, node_id: u64) -> Result<()> {
        match self.client.get_received_infos(node_id).await {
            Ok(resp) => {
                let contents = resp
                    .infos
                    .first()
                    .and_then(|info| info.contents.clone())
                    .ok_or_else(|| {
                        Error::Protocol(format!("node {node_id} has no received stimulus"))
                    })?;
                self.ui.show_stimulus(&contents);
                Ok(())
            },
            Err(err) => {
                // The stimulus fetch renders whatever error page the server
                // sent, even an empty one; the page is unusable either way.
                if let Some(rejection) = err.rejection() {
                    self.error_page.render_html(&rejection.html);
                }
                Err(err)
            },
        }
    }

    /// Submit the participant's response for the current trial, then advance
    /// to the next one. Guarded against double submission.
    pub async fn submit_response(&self, text: &str) -> Result<()> {
        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(Error::SubmissionInFlight);
        }
        let result = self.submit_inner(text).await;
        self.submitting.store(false, Ordering::SeqCst);
        result
    }

    async fn submit_inner(&self, text: &str) -> Result<()> {
        let node_id = self.node_id().ok_or(Error::NoActiveNode)?;
        self.client.create_info(node_id, text, "Info").await?;
        self.advance().await
    }

    /// Submit the questionnaire answers, report the assignment complete,
    /// and leave for the completion page.
    pub async fn finish(&self, answers: &[(String, String)]) -> Result<()> {
        self.client.submit_questionnaire(None, answers).await?;
        self.exit_guard.allow_exit();
        self.navigator.go_to("/complete");
        Ok(())
    }

    /// Report a failed operation through the error path, then surface it.
    async fn fail(&self, err: Error) -> Result<()> {
        if let Some(rejection) = err.rejection() {
            if let Err(report_err) = self
                .client
                .report_error(rejection, self.error_page.as_ref())
                .await
            {
                tracing::error!(error = %report_err, "error report itself failed");
            }
        }
        Err(err)
    }

    fn go_to_questionnaire(&self) {
        self.exit_guard.allow_exit();
        self.go_to_page("questionnaire");
    }

    /// Navigate to an experiment page, carrying the participant id when one
    /// is known.
    pub fn go_to_page(&self, page: &str) {
        let location = match self.client.participant_id() {
            Ok(id) => format!("/{page}?participant_id={id}"),
            Err(_) => format!("/{page}"),
        };
        self.navigator.go_to(&location);
    }
}

impl std::fmt::Debug for TrialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialSession")
            .field("node_id", &self.node_id())
            .field("observer", &self.skip_experiment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::ui::{NoopErrorPageSink, NoopStimulusUi};
    use parking_lot::Mutex as PlMutex;

    #[derive(Default)]
    struct RecordingNavigator {
        visits: PlMutex<Vec<String>>,
        closed: AtomicBool,
    }

    impl PageNavigator for RecordingNavigator {
        fn go_to(&self, location: &str) {
            self.visits.lock().push(location.to_string());
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn session_with(navigator: Arc<RecordingNavigator>) -> TrialSession {
        let client = Arc::new(DallingerClient::new(
            Url::parse("http://127.0.0.1:1/").unwrap(),
            Identity::default(),
            Arc::new(MemoryStore::new()),
        ));
        TrialSession::new(
            client,
            Arc::new(NoopStimulusUi),
            navigator,
            Arc::new(NoopErrorPageSink),
        )
    }

    #[test]
    fn consent_persists_url_params_and_navigates() {
        let navigator = Arc::new(RecordingNavigator::default());
        let session = session_with(navigator.clone());

        let page =
            Url::parse("http://localhost:5000/consent?worker_id=W1&hit_id=H1&mode=debug").unwrap();
        session.consent(&page);

        let store = session.client.store();
        assert_eq!(store.get(keys::WORKER_ID).as_deref(), Some("W1"));
        assert_eq!(store.get(keys::HIT_ID).as_deref(), Some("H1"));
        assert_eq!(store.get(keys::MODE).as_deref(), Some("debug"));
        assert_eq!(store.get(keys::RECRUITER), None);

        assert_eq!(navigator.visits.lock().as_slice(), ["/instructions"]);
        assert!(
            session.exit_guard().may_leave(),
            "consent permits this one departure"
        );
        assert!(
            !session.exit_guard().may_leave(),
            "the allowance does not persist"
        );
    }

    #[test]
    fn decline_closes_the_page() {
        let navigator = Arc::new(RecordingNavigator::default());
        let session = session_with(navigator.clone());

        session.decline();
        assert!(navigator.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn observer_sessions_skip_to_questionnaire() {
        let navigator = Arc::new(RecordingNavigator::default());
        let client = Arc::new(DallingerClient::new(
            Url::parse("http://127.0.0.1:1/").unwrap(),
            Identity {
                participant_id: Some("42".into()),
                ..Identity::default()
            },
            Arc::new(MemoryStore::new()),
        ));
        let outcome = BootstrapOutcome {
            participant_id: "42".into(),
            over_recruited: true,
            waited_for_quorum: false,
            resumed: false,
        };
        let session = TrialSession::from_bootstrap(
            client,
            Arc::new(NoopStimulusUi),
            navigator.clone(),
            Arc::new(NoopErrorPageSink),
            &outcome,
        );

        assert!(session.is_observer());
        session.advance().await.unwrap();
        assert_eq!(
            navigator.visits.lock().as_slice(),
            ["/questionnaire?participant_id=42"]
        );
    }

    #[tokio::test]
    async fn response_without_a_node_is_rejected() {
        let navigator = Arc::new(RecordingNavigator::default());
        let session = session_with(navigator);

        assert!(matches!(
            session.submit_response("anything").await,
            Err(Error::NoActiveNode)
        ));
    }
}
