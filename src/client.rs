//! High-level client for the participant API.
//!
//! One typed method per server route, sharing a gateway, the resolved
//! identity, and the persisted store. The client holds the session's
//! identity behind a lock: the participant id is filled in once by the
//! bootstrap, and assignment completion refreshes the recruitment fields
//! from the server's copy before reporting the worker done.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::shared::http::{HttpGateway, Payload};
use crate::storage::{keys, IdentityStore};
use crate::types::{
    CreateParticipantResponse, InfoResponse, InfosResponse, NodeResponse, ParticipantResponse,
    TransmissionsResponse,
};
use crate::ui::ErrorPageSink;

/// Client for one participant session against an experiment server.
pub struct DallingerClient {
    gateway: HttpGateway,
    identity: RwLock<Identity>,
    store: Arc<dyn IdentityStore>,
}

impl DallingerClient {
    /// Create a client with an already-resolved identity.
    pub fn new(base: Url, identity: Identity, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            gateway: HttpGateway::new(base),
            identity: RwLock::new(identity),
            store,
        }
    }

    /// Create a client by resolving identity from the current page URL and
    /// the persisted store (store values win).
    pub fn from_page_url(base: Url, page: &Url, store: Arc<dyn IdentityStore>) -> Self {
        let identity = Identity::resolve(page, store.as_ref());
        Self::new(base, identity, store)
    }

    /// The underlying request gateway.
    pub fn gateway(&self) -> &HttpGateway {
        &self.gateway
    }

    /// The persisted identity store.
    pub fn store(&self) -> Arc<dyn IdentityStore> {
        self.store.clone()
    }

    /// A snapshot of the session identity.
    pub fn identity(&self) -> Identity {
        self.identity.read().clone()
    }

    /// The participant id, or an error when bootstrap has not assigned one.
    pub fn participant_id(&self) -> Result<String> {
        self.identity
            .read()
            .participant_id()
            .map(str::to_string)
            .ok_or(Error::MissingIdentity("participant_id"))
    }

    /// Fill in the server-assigned participant id. Called once by the
    /// bootstrap; the id is stable afterwards.
    pub(crate) fn set_participant_id(&self, id: u64) {
        self.identity.write().set_participant_id(id.to_string());
    }

    /// Store-backed recruitment fields with in-memory identity fallback.
    pub fn recruitment_params(&self) -> Vec<(&'static str, String)> {
        self.identity.read().recruitment_params(self.store.as_ref())
    }

    /// Create (or re-resolve) the participant record server-side.
    ///
    /// Requires worker, HIT, assignment, and mode to be resolvable; the
    /// stored fingerprint hash wins over the freshly computed one.
    pub async fn create_participant(
        &self,
        fingerprint_hash: &str,
    ) -> Result<CreateParticipantResponse> {
        let params = self.recruitment_params();
        let lookup = |key: &'static str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        };

        let worker = lookup(keys::WORKER_ID).ok_or(Error::MissingIdentity("worker_id"))?;
        let hit = lookup(keys::HIT_ID).ok_or(Error::MissingIdentity("hit_id"))?;
        let assignment =
            lookup(keys::ASSIGNMENT_ID).ok_or(Error::MissingIdentity("assignment_id"))?;
        let mode = lookup(keys::MODE).ok_or(Error::MissingIdentity("mode"))?;
        let hash = lookup(keys::FINGERPRINT_HASH).unwrap_or_else(|| fingerprint_hash.to_string());

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("fingerprint_hash", &hash);
        if let Some(recruiter) = lookup(keys::RECRUITER) {
            query.append_pair("recruiter", &recruiter);
        }

        let route = format!(
            "/participant/{worker}/{hit}/{assignment}/{mode}?{}",
            query.finish()
        );
        let value = self.gateway.post(&route, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a participant record.
    pub async fn get_participant(&self, id: &str) -> Result<ParticipantResponse> {
        let value = self.gateway.get(&format!("/participant/{id}"), None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Mark the assignment complete for this participant.
    pub async fn worker_complete(&self) -> Result<()> {
        let participant_id = self.participant_id()?;
        let mut data = Payload::new();
        data.insert("participant_id".into(), Value::String(participant_id));
        self.gateway.get("/worker_complete", Some(&data)).await?;
        Ok(())
    }

    /// Create a new interaction node for this participant.
    pub async fn create_node(&self) -> Result<NodeResponse> {
        let participant_id = self.participant_id()?;
        let value = self
            .gateway
            .post(&format!("/node/{participant_id}"), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Attach a content record to a node.
    pub async fn create_info(
        &self,
        node_id: u64,
        contents: &str,
        info_type: &str,
    ) -> Result<InfoResponse> {
        let mut data = Payload::new();
        data.insert("contents".into(), Value::String(contents.to_string()));
        data.insert("info_type".into(), Value::String(info_type.to_string()));
        let value = self
            .gateway
            .post(&format!("/info/{node_id}"), Some(&data))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch one info by id.
    pub async fn get_info(&self, node_id: u64, info_id: u64) -> Result<InfoResponse> {
        let value = self
            .gateway
            .get(&format!("/info/{node_id}/{info_id}"), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch the infos a node has produced.
    pub async fn get_infos(&self, node_id: u64) -> Result<InfosResponse> {
        let value = self
            .gateway
            .get(&format!("/node/{node_id}/infos"), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch the infos a node has received from others.
    pub async fn get_received_infos(&self, node_id: u64) -> Result<InfosResponse> {
        let value = self
            .gateway
            .get(&format!("/node/{node_id}/received_infos"), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a node's transmissions.
    pub async fn get_transmissions(&self, node_id: u64) -> Result<TransmissionsResponse> {
        let value = self
            .gateway
            .get(&format!("/node/{node_id}/transmissions"), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read one experiment property.
    pub async fn experiment_property(&self, property: &str) -> Result<Value> {
        self.gateway
            .get(&format!("/experiment/{property}"), None)
            .await
    }

    /// Submit one questionnaire answer record.
    pub async fn submit_question(
        &self,
        question: &str,
        number: u32,
        response: &str,
    ) -> Result<()> {
        let participant_id = self.participant_id()?;
        let mut data = Payload::new();
        data.insert("question".into(), Value::String(question.to_string()));
        data.insert("number".into(), serde_json::json!(number));
        data.insert("response".into(), Value::String(response.to_string()));
        self.gateway
            .post(&format!("/question/{participant_id}"), Some(&data))
            .await?;
        Ok(())
    }

    /// Report the assignment complete.
    ///
    /// Refreshes the identity's recruitment fields from the server's
    /// participant record first, so completion is reported with the
    /// authoritative values even when the page lost its query parameters.
    pub async fn submit_assignment(&self) -> Result<()> {
        let participant_id = self.participant_id()?;
        let resp = self.get_participant(&participant_id).await?;

        {
            let mut identity = self.identity.write();
            identity.mode = resp.participant.mode.clone();
            identity.hit_id = resp.participant.hit_id.clone();
            identity.assignment_id = resp.participant.assignment_id.clone();
            identity.worker_id = resp.participant.worker_id.clone();
        }

        self.worker_complete().await
    }

    /// Submit the questionnaire as a single answer record, then report the
    /// assignment complete.
    pub async fn submit_questionnaire(
        &self,
        name: Option<&str>,
        answers: &[(String, String)],
    ) -> Result<()> {
        let form: serde_json::Map<String, Value> = answers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let response = serde_json::to_string(&Value::Object(form))?;

        self.submit_question(name.unwrap_or("questionnaire"), 1, &response)
            .await?;
        self.submit_assignment().await
    }

    /// Report a failed request to the server.
    ///
    /// When the rejection carries a server-supplied error page, that page is
    /// handed to the sink (the server already knows about the failure it
    /// rendered). Otherwise a form-encoded report is posted to the
    /// error-reporting route with the participant id from the failed
    /// request's payload, the serialized original request, and the
    /// store-backed identity fields, so the server is always informed.
    pub async fn report_error(
        &self,
        rejection: &crate::error::Rejection,
        sink: &dyn ErrorPageSink,
    ) -> Result<()> {
        tracing::warn!(route = %rejection.route, status = ?rejection.status, "reporting failed request");

        if !rejection.html.is_empty() {
            sink.render_html(&rejection.html);
            return Ok(());
        }

        let mut fields: Vec<(String, String)> = Vec::new();
        if let Some(participant_id) = rejection.participant_id() {
            fields.push(("participant_id".into(), participant_id));
        }
        fields.push(("request_data".into(), rejection.request_json()));
        for (key, value) in self.recruitment_params() {
            fields.push((key.to_string(), value));
        }

        self.gateway.post_form("/error-page", &fields).await
    }
}

impl std::fmt::Debug for DallingerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DallingerClient")
            .field("base", &self.gateway.base().as_str())
            .field("identity", &*self.identity.read())
            .finish()
    }
}
