//! Participant identity resolution.
//!
//! Identity is populated once at page load from URL query parameters and the
//! persisted store, with store values taking precedence: some navigations
//! (post-consent, notably) drop query parameters, and the store is the copy
//! that survives them. The participant id is the one late fill, assigned by
//! the server during bootstrap and stable afterwards.

use url::Url;

use crate::storage::{keys, IdentityStore};

/// Identity fields for the current participant session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Recruiter that sourced this participant.
    pub recruiter: Option<String>,
    /// HIT id the participant was recruited under.
    pub hit_id: Option<String>,
    /// Crowdsourcing worker id.
    pub worker_id: Option<String>,
    /// Assignment id for this participation.
    pub assignment_id: Option<String>,
    /// Run mode (`live`, `sandbox`, `debug`).
    pub mode: Option<String>,
    /// Server-assigned participant id, filled in during bootstrap.
    pub participant_id: Option<String>,
    /// Captured browser fingerprint hash.
    pub fingerprint_hash: Option<String>,
}

impl Identity {
    /// Read identity fields from a page URL's query parameters.
    ///
    /// Missing or empty parameters resolve to `None`, never an error.
    pub fn from_url(url: &Url) -> Self {
        Self {
            recruiter: query_param(url, keys::RECRUITER),
            hit_id: query_param(url, keys::HIT_ID),
            worker_id: query_param(url, keys::WORKER_ID),
            assignment_id: query_param(url, keys::ASSIGNMENT_ID),
            mode: query_param(url, keys::MODE),
            participant_id: query_param(url, "participant_id"),
            fingerprint_hash: None,
        }
    }

    /// Resolve identity from a page URL and the persisted store.
    ///
    /// Store values take precedence over URL values for every store-backed
    /// key. The participant id comes from the URL only; the store never
    /// holds it.
    pub fn resolve(url: &Url, store: &dyn IdentityStore) -> Self {
        let mut identity = Self::from_url(url);
        if let Some(v) = store.get(keys::RECRUITER) {
            identity.recruiter = Some(v);
        }
        if let Some(v) = store.get(keys::HIT_ID) {
            identity.hit_id = Some(v);
        }
        if let Some(v) = store.get(keys::WORKER_ID) {
            identity.worker_id = Some(v);
        }
        if let Some(v) = store.get(keys::ASSIGNMENT_ID) {
            identity.assignment_id = Some(v);
        }
        if let Some(v) = store.get(keys::MODE) {
            identity.mode = Some(v);
        }
        if let Some(v) = store.get(keys::FINGERPRINT_HASH) {
            identity.fingerprint_hash = Some(v);
        }
        identity
    }

    /// The participant id, when one is usable.
    ///
    /// The literal string `"undefined"` is a URL-templating artifact and
    /// counts as absent, as does the empty string.
    pub fn participant_id(&self) -> Option<&str> {
        match self.participant_id.as_deref() {
            None | Some("") | Some("undefined") => None,
            Some(id) => Some(id),
        }
    }

    /// Fill in the server-assigned participant id. The single mutation after
    /// construction; the id is stable for the rest of the session.
    pub fn set_participant_id(&mut self, id: impl Into<String>) {
        self.participant_id = Some(id.into());
    }

    /// Store-backed identity fields for recruitment-scoped requests: the
    /// persisted value wins, the in-memory field is the fallback. Absent
    /// fields are omitted.
    pub fn recruitment_params(&self, store: &dyn IdentityStore) -> Vec<(&'static str, String)> {
        let fallbacks: [(&'static str, &Option<String>); 6] = [
            (keys::RECRUITER, &self.recruiter),
            (keys::WORKER_ID, &self.worker_id),
            (keys::HIT_ID, &self.hit_id),
            (keys::ASSIGNMENT_ID, &self.assignment_id),
            (keys::MODE, &self.mode),
            (keys::FINGERPRINT_HASH, &self.fingerprint_hash),
        ];

        fallbacks
            .into_iter()
            .filter_map(|(key, fallback)| {
                store.get(key).or_else(|| fallback.clone()).map(|v| (key, v))
            })
            .collect()
    }
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
