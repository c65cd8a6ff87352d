//! Persisted identity storage.
//!
//! The platform keeps a handful of identity fields in client-side persistent
//! storage so they survive navigations that drop query parameters (the
//! post-consent redirect, for example). The storage backend itself is the
//! embedder's concern; this module defines the contract and an in-memory
//! implementation used by tests and headless runs.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Keys the platform persists client-side.
pub mod keys {
    /// Recruiter that sourced this participant.
    pub const RECRUITER: &str = "recruiter";
    /// Crowdsourcing worker id.
    pub const WORKER_ID: &str = "worker_id";
    /// HIT id the participant was recruited under.
    pub const HIT_ID: &str = "hit_id";
    /// Assignment id for this participation.
    pub const ASSIGNMENT_ID: &str = "assignment_id";
    /// Run mode.
    pub const MODE: &str = "mode";
    /// Captured browser fingerprint hash.
    pub const FINGERPRINT_HASH: &str = "fingerprint_hash";

    /// All persisted keys, in report order.
    pub const ALL: [&str; 6] = [
        RECRUITER,
        WORKER_ID,
        HIT_ID,
        ASSIGNMENT_ID,
        MODE,
        FINGERPRINT_HASH,
    ];
}

/// Contract for the persisted identity store.
///
/// Reads happen from multiple components; writes only at well-defined
/// checkpoints (consent, fingerprint capture), always from a single
/// user-driven event at a time.
pub trait IdentityStore: Send + Sync {
    /// Read a persisted value.
    fn get(&self, key: &str) -> Option<String>;

    /// Persist a value.
    fn set(&self, key: &str, value: &str);
}

/// In-memory [`IdentityStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.get(keys::WORKER_ID), None);

        store.set(keys::WORKER_ID, "W1");
        assert_eq!(store.get(keys::WORKER_ID).as_deref(), Some("W1"));

        store.set(keys::WORKER_ID, "W2");
        assert_eq!(store.get(keys::WORKER_ID).as_deref(), Some("W2"));
    }
}
