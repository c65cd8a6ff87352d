//! Browser fingerprinting capability.
//!
//! Participant creation requires a fingerprint hash, and the fingerprinting
//! library is a favorite target of ad blockers. The provider trait lets the
//! embedder plug in the real capability while the bootstrap only cares about
//! two things: is it present at all, and what hash does it produce.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Source of the browser fingerprint hash.
#[async_trait]
pub trait FingerprintProvider: Send + Sync {
    /// Whether the fingerprinting capability is present. When this is false
    /// the bootstrap halts permanently with a user-facing warning.
    fn is_available(&self) -> bool {
        true
    }

    /// Compute the fingerprint hash.
    async fn compute(&self) -> Result<String>;
}

/// Provider wrapping a precomputed hash. Suitable for headless runs and
/// tests, or embedders that capture the fingerprint out of band.
#[derive(Debug, Clone)]
pub struct StaticFingerprint {
    hash: String,
}

impl StaticFingerprint {
    /// Wrap a fixed fingerprint hash.
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }
}

#[async_trait]
impl FingerprintProvider for StaticFingerprint {
    async fn compute(&self) -> Result<String> {
        Ok(self.hash.clone())
    }
}

/// Provider representing a blocked or missing fingerprinting capability.
#[derive(Debug, Clone, Default)]
pub struct NoFingerprint;

#[async_trait]
impl FingerprintProvider for NoFingerprint {
    fn is_available(&self) -> bool {
        false
    }

    async fn compute(&self) -> Result<String> {
        Err(Error::FingerprintUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_its_hash() {
        let provider = StaticFingerprint::new("deadbeef");
        assert!(provider.is_available());
        assert_eq!(provider.compute().await.unwrap(), "deadbeef");
    }

    #[tokio::test]
    async fn missing_capability_is_unavailable() {
        let provider = NoFingerprint;
        assert!(!provider.is_available());
        assert!(matches!(
            provider.compute().await,
            Err(Error::FingerprintUnavailable)
        ));
    }
}
