//! # contract: collaborator interfaces for the relay pipeline
//!
//! The core never talks to a storage bucket or a chat API directly. It consumes
//! three small async traits instead:
//!
//! - [`ObjectStore`]: list, download, probe, copy and delete objects in a bucket.
//! - [`DeliveryChannel`]: send a local file to the delivery target as a photo, video or document.
//! - [`Sleeper`]: wait for a duration (pacing and retry backoff).
//!
//! ## Mocking & Testing
//! - All traits are annotated for `mockall`, so tests can script listings, failures
//!   and sends deterministically. Mocks are exported under the `test-export-mocks` feature.
//!
//! ## Errors
//! - Every fallible call returns a [`BoxError`]. The orchestration layer never inspects
//!   the concrete error type: remote errors are all treated as retryable.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use mockall::automock;

/// Error type shared by all collaborator calls.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One entry of an object store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Full object key, e.g. `source/alpha/a.jpg`.
    pub key: String,
    /// Object size in bytes as reported by the store.
    pub size: u64,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// Remote object store holding the media to relay.
///
/// Implemented by the bucket client in the binary crate and by mocks in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all objects whose key starts with `prefix`, in store order.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectDescriptor>, BoxError>;

    /// Download the object at `key` into the local file `destination`.
    async fn download(&self, key: &str, destination: &Path) -> Result<(), BoxError>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool, BoxError>;

    /// Copy the object at `key` to `new_key` within the same bucket.
    async fn copy(&self, key: &str, new_key: &str) -> Result<(), BoxError>;

    /// Delete the object at `key`.
    async fn delete(&self, key: &str) -> Result<(), BoxError>;
}

/// Delivery channel that receives the relayed media.
///
/// All three operations share one contract and differ only in media kind.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send_photo(&self, target: &str, path: &Path, caption: &str) -> Result<(), BoxError>;

    async fn send_video(&self, target: &str, path: &Path, caption: &str) -> Result<(), BoxError>;

    async fn send_document(
        &self,
        target: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), BoxError>;
}

/// Cooperative wait used for pacing and backoff.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_advances_the_paused_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(90)).await;
        assert!(start.elapsed() >= Duration::from_secs(90));
    }
}
