//! # worker: the per-item delivery pipeline
//!
//! [`UploadWorker::process`] takes one [`MediaItem`] from admission to ledger:
//!
//! 1. Admission: oversized or unsupported items are skipped without any I/O.
//! 2. Transfer-in: the object is downloaded (with retries) into a scoped
//!    temporary directory that is removed on every exit path.
//! 3. Caption: companion text is fetched best-effort and fed to the [`CaptionBuilder`].
//! 4. Dispatch: photo, video or document send (with retries).
//! 5. Record: the key is appended to the [`SentLedger`], then the object is
//!    optionally archive-moved. Archive failures are logged only.
//!
//! Every per-item error is folded into an [`UploadOutcome`]; nothing here aborts
//! the caller's loop.

use std::path::Path;

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::caption::CaptionBuilder;
use crate::config::RelayConfig;
use crate::contract::{BoxError, DeliveryChannel, ObjectStore, Sleeper};
use crate::ledger::{LedgerStore, SentLedger};
use crate::media::{archive_key, MediaItem, MediaKind};
use crate::retry::{RetryPolicy, RetryableTransfer};

/// Why an item was not attempted. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Oversized { size_bytes: u64, max_size_bytes: u64 },
    UnsupportedKind,
}

/// Why an attempted item did not reach the channel. The item stays eligible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FailReason {
    Staging { message: String },
    Download { attempts: u32, message: String },
    Delivery { attempts: u32, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Delivered,
    Skipped(SkipReason),
    Failed(FailReason),
}

impl UploadOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, UploadOutcome::Delivered)
    }
}

/// Runs the per-item pipeline against injected collaborators.
pub struct UploadWorker<'a, O, D, S>
where
    O: ObjectStore,
    D: DeliveryChannel,
    S: Sleeper,
{
    config: &'a RelayConfig,
    store: &'a O,
    channel: &'a D,
    retry: RetryableTransfer<'a, S>,
    captions: CaptionBuilder,
}

impl<'a, O, D, S> UploadWorker<'a, O, D, S>
where
    O: ObjectStore,
    D: DeliveryChannel,
    S: Sleeper,
{
    pub fn new(config: &'a RelayConfig, store: &'a O, channel: &'a D, sleeper: &'a S) -> Self {
        Self {
            config,
            store,
            channel,
            retry: RetryableTransfer::new(RetryPolicy::from(&config.retry), sleeper),
            captions: CaptionBuilder::new(&config.caption, &config.categories),
        }
    }

    /// Admission control. `Some` means the item must not be attempted.
    pub fn admission(&self, item: &MediaItem) -> Option<SkipReason> {
        let max_size_bytes = self.config.limits.max_size_bytes;
        if item.size_bytes > max_size_bytes {
            return Some(SkipReason::Oversized {
                size_bytes: item.size_bytes,
                max_size_bytes,
            });
        }
        if item.kind.is_none() {
            return Some(SkipReason::UnsupportedKind);
        }
        None
    }

    /// Deliver one item and record it. See the module docs for the stages.
    pub async fn process<L: LedgerStore>(
        &self,
        item: &MediaItem,
        ledger: &mut SentLedger<L>,
    ) -> UploadOutcome {
        if let Some(reason) = self.admission(item) {
            info!(key = %item.key, ?reason, "[UPLOAD] Skipping item");
            return UploadOutcome::Skipped(reason);
        }
        let Some(kind) = item.kind else {
            return UploadOutcome::Skipped(SkipReason::UnsupportedKind);
        };

        // Dropped on return, which removes everything staged for this item.
        let staging = match self.staging_dir().await {
            Ok(dir) => dir,
            Err(e) => {
                error!(key = %item.key, error = %e, "[UPLOAD] Could not create staging directory");
                return UploadOutcome::Failed(FailReason::Staging {
                    message: e.to_string(),
                });
            }
        };
        let local_path = staging.path().join(item.staging_file_name());

        let store = self.store;
        let key = item.key.as_str();
        let path = local_path.as_path();
        if let Err(e) = self
            .retry
            .execute("download", move || store.download(key, path))
            .await
        {
            error!(key = %item.key, error = %e, "[UPLOAD] Download failed");
            return UploadOutcome::Failed(FailReason::Download {
                attempts: e.attempts,
                message: e.last_error.to_string(),
            });
        }
        debug!(key = %item.key, path = %local_path.display(), "[UPLOAD] Downloaded to staging");

        let companion_key = item.companion_key();
        let companion = self.companion_text(&companion_key, staging.path()).await;
        let caption = self.captions.build(item, companion.as_deref());
        debug!(key = %item.key, caption = %caption, "[UPLOAD] Caption built");

        if let Err(e) = self.dispatch(kind, path, &caption).await {
            error!(key = %item.key, ?kind, error = %e, "[UPLOAD] Delivery failed");
            return UploadOutcome::Failed(FailReason::Delivery {
                attempts: e.attempts,
                message: e.last_error.to_string(),
            });
        }
        info!(key = %item.key, ?kind, "[UPLOAD] Delivered");

        if let Err(e) = ledger.record(&item.key).await {
            error!(
                key = %item.key,
                error = %e,
                "[LEDGER] Delivered item could not be persisted to the ledger"
            );
        }

        if let Some(archive_prefix) = self.config.archive_prefix.as_deref() {
            let companion_key = companion.is_some().then_some(companion_key.as_str());
            self.archive(&item.key, companion_key, archive_prefix).await;
        }

        UploadOutcome::Delivered
    }

    async fn staging_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bucket-relay-");
        match &self.config.staging_dir {
            Some(parent) => {
                tokio::fs::create_dir_all(parent).await?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
    }

    async fn dispatch(
        &self,
        kind: MediaKind,
        path: &Path,
        caption: &str,
    ) -> Result<(), crate::retry::RetryError> {
        let channel = self.channel;
        let target = self.config.target.as_str();
        match kind {
            MediaKind::Photo => {
                self.retry
                    .execute("send_photo", move || channel.send_photo(target, path, caption))
                    .await
            }
            MediaKind::Video => {
                self.retry
                    .execute("send_video", move || channel.send_video(target, path, caption))
                    .await
            }
            MediaKind::Document => {
                self.retry
                    .execute("send_document", move || {
                        channel.send_document(target, path, caption)
                    })
                    .await
            }
        }
    }

    /// Companion text, if it exists and can be read. Single attempt; any
    /// failure means "no companion".
    async fn companion_text(&self, companion_key: &str, staging: &Path) -> Option<String> {
        match self.fetch_companion(companion_key, staging).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    key = %companion_key,
                    error = %e,
                    "[UPLOAD] Companion text unavailable, using hashtag caption"
                );
                None
            }
        }
    }

    async fn fetch_companion(
        &self,
        companion_key: &str,
        staging: &Path,
    ) -> Result<Option<String>, BoxError> {
        if !self.store.exists(companion_key).await? {
            return Ok(None);
        }
        let local = staging.join(companion_key.replace('/', "_"));
        self.store.download(companion_key, &local).await?;
        let bytes = tokio::fs::read(&local).await?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Best-effort move of the item (and its companion text) under the archive prefix.
    async fn archive(&self, key: &str, companion_key: Option<&str>, archive_prefix: &str) {
        for key in std::iter::once(key).chain(companion_key) {
            let new_key = archive_key(key, &self.config.source_prefix, archive_prefix);
            let moved = async {
                self.store.copy(key, &new_key).await?;
                self.store.delete(key).await
            }
            .await;
            match moved {
                Ok(()) => info!(key = %key, archived_as = %new_key, "[UPLOAD] Archived"),
                Err(e) => warn!(
                    key = %key,
                    archived_as = %new_key,
                    error = %e,
                    "[UPLOAD] Archive move failed; delivery stays recorded"
                ),
            }
        }
    }
}
