use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Bot API upload limit for files sent by a bot.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 50 * 1024 * 1024;

/// Immutable relay configuration. Built once at startup and handed to each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Delivery target identifier, e.g. a channel username or chat id.
    pub target: String,
    /// Object store bucket holding the media.
    pub bucket: String,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default = "default_source_prefix")]
    pub source_prefix: String,
    /// Delivered objects are moved here when set.
    #[serde(default)]
    pub archive_prefix: Option<String>,
    /// Parent directory for per-item staging directories. System temp dir when unset.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Folder names below `source_prefix`.
    pub folders: Vec<String>,
    /// Folder name to category hashtag.
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub caption: CaptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base of the exponential backoff, in seconds.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_total_cycles")]
    pub total_cycles: u32,
    #[serde(default = "default_uploads_per_cycle")]
    pub uploads_per_cycle: u32,
    #[serde(default = "default_inter_upload_delay_secs")]
    pub inter_upload_delay_secs: u64,
    #[serde(default = "default_inter_cycle_delay_secs")]
    pub inter_cycle_delay_secs: u64,
    /// Only the first N folders of each shuffle are visited when set.
    #[serde(default)]
    pub folders_per_cycle: Option<usize>,
}

impl ScheduleConfig {
    pub fn inter_upload_delay(&self) -> Duration {
        Duration::from_secs(self.inter_upload_delay_secs)
    }

    pub fn inter_cycle_delay(&self) -> Duration {
        Duration::from_secs(self.inter_cycle_delay_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            total_cycles: default_total_cycles(),
            uploads_per_cycle: default_uploads_per_cycle(),
            inter_upload_delay_secs: default_inter_upload_delay_secs(),
            inter_cycle_delay_secs: default_inter_cycle_delay_secs(),
            folders_per_cycle: None,
        }
    }
}

/// Which side of the decorative marker keeps a single space.
///
/// The default keeps the space before the marker, so `hello 🔥 world` becomes
/// `hello 🔥world`. Use `after` to get `hello🔥 world` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerSpacing {
    /// `hello 🔥world`
    #[default]
    Before,
    /// `hello🔥 world`
    After,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// Maximum length of the companion text portion, in characters.
    #[serde(default = "default_caption_max_length")]
    pub max_length: usize,
    #[serde(default = "default_marker")]
    pub marker: Option<String>,
    #[serde(default)]
    pub marker_spacing: MarkerSpacing,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            max_length: default_caption_max_length(),
            marker: default_marker(),
            marker_spacing: MarkerSpacing::default(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("sent_files.txt")
}
fn default_source_prefix() -> String {
    "source/".to_string()
}
fn default_max_size_bytes() -> u64 {
    DEFAULT_MAX_SIZE_BYTES
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_secs() -> f64 {
    2.0
}
fn default_total_cycles() -> u32 {
    10
}
fn default_uploads_per_cycle() -> u32 {
    5
}
fn default_inter_upload_delay_secs() -> u64 {
    60
}
fn default_inter_cycle_delay_secs() -> u64 {
    3600
}
fn default_caption_max_length() -> usize {
    150
}
fn default_marker() -> Option<String> {
    Some("🔥".to_string())
}

/// A configuration that must stop the process before any cycle starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("delivery target must not be empty")]
    MissingTarget,
    #[error("bucket name must not be empty")]
    MissingBucket,
    #[error("at least one source folder is required")]
    NoFolders,
    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("schedule.uploads_per_cycle must be at least 1")]
    ZeroUploadsPerCycle,
    #[error("retry.backoff_base_secs must be a finite, non-negative number")]
    InvalidBackoffBase,
    #[error("caption.max_length must be at least 1")]
    ZeroCaptionLength,
}

impl RelayConfig {
    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::MissingTarget);
        }
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        if self.folders.iter().all(|f| f.trim().is_empty()) {
            return Err(ConfigError::NoFolders);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !self.retry.backoff_base_secs.is_finite() || self.retry.backoff_base_secs < 0.0 {
            return Err(ConfigError::InvalidBackoffBase);
        }
        if self.schedule.uploads_per_cycle == 0 {
            return Err(ConfigError::ZeroUploadsPerCycle);
        }
        if self.caption.max_length == 0 {
            return Err(ConfigError::ZeroCaptionLength);
        }
        Ok(())
    }

    /// Listing prefix of a configured folder, e.g. `source/alpha/`.
    pub fn folder_prefix(&self, folder: &str) -> String {
        format!("{}{}/", self.source_prefix, folder.trim_matches('/'))
    }

    pub fn trace_loaded(&self) {
        info!(
            delivery_target = %self.target,
            bucket = %self.bucket,
            folders_count = self.folders.len(),
            total_cycles = self.schedule.total_cycles,
            uploads_per_cycle = self.schedule.uploads_per_cycle,
            "Loaded RelayConfig"
        );
        debug!(?self, "RelayConfig loaded (full debug)");
    }
}
