//! # ledger: durable record of delivered keys
//!
//! [`SentLedger`] is the authority on "already sent". It keeps every delivered
//! object key in memory and appends each new key to a [`LedgerStore`].
//!
//! The on-disk format of [`FileLedgerStore`] is a flat UTF-8 text log with one key
//! per line. Each record is written with a single `write_all` of `key\n`, so a
//! crash can at worst leave one unterminated trailing fragment. Reloading cuts
//! that fragment off the file, so it never merges with a later record.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger keys must be non-empty single lines, got {0:?}")]
    InvalidKey(String),
    #[error("ledger store lock poisoned")]
    Poisoned,
}

/// Append-only storage behind the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Durably append one key.
    async fn append(&self, key: &str) -> Result<(), LedgerError>;

    /// Every complete record, in append order. Duplicates are allowed.
    async fn load_all(&self) -> Result<Vec<String>, LedgerError>;
}

/// Line-per-key text file.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn append(&self, key: &str) -> Result<(), LedgerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        let record = format!("{key}\n");
        file.write_all(record.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.sync_data().await.map_err(|e| self.io_error(e))?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<String>, LedgerError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "[LEDGER] No ledger file yet, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let complete_len = content.rfind('\n').map_or(0, |idx| idx + 1);
        let (complete, fragment) = content.split_at(complete_len);
        if !fragment.is_empty() {
            warn!(
                path = %self.path.display(),
                fragment = %fragment,
                "[LEDGER] Truncating unterminated trailing record"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .await
                .map_err(|e| self.io_error(e))?;
            file.set_len(complete_len as u64)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        Ok(complete
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect())
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    records: Mutex<Vec<String>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: Mutex::new(records.into_iter().map(Into::into).collect()),
        }
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<String> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, key: &str) -> Result<(), LedgerError> {
        self.records
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .push(key.to_owned());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.records())
    }
}

/// Set of delivered keys backed by an append-only store.
pub struct SentLedger<L: LedgerStore> {
    store: L,
    sent: HashSet<String>,
}

impl<L: LedgerStore> SentLedger<L> {
    /// Rebuild the in-memory set from the store.
    pub async fn open(store: L) -> Result<Self, LedgerError> {
        let records = store.load_all().await?;
        let total = records.len();
        let sent: HashSet<String> = records.into_iter().collect();
        info!(
            records = total,
            distinct = sent.len(),
            "[LEDGER] Loaded sent ledger"
        );
        Ok(Self { store, sent })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sent.contains(key)
    }

    /// Record `key` as delivered. Recording a known key does nothing.
    ///
    /// The key joins the in-memory set even when the durable append fails, so the
    /// running process still never re-selects it.
    pub async fn record(&mut self, key: &str) -> Result<(), LedgerError> {
        if key.trim().is_empty() || key.contains('\n') || key.contains('\r') {
            return Err(LedgerError::InvalidKey(key.to_owned()));
        }
        if !self.sent.insert(key.to_owned()) {
            debug!(key = %key, "[LEDGER] Key already recorded");
            return Ok(());
        }
        self.store.append(key).await?;
        debug!(key = %key, "[LEDGER] Recorded delivered key");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    pub fn store(&self) -> &L {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reload_yields_distinct_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sent.txt");
        std::fs::write(&path, "a.jpg\nb.mp4\na.jpg\n\nc.pdf\n").unwrap();

        let ledger = SentLedger::open(FileLedgerStore::new(&path)).await.unwrap();
        assert_eq!(ledger.len(), 3);
        assert!(ledger.contains("a.jpg"));
        assert!(ledger.contains("b.mp4"));
        assert!(ledger.contains("c.pdf"));
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_ledger() {
        let dir = tempdir().unwrap();
        let ledger = SentLedger::open(FileLedgerStore::new(dir.path().join("absent.txt")))
            .await
            .unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn record_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sent.txt");

        let mut ledger = SentLedger::open(FileLedgerStore::new(&path)).await.unwrap();
        ledger.record("source/alpha/a.jpg").await.unwrap();
        ledger.record("source/alpha/b.mp4").await.unwrap();
        ledger.record("source/alpha/a.jpg").await.unwrap();
        drop(ledger);

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "source/alpha/a.jpg\nsource/alpha/b.mp4\n"
        );
        let reopened = SentLedger::open(FileLedgerStore::new(&path)).await.unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.contains("source/alpha/b.mp4"));
    }

    #[tokio::test]
    async fn unterminated_fragment_is_dropped_and_not_glued_to_next_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sent.txt");
        std::fs::write(&path, "a.jpg\nb.m").unwrap();

        let mut ledger = SentLedger::open(FileLedgerStore::new(&path)).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.contains("b.m"));

        ledger.record("c.png").await.unwrap();
        drop(ledger);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a.jpg\nc.png\n");
        let reopened = SentLedger::open(FileLedgerStore::new(&path)).await.unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.contains("c.png"));
        assert!(!reopened.contains("b.mc.png"));
    }

    #[tokio::test]
    async fn poisoned_memory_store_reports_append_failure() {
        let store = std::sync::Arc::new(MemoryLedgerStore::with_records(["a.jpg"]));
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.records.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(
            store.append("b.jpg").await,
            Err(LedgerError::Poisoned)
        ));
        assert_eq!(store.records(), vec!["a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn unreadable_ledger_reports_path_and_io_source() {
        let dir = tempdir().unwrap();
        // A directory cannot be read as a ledger file.
        let err = FileLedgerStore::new(dir.path()).load_all().await.unwrap_err();

        assert!(matches!(err, LedgerError::Io { .. }));
        assert!(err.to_string().contains(&dir.path().display().to_string()));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn multiline_keys_are_rejected() {
        let mut ledger = SentLedger::open(MemoryLedgerStore::new()).await.unwrap();
        assert!(matches!(
            ledger.record("a\nb").await,
            Err(LedgerError::InvalidKey(_))
        ));
        assert!(ledger.store().records().is_empty());
    }
}
