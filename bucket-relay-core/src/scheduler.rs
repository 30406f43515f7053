//! High-level loop: paced delivery cycles over shuffled source folders.
//!
//! Each cycle shuffles the configured folders, lists every folder, drops
//! auxiliary files and keys already in the ledger, and feeds the survivors to the
//! [`UploadWorker`] one at a time until the per-cycle cap is reached.
//!
//! # Pacing
//! - After a successful delivery, the next attempted item waits `inter_upload_delay` first.
//!   Reaching the cap ends the cycle, so no wait follows the last delivery.
//! - Cycles are separated by `inter_cycle_delay`; none follows the final cycle.
//!
//! # Error Handling
//! Listing failures (after retries) skip the folder for that cycle. Item failures
//! are reported in the [`CycleReport`]. Neither stops the run.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::contract::{DeliveryChannel, ObjectStore, Sleeper};
use crate::ledger::{LedgerStore, SentLedger};
use crate::media::{is_auxiliary, MediaItem};
use crate::retry::{RetryPolicy, RetryableTransfer};
use crate::worker::{UploadOutcome, UploadWorker};

/// Report of a whole run.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub cycles: Vec<CycleReport>,
}

impl RunReport {
    pub fn delivered(&self) -> usize {
        self.cycles.iter().map(|c| c.delivered.len()).sum()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub index: u32,
    pub folder_order: Vec<String>,
    pub delivered: Vec<String>,
    pub skipped: Vec<ItemReport>,
    pub failed: Vec<ItemReport>,
    /// Folders whose listing failed in this cycle.
    pub unlisted_folders: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ItemReport {
    pub key: String,
    pub outcome: UploadOutcome,
}

/// Drives delivery cycles. Owns the ledger and the RNG used for shuffling.
pub struct CycleScheduler<'a, O, D, S, L, R>
where
    O: ObjectStore,
    D: DeliveryChannel,
    S: Sleeper,
    L: LedgerStore,
    R: Rng,
{
    config: &'a RelayConfig,
    store: &'a O,
    sleeper: &'a S,
    worker: UploadWorker<'a, O, D, S>,
    list_retry: RetryableTransfer<'a, S>,
    ledger: SentLedger<L>,
    rng: R,
}

impl<'a, O, D, S, L, R> CycleScheduler<'a, O, D, S, L, R>
where
    O: ObjectStore,
    D: DeliveryChannel,
    S: Sleeper,
    L: LedgerStore,
    R: Rng,
{
    pub fn new(
        config: &'a RelayConfig,
        store: &'a O,
        channel: &'a D,
        sleeper: &'a S,
        ledger: SentLedger<L>,
        rng: R,
    ) -> Self {
        Self {
            config,
            store,
            sleeper,
            worker: UploadWorker::new(config, store, channel, sleeper),
            list_retry: RetryableTransfer::new(RetryPolicy::from(&config.retry), sleeper),
            ledger,
            rng,
        }
    }

    pub fn ledger(&self) -> &SentLedger<L> {
        &self.ledger
    }

    pub fn into_ledger(self) -> SentLedger<L> {
        self.ledger
    }

    /// Run `schedule.total_cycles` cycles.
    pub async fn run(&mut self) -> RunReport {
        let config = self.config;
        let schedule = &config.schedule;
        info!(
            total_cycles = schedule.total_cycles,
            uploads_per_cycle = schedule.uploads_per_cycle,
            inter_upload_delay_secs = schedule.inter_upload_delay_secs,
            inter_cycle_delay_secs = schedule.inter_cycle_delay_secs,
            "[CYCLE] Starting relay run"
        );

        let mut report = RunReport::default();
        for index in 1..=schedule.total_cycles {
            let cycle = self.run_cycle(index).await;
            match serde_json::to_string(&cycle) {
                Ok(json) => debug!(json = %json, "[CYCLE] Cycle report"),
                Err(e) => debug!(error = ?e, "[CYCLE] Failed to serialize cycle report"),
            }
            report.cycles.push(cycle);

            if index < schedule.total_cycles {
                info!(
                    next_cycle = index + 1,
                    delay_secs = schedule.inter_cycle_delay_secs,
                    "[CYCLE] Waiting before next cycle"
                );
                self.sleeper.sleep(schedule.inter_cycle_delay()).await;
            }
        }

        info!(
            cycles = report.cycles.len(),
            delivered = report.delivered(),
            "[CYCLE] Relay run complete"
        );
        report
    }

    /// One pass over the shuffled folders, capped at `uploads_per_cycle` deliveries.
    pub async fn run_cycle(&mut self, index: u32) -> CycleReport {
        let config = self.config;
        let schedule = &config.schedule;
        let cap = schedule.uploads_per_cycle as usize;
        let folder_order = self.folder_order();
        info!(cycle = index, folders = ?folder_order, "[CYCLE] Starting cycle");

        let mut cycle = CycleReport {
            index,
            folder_order: folder_order.clone(),
            ..CycleReport::default()
        };
        let mut pause_before_next = false;

        'folders: for folder in &folder_order {
            if cycle.delivered.len() >= cap {
                break;
            }
            let Some(candidates) = self.candidates(folder).await else {
                cycle.unlisted_folders.push(folder.clone());
                continue;
            };
            info!(
                cycle = index,
                folder = %folder,
                candidates = candidates.len(),
                "[CYCLE] Listed folder"
            );

            for item in candidates {
                // An earlier folder may have delivered the same key this cycle.
                if self.ledger.contains(&item.key) {
                    continue;
                }
                if let Some(reason) = self.worker.admission(&item) {
                    info!(key = %item.key, ?reason, "[CYCLE] Skipping item");
                    cycle.skipped.push(ItemReport {
                        key: item.key,
                        outcome: UploadOutcome::Skipped(reason),
                    });
                    continue;
                }
                if pause_before_next {
                    debug!(
                        delay_secs = schedule.inter_upload_delay_secs,
                        "[CYCLE] Pacing before next upload"
                    );
                    self.sleeper.sleep(schedule.inter_upload_delay()).await;
                    pause_before_next = false;
                }

                match self.worker.process(&item, &mut self.ledger).await {
                    UploadOutcome::Delivered => {
                        cycle.delivered.push(item.key);
                        if cycle.delivered.len() >= cap {
                            info!(cycle = index, cap, "[CYCLE] Upload cap reached");
                            break 'folders;
                        }
                        pause_before_next = true;
                    }
                    outcome @ UploadOutcome::Skipped(_) => cycle.skipped.push(ItemReport {
                        key: item.key,
                        outcome,
                    }),
                    outcome @ UploadOutcome::Failed(_) => cycle.failed.push(ItemReport {
                        key: item.key,
                        outcome,
                    }),
                }
            }
        }

        if cycle.delivered.is_empty() {
            warn!(
                cycle = index,
                skipped = cycle.skipped.len(),
                failed = cycle.failed.len(),
                "[CYCLE] No deliveries this cycle"
            );
        } else {
            info!(
                cycle = index,
                delivered = cycle.delivered.len(),
                skipped = cycle.skipped.len(),
                failed = cycle.failed.len(),
                "[CYCLE] Cycle finished"
            );
        }
        cycle
    }

    /// Fresh shuffle of the non-empty configured folders, optionally truncated.
    fn folder_order(&mut self) -> Vec<String> {
        let mut folders: Vec<String> = self
            .config
            .folders
            .iter()
            .map(|f| f.trim().trim_matches('/').to_owned())
            .filter(|f| !f.is_empty())
            .collect();
        folders.shuffle(&mut self.rng);
        if let Some(limit) = self.config.schedule.folders_per_cycle {
            folders.truncate(limit);
        }
        folders
    }

    /// Undelivered media in `folder`, in listing order. `None` when listing failed.
    async fn candidates(&self, folder: &str) -> Option<Vec<MediaItem>> {
        let prefix = self.config.folder_prefix(folder);
        let store = self.store;
        let listing = match self
            .list_retry
            .execute("list", || store.list(&prefix))
            .await
        {
            Ok(listing) => listing,
            Err(e) => {
                error!(folder = %folder, prefix = %prefix, error = %e, "[CYCLE] Listing failed");
                return None;
            }
        };

        let archive_prefix = self.config.archive_prefix.as_deref();
        Some(
            listing
                .into_iter()
                .filter(|object| !is_auxiliary(&object.key, archive_prefix))
                .filter(|object| !self.ledger.contains(&object.key))
                .map(|object| MediaItem::new(object, folder))
                .collect(),
        )
    }
}
