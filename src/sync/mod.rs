//! Replays queued local mutations against the backend.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::{ApiError, RemoteApi};
use crate::config::Config;
use crate::connectivity::{Reachability, ReachabilityProbe};
use crate::db::Database;
use crate::models::{SyncOperation, SyncQueueEntry};

mod auto;

pub use auto::spawn_auto_sync;

/// Marker reported when a drain is skipped for lack of connectivity.
pub const OFFLINE: &str = "offline";

#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    /// Attempts an entry gets before it is dropped.
    pub max_retries: i64,
    /// Pause after every replayed entry.
    pub request_delay: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_delay: Duration::from_millis(500),
        }
    }
}

impl SyncPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.sync_max_retries,
            request_delay: config.sync_delay(),
        }
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub success: bool,
    pub synced: usize,
    pub errors: usize,
    /// Entries removed after reaching the retry ceiling; also counted in `errors`.
    pub dropped: usize,
    /// Invoices still flagged `synced = 0` once the drain finished.
    pub unsynced_count: i64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            return write!(f, "sync skipped ({error}), {} invoice(s) pending", self.unsynced_count);
        }
        write!(
            f,
            "{} synced, {} failed ({} dropped), {} invoice(s) pending",
            self.synced, self.errors, self.dropped, self.unsynced_count
        )
    }
}

enum EntryOutcome {
    Synced,
    Retrying,
    Dropped,
}

pub struct SyncService {
    db: Database,
    api: Arc<dyn RemoteApi>,
    probe: Arc<dyn ReachabilityProbe>,
    policy: SyncPolicy,
}

impl SyncService {
    pub fn new(
        db: Database,
        api: Arc<dyn RemoteApi>,
        probe: Arc<dyn ReachabilityProbe>,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            db,
            api,
            probe,
            policy,
        }
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Replay the whole queue, in insertion order, if the backend is reachable.
    ///
    /// Failures are recorded per entry and never abort the drain. Only database
    /// errors are returned as `Err`.
    pub async fn drain(&self) -> Result<SyncReport> {
        if self.probe.probe().await == Reachability::Offline {
            info!("offline, leaving sync queue untouched");
            return Ok(SyncReport {
                success: false,
                synced: 0,
                errors: 0,
                dropped: 0,
                unsynced_count: self.db.unsynced_count().await?,
                error: Some(OFFLINE.to_string()),
                timestamp: Utc::now(),
            });
        }

        let entries = self.db.get_sync_queue().await?;
        if !entries.is_empty() {
            info!(pending = entries.len(), "draining sync queue");
        }

        let mut synced = 0;
        let mut errors = 0;
        let mut dropped = 0;

        for entry in &entries {
            let result = self.dispatch(entry).await;
            tokio::time::sleep(self.policy.request_delay).await;

            match self.settle(entry, result).await? {
                EntryOutcome::Synced => synced += 1,
                EntryOutcome::Retrying => errors += 1,
                EntryOutcome::Dropped => {
                    errors += 1;
                    dropped += 1;
                }
            }
        }

        let report = SyncReport {
            success: errors == 0,
            synced,
            errors,
            dropped,
            unsynced_count: self.db.unsynced_count().await?,
            error: None,
            timestamp: Utc::now(),
        };

        if !entries.is_empty() {
            info!(%report, "sync queue drained");
        }

        Ok(report)
    }

    async fn dispatch(&self, entry: &SyncQueueEntry) -> Result<(), ApiError> {
        debug!(id = entry.id, operation = %entry.operation, entity = %entry.entity_id, "replaying");

        match entry.operation() {
            Some(SyncOperation::CreateInvoice) => {
                let payload = entry
                    .payload_json()
                    .map_err(|e| ApiError::Decode(e.to_string()))?;
                self.api.create_invoice(&payload).await
            }
            Some(SyncOperation::DeleteInvoice) => self.api.delete_invoice(&entry.entity_id).await,
            None => Ok(()),
        }
    }

    async fn settle(
        &self,
        entry: &SyncQueueEntry,
        result: Result<(), ApiError>,
    ) -> Result<EntryOutcome> {
        match result {
            Ok(()) => {
                if entry.operation() == Some(SyncOperation::CreateInvoice) {
                    self.db.mark_invoice_synced(&entry.entity_id).await?;
                }
                self.db.remove_sync_entry(entry.id).await?;
                Ok(EntryOutcome::Synced)
            }
            Err(e) => {
                let retry_count = entry.retry_count + 1;
                if retry_count >= self.policy.max_retries {
                    warn!(
                        id = entry.id,
                        operation = %entry.operation,
                        entity = %entry.entity_id,
                        error = %e,
                        "retry ceiling reached, dropping queued mutation"
                    );
                    self.db.remove_sync_entry(entry.id).await?;
                    Ok(EntryOutcome::Dropped)
                } else {
                    debug!(id = entry.id, retry_count, error = %e, "replay failed");
                    self.db
                        .record_sync_failure(entry.id, retry_count, &e.to_string())
                        .await?;
                    Ok(EntryOutcome::Retrying)
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing;
