//! Materialization cache.
//!
//! Cacheable query results live in tables named after their
//! fingerprint, so the table itself is the durable cache record: a
//! coordinator restarted with an empty in-memory map rediscovers prior
//! results by probing for the table before building.
//!
//! The coordinator guarantees at most one concurrent build per
//! fingerprint. The claim is taken under a mutex over the entry map;
//! everything after the claim is lock-free, with per-entry state
//! published over a watch channel that any number of pollers can
//! subscribe to.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{error, info};

use eventide_core::{Fingerprint, NodeId, QueryGraph};
use eventide_error::{ErrorCode, ErrorContext, EventideError, Result};

use crate::pool::WorkerPool;
use crate::storage::StorageBackend;

/// Lifecycle of one fingerprint's materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    /// Claimed, waiting for a worker slot.
    Queued,
    /// A worker is materializing the table.
    Executing,
    /// The table exists and holds the result rows.
    Completed { table: String },
    /// The build failed. Stays errored until a fresh build request.
    Errored { message: String },
    /// Cancelled before a worker picked it up.
    Cancelled,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildState::Completed { .. } | BuildState::Errored { .. } | BuildState::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuildState::Queued => "queued",
            BuildState::Executing => "executing",
            BuildState::Completed { .. } => "completed",
            BuildState::Errored { .. } => "errored",
            BuildState::Cancelled => "cancelled",
        }
    }
}

/// One fingerprint's cache record.
#[derive(Debug)]
pub struct CacheEntry {
    fingerprint: String,
    state_tx: watch::Sender<BuildState>,
}

impl CacheEntry {
    fn new(fingerprint: String) -> Self {
        let (state_tx, _) = watch::channel(BuildState::Queued);
        Self {
            fingerprint,
            state_tx,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn state(&self) -> BuildState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BuildState> {
        self.state_tx.subscribe()
    }

    /// Wait until the build reaches a terminal state.
    pub async fn wait_terminal(&self) -> BuildState {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(BuildState::is_terminal).await {
            Ok(state) => state.clone(),
            // Sender dropped; whatever is in the channel is final.
            Err(_) => self.state(),
        };
        state
    }

    fn set(&self, state: BuildState) {
        self.state_tx.send_replace(state);
    }

    /// Transition Queued -> Executing. False if the entry left Queued
    /// in the meantime (cancelled, typically).
    fn try_start(&self) -> bool {
        let mut started = false;
        self.state_tx.send_modify(|state| {
            if matches!(state, BuildState::Queued) {
                *state = BuildState::Executing;
                started = true;
            }
        });
        started
    }

    /// Transition Queued -> Cancelled. False once a worker has started.
    fn try_cancel(&self) -> bool {
        let mut cancelled = false;
        self.state_tx.send_modify(|state| {
            if matches!(state, BuildState::Queued) {
                *state = BuildState::Cancelled;
                cancelled = true;
            }
        });
        cancelled
    }
}

pub struct CacheCoordinator {
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
    /// Schema holding materialized tables. Empty means unqualified.
    schema: String,
}

impl CacheCoordinator {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            schema: schema.into(),
        }
    }

    /// Deterministic table name for a fingerprint.
    pub fn table_name(&self, fingerprint: &Fingerprint) -> String {
        if self.schema.is_empty() {
            format!("x{}", fingerprint.table_suffix())
        } else {
            format!("{}.x{}", self.schema, fingerprint.table_suffix())
        }
    }

    /// Entry for a fingerprint, if one is known to this coordinator.
    pub fn lookup(&self, fingerprint: &str) -> Option<Arc<CacheEntry>> {
        self.entries.lock().get(fingerprint).cloned()
    }

    /// Cancel a queued build. Returns false when the build has already
    /// started, finished, or was never claimed.
    pub fn cancel(&self, fingerprint: &str) -> bool {
        match self.lookup(fingerprint) {
            Some(entry) => {
                let cancelled = entry.try_cancel();
                if cancelled {
                    info!(fingerprint, "cancelled queued build");
                }
                cancelled
            }
            None => false,
        }
    }

    /// Return the cache entry for the graph rooted at `root`, claiming
    /// and scheduling a build if no usable one exists.
    ///
    /// Exactly one caller wins the claim for a fingerprint at a time;
    /// everyone else gets the same entry to poll. Errored and cancelled
    /// entries are reset and reclaimed by a fresh request; polling an
    /// entry never retries it.
    pub async fn get_or_build(
        &self,
        storage: Arc<dyn StorageBackend>,
        pool: &WorkerPool,
        graph: &QueryGraph,
        root: NodeId,
    ) -> Result<Arc<CacheEntry>> {
        let fingerprint = graph.fingerprint(root)?.clone();
        if !graph.cacheable(root)? {
            return Err(EventideError::new(
                ErrorCode::NotCacheable,
                "The query's root node cannot be materialized",
            )
            .with_context(ErrorContext::Cache {
                fingerprint: fingerprint.to_string(),
                state: None,
            })
            .with_hint("Wrap raw scans and opted-out custom SQL in an aggregation"));
        }

        let table = self.table_name(&fingerprint);

        // Check-then-claim is atomic under the map lock.
        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(fingerprint.as_str()) {
                Some(existing) => match existing.state() {
                    BuildState::Cancelled | BuildState::Errored { .. } => {
                        existing.set(BuildState::Queued);
                        Arc::clone(existing)
                    }
                    // Completed or in flight: share it.
                    _ => return Ok(Arc::clone(existing)),
                },
                None => {
                    let entry = Arc::new(CacheEntry::new(fingerprint.to_string()));
                    entries.insert(fingerprint.to_string(), Arc::clone(&entry));
                    entry
                }
            }
        };

        // A table left behind by an earlier process is still a valid
        // result for this fingerprint.
        match storage.table_exists(&table).await {
            Ok(true) => {
                info!(fingerprint = %fingerprint, table, "rediscovered materialized table");
                entry.set(BuildState::Completed {
                    table: table.clone(),
                });
                return Ok(entry);
            }
            Ok(false) => {}
            Err(err) => {
                entry.set(BuildState::Errored {
                    message: err.to_string(),
                });
                return Err(err);
            }
        }

        let sql = graph.render(root)?;
        let worker_entry = Arc::clone(&entry);
        let fingerprint = fingerprint.to_string();
        pool.spawn(async move {
            // A cancel may have landed while we waited for a slot.
            if !worker_entry.try_start() {
                return;
            }
            match storage.materialize(&table, &sql).await {
                Ok(()) => {
                    info!(fingerprint, table, "materialized query result");
                    worker_entry.set(BuildState::Completed { table });
                }
                Err(err) => {
                    error!(fingerprint, table, %err, "materialization failed");
                    worker_entry.set(BuildState::Errored {
                        message: err.to_string(),
                    });
                }
            }
        });

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!BuildState::Queued.is_terminal());
        assert!(!BuildState::Executing.is_terminal());
        assert!(BuildState::Cancelled.is_terminal());
        assert!(BuildState::Completed {
            table: "x".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn table_names_are_schema_qualified() {
        let fp = Fingerprint::digest("scan", &serde_json::json!({}), &[]);
        let qualified = CacheCoordinator::new("cache");
        assert_eq!(
            qualified.table_name(&fp),
            format!("cache.x{}", fp.table_suffix())
        );
        let bare = CacheCoordinator::new("");
        assert_eq!(bare.table_name(&fp), format!("x{}", fp.table_suffix()));
    }

    #[test]
    fn cancel_only_applies_to_queued_entries() {
        let entry = CacheEntry::new("fp".to_string());
        assert!(entry.try_start());
        assert!(!entry.try_cancel());
        assert_eq!(entry.state(), BuildState::Executing);

        let queued = CacheEntry::new("fp2".to_string());
        assert!(queued.try_cancel());
        assert!(!queued.try_start());
        assert_eq!(queued.state(), BuildState::Cancelled);
    }
}
