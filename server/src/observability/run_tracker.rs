//! Run Tracker Module
//!
//! Keeps the phase and progress of every categorization run submitted to
//! this process so clients can poll it, and logs a status table whenever a
//! run changes phase.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::pipeline::RunProgress;

use super::common::{format_elapsed_secs, format_table};

/// How long a completed run stays pollable. Its analysis outlives it in the
/// analysis store.
pub const RUN_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Lifecycle of a run. There is no failed phase: a run always completes,
/// possibly with every record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "camelCase")]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
}

#[derive(Debug, Clone)]
pub struct RunEntry {
    pub id: Uuid,
    pub name: String,
    pub phase: RunPhase,
    pub progress: RunProgress,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
}

impl RunEntry {
    fn new(id: Uuid, name: String, total: usize) -> Self {
        Self {
            id,
            name,
            phase: RunPhase::Idle,
            progress: RunProgress {
                processed: 0,
                total,
                message: "Queued".to_string(),
            },
            started_at: Instant::now(),
            finished_at: None,
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Instant::now);
        end.duration_since(self.started_at).as_secs()
    }

    fn is_expired(&self, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|finished_at| finished_at.elapsed() >= retention)
    }

    pub fn status(&self) -> RunStatus {
        RunStatus {
            id: self.id,
            name: self.name.clone(),
            phase: self.phase,
            processed: self.progress.processed,
            total: self.progress.total,
            percentage: self.progress.percentage(),
            message: self.progress.message.clone(),
            elapsed_secs: self.elapsed_secs(),
        }
    }
}

/// Snapshot of a run as served to polling clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub id: Uuid,
    pub name: String,
    pub phase: RunPhase,
    pub processed: usize,
    pub total: usize,
    pub percentage: f32,
    pub message: String,
    pub elapsed_secs: u64,
}

/// Thread-safe tracker for submitted runs. Completed runs stay visible for
/// the retention window and are pruned when the next run registers.
#[derive(Clone)]
pub struct RunTracker {
    runs: Arc<RwLock<HashMap<Uuid, RunEntry>>>,
    retention: Duration,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::with_retention(RUN_RETENTION)
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, RunEntry>> {
        self.runs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, RunEntry>> {
        self.runs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_table(&self) {
        if let Some(table) = self.get_runs_table() {
            info!("Run Status Update:\n{}", table);
        }
    }

    /// Register a run in the Idle phase and log the status table
    pub fn register_run(&self, id: Uuid, name: String, total: usize) {
        self.prune_expired();
        self.write().insert(id, RunEntry::new(id, name, total));
        self.log_table();
    }

    /// Drop completed runs older than the retention window and return the
    /// count of remaining runs
    pub fn prune_expired(&self) -> usize {
        let mut runs = self.write();
        let before = runs.len();
        runs.retain(|_, entry| !entry.is_expired(self.retention));
        let after = runs.len();
        if before > after {
            tracing::debug!("Pruned {} completed runs, {} remaining", before - after, after);
        }
        after
    }

    pub fn start_run(&self, id: Uuid) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.phase = RunPhase::Running;
            entry.started_at = Instant::now();
        }
        self.log_table();
    }

    pub fn update_progress(&self, id: Uuid, progress: &RunProgress) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.progress = progress.clone();
        }
    }

    /// Mark a run as complete and log the status table
    pub fn complete_run(&self, id: Uuid) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.phase = RunPhase::Completed;
            entry.finished_at = Some(Instant::now());
        }
        self.log_table();
    }

    pub fn remove_run(&self, id: Uuid) {
        self.write().remove(&id);
    }

    pub fn get_run(&self, id: Uuid) -> Option<RunEntry> {
        self.read().get(&id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.read()
            .values()
            .filter(|entry| entry.phase != RunPhase::Completed)
            .count()
    }

    /// Get formatted table of tracked runs
    pub fn get_runs_table(&self) -> Option<String> {
        let runs = self.read();
        if runs.is_empty() {
            return None;
        }

        let headers = ["Run", "Name", "Phase", "Progress", "Elapsed"];
        let mut entries: Vec<&RunEntry> = runs.values().collect();
        entries.sort_by_key(|entry| entry.started_at);

        let rows: Vec<Vec<String>> = entries
            .into_iter()
            .map(|entry| {
                vec![
                    entry.id.to_string(),
                    entry.name.clone(),
                    entry.phase.to_string(),
                    format!(
                        "{}/{} ({:.0}%)",
                        entry.progress.processed,
                        entry.progress.total,
                        entry.progress.percentage()
                    ),
                    format_elapsed_secs(entry.elapsed_secs()),
                ]
            })
            .collect();

        Some(format!(
            "Categorization Runs ({}):\n{}",
            runs.len(),
            format_table(&headers, &rows)
        ))
    }
}
