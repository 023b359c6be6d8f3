//! Types shared across the categorization pipeline stages.

use std::time::Duration;

use serde::Serialize;

use crate::model::{CategorizedRecord, FailedRecord, FailureKind};
use crate::prompt::CategorizeError;
use crate::server_config::ServerConfig;

pub const DEFAULT_BATCH_SIZE: usize = 40;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const MISSING_TITLE_REASON: &str = "Missing document title";
pub const NO_KEY_REASON: &str = "No API key available.";
pub const SAFETY_REASON: &str = "Categorization failed due to safety settings.";
pub const RATE_LIMIT_REASON: &str = "API rate limit exceeded. Try adding more keys or waiting.";
pub const UNKNOWN_BATCH_REASON: &str = "unknown error occurred during batch categorization";
pub const OMITTED_REASON: &str = "model did not return a category for this title in the batch.";
pub const CANCELLED_REASON: &str = "Categorization was cancelled before this batch was submitted.";

/// Map a failed external call to the failure recorded on every affected
/// record.
pub fn failure_for(error: &CategorizeError) -> (FailureKind, String) {
    match error {
        CategorizeError::SafetyBlocked(_) => (FailureKind::SafetyBlocked, SAFETY_REASON.to_string()),
        CategorizeError::RateLimited(_) => (FailureKind::RateLimited, RATE_LIMIT_REASON.to_string()),
        CategorizeError::TimedOut(after) => (
            FailureKind::TimedOut,
            format!("Categorization request timed out after {}s.", after.as_secs()),
        ),
        CategorizeError::Other(message) if message.trim().is_empty() => (
            FailureKind::UnknownBatchError,
            UNKNOWN_BATCH_REASON.to_string(),
        ),
        CategorizeError::Other(message) => (FailureKind::UnknownBatchError, message.clone()),
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub request_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(cfg: &ServerConfig) -> Self {
        Self {
            batch_size: cfg.pipeline.batch_size,
            request_timeout: cfg.api.request_timeout(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Progress snapshot reported after every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    pub processed: usize,
    pub total: usize,
    pub message: String,
}

impl RunProgress {
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f32 / self.total as f32) * 100.0
        }
    }
}

pub type TrackFn<'a> = &'a (dyn Fn(&RunProgress) + Send + Sync);

/// Everything a run produced, each list in input order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub categorized: Vec<CategorizedRecord>,
    pub failed: Vec<FailedRecord>,
}

impl RunOutput {
    pub fn total(&self) -> usize {
        self.categorized.len() + self.failed.len()
    }
}
