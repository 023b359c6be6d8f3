//! Batch Invoker
//!
//! Submits one batch to the categorizer and turns whatever comes back into
//! per-record outcomes. A failed call fails every record of the batch with
//! the same reason; a successful call is matched back to its records by
//! exact title.

use std::collections::HashMap;
use std::time::Duration;

use crate::model::{CategorizedRecord, FailedRecord, FailureKind, Record};
use crate::prompt::{CategorizeError, Categorizer, TitleCategory};

use super::partition::Batch;
use super::types::{failure_for, OMITTED_REASON};

/// Outcome of one batch. Every record of the batch ends up in exactly one of
/// the two lists.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub categorized: Vec<CategorizedRecord>,
    pub failed: Vec<FailedRecord>,
    /// Set when the external call itself failed.
    pub batch_error: Option<CategorizeError>,
}

impl BatchOutcome {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.batch_error, Some(CategorizeError::RateLimited(_)))
    }
}

/// Categorize `batch` with a single call authenticated by `key`, bounded by
/// `timeout`.
pub async fn invoke_batch<C: Categorizer>(
    categorizer: &C,
    batch: Batch,
    key: &str,
    timeout: Duration,
) -> BatchOutcome {
    let titles = batch.titles();

    let result = match tokio::time::timeout(timeout, categorizer.categorize_batch(&titles, key)).await
    {
        Ok(result) => result,
        Err(_) => Err(CategorizeError::TimedOut(timeout)),
    };

    match result {
        Ok(answers) => {
            tracing::debug!(
                "Batch {} returned {} answers for {} titles",
                batch.index + 1,
                answers.len(),
                titles.len()
            );
            merge_results(batch.records, answers)
        }
        Err(err) => {
            tracing::warn!("Batch {} failed: {}", batch.index + 1, err);
            let (kind, reason) = failure_for(&err);
            BatchOutcome {
                categorized: Vec::new(),
                failed: fail_records(batch.records, kind, &reason),
                batch_error: Some(err),
            }
        }
    }
}

/// Match answers to records by exact title. The first answer carrying a title
/// wins, answers for titles not in the batch are ignored, and records without
/// an answer fail as omitted.
pub fn merge_results(records: Vec<Record>, answers: Vec<TitleCategory>) -> BatchOutcome {
    let mut by_title: HashMap<String, (String, f32)> = HashMap::with_capacity(answers.len());
    for answer in answers {
        by_title
            .entry(answer.title)
            .or_insert((answer.category, answer.confidence));
    }

    let mut outcome = BatchOutcome::default();
    for record in records {
        match by_title.get(&record.title) {
            Some((category, confidence)) => {
                let categorized = record.categorized(category.clone(), *confidence);
                outcome.categorized.push(categorized);
            }
            None => outcome
                .failed
                .push(record.failed(FailureKind::OmittedResult, OMITTED_REASON)),
        }
    }

    outcome
}

/// Fail every record with the same kind and reason.
pub fn fail_records(records: Vec<Record>, kind: FailureKind, reason: &str) -> Vec<FailedRecord> {
    records
        .into_iter()
        .map(|record| record.failed(kind, reason))
        .collect()
}
