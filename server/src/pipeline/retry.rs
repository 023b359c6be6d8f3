use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::model::FailedRecord;
use crate::prompt::{CategorizeError, Categorizer};
use crate::rate_limiters::RateLimiters;
use crate::state::{AnalysisStore, KeyPool};

use super::types::failure_for;

/// Counts from one retry pass over an analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcome {
    pub attempted: usize,
    pub recovered: usize,
    /// Retryable records left untouched because the key pool ran dry.
    pub skipped: usize,
}

/// Retry every retryable failed record of the stored analysis `id` one title
/// at a time.
///
/// Each result is written to the store as soon as it resolves, so attempts
/// already made survive if the caller stops polling this future. Recovered
/// records are appended to the categorized list in the order they were
/// retried. A failed attempt keeps the record in its slot with the newly
/// classified reason. Stops at the first missing key.
///
/// Returns None if no analysis is stored under `id`.
pub async fn retry_failed<C: Categorizer>(
    categorizer: &C,
    key_pool: &KeyPool,
    rate_limiters: &RateLimiters,
    analysis_store: &AnalysisStore,
    id: Uuid,
    timeout: Duration,
) -> Option<RetryOutcome> {
    let candidates: Vec<FailedRecord> = analysis_store
        .get(&id)
        .await?
        .failed_papers
        .into_iter()
        .filter(|f| f.failure_kind.is_retryable())
        .collect();

    let mut outcome = RetryOutcome::default();
    for (i, failed) in candidates.iter().enumerate() {
        let Some(key) = key_pool.next_key() else {
            tracing::warn!("No API key available, stopping retry");
            outcome.skipped = candidates.len() - i;
            break;
        };

        outcome.attempted += 1;
        rate_limiters.acquire_one().await;
        let result = retry_one(categorizer, failed, &key, timeout).await;
        if matches!(result, Err(CategorizeError::RateLimited(_))) {
            rate_limiters.trigger_backoff();
        }

        let recovered = result.is_ok();
        let retried = match result {
            Ok((category, confidence)) => {
                Ok(failed.clone().into_record().categorized(category, confidence))
            }
            Err(err) => {
                tracing::debug!("Retry of \"{}\" failed: {}", failed.record.title, err);
                let (kind, reason) = failure_for(&err);
                Err(failed.clone().into_record().failed(kind, reason))
            }
        };

        let mut applied = false;
        let stored = analysis_store
            .update(&id, |analysis| applied = analysis.apply_retry(failed, retried))
            .await;
        if stored.is_none() {
            tracing::warn!("Analysis {} disappeared during retry", id);
            break;
        }
        if recovered && applied {
            outcome.recovered += 1;
        }
    }

    tracing::info!(
        "Retried {} failed papers of analysis {}: {} recovered, {} skipped",
        outcome.attempted,
        id,
        outcome.recovered,
        outcome.skipped
    );
    Some(outcome)
}

async fn retry_one<C: Categorizer>(
    categorizer: &C,
    failed: &FailedRecord,
    key: &str,
    timeout: Duration,
) -> Result<(String, f32), CategorizeError> {
    let answer = tokio::time::timeout(
        timeout,
        categorizer.categorize_single(&failed.record.title, key),
    )
    .await
    .map_err(|_| CategorizeError::TimedOut(timeout))??;

    Ok((answer.category, answer.confidence))
}
