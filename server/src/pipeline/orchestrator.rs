//! Pipeline Orchestrator
//!
//! Drives one categorization run: filters untitled records, partitions the
//! rest and submits the batches one at a time, rotating keys between calls.
//! Business failures never abort a run; they end up in the failed list.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::model::{FailureKind, Record};
use crate::prompt::Categorizer;
use crate::rate_limiters::RateLimiters;
use crate::state::KeyPool;

use super::invoker::{fail_records, invoke_batch};
use super::partition::partition;
use super::types::{
    PipelineOptions, RunOutput, RunProgress, TrackFn, CANCELLED_REASON, MISSING_TITLE_REASON,
    NO_KEY_REASON,
};

pub struct CategorizationPipeline<C> {
    categorizer: Arc<C>,
    key_pool: KeyPool,
    rate_limiters: RateLimiters,
    options: PipelineOptions,
}

impl<C: Categorizer> CategorizationPipeline<C> {
    pub fn new(
        categorizer: Arc<C>,
        key_pool: KeyPool,
        rate_limiters: RateLimiters,
        options: PipelineOptions,
    ) -> Self {
        Self {
            categorizer,
            key_pool,
            rate_limiters,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Categorize `records`, reporting progress through `track_fn` after every
    /// batch.
    ///
    /// Every input record appears exactly once in the output. Only an invalid
    /// batch size returns an error.
    pub async fn run(
        &self,
        records: Vec<Record>,
        track_fn: Option<TrackFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, PipelineError> {
        let mut output = RunOutput::default();

        let (titled, untitled): (Vec<Record>, Vec<Record>) =
            records.into_iter().partition(Record::has_title);
        if !untitled.is_empty() {
            tracing::info!("{} records have no title", untitled.len());
        }
        output.failed.extend(fail_records(
            untitled,
            FailureKind::MissingTitle,
            MISSING_TITLE_REASON,
        ));

        let total = titled.len();
        let batches = partition(titled, self.options.batch_size)?;
        let batch_count = batches.len();
        let mut processed = 0;

        let report = |processed: usize, message: String| {
            if let Some(track_fn) = track_fn {
                track_fn(&RunProgress {
                    processed,
                    total,
                    message,
                });
            }
        };

        tracing::info!(
            "Starting categorization of {} titles in {} batches",
            total,
            batch_count
        );
        report(0, format!("Categorizing {} papers", total));

        for batch in batches {
            let batch_number = batch.index + 1;
            let batch_len = batch.len();

            if cancel.is_cancelled() {
                output.failed.extend(fail_records(
                    batch.records,
                    FailureKind::Cancelled,
                    CANCELLED_REASON,
                ));
            } else if let Some(key) = self.key_pool.next_key() {
                self.rate_limiters.acquire_one().await;
                let outcome = invoke_batch(
                    self.categorizer.as_ref(),
                    batch,
                    &key,
                    self.options.request_timeout,
                )
                .await;
                if outcome.is_rate_limited() {
                    self.rate_limiters.trigger_backoff();
                }
                output.categorized.extend(outcome.categorized);
                output.failed.extend(outcome.failed);
            } else {
                tracing::warn!("No API key available for batch {}", batch_number);
                output.failed.extend(fail_records(
                    batch.records,
                    FailureKind::NoKeyAvailable,
                    NO_KEY_REASON,
                ));
            }

            processed += batch_len;
            report(
                processed,
                format!("Categorized batch {} of {}", batch_number, batch_count),
            );
        }

        tracing::info!(
            "Categorization finished: {} categorized, {} failed",
            output.categorized.len(),
            output.failed.len()
        );

        Ok(output)
    }
}
