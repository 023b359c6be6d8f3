use std::{future::Future, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{AppError, AppJsonResult, AppResult, PipelineError},
    model::{Analysis, AnalysisEnrichment, AnalysisSummary, Record, RecordInput},
    observability::{RunStatus, RunTracker},
    pipeline::{retry_failed, CategorizationPipeline, PipelineOptions, RunProgress},
    prompt::MistralClient,
    rate_limiters::RateLimiters,
    state::{AnalysisStore, KeyPool},
    ServerState,
};

fn analysis_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Analysis {} not found", id))
}

/// # POST /api/analyses

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisBody {
    pub name: Option<String>,
    pub records: Vec<RecordInput>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisResponse {
    pub run_id: Uuid,
}

/// Start a categorization run in the background. The analysis is stored
/// under the returned run id once the run completes.
pub async fn start_analysis(
    State(state): State<ServerState>,
    Json(StartAnalysisBody {
        name,
        records,
        batch_size,
    }): Json<StartAnalysisBody>,
) -> AppResult<(StatusCode, Json<StartAnalysisResponse>)> {
    let options = match batch_size {
        Some(0) => {
            return Err(PipelineError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            )
            .into())
        }
        Some(batch_size) => state.pipeline_options.clone().with_batch_size(batch_size),
        None => state.pipeline_options.clone(),
    };

    let records: Vec<Record> = records
        .into_iter()
        .enumerate()
        .map(|(position, input)| Record::from_input(input, position))
        .collect();

    let run_id = Uuid::new_v4();
    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Analysis {}", Utc::now().format("%Y-%m-%d %H:%M")));

    let titled = records.iter().filter(|r| r.has_title()).count();
    state.run_tracker.register_run(run_id, name.clone(), titled);

    let pipeline = CategorizationPipeline::new(
        state.categorizer.clone(),
        state.key_pool.clone(),
        state.rate_limiters.clone(),
        options,
    );
    spawn_tracked_run(
        state.run_tracker.clone(),
        run_id,
        run_analysis(
            pipeline,
            run_id,
            name,
            records,
            state.run_tracker.clone(),
            state.analysis_store.clone(),
            state.shutdown.clone(),
        ),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(StartAnalysisResponse { run_id }),
    ))
}

async fn run_analysis(
    pipeline: CategorizationPipeline<MistralClient>,
    run_id: Uuid,
    name: String,
    records: Vec<Record>,
    run_tracker: RunTracker,
    analysis_store: AnalysisStore,
    shutdown: CancellationToken,
) {
    run_tracker.start_run(run_id);
    let track = |progress: &RunProgress| run_tracker.update_progress(run_id, progress);

    match pipeline.run(records, Some(&track), &shutdown).await {
        Ok(output) => {
            let analysis = Analysis::new(run_id, name, output.categorized, output.failed);
            analysis_store.save(analysis).await;
            run_tracker.complete_run(run_id);
        }
        Err(e) => {
            tracing::error!("Run {} could not start: {}", run_id, e);
            run_tracker.remove_run(run_id);
        }
    }
}

/// Spawn `run` and drop its tracker entry if the task panics, so pollers get
/// a 404 instead of a run stuck in `running`.
fn spawn_tracked_run<F>(run_tracker: RunTracker, run_id: Uuid, run: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(run);
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            tracing::error!("Run {} aborted: {}", run_id, join_error_message(e));
            run_tracker.remove_run(run_id);
        }
    });
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let panic = err.into_panic();
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Unknown panic".to_string())
}

/// # GET /api/runs/:id
pub async fn get_run(
    State(run_tracker): State<RunTracker>,
    Path(id): Path<Uuid>,
) -> AppJsonResult<RunStatus> {
    run_tracker
        .get_run(id)
        .map(|entry| Json(entry.status()))
        .ok_or_else(|| AppError::NotFound(format!("Run {} not found", id)))
}

/// # GET /api/analyses
pub async fn list_analyses(
    State(analysis_store): State<AnalysisStore>,
) -> AppJsonResult<Vec<AnalysisSummary>> {
    Ok(Json(analysis_store.list().await))
}

/// # GET /api/analyses/:id
pub async fn get_analysis(
    State(analysis_store): State<AnalysisStore>,
    Path(id): Path<Uuid>,
) -> AppJsonResult<Analysis> {
    analysis_store
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| analysis_not_found(id))
}

/// # PATCH /api/analyses/:id
pub async fn enrich_analysis(
    State(analysis_store): State<AnalysisStore>,
    Path(id): Path<Uuid>,
    Json(enrichment): Json<AnalysisEnrichment>,
) -> AppJsonResult<Analysis> {
    analysis_store
        .update(&id, |analysis| analysis.apply_enrichment(enrichment))
        .await
        .map(Json)
        .ok_or_else(|| analysis_not_found(id))
}

/// # POST /api/analyses/:id/retry
///
/// Retries the retryable failed papers one title at a time. The retry runs
/// as its own task and stores each result as it resolves, so a request that
/// times out still keeps every finished attempt.
pub async fn retry_analysis(
    State(analysis_store): State<AnalysisStore>,
    State(categorizer): State<Arc<MistralClient>>,
    State(key_pool): State<KeyPool>,
    State(rate_limiters): State<RateLimiters>,
    State(pipeline_options): State<PipelineOptions>,
    Path(id): Path<Uuid>,
) -> AppJsonResult<Analysis> {
    let store = analysis_store.clone();
    let retry = tokio::spawn(async move {
        retry_failed(
            categorizer.as_ref(),
            &key_pool,
            &rate_limiters,
            &store,
            id,
            pipeline_options.request_timeout,
        )
        .await
    });

    retry
        .await
        .map_err(|e| anyhow::anyhow!("Retry of {} aborted: {}", id, join_error_message(e)))?
        .ok_or_else(|| analysis_not_found(id))?;

    analysis_store
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| analysis_not_found(id))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::observability::RunPhase;

    #[tokio::test]
    async fn test_panicked_run_leaves_tracker() {
        let run_tracker = RunTracker::new();
        let run_id = Uuid::new_v4();
        run_tracker.register_run(run_id, "doomed".to_string(), 3);
        run_tracker.start_run(run_id);

        spawn_tracked_run(run_tracker.clone(), run_id, async {
            panic!("categorizer exploded");
        });

        for _ in 0..100 {
            if run_tracker.get_run(run_id).is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} still tracked after its task panicked");
    }

    #[tokio::test]
    async fn test_finished_run_stays_tracked() {
        let run_tracker = RunTracker::new();
        let run_id = Uuid::new_v4();
        run_tracker.register_run(run_id, "fine".to_string(), 0);

        let tracker = run_tracker.clone();
        spawn_tracked_run(run_tracker.clone(), run_id, async move {
            tracker.complete_run(run_id);
        });

        for _ in 0..100 {
            if run_tracker
                .get_run(run_id)
                .is_some_and(|entry| entry.phase == RunPhase::Completed)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} never completed");
    }
}
