use super::{AppState, error::ApiError};
use crate::server::telemetry::{
    increment_jobs_rejected, increment_jobs_submitted, record_job_outcome,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use docpool::{DocumentId, JobId, JobReceipt, PoolStatus, Renderer, watch};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Instant;

const DEFAULT_SUBMITTER: &str = "anonymous";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateRequest {
    #[serde(default)]
    pub submitter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub job_id: JobId,
    pub document_id: DocumentId,
    pub queue_size: usize,
    pub active_workers: usize,
}

/// Queues a document for generation.
///
/// The body is optional; an empty body is the same as `{}`. The response does
/// not wait for the render: the outcome is observed by a detached monitor and
/// only logged.
#[cfg_attr(feature = "tracing", tracing::instrument(name = "generate", skip_all))]
pub async fn generate<R: Renderer>(
    State(state): State<AppState<R>>,
    Path(document_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<GenerateResponse>), ApiError> {
    let request = if body.is_empty() {
        GenerateRequest::default()
    } else {
        serde_json::from_slice::<GenerateRequest>(&body)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let submitter = request
        .submitter
        .unwrap_or_else(|| DEFAULT_SUBMITTER.to_owned());

    let receipt = match state.pool.submit(document_id, submitter).await {
        Ok(receipt) => receipt,
        Err(e) => {
            increment_jobs_rejected(match e {
                docpool::Error::QueueFull => "queue_full",
                _ => "pool_stopped",
            });
            #[cfg(feature = "tracing")]
            tracing::warn!("Rejected generation request: {e}");
            return Err(e.into());
        }
    };
    increment_jobs_submitted();

    let response = GenerateResponse {
        status: "accepted",
        job_id: receipt.job_id(),
        document_id: receipt.document_id().clone(),
        queue_size: state.pool.queue_size(),
        active_workers: state.pool.active_workers(),
    };

    spawn_outcome_monitor(receipt, &state);

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Logs and records the eventual outcome of `receipt` off the request path.
fn spawn_outcome_monitor<R>(receipt: JobReceipt, state: &AppState<R>) {
    let ceiling = state.monitor_timeout;
    let token = state.monitors.child_token();
    let started = Instant::now();

    #[cfg(feature = "tracing")]
    let span = tracing::info_span!(
        "job_monitor",
        job_id = %receipt.job_id(),
        document_id = %receipt.document_id()
    );

    let fut = async move {
        let outcome = watch(receipt, ceiling, token).await;
        record_job_outcome(outcome, started.elapsed().as_secs_f64() * 1000.0);
    };

    #[cfg(feature = "tracing")]
    let fut = {
        use tracing::Instrument;
        fut.instrument(span)
    };

    tokio::spawn(fut);
}

pub async fn status<R: Renderer>(State(state): State<AppState<R>>) -> Json<PoolStatus> {
    Json(state.pool.status())
}

pub async fn health<R: Renderer>(State(state): State<AppState<R>>) -> (StatusCode, Json<Value>) {
    if state.pool.is_running() {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
    }
}
