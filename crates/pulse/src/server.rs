//! HTTP host for the brief service.
//!
//! # Routes
//!
//! - `POST /runs` - start a run (202, 409 while one is running)
//! - `GET /runs/current` - run slot state and the active or last run id
//! - `GET /runs/{run_id}/events` - progress as Server-Sent Events; resumes
//!   from `?from=N` or the `Last-Event-ID` header
//! - `GET /result` - the last successful result
//! - `POST /credential` - validate and store the model API key
//! - `GET /health` - liveness

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use pulse_models::progress::RunState;
use pulse_models::report::RunResult;
use pulse_pipeline::{BriefService, PipelineError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Build the router over a shared service.
pub fn router(service: BriefService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/runs", post(start_run))
        .route("/runs/current", get(current_run))
        .route("/runs/{run_id}/events", get(run_events))
        .route("/result", get(last_result))
        .route("/credential", post(store_credential))
        .with_state(service)
}

/// Bind `addr` and serve until `cancel` fires.
pub async fn serve(service: BriefService, addr: &str, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    serve_on(listener, service, cancel).await
}

/// Serve on an already-bound listener until `cancel` fires.
pub async fn serve_on(
    listener: TcpListener,
    service: BriefService,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "Pulse server listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Server error")?;
    info!("Pulse server stopped");
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunStarted {
    pub run_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentRun {
    pub state: RunState,
    pub run_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub from: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    #[serde(alias = "api_key")]
    pub secret: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /runs
async fn start_run(State(service): State<BriefService>) -> ApiResult<(StatusCode, Json<RunStarted>)> {
    let run_id = service.start_run().await?;
    Ok((StatusCode::ACCEPTED, Json(RunStarted { run_id })))
}

/// GET /runs/current
async fn current_run(State(service): State<BriefService>) -> Json<CurrentRun> {
    Json(CurrentRun {
        state: service.run_state(),
        run_id: service.current_run(),
    })
}

/// GET /runs/{run_id}/events
async fn run_events(
    State(service): State<BriefService>,
    Path(run_id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let from_seq = resume_point(query.from, &headers);
    let events = service.subscribe_progress(run_id, from_seq)?.map(|event| {
        Event::default()
            .event("progress")
            .id(event.seq.to_string())
            .json_data(&event)
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// GET /result
async fn last_result(State(service): State<BriefService>) -> ApiResult<Json<RunResult>> {
    service
        .get_last_result()?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no run has completed yet".to_string()))
}

/// POST /credential
async fn store_credential(
    State(service): State<BriefService>,
    Json(request): Json<CredentialRequest>,
) -> ApiResult<StatusCode> {
    match service.validate_and_store_credential(&request.secret).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(PipelineError::CredentialInvalid(msg)) => Err(ApiError::BadRequest(msg)),
        Err(e) => Err(e.into()),
    }
}

/// An explicit `from` wins; otherwise resume after `Last-Event-ID`.
fn resume_point(from: Option<u64>, headers: &HeaderMap) -> u64 {
    if let Some(from) = from {
        return from.max(1);
    }
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|last| last + 1)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn resume_point_prefers_query() {
        let mut headers = HeaderMap::new();
        headers.insert("last-event-id", HeaderValue::from_static("7"));
        assert_eq!(resume_point(Some(3), &headers), 3);
        assert_eq!(resume_point(None, &headers), 8);
        assert_eq!(resume_point(None, &HeaderMap::new()), 1);
        assert_eq!(resume_point(Some(0), &HeaderMap::new()), 1);
    }

    #[test]
    fn garbage_last_event_id_starts_over() {
        let mut headers = HeaderMap::new();
        headers.insert("last-event-id", HeaderValue::from_static("abc"));
        assert_eq!(resume_point(None, &headers), 1);
    }
}
