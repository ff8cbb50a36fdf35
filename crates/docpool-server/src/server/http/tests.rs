use super::{AppState, router};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use docpool::{DocumentId, PoolConfig, RenderContext, RenderError, RenderPool, Renderer};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tower::ServiceExt;

async fn instant(_ctx: RenderContext, _document_id: DocumentId) -> Result<(), RenderError> {
    Ok(())
}

/// Renders only once the test releases a permit.
struct Gated(Arc<Semaphore>);

impl Renderer for Gated {
    fn render(
        &self,
        _ctx: RenderContext,
        _document_id: DocumentId,
    ) -> impl Future<Output = Result<(), RenderError>> + Send {
        let gate = Arc::clone(&self.0);
        async move {
            let _permit = gate.acquire().await.map_err(|_| RenderError::Cancelled)?;
            Ok(())
        }
    }
}

fn app<R: Renderer>(pool: RenderPool<R>) -> (Router, AppState<R>) {
    let state = AppState::new(pool, Duration::from_secs(5));
    (router(state.clone()), state)
}

fn generate(document_id: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/documents/{document_id}/generate"))
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn generate_is_accepted_immediately() {
    let pool = RenderPool::new(PoolConfig::new(2, 8), instant);
    pool.start();
    let (app, state) = app(pool);

    let (status, body) = send(&app, generate("invoice-9", r#"{"submitter":"alice"}"#)).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["document_id"], "invoice-9");
    assert!(body["job_id"].as_u64().is_some());
    assert!(body["queue_size"].as_u64().is_some());

    assert!(state.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn generate_accepts_empty_body() {
    let pool = RenderPool::new(PoolConfig::new(1, 8), instant);
    pool.start();
    let (app, state) = app(pool);

    let (status, _) = send(&app, generate("report", "")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    assert!(state.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_body_is_bad_request() {
    let pool = RenderPool::new(PoolConfig::new(1, 8), instant);
    pool.start();
    let (app, state) = app(pool);

    let (status, body) = send(&app, generate("report", r#"{"submitter":"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    assert_eq!(state.pool.status().submitted_jobs, 0);

    assert!(state.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stopped_pool_is_service_unavailable() {
    let pool = RenderPool::new(PoolConfig::new(1, 8), instant);
    let (app, _state) = app(pool);

    let (status, body) = send(&app, generate("report", "")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Worker pool is stopped");

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saturated_pool_is_too_many_requests() {
    let gate = Arc::new(Semaphore::new(0));
    let pool = RenderPool::new(
        PoolConfig::new(1, 1).with_submit_timeout(Duration::from_millis(20)),
        Gated(Arc::clone(&gate)),
    );
    pool.start();
    let (app, state) = app(pool);

    let mut accepted = 0;
    let mut throttled = false;
    for i in 0..5 {
        let (status, _) = send(&app, generate(&format!("doc-{i}"), "")).await;
        match status {
            StatusCode::ACCEPTED => accepted += 1,
            StatusCode::TOO_MANY_REQUESTS => {
                throttled = true;
                break;
            }
            other => panic!("unexpected status {other}"),
        }
    }
    assert!(throttled);

    gate.add_permits(accepted);
    assert!(state.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn status_and_health_reflect_pool() {
    let pool = RenderPool::new(PoolConfig::new(3, 16), instant);
    pool.start();
    let (app, state) = app(pool);

    let (status, body) = send(&app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_running"], true);
    assert_eq!(body["total_workers"], 3);
    assert_eq!(body["queue_capacity"], 16);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    assert!(state.shutdown(Duration::from_secs(5)).await);

    let (status, body) = send(&app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_running"], false);
    assert_eq!(body["active_workers"], 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_keeps_monitors_until_in_flight_jobs_finish() {
    let gate = Arc::new(Semaphore::new(0));
    let pool = RenderPool::new(PoolConfig::new(1, 4), Gated(Arc::clone(&gate)));
    pool.start();
    let (app, state) = app(pool);

    let (status, _) = send(&app, generate("in-flight", "")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let in_flight = tokio::time::timeout(Duration::from_secs(5), async {
        while state.pool.active_jobs() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(in_flight.is_ok(), "job never reached a worker");

    let shutting_down = {
        let state = state.clone();
        tokio::spawn(async move { state.shutdown(Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    gate.add_permits(1);

    assert!(shutting_down.await.unwrap());
    assert_eq!(state.pool.completed_jobs(), 1);
    assert_eq!(state.pool.lost_results(), 0);
}
