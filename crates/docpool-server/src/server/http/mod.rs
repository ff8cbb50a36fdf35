//! HTTP front end for the render pool.
//!
//! ## Routes
//!
//! - `POST /documents/{document_id}/generate` - queue a document, answer
//!   `202 Accepted` right away.
//! - `GET /status` - pool status snapshot.
//! - `GET /health` - `200` while the pool runs, `503` otherwise.

pub mod error;
pub mod handler;

#[cfg(test)]
mod tests;

use axum::{
    Router,
    routing::{get, post},
};
use docpool::{RenderPool, Renderer};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// State shared by every handler.
pub struct AppState<R> {
    pub pool: RenderPool<R>,
    /// Ceiling for each per-request outcome monitor.
    pub monitor_timeout: Duration,
    /// Parent of every monitor token; cancelled on shutdown.
    pub monitors: CancellationToken,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            monitor_timeout: self.monitor_timeout,
            monitors: self.monitors.clone(),
        }
    }
}

impl<R: Renderer> AppState<R> {
    pub fn new(pool: RenderPool<R>, monitor_timeout: Duration) -> Self {
        Self {
            pool,
            monitor_timeout,
            monitors: CancellationToken::new(),
        }
    }

    /// Stops the pool, waiting at most `grace` for in-flight renders, then
    /// cancels whatever monitors are still waiting.
    ///
    /// Monitors stay attached while the pool drains so in-flight outcomes are
    /// still observed. Returns `false` if the pool did not stop in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let stopped = timeout(grace, self.pool.stop()).await.is_ok();
        self.monitors.cancel();
        stopped
    }
}

pub fn router<R: Renderer>(state: AppState<R>) -> Router {
    Router::new()
        .route(
            "/documents/{document_id}/generate",
            post(handler::generate::<R>),
        )
        .route("/status", get(handler::status::<R>))
        .route("/health", get(handler::health::<R>))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
