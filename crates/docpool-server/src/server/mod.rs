//! Server-side building blocks for the `docpool-server` binary.
//!
//! ## Structure
//!
//! - [`config`] - CLI/environment configuration.
//! - [`http`] - axum router, handlers and error mapping.
//! - [`render`] - filesystem-backed renderer.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod config;
pub mod http;
pub mod render;
pub mod telemetry;
