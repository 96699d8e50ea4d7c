//! HTTP handler definitions for a service instance.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors by the built-in probe routes) and re-exports all handler
//! functions for convenient access when building routers.

pub mod health;
pub mod register;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use register::{register_handler, register_routes, REGISTER_PATH};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;

/// Shared state of the built-in probe routes.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Service name reported by the health endpoint.
    pub service: Arc<str>,
    /// Service version reported by the health endpoint.
    pub version: Arc<str>,
    /// Instance start time, used for uptime calculation.
    pub start_time: Instant,
}
