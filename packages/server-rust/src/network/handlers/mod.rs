//! HTTP handler definitions for the crossbar server.
//!
//! Defines `AppState` (the shared state carried through axum extractors)
//! and re-exports the handler functions used when building the router.

pub mod health;
pub mod oper;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use oper::oper_handler;

use std::sync::Arc;
use std::time::Instant;

use crossbar_core::DispatchEngine;

use super::{ServerConfig, ShutdownController};

/// Shared application state passed to all axum handlers via `State`.
///
/// Holds `Arc` references so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The transport-agnostic dispatch engine; all operation traffic goes
    /// through it.
    pub engine: Arc<DispatchEngine>,
    /// Graceful shutdown controller with lifecycle state and in-flight
    /// tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Process start time, used for uptime reporting.
    pub start_time: Instant,
}
