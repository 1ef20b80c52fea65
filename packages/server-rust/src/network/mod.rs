//! HTTP transport: configuration, handlers, lifecycle, and shutdown control.

pub mod config;
pub mod handlers;
pub mod module;
pub mod shutdown;

pub use config::{ServerConfig, TlsConfig};
pub use handlers::AppState;
pub use module::ServerModule;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
