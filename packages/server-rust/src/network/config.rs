//! Server configuration for the crossbar transports.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration shared by the HTTP adapter and the bus listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Service name; the bus listener subscribes to `"{service_name}.>"`.
    pub service_name: String,
    /// Bind address for the HTTP listener.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// How long to wait for in-flight requests on shutdown, in seconds.
    pub drain_timeout_secs: u64,
    /// Per-subject broadcast channel capacity of the in-process bus.
    pub bus_capacity: usize,
}

impl ServerConfig {
    /// Drain timeout as a [`Duration`].
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_name: "crossbar".to_string(),
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            max_body_bytes: 1_048_576, // 1 MB
            drain_timeout_secs: 30,
            bus_capacity: 256,
        }
    }
}

/// TLS certificate configuration.
///
/// No `Default` impl because certificate paths have no sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to the PEM certificate file.
    pub cert_path: PathBuf,
    /// Path to the PEM private key file.
    pub key_path: PathBuf,
}
