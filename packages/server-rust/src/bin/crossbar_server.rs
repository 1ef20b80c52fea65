//! Crossbar server binary.
//!
//! Builds the operation registry, wires the dispatch engine into the HTTP
//! adapter and the bus listener, and serves until ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crossbar_core::{DispatchEngine, OperationRegistry};
use crossbar_server::network::{ServerConfig, ServerModule, TlsConfig};
use crossbar_server::{demo, Bus, BusListener};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "crossbar-server", about = "Crossbar operation-dispatch server")]
struct Cli {
    /// Service name; the bus listener answers subjects under "{name}.".
    #[arg(long, env = "CROSSBAR_SERVICE_NAME", default_value = "crossbar")]
    service_name: String,

    /// Bind address for the HTTP listener.
    #[arg(long, env = "CROSSBAR_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on; 0 picks an OS-assigned port.
    #[arg(long, env = "CROSSBAR_PORT", default_value_t = 8080)]
    port: u16,

    /// Path to a PEM certificate; enables TLS together with --tls-key.
    #[arg(long, env = "CROSSBAR_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// Path to the PEM private key for --tls-cert.
    #[arg(long, env = "CROSSBAR_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Maximum accepted request body size in bytes.
    #[arg(long, env = "CROSSBAR_MAX_BODY_BYTES", default_value_t = 1_048_576)]
    max_body_bytes: usize,

    /// Seconds to wait for in-flight requests on shutdown.
    #[arg(long, env = "CROSSBAR_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,

    /// Per-subject buffer capacity of the in-process bus.
    #[arg(long, env = "CROSSBAR_BUS_CAPACITY", default_value_t = 256)]
    bus_capacity: usize,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "CROSSBAR_JSON_LOGS")]
    json_logs: bool,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        let tls = match (self.tls_cert, self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path,
                key_path,
            }),
            _ => None,
        };
        ServerConfig {
            service_name: self.service_name,
            host: self.host,
            port: self.port,
            tls,
            max_body_bytes: self.max_body_bytes,
            drain_timeout_secs: self.drain_timeout_secs,
            bus_capacity: self.bus_capacity,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json_logs = cli.json_logs;
    init_tracing(json_logs);

    let config = cli.into_config();

    let registry = Arc::new(OperationRegistry::new());
    demo::register(&registry).context("operation registration failed")?;
    let engine = Arc::new(DispatchEngine::new(Arc::clone(&registry)));
    info!(
        service = %config.service_name,
        operations = registry.len(),
        "registry assembled"
    );

    let bus = Arc::new(Bus::new(config.bus_capacity));
    let mut module = ServerModule::new(config.clone(), Arc::clone(&engine));
    let port = module.start().await.context("failed to bind listener")?;
    info!(host = %config.host, port, "crossbar server up");

    let listener = BusListener::new(bus, engine, &config.service_name);
    tokio::spawn(listener.run(module.shutdown_controller().shutdown_receiver()));

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl-c received, shutting down");
        })
        .await
}
