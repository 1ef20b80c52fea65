//! HTTP server module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts requests until shutdown. The split lets the binary
//! wire up the bus listener and any other collaborators between binding
//! and serving, with the shutdown controller shared across all of them.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use crossbar_core::DispatchEngine;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::config::ServerConfig;
use super::handlers::{
    health_handler, liveness_handler, oper_handler, readiness_handler, AppState,
};
use super::shutdown::ShutdownController;

/// Manages the HTTP transport lifecycle.
///
/// 1. `new()` allocates the shutdown controller and captures the engine
/// 2. `start()` binds the TCP listener to the configured address
/// 3. `serve()` accepts requests until the shutdown future resolves, then
///    drains in-flight requests up to the configured timeout
pub struct ServerModule {
    config: ServerConfig,
    engine: Arc<DispatchEngine>,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl ServerModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: ServerConfig, engine: Arc<DispatchEngine>) -> Self {
        Self {
            config,
            engine,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Shared handle to the shutdown controller, for collaborators that
    /// need lifecycle signals (the bus listener, tests).
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router.
    ///
    /// Routes:
    /// - `POST /oper/{name}` -- operation dispatch
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = AppState {
            engine: Arc::clone(&self.engine),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/oper/{name}", post(oper_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(self.config.max_body_bytes)),
            )
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 requested an OS-assigned port.
    ///
    /// # Errors
    ///
    /// Returns an error when the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains.
    ///
    /// Consumes `self` because the listener moves into the server.
    ///
    /// # Errors
    ///
    /// `start()` not called first, a fatal accept-loop I/O error, or
    /// unloadable TLS certificates.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let controller = self.shutdown;

        controller.set_ready();

        if let Some(ref tls) = self.config.tls {
            serve_tls(listener, router, tls, shutdown).await?;
        } else {
            info!("serving plain HTTP");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await?;
        }

        drain(&controller, self.config.drain_timeout()).await;
        Ok(())
    }
}

/// Serves TLS via `axum-server` rustls, reusing the pre-bound listener.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &super::config::TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!(%addr, "serving TLS");

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

/// Signals draining and waits for in-flight requests to finish.
async fn drain(controller: &ShutdownController, timeout: std::time::Duration) {
    controller.trigger_shutdown();
    if controller.wait_for_drain(timeout).await {
        info!("drain complete");
    } else {
        warn!(
            in_flight = controller.in_flight_count(),
            "drain timeout expired with requests outstanding"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crossbar_core::OperationRegistry;

    use super::*;
    use crate::demo;

    fn test_module() -> ServerModule {
        let registry = Arc::new(OperationRegistry::new());
        demo::register(&registry).expect("demo registration");
        let engine = Arc::new(DispatchEngine::new(registry));
        ServerModule::new(ServerConfig::default(), engine)
    }

    #[test]
    fn new_does_not_bind() {
        let module = test_module();
        assert!(module.listener.is_none());
    }

    #[test]
    fn shutdown_controller_is_shared() {
        let module = test_module();
        let a = module.shutdown_controller();
        let b = module.shutdown_controller();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn start_binds_an_os_assigned_port() {
        let mut module = test_module();
        let port = module.start().await.expect("bind");
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let module = test_module();
        let err = module
            .serve(std::future::pending::<()>())
            .await
            .expect_err("must require start()");
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn served_requests_roundtrip_over_tcp() {
        let mut module = test_module();
        let port = module.start().await.expect("bind");
        let controller = module.shutdown_controller();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = stop_rx.await;
        }));

        let client = reqwest::Client::new();
        let base = format!("http://127.0.0.1:{port}");

        let body: serde_json::Value = client
            .post(format!("{base}/oper/hello"))
            .body(r#"{"request":{"name":"Jan"}}"#)
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json body");
        assert_eq!(body["response"], "Hi Jan");

        let ready = client
            .get(format!("{base}/health/ready"))
            .send()
            .await
            .expect("probe");
        assert_eq!(ready.status(), reqwest::StatusCode::OK);

        let health: serde_json::Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .expect("health")
            .json()
            .await
            .expect("health json");
        assert_eq!(health["state"], "ready");

        stop_tx.send(()).expect("signal shutdown");
        server
            .await
            .expect("server task")
            .expect("serve returns cleanly");
        assert_eq!(
            controller.health_state(),
            crate::network::HealthState::Stopped
        );
    }

    #[tokio::test]
    async fn unknown_operation_is_http_200_with_error_envelope() {
        let mut module = test_module();
        let port = module.start().await.expect("bind");

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = stop_rx.await;
        }));

        let response = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/oper/bye"))
            .body(r#"{"request":{}}"#)
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.expect("json");
        assert_eq!(body["error"]["type"], "unknownOper");

        stop_tx.send(()).expect("signal shutdown");
        server.await.expect("server task").expect("clean exit");
    }
}
