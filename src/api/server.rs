//! API Server

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ApiConfig;
use crate::engine::FairnessEngine;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// Router with the full middleware stack
pub fn create_app(engine: Arc<FairnessEngine>, config: &ApiConfig) -> axum::Router {
    let state = Arc::new(AppState {
        engine,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    create_router(state)
        .layer(axum::middleware::from_fn(request_id_middleware))
        // CORS before timeout so preflight is answered
        .layer(create_cors_layer(config.allowed_origins.clone()))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

pub struct ApiServer {
    config: ApiConfig,
    engine: Arc<FairnessEngine>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, engine: Arc<FairnessEngine>) -> Self {
        Self { config, engine }
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.socket_addr()?;
        let app = create_app(self.engine.clone(), &self.config);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "Fairness API listening");
        self.log_server_info();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped");
        Ok(())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }

    fn log_server_info(&self) {
        let config = self.engine.config();
        info!(
            disclosure = ?config.seeds.disclosure,
            rounds_per_seed = config.seeds.rounds_per_seed,
            cors = ?self.config.allowed_origins,
            timeout_secs = self.config.request_timeout_secs,
            "Server configuration"
        );
        info!("   POST /rounds                  - Open a round (returns seed hash)");
        info!("   POST /rounds/:n/settle        - Compute and record the outcome");
        info!("   GET  /rounds/:n/verify        - Recompute and check a revealed round");
        info!("   POST /seeds/rotate            - Retire the active seed");
        info!("   POST /seeds/:id/reveal        - Disclose a retired seed");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
