//! Status API server.
//!
//! A thin read-only JSON surface over the engine snapshot, the incident
//! store and the alert history. Handlers never mutate monitoring state.

mod handlers;

pub use handlers::*;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};

use crate::alert::AlertDispatcher;
use crate::db::Store;
use crate::scheduler::StatusSnapshot;

/// Shared state for the read-only handlers.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<RwLock<StatusSnapshot>>,
    pub store: Arc<Store>,
    pub dispatcher: Arc<Mutex<AlertDispatcher>>,
}

/// Status API server.
pub struct Server {
    port: u16,
    state: AppState,
}

impl Server {
    pub fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/health", get(handlers::handle_health))
            .route("/api/status", get(handlers::handle_status))
            .route("/api/incidents", get(handlers::handle_incidents))
            .route("/api/statistics", get(handlers::handle_statistics))
            .route("/api/alerts", get(handlers::handle_alerts))
            .route("/api/metrics/history", get(handlers::handle_metric_history))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Bind and serve until the process exits.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = self.routes();

        tracing::info!("status API listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
