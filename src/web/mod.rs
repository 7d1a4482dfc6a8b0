//! Web server module.

mod handlers;

pub use handlers::*;

use crate::aggregate::Aggregator;
use crate::config::ServerConfig;
use crate::db::Store;
use crate::monitor::Monitor;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub monitor: Arc<Monitor<Store>>,
    pub aggregator: Arc<Aggregator<Store>>,
}

/// Web server for StatusWatch.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, monitor: Arc<Monitor<Store>>) -> Self {
        let aggregator = Arc::new(Aggregator::new(store.clone()));
        Self {
            state: AppState {
                config,
                store,
                monitor,
                aggregator,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        routes(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

pub fn routes(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/systems_list/", get(handlers::handle_systems_list))
        .route("/system_status/", get(handlers::handle_system_status))
        .route("/system_history/", get(handlers::handle_system_history))
        .route("/dashboard_summary/", get(handlers::handle_dashboard_summary))
        .route("/uptime_by_hour/", get(handlers::handle_uptime_by_hour))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
