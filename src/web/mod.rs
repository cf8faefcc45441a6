//! HTTP surface: routing and views around the engine client and the log
//! stream adapter.

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::DashboardConfig;
use crate::engine::Engine;

mod auth;
mod error;
mod handlers;
mod metrics;
mod views;

use metrics::RequestMetrics;
use views::Views;

/// State shared across axum handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<dyn Engine>,
    views: Arc<Views>,
    config: Arc<DashboardConfig>,
    metrics: Arc<RequestMetrics>,
}

impl AppState {
    pub fn new(
        engine: Arc<dyn Engine>,
        config: DashboardConfig,
    ) -> Result<Self, minijinja::Error> {
        Ok(Self {
            engine,
            views: Arc::new(Views::new()?),
            config: Arc::new(config),
            metrics: Arc::new(RequestMetrics::default()),
        })
    }

    fn grafana_url(&self) -> Option<&str> {
        self.config.grafana_url.as_ref().map(url::Url::as_str)
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(handlers::index))
        .route("/partials/rows", get(handlers::rows_partial))
        .route("/containers/{id}", get(handlers::container_detail))
        .route("/containers/{id}/{action}", post(handlers::container_action))
        .route("/logs/{id}", get(handlers::logs_page))
        .route("/logs/stream/{id}", get(handlers::logs_stream))
        .route("/logs/raw/{id}", get(handlers::logs_raw))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    let public = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(metrics::metrics))
        .route("/static/{file}", get(handlers::static_asset));

    protected
        .merge(public)
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics::track,
        ))
        .with_state(state)
}

/// Serve the dashboard on `listener` until the process is stopped.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
