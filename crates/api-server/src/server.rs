//! API server: HTTP routes for the scoring engine plus the Prometheus
//! exporter on its own port.

use crate::rest::{self, AppState};
use crate::scoring_rest;
use crate::swagger::ApiDoc;
use appswap_core::config::AppConfig;
use appswap_scoring::ScoringFacade;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Assemble every route over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Scoring endpoints
        .route(
            "/ml/price-suggestion/:item_id",
            post(scoring_rest::handle_price_suggestion),
        )
        .route(
            "/ml/recommendations/:user_id",
            get(scoring_rest::handle_recommendations),
        )
        .route("/ml/retrain", post(scoring_rest::handle_retrain))
        .route("/ml/status", get(scoring_rest::handle_status))
        .route("/search", post(scoring_rest::handle_search))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    facade: Arc<ScoringFacade>,
}

impl ApiServer {
    pub fn new(config: AppConfig, facade: Arc<ScoringFacade>) -> Self {
        Self { config, facade }
    }

    /// Start the HTTP REST server. Runs until the listener fails.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState {
            facade: self.facade.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };
        let app = build_router(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics exporter on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics exporter disabled");
            return Ok(());
        }
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
