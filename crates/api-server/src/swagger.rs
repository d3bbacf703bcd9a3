//! OpenAPI specification served alongside Swagger UI.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AppSwap Scoring API",
        version = "0.1.0",
        description = "Price suggestions, personalized recommendations and catalog search for the AppSwap marketplace.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Pricing", description = "Regression-based price suggestions"),
        (name = "Recommendations", description = "Hybrid collaborative, content and popularity ranking"),
        (name = "Training", description = "Model retraining and status"),
        (name = "Search", description = "Free-text catalog search"),
        (name = "Operations", description = "Health, readiness, and liveness probes"),
    ),
    paths(
        crate::scoring_rest::handle_price_suggestion,
        crate::scoring_rest::handle_recommendations,
        crate::scoring_rest::handle_retrain,
        crate::scoring_rest::handle_status,
        crate::scoring_rest::handle_search,
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        // Engine types
        appswap_core::types::Item,
        appswap_core::types::PriceSuggestion,
        appswap_core::types::PriceReason,
        appswap_core::types::PriceStats,
        appswap_core::types::RankedItem,
        appswap_core::types::RecommendationReason,
        appswap_core::types::TrainingReport,
        appswap_core::types::ModelTrainingStatus,
        appswap_core::types::PriceModelMetrics,
        appswap_core::types::ScoringStatus,
        appswap_core::types::SnapshotOrigin,
        // Request/response envelopes
        crate::scoring_rest::RecommendationResponse,
        crate::scoring_rest::SearchRequest,
        crate::scoring_rest::SearchResponse,
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
    ))
)]
pub struct ApiDoc;
