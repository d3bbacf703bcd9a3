use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type ItemId = i64;
pub type UserId = i64;

/// A catalog listing (an app) available for purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: f64,
    pub owner_id: UserId,
}

/// A confirmed purchase linking a buyer to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    pub item_id: ItemId,
    pub buyer_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A 1-5 review score left by a buyer for a purchased item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Rating {
    pub item_id: ItemId,
    pub author_id: UserId,
    pub score: u8,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub const MIN_SCORE: f64 = 1.0;
    pub const MAX_SCORE: f64 = 5.0;

    /// Score forced into the 1-5 scale. Training and live queries both
    /// read ratings through this.
    pub fn clamped_score(&self) -> f64 {
        (self.score as f64).clamp(Self::MIN_SCORE, Self::MAX_SCORE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Buyer,
    Developer,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
}

/// Full export of the marketplace tables the scoring engine reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDump {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
}

// ─── Price suggestion ───────────────────────────────────────────────────────

/// Which rule of the reason priority chain fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriceReason {
    HighRating,
    RecentDemand,
    CompetitivePricing,
    MarketAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceStats {
    pub total_sales: u64,
    pub recent_sales: u64,
    pub avg_rating: f64,
    pub competitor_avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceSuggestion {
    pub item_id: ItemId,
    pub current_price: f64,
    pub suggested_price: f64,
    pub confidence: f64,
    pub impact: String,
    pub reason: String,
    pub reason_kind: PriceReason,
    pub stats: PriceStats,
}

// ─── Recommendations ────────────────────────────────────────────────────────

/// Candidate generator that contributed to a recommendation, in priority
/// order (collaborative wins when several contributed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    Collaborative,
    Content,
    Popular,
    TopRated,
}

impl RecommendationReason {
    pub fn text(&self) -> &'static str {
        match self {
            RecommendationReason::Collaborative => "Users similar to you bought this app",
            RecommendationReason::Content => "Similar to apps you liked",
            RecommendationReason::Popular => "Popular among all users",
            RecommendationReason::TopRated => "Highly rated by the community",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RankedItem {
    pub item_id: ItemId,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub score: f64,
    pub reason: RecommendationReason,
    pub reason_text: String,
}

// ─── Training / status ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceModelMetrics {
    pub mae: f64,
    pub r2: f64,
    pub train_rows: usize,
    pub validation_rows: usize,
    /// Set when the catalog was too small to hold out a validation split,
    /// so the metrics are computed on the training rows and are optimistic.
    pub validated_on_training_set: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelTrainingStatus {
    Trained { detail: String },
    /// Not enough data; the previously fitted model (if any) stays in service.
    Skipped { reason: String, kept_previous: bool },
}

impl ModelTrainingStatus {
    pub fn is_trained(&self) -> bool {
        matches!(self, ModelTrainingStatus::Trained { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TrainingReport {
    pub price_model: ModelTrainingStatus,
    pub recommender: ModelTrainingStatus,
    #[schema(nullable)]
    pub price_metrics: Option<PriceModelMetrics>,
    pub items: usize,
    pub transactions: usize,
    pub ratings: usize,
    pub duration_ms: u64,
    pub persisted: bool,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Empty,
    Trained,
    Restored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScoringStatus {
    pub price_model_trained: bool,
    pub recommender_trained: bool,
    pub possibly_stale: bool,
    pub origin: SnapshotOrigin,
    #[schema(nullable)]
    pub trained_at: Option<DateTime<Utc>>,
}

impl ScoringStatus {
    pub fn any_trained(&self) -> bool {
        self.price_model_trained || self.recommender_trained
    }
}
