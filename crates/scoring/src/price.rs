//! Price suggester: regresses a suggested list price from sales, rating and
//! competitor signals, then explains the suggestion with a priority chain of
//! business rules.

use crate::features::{CategoryCodec, FeatureSet, ItemFeatures, NEUTRAL_RATING};
use crate::linear::{mean_absolute_error, r2_score, LinearModel};
use appswap_core::config::ScoringConfig;
use appswap_core::types::{ItemId, PriceModelMetrics, PriceReason, PriceStats, PriceSuggestion};
use appswap_core::{ScoringError, ScoringResult};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

/// `[category_code, total_sales, recent_sales, avg_rating, competitor_avg_price]`
pub const PRICE_FEATURES: usize = 5;

/// Average rating at or above which a premium price is justified.
pub const PREMIUM_RATING: f64 = 4.5;

/// Recent sales above which demand alone explains the suggestion.
pub const STRONG_DEMAND_SALES: u64 = 5;

const MIN_CONFIDENCE: f64 = 0.5;

/// Training and query knobs, derived from [`ScoringConfig`].
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    pub min_price: f64,
    pub elasticity_pct: f64,
    pub min_items: usize,
    pub validation_min_items: usize,
    pub validation_fraction: f64,
    pub split_seed: u64,
    pub recent_window_days: i64,
}

impl From<&ScoringConfig> for PricingPolicy {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            min_price: config.min_price,
            elasticity_pct: config.elasticity_pct,
            min_items: config.price_min_items,
            validation_min_items: config.validation_min_items,
            validation_fraction: config.validation_fraction,
            split_seed: config.split_seed,
            recent_window_days: config.recent_window_days,
        }
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self::from(&ScoringConfig::default())
    }
}

/// Live statistics of one item, gathered at query time.
#[derive(Debug, Clone)]
pub struct LiveItemStats {
    pub item_id: ItemId,
    pub category: String,
    pub current_price: f64,
    pub total_sales: u64,
    pub recent_sales: u64,
    pub avg_rating: Option<f64>,
    /// `None` when the item is the only member of its category.
    pub competitor_avg_price: Option<f64>,
}

impl LiveItemStats {
    fn avg_rating(&self) -> f64 {
        self.avg_rating.unwrap_or(NEUTRAL_RATING)
    }

    fn competitor_avg(&self) -> f64 {
        self.competitor_avg_price.unwrap_or(self.current_price)
    }
}

impl From<&ItemFeatures> for LiveItemStats {
    fn from(features: &ItemFeatures) -> Self {
        Self {
            item_id: features.item_id,
            category: features.category.clone(),
            current_price: features.price,
            total_sales: features.popularity,
            recent_sales: features.recent_popularity,
            avg_rating: Some(features.avg_rating),
            competitor_avg_price: Some(features.competitor_avg_price),
        }
    }
}

pub struct PriceSuggester {
    policy: PricingPolicy,
}

impl PriceSuggester {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn fit(&self, features: &FeatureSet) -> ScoringResult<PriceModel> {
        let n = features.items.len();
        if n < self.policy.min_items {
            return Err(ScoringError::InsufficientData {
                component: "price model",
                required: self.policy.min_items,
                found: n,
            });
        }

        let mut x = Array2::<f64>::zeros((n, PRICE_FEATURES));
        let mut y = Array1::<f64>::zeros(n);
        for (i, item) in features.items.iter().enumerate() {
            let row = feature_row(
                item.category_code,
                item.popularity,
                item.recent_popularity,
                item.avg_rating,
                item.competitor_avg_price,
            );
            for (j, value) in row.iter().enumerate() {
                x[[i, j]] = *value;
            }
            y[i] = item.price;
        }

        let (train_idx, validation_idx, on_training_set) = self.split(n);
        let x_train = x.select(ndarray::Axis(0), &train_idx);
        let y_train = y.select(ndarray::Axis(0), &train_idx);
        let x_val = x.select(ndarray::Axis(0), &validation_idx);
        let y_val = y.select(ndarray::Axis(0), &validation_idx);

        let model = LinearModel::fit(&x_train, &y_train);
        let predicted = model.predict(&x_val);
        let metrics = PriceModelMetrics {
            mae: mean_absolute_error(&y_val, &predicted),
            r2: r2_score(&y_val, &predicted),
            train_rows: train_idx.len(),
            validation_rows: validation_idx.len(),
            validated_on_training_set: on_training_set,
        };

        info!(
            mae = metrics.mae,
            r2 = metrics.r2,
            train_rows = metrics.train_rows,
            validation_rows = metrics.validation_rows,
            optimistic = on_training_set,
            "Price model trained"
        );

        Ok(PriceModel {
            model,
            codec: features.codec.clone(),
            metrics,
            item_ids: features.items.iter().map(|item| item.item_id).collect(),
            trained_at: features.built_at,
        })
    }

    /// Deterministic shuffle split. Small catalogs train and validate on
    /// every row.
    fn split(&self, n: usize) -> (Vec<usize>, Vec<usize>, bool) {
        let all: Vec<usize> = (0..n).collect();
        if n < self.policy.validation_min_items.max(2) {
            return (all.clone(), all, true);
        }
        let mut shuffled = all;
        let mut rng = StdRng::seed_from_u64(self.policy.split_seed);
        shuffled.shuffle(&mut rng);
        let validation_len = ((n as f64) * self.policy.validation_fraction).ceil() as usize;
        let validation_len = validation_len.clamp(1, n - 1);
        let validation = shuffled[..validation_len].to_vec();
        let train = shuffled[validation_len..].to_vec();
        (train, validation, false)
    }
}

fn feature_row(
    category_code: usize,
    total_sales: u64,
    recent_sales: u64,
    avg_rating: f64,
    competitor_avg_price: f64,
) -> [f64; PRICE_FEATURES] {
    [
        category_code as f64,
        total_sales as f64,
        recent_sales as f64,
        avg_rating,
        competitor_avg_price,
    ]
}

/// A fitted price regression plus the codec it was trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceModel {
    model: LinearModel,
    codec: CategoryCodec,
    metrics: PriceModelMetrics,
    item_ids: Vec<ItemId>,
    trained_at: DateTime<Utc>,
}

impl PriceModel {
    pub fn metrics(&self) -> &PriceModelMetrics {
        &self.metrics
    }

    pub fn codec(&self) -> &CategoryCodec {
        &self.codec
    }

    pub fn coefficients(&self) -> (&[f64], f64) {
        (&self.model.coefficients, self.model.intercept)
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn suggest(
        &self,
        live: &LiveItemStats,
        policy: &PricingPolicy,
    ) -> ScoringResult<PriceSuggestion> {
        let category_code = self.codec.encode(&live.category)?;
        let avg_rating = live.avg_rating();
        let competitor_avg = live.competitor_avg();
        let row = feature_row(
            category_code,
            live.total_sales,
            live.recent_sales,
            avg_rating,
            competitor_avg,
        );

        let raw = self.model.predict_row(&row);
        let suggested = if raw.is_finite() {
            raw.max(policy.min_price)
        } else {
            policy.min_price
        };
        let current = live.current_price;

        let confidence = if current > 0.0 {
            (1.0 - (suggested - current).abs() / current).clamp(MIN_CONFIDENCE, 1.0)
        } else {
            MIN_CONFIDENCE
        };

        let impact = impact_text(current, suggested, policy.elasticity_pct);
        let reason_kind = select_reason(avg_rating, live.recent_sales, suggested, competitor_avg);
        let reason = reason_text(
            reason_kind,
            avg_rating,
            live.recent_sales,
            competitor_avg,
            policy.recent_window_days,
        );

        Ok(PriceSuggestion {
            item_id: live.item_id,
            current_price: round_to(current, 2),
            suggested_price: round_to(suggested, 2),
            confidence: round_to(confidence, 2),
            impact,
            reason,
            reason_kind,
            stats: PriceStats {
                total_sales: live.total_sales,
                recent_sales: live.recent_sales,
                avg_rating: round_to(avg_rating, 1),
                competitor_avg: round_to(competitor_avg, 2),
            },
        })
    }
}

fn impact_text(current: f64, suggested: f64, elasticity_pct: f64) -> String {
    if current <= 0.0 {
        return "First price point for this app".to_string();
    }
    let current_cents = (current * 100.0).round();
    let suggested_cents = (suggested * 100.0).round();
    if suggested_cents > current_cents {
        format!("+{:.0}% potential revenue", (suggested / current - 1.0) * 100.0)
    } else if suggested_cents < current_cents {
        format!(
            "+{:.0}% estimated sales",
            (current / suggested - 1.0) * elasticity_pct
        )
    } else {
        "Current price is optimal".to_string()
    }
}

/// First matching rule wins.
fn select_reason(
    avg_rating: f64,
    recent_sales: u64,
    suggested: f64,
    competitor_avg: f64,
) -> PriceReason {
    if avg_rating >= PREMIUM_RATING {
        PriceReason::HighRating
    } else if recent_sales > STRONG_DEMAND_SALES {
        PriceReason::RecentDemand
    } else if suggested < competitor_avg {
        PriceReason::CompetitivePricing
    } else {
        PriceReason::MarketAnalysis
    }
}

fn reason_text(
    kind: PriceReason,
    avg_rating: f64,
    recent_sales: u64,
    competitor_avg: f64,
    window_days: i64,
) -> String {
    match kind {
        PriceReason::HighRating => {
            format!("High rating ({avg_rating:.1}★) justifies a premium price")
        }
        PriceReason::RecentDemand => {
            format!("Strong recent demand ({recent_sales} sales in the last {window_days} days)")
        }
        PriceReason::CompetitivePricing => {
            format!("Competitive pricing (competitors average ${competitor_avg:.2})")
        }
        PriceReason::MarketAnalysis => "Based on market and demand analysis".to_string(),
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
