use serde::Deserialize;

use crate::error::{ScoringError, ScoringResult};

/// Root application configuration. Loaded from an optional `appswap.toml`
/// and environment variables with the prefix `APPSWAP__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataConfig {
    /// JSON export of users, items, transactions and ratings.
    #[serde(default)]
    pub catalog_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersistenceConfig {
    /// Where the fitted snapshot is written after each successful retrain.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

/// Tunables of the scoring engine. The business constants (recent window,
/// elasticity, price floor) are kept here so operators can override them.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: i64,
    /// Assumed sales lift, in percent, per unit of relative price cut.
    #[serde(default = "default_elasticity_pct")]
    pub elasticity_pct: f64,
    #[serde(default = "default_min_price")]
    pub min_price: f64,
    #[serde(default = "default_price_min_items")]
    pub price_min_items: usize,
    #[serde(default = "default_validation_min_items")]
    pub validation_min_items: usize,
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f64,
    #[serde(default = "default_split_seed")]
    pub split_seed: u64,
    #[serde(default = "default_recommender_min_transactions")]
    pub recommender_min_transactions: usize,
    #[serde(default = "default_neighbours")]
    pub neighbours: usize,
    #[serde(default = "default_content_seeds")]
    pub content_seeds: usize,
    #[serde(default = "default_content_neighbours")]
    pub content_neighbours: usize,
    #[serde(default = "default_popular_pool")]
    pub popular_pool: usize,
    #[serde(default = "default_popularity_weight")]
    pub popularity_weight: f64,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_training_timeout_ms")]
    pub training_timeout_ms: u64,
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
}

// Default functions
fn default_node_id() -> String {
    "scoring-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8000
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_recent_window_days() -> i64 { 30 }
fn default_elasticity_pct() -> f64 { 30.0 }
fn default_min_price() -> f64 { 5.0 }
fn default_price_min_items() -> usize { 10 }
fn default_validation_min_items() -> usize { 20 }
fn default_validation_fraction() -> f64 { 0.2 }
fn default_split_seed() -> u64 { 42 }
fn default_recommender_min_transactions() -> usize { 10 }
fn default_neighbours() -> usize { 5 }
fn default_content_seeds() -> usize { 3 }
fn default_content_neighbours() -> usize { 5 }
fn default_popular_pool() -> usize { 10 }
fn default_popularity_weight() -> f64 { 0.5 }
fn default_top_k() -> usize { 6 }
fn default_max_top_k() -> usize { 50 }
fn default_training_timeout_ms() -> u64 { 30_000 }
fn default_search_timeout_ms() -> u64 { 2_000 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recent_window_days: default_recent_window_days(),
            elasticity_pct: default_elasticity_pct(),
            min_price: default_min_price(),
            price_min_items: default_price_min_items(),
            validation_min_items: default_validation_min_items(),
            validation_fraction: default_validation_fraction(),
            split_seed: default_split_seed(),
            recommender_min_transactions: default_recommender_min_transactions(),
            neighbours: default_neighbours(),
            content_seeds: default_content_seeds(),
            content_neighbours: default_content_neighbours(),
            popular_pool: default_popular_pool(),
            popularity_weight: default_popularity_weight(),
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            training_timeout_ms: default_training_timeout_ms(),
            search_timeout_ms: default_search_timeout_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            scoring: ScoringConfig::default(),
            data: DataConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl ScoringConfig {
    /// Reject settings that would make training or ranking meaningless.
    pub fn validate(&self) -> ScoringResult<()> {
        let invalid = |msg: &str| Err(ScoringError::Config(msg.to_string()));
        if self.recent_window_days <= 0 {
            return invalid("scoring.recent_window_days must be positive");
        }
        if self.min_price < 0.0 {
            return invalid("scoring.min_price must be non-negative");
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return invalid("scoring.validation_fraction must be in [0, 1)");
        }
        if self.price_min_items == 0 || self.recommender_min_transactions == 0 {
            return invalid("training minimums must be at least 1");
        }
        // A held-out split needs at least one training and one validation row.
        if self.validation_min_items < 2 {
            return invalid("scoring.validation_min_items must be at least 2");
        }
        if self.validation_min_items < self.price_min_items {
            return invalid("scoring.validation_min_items must not be below scoring.price_min_items");
        }
        if self.default_top_k > self.max_top_k {
            return invalid("scoring.default_top_k exceeds scoring.max_top_k");
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from an optional `appswap` config file and
    /// environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("appswap").required(false))
            .add_source(
                config::Environment::with_prefix("APPSWAP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config
            .scoring
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_business_constants() {
        let config = AppConfig::default();
        assert_eq!(config.scoring.recent_window_days, 30);
        assert_eq!(config.scoring.elasticity_pct, 30.0);
        assert_eq!(config.scoring.min_price, 5.0);
        assert_eq!(config.scoring.default_top_k, 6);
        assert!(config.persistence.snapshot_path.is_none());
        assert!(config.scoring.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fraction() {
        let scoring = ScoringConfig {
            validation_fraction: 1.5,
            ..Default::default()
        };
        assert!(scoring.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_degenerate_split() {
        let scoring = ScoringConfig {
            price_min_items: 1,
            validation_min_items: 1,
            ..Default::default()
        };
        let err = scoring.validate().unwrap_err();
        assert!(matches!(err, ScoringError::Config(_)));

        let scoring = ScoringConfig {
            price_min_items: 10,
            validation_min_items: 5,
            ..Default::default()
        };
        assert!(matches!(scoring.validate(), Err(ScoringError::Config(_))));
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"scoring": {"min_price": 9.5}}"#).unwrap();
        assert_eq!(config.scoring.min_price, 9.5);
        assert_eq!(config.scoring.neighbours, 5);
        assert_eq!(config.api.http_port, 8000);
    }
}
