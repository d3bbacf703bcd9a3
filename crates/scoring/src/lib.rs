//! Scoring engine: feature building, price suggestion, hybrid
//! recommendations and the facade that serves them from an atomically
//! swapped model snapshot.

pub mod facade;
pub mod features;
pub mod linear;
pub mod persistence;
pub mod price;
pub mod recommender;
pub mod search;
pub mod similarity;

pub use facade::{ScoringFacade, Snapshot};
pub use features::{CategoryCodec, FeatureBuilder, FeatureSet, InteractionMatrix, ItemFeatures};
pub use persistence::{PersistedSnapshot, SnapshotStore};
pub use price::{LiveItemStats, PriceModel, PriceSuggester, PricingPolicy};
pub use recommender::{RecommendPolicy, Recommender, RecommenderModel};
pub use search::{KeywordSearch, SearchAssistant};
