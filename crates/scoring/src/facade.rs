//! Scoring facade: owns the current model snapshot and answers every
//! price, recommendation, status and search query against it.
//!
//! The snapshot is immutable and swapped whole. A query clones the `Arc`
//! under a short read lock and works on that snapshot for its whole
//! lifetime, so a concurrent retrain can never hand it a new price model
//! next to an old recommender.

use crate::features::FeatureBuilder;
use crate::persistence::{PersistedSnapshot, SnapshotStore, FORMAT_VERSION};
use crate::price::{LiveItemStats, PriceModel, PriceSuggester, PricingPolicy};
use crate::recommender::{RecommendPolicy, Recommender, RecommenderModel};
use crate::search::{KeywordSearch, SearchAssistant};
use appswap_core::config::ScoringConfig;
use appswap_core::types::{
    Item, ItemId, ModelTrainingStatus, PriceSuggestion, RankedItem, ScoringStatus,
    SnapshotOrigin, TrainingReport, UserId,
};
use appswap_core::{ScoringError, ScoringResult, TransactionRepository};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Both fitted models, published together.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub price: Option<Arc<PriceModel>>,
    pub recommender: Option<Arc<RecommenderModel>>,
    pub trained_at: Option<DateTime<Utc>>,
    pub origin: SnapshotOrigin,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            price: None,
            recommender: None,
            trained_at: None,
            origin: SnapshotOrigin::Empty,
        }
    }
}

/// Output of the CPU-bound part of a training pass.
struct FittedModels {
    price: ScoringResult<PriceModel>,
    recommender: ScoringResult<RecommenderModel>,
    built_at: DateTime<Utc>,
}

pub struct ScoringFacade {
    repo: Arc<dyn TransactionRepository>,
    config: ScoringConfig,
    pricing: PricingPolicy,
    recommend_policy: RecommendPolicy,
    snapshot: RwLock<Arc<Snapshot>>,
    train_guard: tokio::sync::Mutex<()>,
    store: Option<SnapshotStore>,
    search: Arc<dyn SearchAssistant>,
}

impl ScoringFacade {
    pub fn new(repo: Arc<dyn TransactionRepository>, config: ScoringConfig) -> Self {
        Self {
            repo,
            pricing: PricingPolicy::from(&config),
            recommend_policy: RecommendPolicy::from(&config),
            config,
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
            train_guard: tokio::sync::Mutex::new(()),
            store: None,
            search: Arc::new(KeywordSearch::default()),
        }
    }

    pub fn with_snapshot_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_search_assistant(mut self, assistant: Arc<dyn SearchAssistant>) -> Self {
        self.search = assistant;
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// The snapshot currently in service.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Refit both models from a fresh repository read and publish them as
    /// one snapshot. Concurrent calls run one after another.
    pub async fn train_all(&self) -> ScoringResult<TrainingReport> {
        let _guard = self.train_guard.lock().await;
        let started = Instant::now();
        metrics::counter!("scoring.train.runs").increment(1);

        let timeout_ms = self.config.training_timeout_ms;
        let pass = tokio::time::timeout(Duration::from_millis(timeout_ms), self.fetch_and_fit());
        let (fitted, items, transactions, ratings) = match pass.await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout_ms, "Training pass timed out, keeping current snapshot");
                metrics::counter!("scoring.train.timeouts").increment(1);
                return Err(ScoringError::TrainingTimedOut(timeout_ms));
            }
        };

        let previous = self.snapshot();
        let (price, price_status) = match fitted.price {
            Ok(model) => {
                let fit = model.metrics();
                let detail = format!(
                    "{} training rows, MAE {:.2}, R² {:.3}",
                    fit.train_rows, fit.mae, fit.r2
                );
                (Some(Arc::new(model)), ModelTrainingStatus::Trained { detail })
            }
            Err(e) if e.is_insufficient_data() => skipped(previous.price.clone(), &e),
            Err(e) => return Err(e),
        };
        let (recommender, recommender_status) = match fitted.recommender {
            Ok(model) => {
                let detail = format!("{} items, {} transactions", model.items().len(), transactions);
                (Some(Arc::new(model)), ModelTrainingStatus::Trained { detail })
            }
            Err(e) if e.is_insufficient_data() => skipped(previous.recommender.clone(), &e),
            Err(e) => return Err(e),
        };
        let price_metrics = price_status
            .is_trained()
            .then(|| price.as_ref().map(|m| m.metrics().clone()))
            .flatten();

        let any_trained = price_status.is_trained() || recommender_status.is_trained();
        let mut persisted = false;
        if any_trained {
            let next = Snapshot {
                price,
                recommender,
                trained_at: Some(fitted.built_at),
                origin: SnapshotOrigin::Trained,
            };
            persisted = self.persist(&next).await;
            *self.snapshot.write() = Arc::new(next);
        } else {
            info!("No model trained, current snapshot left in service");
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("scoring.train.duration_ms").record(duration_ms as f64);
        info!(
            price_trained = price_status.is_trained(),
            recommender_trained = recommender_status.is_trained(),
            items,
            transactions,
            ratings,
            duration_ms,
            persisted,
            "Training pass complete"
        );

        Ok(TrainingReport {
            price_model: price_status,
            recommender: recommender_status,
            price_metrics,
            items,
            transactions,
            ratings,
            duration_ms,
            persisted,
            trained_at: fitted.built_at,
        })
    }

    async fn fetch_and_fit(&self) -> ScoringResult<(FittedModels, usize, usize, usize)> {
        let items = self.repo.list_items().await.map_err(ScoringError::Repository)?;
        let transactions = self
            .repo
            .list_confirmed_transactions(None)
            .await
            .map_err(ScoringError::Repository)?;
        let ratings = self.repo.list_ratings().await.map_err(ScoringError::Repository)?;
        let counts = (items.len(), transactions.len(), ratings.len());
        debug!(
            items = counts.0,
            transactions = counts.1,
            ratings = counts.2,
            "Training data fetched"
        );

        let recent_window_days = self.config.recent_window_days;
        let pricing = self.pricing.clone();
        let recommend_policy = self.recommend_policy.clone();
        let fitted = tokio::task::spawn_blocking(move || {
            let now = Utc::now();
            match FeatureBuilder::new(recent_window_days).build(&items, &transactions, &ratings, now) {
                Ok(features) => FittedModels {
                    price: PriceSuggester::new(pricing).fit(&features),
                    recommender: Recommender::new(recommend_policy).fit(&features),
                    built_at: now,
                },
                Err(e) => FittedModels {
                    price: Err(clone_data_error(&e)),
                    recommender: Err(e),
                    built_at: now,
                },
            }
        })
        .await
        .map_err(|e| ScoringError::Internal(format!("training task failed: {e}")))?;

        Ok((fitted, counts.0, counts.1, counts.2))
    }

    /// Best effort; a failed write is logged and reported, the new snapshot
    /// still goes into service.
    async fn persist(&self, snapshot: &Snapshot) -> bool {
        let Some(store) = self.store.clone() else {
            return false;
        };
        let Some(trained_at) = snapshot.trained_at else {
            return false;
        };
        let document = PersistedSnapshot {
            format_version: FORMAT_VERSION,
            trained_at,
            price: snapshot.price.as_deref().cloned(),
            recommender: snapshot.recommender.as_deref().cloned(),
        };
        match tokio::task::spawn_blocking(move || store.save(&document)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to persist model snapshot");
                false
            }
            Err(e) => {
                error!(error = %e, "Snapshot persistence task failed");
                false
            }
        }
    }

    /// Load the persisted snapshot, if any. Returns whether a model was
    /// restored; an unreadable file is logged and ignored.
    pub fn restore(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.load() {
            Ok(Some(persisted)) if persisted.price.is_some() || persisted.recommender.is_some() => {
                let snapshot = Snapshot {
                    price: persisted.price.map(Arc::new),
                    recommender: persisted.recommender.map(Arc::new),
                    trained_at: Some(persisted.trained_at),
                    origin: SnapshotOrigin::Restored,
                };
                info!(
                    path = %store.path().display(),
                    trained_at = %persisted.trained_at,
                    price = snapshot.price.is_some(),
                    recommender = snapshot.recommender.is_some(),
                    "Model snapshot restored"
                );
                *self.snapshot.write() = Arc::new(snapshot);
                true
            }
            Ok(_) => {
                info!(path = %store.path().display(), "No persisted snapshot, starting untrained");
                false
            }
            Err(e) => {
                error!(path = %store.path().display(), error = %e, "Persisted snapshot unreadable, starting untrained");
                false
            }
        }
    }

    pub async fn suggest_price(&self, item_id: ItemId) -> ScoringResult<PriceSuggestion> {
        metrics::counter!("scoring.price.queries").increment(1);
        let snapshot = self.snapshot();
        let model = snapshot
            .price
            .clone()
            .ok_or(ScoringError::NotTrained("price model"))?;

        let item = self
            .repo
            .get_item(item_id)
            .await
            .map_err(ScoringError::Repository)?
            .ok_or(ScoringError::ItemNotFound(item_id))?;

        let since = Utc::now() - chrono::Duration::days(self.config.recent_window_days);
        let (total_sales, recent_sales, avg_rating, competitor_avg_price) = tokio::try_join!(
            self.repo.count_confirmed(item_id, None),
            self.repo.count_confirmed(item_id, Some(since)),
            self.repo.average_rating(item_id),
            self.repo.average_price(&item.category, item_id),
        )
        .map_err(ScoringError::Repository)?;

        let live = LiveItemStats {
            item_id,
            category: item.category,
            current_price: item.price,
            total_sales,
            recent_sales,
            avg_rating,
            competitor_avg_price,
        };
        let suggestion = model.suggest(&live, &self.pricing)?;
        debug!(
            item_id,
            current = suggestion.current_price,
            suggested = suggestion.suggested_price,
            "Price suggested"
        );
        Ok(suggestion)
    }

    /// Up to `top_k` (capped at the configured maximum) unpurchased items.
    pub async fn recommend(&self, user_id: UserId, top_k: usize) -> ScoringResult<Vec<RankedItem>> {
        metrics::counter!("scoring.recommend.queries").increment(1);
        let snapshot = self.snapshot();
        let model = snapshot
            .recommender
            .clone()
            .ok_or(ScoringError::NotTrained("recommender"))?;

        if !self
            .repo
            .user_exists(user_id)
            .await
            .map_err(ScoringError::Repository)?
        {
            return Err(ScoringError::UserNotFound(user_id));
        }
        let history = self
            .repo
            .buyer_transactions(user_id)
            .await
            .map_err(ScoringError::Repository)?;

        let top_k = top_k.min(self.config.max_top_k);
        let recommendations = model.recommend(user_id, &history, top_k, &self.recommend_policy);
        debug!(user_id, top_k, returned = recommendations.len(), "Recommendations generated");
        Ok(recommendations)
    }

    pub async fn status(&self) -> ScoringStatus {
        let snapshot = self.snapshot();
        let possibly_stale = match snapshot.origin {
            SnapshotOrigin::Restored => self.catalog_drifted(&snapshot).await,
            SnapshotOrigin::Empty | SnapshotOrigin::Trained => false,
        };
        ScoringStatus {
            price_model_trained: snapshot.price.is_some(),
            recommender_trained: snapshot.recommender.is_some(),
            possibly_stale,
            origin: snapshot.origin,
            trained_at: snapshot.trained_at,
        }
    }

    /// True when the live catalog no longer matches the items a restored
    /// snapshot was trained on, or when the catalog cannot be read.
    async fn catalog_drifted(&self, snapshot: &Snapshot) -> bool {
        let live: BTreeSet<ItemId> = match self.repo.list_items().await {
            Ok(items) => items.iter().map(|item| item.id).collect(),
            Err(e) => {
                warn!(error = %e, "Cannot read catalog to check snapshot freshness");
                return true;
            }
        };
        let price_drift = snapshot
            .price
            .as_ref()
            .is_some_and(|m| m.item_ids().iter().copied().collect::<BTreeSet<_>>() != live);
        let recommender_drift = snapshot.recommender.as_ref().is_some_and(|m| {
            m.items().iter().map(|f| f.item_id).collect::<BTreeSet<_>>() != live
        });
        price_drift || recommender_drift
    }

    /// Catalog items matching `query`, best first. Assistant failures and
    /// timeouts degrade to an empty result.
    pub async fn search(&self, query: &str) -> ScoringResult<Vec<Item>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScoringError::InvalidQuery("query must not be empty".to_string()));
        }
        let catalog = self.repo.list_items().await.map_err(ScoringError::Repository)?;
        if catalog.is_empty() {
            return Ok(Vec::new());
        }

        let timeout_ms = self.config.search_timeout_ms;
        let ids = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.search.search(query, &catalog),
        )
        .await
        {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                warn!(error = %e, "Search assistant failed");
                return Ok(Vec::new());
            }
            Err(_) => {
                warn!(timeout_ms, "Search assistant timed out");
                return Ok(Vec::new());
            }
        };

        let mut by_id: HashMap<ItemId, Item> =
            catalog.into_iter().map(|item| (item.id, item)).collect();
        Ok(ids.into_iter().filter_map(|id| by_id.remove(&id)).collect())
    }
}

fn skipped<T>(previous: Option<Arc<T>>, cause: &ScoringError) -> (Option<Arc<T>>, ModelTrainingStatus) {
    info!(reason = %cause, kept_previous = previous.is_some(), "Model skipped this pass");
    let status = ModelTrainingStatus::Skipped {
        reason: cause.to_string(),
        kept_previous: previous.is_some(),
    };
    (previous, status)
}

/// Feature building fails for both models at once; each gets its own copy.
fn clone_data_error(e: &ScoringError) -> ScoringError {
    match e {
        ScoringError::NoItems => ScoringError::NoItems,
        ScoringError::InsufficientData {
            component,
            required,
            found,
        } => ScoringError::InsufficientData {
            component: *component,
            required: *required,
            found: *found,
        },
        other => ScoringError::Internal(other.to_string()),
    }
}
