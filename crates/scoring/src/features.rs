//! Feature builder: turns a full repository snapshot into the per-item
//! feature table, the category codec and the buyer×item interaction matrix
//! shared by the price suggester and the recommender.

use appswap_core::types::{Item, ItemId, Rating, Transaction, UserId};
use appswap_core::{ScoringError, ScoringResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Average rating assumed for items nobody has rated yet, and the implicit
/// strength of a purchase its buyer never rated.
pub const NEUTRAL_RATING: f64 = 3.0;

pub const MAX_RATING: f64 = Rating::MAX_SCORE;

/// Added to every min-max range so an all-equal column maps to 0.
pub const NORMALIZATION_EPSILON: f64 = 0.01;

/// Ordinal encoding of category names: sorted ascending, index = code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCodec {
    categories: Vec<String>,
}

impl CategoryCodec {
    pub fn fit<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut categories: Vec<String> = names.into_iter().map(str::to_string).collect();
        categories.sort();
        categories.dedup();
        Self { categories }
    }

    /// Fails on a category the codec has never seen instead of guessing.
    pub fn encode(&self, category: &str) -> ScoringResult<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(category))
            .map_err(|_| ScoringError::UnknownCategory(category.to_string()))
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Derived per-item record. Rebuilt wholesale on every training pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFeatures {
    pub item_id: ItemId,
    pub name: String,
    pub category: String,
    pub category_code: usize,
    pub price: f64,
    pub price_norm: f64,
    pub avg_rating: f64,
    pub rating_norm: f64,
    pub popularity: u64,
    pub recent_popularity: u64,
    pub popularity_norm: f64,
    /// Mean price of the other items in the same category, or the item's own
    /// price when it is alone in its category.
    pub competitor_avg_price: f64,
}

impl ItemFeatures {
    /// Vector used for item-to-item similarity.
    pub fn content_vector(&self) -> [f64; 4] {
        [
            self.category_code as f64,
            self.price_norm,
            self.rating_norm,
            self.popularity_norm,
        ]
    }
}

/// Sparse buyer × item strengths: the buyer's rating when one exists,
/// otherwise [`NEUTRAL_RATING`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionMatrix {
    rows: BTreeMap<UserId, BTreeMap<ItemId, f64>>,
}

impl InteractionMatrix {
    pub fn row(&self, user_id: UserId) -> Option<&BTreeMap<ItemId, f64>> {
        self.rows.get(&user_id)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&UserId, &BTreeMap<ItemId, f64>)> {
        self.rows.iter()
    }

    pub fn user_count(&self) -> usize {
        self.rows.len()
    }

    pub fn interaction_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }
}

/// Everything one training pass derives from the repository snapshot.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Ordered by ascending item id.
    pub items: Vec<ItemFeatures>,
    pub codec: CategoryCodec,
    pub interactions: InteractionMatrix,
    /// Confirmed transactions that referenced a known item.
    pub transaction_count: usize,
    pub built_at: DateTime<Utc>,
}

pub struct FeatureBuilder {
    recent_window: Duration,
}

impl FeatureBuilder {
    pub fn new(recent_window_days: i64) -> Self {
        Self {
            recent_window: Duration::days(recent_window_days),
        }
    }

    pub fn build(
        &self,
        items: &[Item],
        transactions: &[Transaction],
        ratings: &[Rating],
        now: DateTime<Utc>,
    ) -> ScoringResult<FeatureSet> {
        if items.is_empty() {
            return Err(ScoringError::NoItems);
        }

        let mut items: Vec<&Item> = items.iter().collect();
        items.sort_by_key(|item| item.id);
        items.dedup_by_key(|item| item.id);

        let codec = CategoryCodec::fit(items.iter().map(|item| item.category.as_str()));
        let known: HashSet<ItemId> = items.iter().map(|item| item.id).collect();

        // Per-item rating aggregates, and per-(author, item) for duplicates.
        let mut rating_sums: HashMap<ItemId, (f64, u32)> = HashMap::new();
        let mut pair_ratings: HashMap<(UserId, ItemId), (f64, u32)> = HashMap::new();
        for rating in ratings {
            let score = rating.clamped_score();
            let entry = rating_sums.entry(rating.item_id).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
            let pair = pair_ratings
                .entry((rating.author_id, rating.item_id))
                .or_insert((0.0, 0));
            pair.0 += score;
            pair.1 += 1;
        }

        let recent_cutoff = now - self.recent_window;
        let mut sales: HashMap<ItemId, (u64, u64)> = HashMap::new();
        let mut interactions = InteractionMatrix::default();
        let mut transaction_count = 0usize;
        let mut skipped = 0usize;
        for tx in transactions {
            if !known.contains(&tx.item_id) {
                skipped += 1;
                continue;
            }
            transaction_count += 1;
            let entry = sales.entry(tx.item_id).or_insert((0, 0));
            entry.0 += 1;
            if tx.created_at >= recent_cutoff {
                entry.1 += 1;
            }
            let strength = pair_ratings
                .get(&(tx.buyer_id, tx.item_id))
                .map(|(sum, n)| sum / *n as f64)
                .unwrap_or(NEUTRAL_RATING);
            interactions
                .rows
                .entry(tx.buyer_id)
                .or_default()
                .insert(tx.item_id, strength);
        }
        if skipped > 0 {
            debug!(skipped, "Skipped transactions referencing unknown items");
        }

        let prices: Vec<f64> = items.iter().map(|item| item.price).collect();
        let popularity: Vec<f64> = items
            .iter()
            .map(|item| sales.get(&item.id).map_or(0, |s| s.0) as f64)
            .collect();
        let price_norm = min_max_normalize(&prices);
        let popularity_norm = min_max_normalize(&popularity);

        // Category price totals for the competitor average.
        let mut category_prices: HashMap<&str, (f64, usize)> = HashMap::new();
        for item in &items {
            let entry = category_prices.entry(item.category.as_str()).or_insert((0.0, 0));
            entry.0 += item.price;
            entry.1 += 1;
        }

        let mut features = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let avg_rating = rating_sums
                .get(&item.id)
                .map(|(sum, n)| sum / *n as f64)
                .unwrap_or(NEUTRAL_RATING);
            let (total, recent) = sales.get(&item.id).copied().unwrap_or((0, 0));
            let (cat_sum, cat_count) = category_prices[&item.category.as_str()];
            let competitor_avg_price = if cat_count > 1 {
                (cat_sum - item.price) / (cat_count - 1) as f64
            } else {
                item.price
            };

            features.push(ItemFeatures {
                item_id: item.id,
                name: item.name.clone(),
                category: item.category.clone(),
                category_code: codec.encode(&item.category)?,
                price: item.price,
                price_norm: price_norm[idx],
                avg_rating,
                rating_norm: avg_rating / MAX_RATING,
                popularity: total,
                recent_popularity: recent,
                popularity_norm: popularity_norm[idx],
                competitor_avg_price,
            });
        }

        info!(
            items = features.len(),
            categories = codec.len(),
            transactions = transaction_count,
            buyers = interactions.user_count(),
            "Feature set built"
        );

        Ok(FeatureSet {
            items: features,
            codec,
            interactions,
            transaction_count,
            built_at: now,
        })
    }
}

/// Min–max scaling with [`NORMALIZATION_EPSILON`] added to the range.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    values
        .iter()
        .map(|v| (v - min) / (max - min + NORMALIZATION_EPSILON))
        .collect()
}
