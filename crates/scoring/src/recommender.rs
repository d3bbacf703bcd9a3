//! Hybrid recommender: collaborative filtering over the buyer×item matrix,
//! content-based similarity over item features, and a down-weighted
//! popularity signal. Candidate scores from every strategy are summed per
//! item before ranking.

use crate::features::{FeatureSet, InteractionMatrix, ItemFeatures};
use crate::price::round_to;
use crate::similarity::{cosine_matrix, sparse_cosine};
use appswap_core::config::ScoringConfig;
use appswap_core::types::{ItemId, RankedItem, RecommendationReason, Transaction, UserId};
use appswap_core::{ScoringError, ScoringResult};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RecommendPolicy {
    pub min_transactions: usize,
    /// Most similar other buyers consulted by the collaborative strategy.
    pub neighbours: usize,
    /// Most recent purchases used as content-based seeds.
    pub content_seeds: usize,
    /// Similar items taken per seed.
    pub content_neighbours: usize,
    pub popular_pool: usize,
    pub popularity_weight: f64,
}

impl From<&ScoringConfig> for RecommendPolicy {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            min_transactions: config.recommender_min_transactions,
            neighbours: config.neighbours,
            content_seeds: config.content_seeds,
            content_neighbours: config.content_neighbours,
            popular_pool: config.popular_pool,
            popularity_weight: config.popularity_weight,
        }
    }
}

impl Default for RecommendPolicy {
    fn default() -> Self {
        Self::from(&ScoringConfig::default())
    }
}

/// One strategy's vote for an item.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    item_id: ItemId,
    score: f64,
    reason: RecommendationReason,
}

pub struct Recommender {
    policy: RecommendPolicy,
}

impl Recommender {
    pub fn new(policy: RecommendPolicy) -> Self {
        Self { policy }
    }

    pub fn fit(&self, features: &FeatureSet) -> ScoringResult<RecommenderModel> {
        if features.transaction_count < self.policy.min_transactions {
            return Err(ScoringError::InsufficientData {
                component: "recommender",
                required: self.policy.min_transactions,
                found: features.transaction_count,
            });
        }

        let mut matrix = Array2::<f64>::zeros((features.items.len(), 4));
        for (i, item) in features.items.iter().enumerate() {
            for (j, value) in item.content_vector().iter().enumerate() {
                matrix[[i, j]] = *value;
            }
        }
        let similarity = cosine_matrix(&matrix);

        info!(
            users = features.interactions.user_count(),
            items = features.items.len(),
            interactions = features.interactions.interaction_count(),
            "Recommender trained"
        );

        Ok(RecommenderModel::new(
            features.items.clone(),
            similarity,
            features.interactions.clone(),
            features.codec.categories().to_vec(),
            features.built_at,
        ))
    }
}

/// Fitted recommender state. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommenderModel {
    categories: Vec<String>,
    /// Ordered by ascending item id; row/column `i` of `similarity` is `items[i]`.
    items: Vec<ItemFeatures>,
    similarity: Array2<f64>,
    interactions: InteractionMatrix,
    trained_at: DateTime<Utc>,
    #[serde(skip)]
    index: HashMap<ItemId, usize>,
}

impl RecommenderModel {
    fn new(
        items: Vec<ItemFeatures>,
        similarity: Array2<f64>,
        interactions: InteractionMatrix,
        categories: Vec<String>,
        trained_at: DateTime<Utc>,
    ) -> Self {
        let mut model = Self {
            categories,
            items,
            similarity,
            interactions,
            trained_at,
            index: HashMap::new(),
        };
        model.reindex();
        model
    }

    /// Rebuild the id → row lookup; needed after deserialization.
    pub(crate) fn reindex(&mut self) {
        self.index = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.item_id, i))
            .collect();
    }

    /// A persisted model must have one similarity row per item.
    pub(crate) fn is_consistent(&self) -> bool {
        let n = self.items.len();
        self.similarity.nrows() == n && self.similarity.ncols() == n
    }

    pub fn items(&self) -> &[ItemFeatures] {
        &self.items
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn similarity(&self, a: ItemId, b: ItemId) -> Option<f64> {
        let (i, j) = (*self.index.get(&a)?, *self.index.get(&b)?);
        Some(self.similarity[[i, j]])
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Rank up to `top_k` items the user has not purchased. `history` is the
    /// user's confirmed purchases as currently recorded upstream.
    pub fn recommend(
        &self,
        user_id: UserId,
        history: &[Transaction],
        top_k: usize,
        policy: &RecommendPolicy,
    ) -> Vec<RankedItem> {
        if top_k == 0 {
            return Vec::new();
        }
        let purchased: HashSet<ItemId> = history.iter().map(|t| t.item_id).collect();

        let collaborative = self.collaborative(user_id, &purchased, policy);
        let content = self.content_based(history, &purchased, policy);
        let popular = self.popular(&purchased, policy);
        debug!(
            user_id,
            collaborative = collaborative.len(),
            content = content.len(),
            popular = popular.len(),
            "Recommendation candidates generated"
        );

        let mut candidates: Vec<Candidate> = collaborative
            .into_iter()
            .chain(content)
            .chain(popular)
            .collect();
        if candidates.is_empty() {
            candidates = self.top_rated(&purchased, top_k);
        }

        self.rank(candidates, top_k)
    }

    /// Items liked by the most similar other buyers.
    fn collaborative(
        &self,
        user_id: UserId,
        purchased: &HashSet<ItemId>,
        policy: &RecommendPolicy,
    ) -> Vec<Candidate> {
        let Some(user_row) = self.interactions.row(user_id) else {
            return Vec::new();
        };

        let mut neighbours: Vec<(UserId, f64, &BTreeMap<ItemId, f64>)> = self
            .interactions
            .rows()
            .filter(|(other, _)| **other != user_id)
            .map(|(other, row)| (*other, sparse_cosine(user_row, row), row))
            .filter(|(_, similarity, _)| *similarity > 0.0)
            .collect();
        neighbours.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        neighbours.truncate(policy.neighbours);

        let mut candidates = Vec::new();
        for (_, similarity, row) in neighbours {
            for (item_id, strength) in row {
                if *strength > 0.0 && !purchased.contains(item_id) {
                    candidates.push(Candidate {
                        item_id: *item_id,
                        score: strength * similarity,
                        reason: RecommendationReason::Collaborative,
                    });
                }
            }
        }
        candidates
    }

    /// Items most similar to the user's most recent purchases.
    fn content_based(
        &self,
        history: &[Transaction],
        purchased: &HashSet<ItemId>,
        policy: &RecommendPolicy,
    ) -> Vec<Candidate> {
        let mut recent: Vec<&Transaction> = history.iter().collect();
        recent.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.item_id.cmp(&b.item_id))
        });
        let mut seeds: Vec<ItemId> = Vec::new();
        for tx in recent {
            if !seeds.contains(&tx.item_id) {
                seeds.push(tx.item_id);
            }
            if seeds.len() == policy.content_seeds {
                break;
            }
        }

        let mut candidates = Vec::new();
        for seed in seeds {
            // Purchases made after training have no similarity row yet.
            let Some(&row) = self.index.get(&seed) else {
                continue;
            };
            let mut similar: Vec<(usize, f64)> = (0..self.items.len())
                .filter(|&j| j != row && !purchased.contains(&self.items[j].item_id))
                .map(|j| (j, self.similarity[[row, j]]))
                .collect();
            similar.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            similar.truncate(policy.content_neighbours);

            candidates.extend(similar.into_iter().map(|(j, similarity)| Candidate {
                item_id: self.items[j].item_id,
                score: similarity,
                reason: RecommendationReason::Content,
            }));
        }
        candidates
    }

    /// Best sellers overall, deliberately down-weighted.
    fn popular(&self, purchased: &HashSet<ItemId>, policy: &RecommendPolicy) -> Vec<Candidate> {
        let mut by_sales: Vec<&ItemFeatures> = self.items.iter().collect();
        by_sales.sort_by(|a, b| b.popularity.cmp(&a.popularity).then(a.item_id.cmp(&b.item_id)));

        by_sales
            .into_iter()
            .take(policy.popular_pool)
            .filter(|item| !purchased.contains(&item.item_id))
            .map(|item| Candidate {
                item_id: item.item_id,
                score: item.popularity_norm * policy.popularity_weight,
                reason: RecommendationReason::Popular,
            })
            .collect()
    }

    /// Last resort when no strategy produced anything.
    fn top_rated(&self, purchased: &HashSet<ItemId>, top_k: usize) -> Vec<Candidate> {
        let mut by_rating: Vec<&ItemFeatures> = self
            .items
            .iter()
            .filter(|item| !purchased.contains(&item.item_id))
            .collect();
        by_rating.sort_by(|a, b| {
            b.avg_rating
                .total_cmp(&a.avg_rating)
                .then(a.item_id.cmp(&b.item_id))
        });
        by_rating
            .into_iter()
            .take(top_k)
            .map(|item| Candidate {
                item_id: item.item_id,
                score: item.rating_norm,
                reason: RecommendationReason::TopRated,
            })
            .collect()
    }

    /// Sum scores per item, sort by summed score descending then item id
    /// ascending, and keep the first `top_k`. Scores are rounded to two
    /// decimals on output only.
    fn rank(&self, candidates: Vec<Candidate>, top_k: usize) -> Vec<RankedItem> {
        let mut merged: BTreeMap<ItemId, (f64, BTreeSet<RecommendationReason>)> = BTreeMap::new();
        for candidate in candidates {
            let entry = merged.entry(candidate.item_id).or_default();
            entry.0 += candidate.score;
            entry.1.insert(candidate.reason);
        }

        let mut ranked: Vec<(ItemId, f64, RecommendationReason)> = merged
            .into_iter()
            .filter_map(|(item_id, (score, reasons))| {
                reasons
                    .first()
                    .map(|reason| (item_id, score, *reason))
            })
            .collect();
        ranked.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });

        ranked
            .into_iter()
            .filter_map(|(item_id, score, reason)| {
                let item = &self.items[*self.index.get(&item_id)?];
                Some(RankedItem {
                    item_id,
                    name: item.name.clone(),
                    category: item.category.clone(),
                    price: item.price,
                    score: round_to(score, 2),
                    reason,
                    reason_text: reason.text().to_string(),
                })
            })
            .take(top_k)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureBuilder;
    use appswap_core::types::{Item, Rating};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    fn item(id: ItemId, category: &str, price: f64) -> Item {
        Item {
            id,
            name: format!("app-{id}"),
            description: String::new(),
            category: category.to_string(),
            price,
            owner_id: 1,
        }
    }

    fn tx(item_id: ItemId, buyer_id: UserId, days_ago: i64) -> Transaction {
        Transaction {
            item_id,
            buyer_id,
            created_at: now() - Duration::days(days_ago),
        }
    }

    fn rating(item_id: ItemId, author_id: UserId, score: u8) -> Rating {
        Rating {
            item_id,
            author_id,
            score,
            created_at: now(),
        }
    }

    fn train(items: &[Item], transactions: &[Transaction], ratings: &[Rating]) -> RecommenderModel {
        let set = FeatureBuilder::new(30)
            .build(items, transactions, ratings, now())
            .unwrap();
        Recommender::new(RecommendPolicy::default()).fit(&set).unwrap()
    }

    fn history(model_user: UserId, transactions: &[Transaction]) -> Vec<Transaction> {
        transactions
            .iter()
            .filter(|t| t.buyer_id == model_user)
            .cloned()
            .collect()
    }

    /// Ten items across two categories, ten buyers with overlapping tastes.
    fn marketplace() -> (Vec<Item>, Vec<Transaction>, Vec<Rating>) {
        let items: Vec<Item> = (1..=10)
            .map(|id| item(id, if id <= 5 { "Finance" } else { "Games" }, 5.0 * id as f64))
            .collect();
        let transactions = vec![
            tx(1, 1, 1),
            tx(2, 1, 2),
            tx(1, 2, 3),
            tx(2, 2, 4),
            tx(3, 2, 5),
            tx(6, 3, 1),
            tx(7, 3, 2),
            tx(6, 4, 3),
            tx(8, 4, 4),
            tx(9, 5, 5),
            tx(9, 6, 6),
            tx(9, 7, 7),
        ];
        let ratings = vec![rating(1, 1, 5), rating(2, 1, 4), rating(3, 2, 5)];
        (items, transactions, ratings)
    }

    #[test]
    fn test_insufficient_transactions() {
        let items: Vec<Item> = (1..=10).map(|id| item(id, "Finance", 10.0)).collect();
        let set = FeatureBuilder::new(30).build(&items, &[], &[], now()).unwrap();
        let err = Recommender::new(RecommendPolicy::default())
            .fit(&set)
            .unwrap_err();
        assert!(matches!(
            err,
            ScoringError::InsufficientData { component: "recommender", found: 0, .. }
        ));
    }

    #[test]
    fn test_collaborative_signal_from_similar_buyer() {
        let (items, transactions, ratings) = marketplace();
        let model = train(&items, &transactions, &ratings);
        let recs = model.recommend(1, &history(1, &transactions), 6, &RecommendPolicy::default());

        // Buyer 2 shares items 1 and 2 with buyer 1 and also bought item 3.
        let item3 = recs.iter().find(|r| r.item_id == 3).unwrap();
        assert_eq!(item3.reason, RecommendationReason::Collaborative);
        assert_eq!(item3.reason_text, "Users similar to you bought this app");
    }

    #[test]
    fn test_never_recommends_purchased_items() {
        let (items, transactions, ratings) = marketplace();
        let model = train(&items, &transactions, &ratings);
        for user in 1..=7 {
            let own = history(user, &transactions);
            let recs = model.recommend(user, &own, 10, &RecommendPolicy::default());
            for rec in &recs {
                assert!(own.iter().all(|t| t.item_id != rec.item_id));
            }
        }
    }

    #[test]
    fn test_top_k_respected_and_sorted() {
        let (items, transactions, ratings) = marketplace();
        let model = train(&items, &transactions, &ratings);
        for k in 0..12 {
            let recs = model.recommend(4, &history(4, &transactions), k, &RecommendPolicy::default());
            assert!(recs.len() <= k);
            for pair in recs.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
        }
    }

    #[test]
    fn test_cold_user_gets_popular_items() {
        let (items, transactions, ratings) = marketplace();
        let model = train(&items, &transactions, &ratings);
        let recs = model.recommend(999, &[], 3, &RecommendPolicy::default());
        assert_eq!(recs.len(), 3);
        // Item 9 has three sales, the most of any item.
        assert_eq!(recs[0].item_id, 9);
        assert_eq!(recs[0].reason, RecommendationReason::Popular);
    }

    #[test]
    fn test_top_rated_fallback_when_nothing_else() {
        let (items, transactions, ratings) = marketplace();
        let model = train(&items, &transactions, &ratings);
        let policy = RecommendPolicy {
            popular_pool: 0,
            ..RecommendPolicy::default()
        };
        let recs = model.recommend(999, &[], 2, &policy);
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.reason == RecommendationReason::TopRated));
        // Item 3 is rated 5.0, item 1 is rated 5.0; ties go to the lower id.
        assert_eq!(recs[0].item_id, 1);
        assert_eq!(recs[1].item_id, 3);
    }

    #[test]
    fn test_scores_accumulate_across_strategies() {
        let candidates = vec![
            Candidate { item_id: 2, score: 0.4, reason: RecommendationReason::Popular },
            Candidate { item_id: 3, score: 0.5, reason: RecommendationReason::Content },
            Candidate { item_id: 2, score: 0.3, reason: RecommendationReason::Content },
            Candidate { item_id: 1, score: 0.5, reason: RecommendationReason::Popular },
        ];
        let (items, transactions, ratings) = marketplace();
        let model = train(&items, &transactions, &ratings);
        let ranked = model.rank(candidates, 10);

        assert_eq!(ranked[0].item_id, 2);
        assert_eq!(ranked[0].score, 0.7);
        assert_eq!(ranked[0].reason, RecommendationReason::Content);
        // Equal scores: ascending item id.
        assert_eq!(ranked[1].item_id, 1);
        assert_eq!(ranked[2].item_id, 3);
    }

    #[test]
    fn test_ranks_on_summed_score_before_rounding() {
        // Both round to 0.70; item 9 still has the higher summed score.
        let candidates = vec![
            Candidate { item_id: 2, score: 0.696, reason: RecommendationReason::Popular },
            Candidate { item_id: 9, score: 0.704, reason: RecommendationReason::Popular },
        ];
        let (items, transactions, ratings) = marketplace();
        let model = train(&items, &transactions, &ratings);
        let ranked = model.rank(candidates, 1);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item_id, 9);
        assert_eq!(ranked[0].score, 0.7);
    }

    #[test]
    fn test_content_similarity_beats_popularity() {
        // Item 1 and item 3 share a category and sit close in price and
        // rating; item 9 is a best seller in another category.
        let items = vec![
            item(1, "Finance", 10.0),
            item(2, "Finance", 40.0),
            item(3, "Finance", 11.0),
            item(4, "Games", 60.0),
            item(5, "Games", 70.0),
            item(6, "Tools", 80.0),
            item(7, "Tools", 90.0),
            item(8, "Tools", 95.0),
            item(9, "Games", 100.0),
        ];
        let mut transactions = vec![tx(1, 1, 1), tx(2, 1, 2)];
        transactions.extend((10..20).map(|buyer| tx(9, buyer, 3)));
        let ratings = vec![rating(1, 1, 5), rating(2, 1, 3), rating(3, 50, 5)];
        let model = train(&items, &transactions, &ratings);

        assert!(model.similarity(1, 3).unwrap() > model.similarity(1, 9).unwrap());

        let recs = model.recommend(1, &history(1, &transactions), 6, &RecommendPolicy::default());
        let position = |id: ItemId| recs.iter().position(|r| r.item_id == id);
        let item3 = position(3).unwrap();
        let item9 = position(9).unwrap();
        assert!(item3 < item9);
        assert!(recs.iter().all(|r| r.reason != RecommendationReason::Collaborative));
    }

    #[test]
    fn test_deterministic_output() {
        let (items, transactions, ratings) = marketplace();
        let first = train(&items, &transactions, &ratings);
        let second = train(&items, &transactions, &ratings);
        for user in [1, 2, 4, 999] {
            let own = history(user, &transactions);
            assert_eq!(
                first.recommend(user, &own, 6, &RecommendPolicy::default()),
                second.recommend(user, &own, 6, &RecommendPolicy::default())
            );
        }
    }
}
