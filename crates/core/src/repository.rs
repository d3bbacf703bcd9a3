//! Read-only access to the marketplace tables the scoring engine consumes.
//!
//! The relational store is an external collaborator; the engine only sees
//! the [`TransactionRepository`] trait. [`InMemoryRepository`] backs the
//! binary (loaded from a JSON export) and the test suites.

use crate::types::{CatalogDump, Item, ItemId, Rating, Transaction, User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Queries over items, confirmed purchases and ratings.
///
/// Bulk listings are used by training passes; the point aggregates serve
/// live queries.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn list_items(&self) -> anyhow::Result<Vec<Item>>;

    async fn get_item(&self, item_id: ItemId) -> anyhow::Result<Option<Item>>;

    async fn list_confirmed_transactions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<Transaction>>;

    /// Confirmed purchases of one buyer, in no particular order.
    async fn buyer_transactions(&self, user_id: UserId) -> anyhow::Result<Vec<Transaction>>;

    async fn list_ratings(&self) -> anyhow::Result<Vec<Rating>>;

    async fn average_rating(&self, item_id: ItemId) -> anyhow::Result<Option<f64>>;

    async fn count_confirmed(
        &self,
        item_id: ItemId,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<u64>;

    /// Mean list price of the items in `category` other than `exclude_item_id`.
    /// `None` when the category has no other member.
    async fn average_price(
        &self,
        category: &str,
        exclude_item_id: ItemId,
    ) -> anyhow::Result<Option<f64>>;

    async fn user_exists(&self, user_id: UserId) -> anyhow::Result<bool>;
}

/// Repository over an in-process copy of the marketplace tables.
pub struct InMemoryRepository {
    data: RwLock<CatalogDump>,
    unavailable: AtomicBool,
}

impl InMemoryRepository {
    pub fn new(dump: CatalogDump) -> Self {
        Self {
            data: RwLock::new(dump),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Load a JSON catalog export from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let dump: CatalogDump = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            items = dump.items.len(),
            transactions = dump.transactions.len(),
            ratings = dump.ratings.len(),
            "Catalog export loaded"
        );
        Ok(Self::new(dump))
    }

    pub fn insert_user(&self, user: User) {
        self.data.write().users.push(user);
    }

    pub fn insert_item(&self, item: Item) {
        let mut data = self.data.write();
        data.items.retain(|existing| existing.id != item.id);
        data.items.push(item);
    }

    pub fn remove_item(&self, item_id: ItemId) {
        self.data.write().items.retain(|item| item.id != item_id);
    }

    pub fn insert_transaction(&self, transaction: Transaction) {
        self.data.write().transactions.push(transaction);
    }

    pub fn insert_rating(&self, rating: Rating) {
        self.data.write().ratings.push(rating);
    }

    /// Simulate an upstream outage: every query fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("transaction store unavailable");
        }
        Ok(())
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new(CatalogDump::default())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryRepository {
    async fn list_items(&self) -> anyhow::Result<Vec<Item>> {
        self.check_available()?;
        Ok(self.data.read().items.clone())
    }

    async fn get_item(&self, item_id: ItemId) -> anyhow::Result<Option<Item>> {
        self.check_available()?;
        Ok(self
            .data
            .read()
            .items
            .iter()
            .find(|item| item.id == item_id)
            .cloned())
    }

    async fn list_confirmed_transactions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<Transaction>> {
        self.check_available()?;
        Ok(self
            .data
            .read()
            .transactions
            .iter()
            .filter(|t| since.map_or(true, |s| t.created_at >= s))
            .cloned()
            .collect())
    }

    async fn buyer_transactions(&self, user_id: UserId) -> anyhow::Result<Vec<Transaction>> {
        self.check_available()?;
        Ok(self
            .data
            .read()
            .transactions
            .iter()
            .filter(|t| t.buyer_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_ratings(&self) -> anyhow::Result<Vec<Rating>> {
        self.check_available()?;
        Ok(self.data.read().ratings.clone())
    }

    async fn average_rating(&self, item_id: ItemId) -> anyhow::Result<Option<f64>> {
        self.check_available()?;
        let data = self.data.read();
        let scores: Vec<f64> = data
            .ratings
            .iter()
            .filter(|r| r.item_id == item_id)
            .map(Rating::clamped_score)
            .collect();
        if scores.is_empty() {
            return Ok(None);
        }
        Ok(Some(scores.iter().sum::<f64>() / scores.len() as f64))
    }

    async fn count_confirmed(
        &self,
        item_id: ItemId,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<u64> {
        self.check_available()?;
        Ok(self
            .data
            .read()
            .transactions
            .iter()
            .filter(|t| t.item_id == item_id && since.map_or(true, |s| t.created_at >= s))
            .count() as u64)
    }

    async fn average_price(
        &self,
        category: &str,
        exclude_item_id: ItemId,
    ) -> anyhow::Result<Option<f64>> {
        self.check_available()?;
        let data = self.data.read();
        let prices: Vec<f64> = data
            .items
            .iter()
            .filter(|item| item.category == category && item.id != exclude_item_id)
            .map(|item| item.price)
            .collect();
        if prices.is_empty() {
            return Ok(None);
        }
        Ok(Some(prices.iter().sum::<f64>() / prices.len() as f64))
    }

    async fn user_exists(&self, user_id: UserId) -> anyhow::Result<bool> {
        self.check_available()?;
        let data = self.data.read();
        // Buyers known only through their purchases still count as users.
        Ok(data.users.iter().any(|u| u.id == user_id)
            || data.transactions.iter().any(|t| t.buyer_id == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserRole;
    use chrono::{Duration, TimeZone};

    fn sample_repo() -> InMemoryRepository {
        let at = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
        let item = |id: ItemId, category: &str, price: f64| Item {
            id,
            name: format!("app-{id}"),
            description: String::new(),
            category: category.to_string(),
            price,
            owner_id: 100,
        };
        InMemoryRepository::new(CatalogDump {
            users: vec![User {
                id: 1,
                name: "buyer".to_string(),
                role: UserRole::Buyer,
            }],
            items: vec![item(1, "Finance", 10.0), item(2, "Finance", 30.0), item(3, "Games", 5.0)],
            transactions: vec![
                Transaction { item_id: 1, buyer_id: 1, created_at: at },
                Transaction { item_id: 1, buyer_id: 2, created_at: at - Duration::days(60) },
            ],
            ratings: vec![
                Rating { item_id: 1, author_id: 1, score: 5, created_at: at },
                Rating { item_id: 1, author_id: 2, score: 2, created_at: at },
            ],
        })
    }

    #[tokio::test]
    async fn test_point_aggregates() {
        let repo = sample_repo();
        assert_eq!(repo.average_rating(1).await.unwrap(), Some(3.5));
        assert_eq!(repo.average_rating(2).await.unwrap(), None);
        assert_eq!(repo.count_confirmed(1, None).await.unwrap(), 2);

        let since = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(repo.count_confirmed(1, Some(since)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_average_rating_clamps_out_of_range_scores() {
        let repo = sample_repo();
        let at = Utc.with_ymd_and_hms(2026, 1, 11, 0, 0, 0).unwrap();
        repo.insert_rating(Rating { item_id: 3, author_id: 1, score: 9, created_at: at });
        repo.insert_rating(Rating { item_id: 3, author_id: 2, score: 0, created_at: at });
        // 9 reads as 5 and 0 as 1.
        assert_eq!(repo.average_rating(3).await.unwrap(), Some(3.0));
    }

    #[tokio::test]
    async fn test_average_price_excludes_item() {
        let repo = sample_repo();
        assert_eq!(repo.average_price("Finance", 1).await.unwrap(), Some(30.0));
        assert_eq!(repo.average_price("Games", 3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_user_exists_via_purchases() {
        let repo = sample_repo();
        assert!(repo.user_exists(1).await.unwrap());
        assert!(repo.user_exists(2).await.unwrap());
        assert!(!repo.user_exists(99).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_query() {
        let repo = sample_repo();
        repo.set_unavailable(true);
        assert!(repo.list_items().await.is_err());
        assert!(repo.count_confirmed(1, None).await.is_err());
        repo.set_unavailable(false);
        assert_eq!(repo.list_items().await.unwrap().len(), 3);
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"items":[{"id":4,"name":"Calc","category":"Tools","price":9.0,"owner_id":1}]}"#,
        )
        .unwrap();
        let repo = InMemoryRepository::from_json_file(&path).unwrap();
        assert_eq!(repo.data.read().items[0].name, "Calc");
    }
}
