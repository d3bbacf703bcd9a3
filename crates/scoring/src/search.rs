//! Catalog search behind a pluggable assistant. The default implementation
//! is a plain keyword matcher; richer assistants plug in through the trait.

use appswap_core::types::{Item, ItemId};
use async_trait::async_trait;

#[async_trait]
pub trait SearchAssistant: Send + Sync {
    /// Item ids matching `query`, best match first.
    async fn search(&self, query: &str, catalog: &[Item]) -> anyhow::Result<Vec<ItemId>>;
}

/// Ranks items by how many distinct query terms appear in their name,
/// description or category. Case-insensitive.
#[derive(Debug, Clone)]
pub struct KeywordSearch {
    pub max_results: usize,
}

impl Default for KeywordSearch {
    fn default() -> Self {
        Self { max_results: 20 }
    }
}

#[async_trait]
impl SearchAssistant for KeywordSearch {
    async fn search(&self, query: &str, catalog: &[Item]) -> anyhow::Result<Vec<ItemId>> {
        let mut terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(usize, ItemId)> = catalog
            .iter()
            .filter_map(|item| {
                let haystack = format!(
                    "{} {} {}",
                    item.name.to_lowercase(),
                    item.description.to_lowercase(),
                    item.category.to_lowercase()
                );
                let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                (matched > 0).then_some((matched, item.id))
            })
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(hits
            .into_iter()
            .take(self.max_results)
            .map(|(_, id)| id)
            .collect())
    }
}
