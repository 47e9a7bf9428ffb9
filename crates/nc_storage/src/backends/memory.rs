use async_trait::async_trait;
use nc_core::{ArticleQuery, ArticleRecord, ArticleStorage, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::StorageBackend;

/// Process-local store keyed by URL. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    articles: Arc<RwLock<BTreeMap<String, ArticleRecord>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut articles: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at).then_with(|| a.url.cmp(&b.url)));
    articles
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn open(_url: Option<&str>) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn find_by_url(&self, url: &str) -> Result<Option<ArticleRecord>> {
        Ok(self.articles.read().await.get(url).cloned())
    }

    async fn upsert_batch(&self, records: &[ArticleRecord]) -> Result<()> {
        let mut articles = self.articles.write().await;
        for record in records {
            match articles.get_mut(&record.url) {
                Some(existing) => {
                    existing.overwrite_from(record);
                    existing.updated_at = record.updated_at;
                }
                None => {
                    articles.insert(record.url.clone(), record.clone());
                }
            }
        }
        Ok(())
    }

    async fn get_by_source(&self, source: &str) -> Result<Vec<ArticleRecord>> {
        let articles = self.articles.read().await;
        Ok(newest_first(
            articles
                .values()
                .filter(|a| a.source == source)
                .cloned()
                .collect(),
        ))
    }

    async fn search(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>> {
        let articles = self.articles.read().await;
        let matched = newest_first(articles.values().filter(|a| query.matches(a)).cloned().collect());
        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.articles.read().await.len() as u64)
    }
}
