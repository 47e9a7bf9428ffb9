use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::date_window::DateWindow;
use crate::types::ArticleRecord;
use crate::Result;

/// Filters for browsing stored articles. Results are newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleQuery {
    /// Literal substring of title or content. Case folding covers ASCII
    /// letters only, the same rule SQLite's `lower()` applies.
    pub keyword: Option<String>,
    pub source: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub window: DateWindow,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl ArticleQuery {
    pub fn matches(&self, article: &ArticleRecord) -> bool {
        if let Some(source) = &self.source {
            if &article.source != source {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if article.category.as_ref() != Some(category) {
                return false;
            }
        }
        if !self.window.is_unbounded() && !self.window.includes(Some(&article.published_at)) {
            return false;
        }
        match &self.keyword {
            Some(keyword) => {
                let keyword = keyword.to_ascii_lowercase();
                article.title.to_ascii_lowercase().contains(&keyword)
                    || article
                        .content
                        .as_deref()
                        .map_or(false, |c| c.to_ascii_lowercase().contains(&keyword))
            }
            None => true,
        }
    }
}

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Look up an article by its natural key
    async fn find_by_url(&self, url: &str) -> Result<Option<ArticleRecord>>;

    /// Insert or update every record, keyed by URL, as one unit of work.
    /// An existing row keeps its `created_at`.
    async fn upsert_batch(&self, records: &[ArticleRecord]) -> Result<()>;

    /// Get all articles from a specific source, newest first
    async fn get_by_source(&self, source: &str) -> Result<Vec<ArticleRecord>>;

    async fn search(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>>;

    async fn count(&self) -> Result<u64>;
}
