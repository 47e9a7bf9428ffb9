use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lightweight reference to an article as seen on a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleStub {
    pub url: String,
    pub title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub category: Option<String>,
}

impl ArticleStub {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            published_at: None,
            image_url: None,
            category: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// A fully fetched article. `url` is the natural key.
///
/// `created_at` and `updated_at` stay `None` until the record has been
/// through `UpsertStore::save`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    pub source: String,
    pub title: String,
    pub content: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub reporter: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ArticleRecord {
    pub fn new(
        url: impl Into<String>,
        source: impl Into<String>,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
            title: title.into(),
            content: None,
            description: None,
            image_url: None,
            category: None,
            reporter: None,
            published_at,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_reporter(mut self, reporter: impl Into<String>) -> Self {
        self.reporter = Some(reporter.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Fills listing-time fields the article page did not provide.
    pub fn merge_stub(&mut self, stub: &ArticleStub) {
        if self.image_url.is_none() {
            self.image_url = stub.image_url.clone();
        }
        if self.category.is_none() {
            self.category = stub.category.clone();
        }
    }

    /// Copies every mutable field from `other`. The key, the source that
    /// first stored the URL and both bookkeeping timestamps stay as they are.
    pub fn overwrite_from(&mut self, other: &ArticleRecord) {
        self.title = other.title.clone();
        self.content = other.content.clone();
        self.description = other.description.clone();
        self.image_url = other.image_url.clone();
        self.category = other.category.clone();
        self.reporter = other.reporter.clone();
        self.published_at = other.published_at;
    }
}

/// Outcome of a single `UpsertStore::save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Inserted,
    Updated,
}

/// Why pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A listing page returned no stubs.
    EmptyPage,
    /// Every dated stub on the last page was older than the window start.
    Exhausted,
    /// The configured page limit was reached.
    MaxPages,
    Cancelled,
}

/// A failure attributed to one article URL or one listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub target: String,
    pub reason: String,
}

impl CrawlFailure {
    pub fn new(target: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn page(page: u32, reason: impl ToString) -> Self {
        Self::new(format!("page {}", page), reason)
    }
}

/// Summary of one crawl run, handed back to the caller and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub source: String,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub pages_visited: u32,
    pub stop_reason: Option<StopReason>,
    pub errors: Vec<CrawlFailure>,
}

impl CrawlResult {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fetched: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            pages_visited: 0,
            stop_reason: None,
            errors: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, failure: CrawlFailure) {
        self.errors.push(failure);
    }

    pub fn saved(&self) -> usize {
        self.inserted + self.updated
    }

    /// Copy of the result keeping at most `max_errors` failures, for operator
    /// facing output. The dropped count is appended as a final entry.
    pub fn truncated(&self, max_errors: usize) -> CrawlResult {
        let mut result = self.clone();
        if result.errors.len() > max_errors {
            let dropped = result.errors.len() - max_errors;
            result.errors.truncate(max_errors);
            result
                .errors
                .push(CrawlFailure::new("…", format!("{} more failure(s) omitted", dropped)));
        }
        result
    }
}
