use nc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::browser::{SessionConfig, DEFAULT_USER_AGENT};
use crate::pagination::DEFAULT_MAX_PAGES;
use crate::retry::{ExponentialBackoff, RetryPolicy};
use crate::run::CrawlOptions;

const DEFAULT_CONFIG: &str = include_str!("../config/sources.yml");

/// Crawler settings plus the sources it knows how to crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub max_pages: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub ready_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub batch_size: usize,
    pub request_delay_ms: u64,
    pub user_agent: String,
    /// Stripped from every source's content.
    pub ad_phrases: Vec<String>,
    pub sources: Vec<SourceDefinition>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            ready_timeout_ms: 10_000,
            poll_interval_ms: 250,
            request_timeout_ms: 30_000,
            batch_size: nc_storage::DEFAULT_BATCH_SIZE,
            request_delay_ms: 1_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ad_phrases: Vec::new(),
            sources: Vec::new(),
        }
    }
}

/// Where to find articles on one site and how to read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub name: String,
    /// Listing URL with a `{page}` placeholder.
    pub list_url: String,
    /// Used for page 1 instead of `list_url` when the site's first page differs.
    #[serde(default)]
    pub first_page_url: Option<String>,
    pub list: ListSelectors,
    pub article: ArticleSelectors,
    /// chrono formats tried in order after RFC 3339.
    #[serde(default)]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Selector that must be present before a listing page is read.
    #[serde(default)]
    pub ready_marker: Option<String>,
    /// Selector that must be present before an article page is read.
    #[serde(default)]
    pub article_ready_marker: Option<String>,
    #[serde(default)]
    pub ad_phrases: Vec<String>,
    /// Listing items whose title contains one of these are ignored.
    #[serde(default)]
    pub skip_title_markers: Vec<String>,
    #[serde(default)]
    pub default_category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSelectors {
    pub item: String,
    #[serde(default = "default_link_selector")]
    pub link: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_link_selector() -> String {
    "a".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSelectors {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub reporter: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl CrawlerConfig {
    /// Built-in configuration shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(DEFAULT_CONFIG)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: CrawlerConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("Invalid crawler config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, or the built-in configuration when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)?;
                Self::from_yaml_str(&yaml)
            }
            None => Self::builtin(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(Error::Config("source with empty name".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(Error::Config(format!("duplicate source '{}'", source.name)));
            }
            if !source.list_url.contains("{page}") {
                return Err(Error::Config(format!(
                    "source '{}': list_url must contain {{page}}",
                    source.name
                )));
            }
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceDefinition> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_backoff(ExponentialBackoff::new(self.backoff_base_ms, self.backoff_max_ms))
            .with_ready_timeout(Duration::from_millis(self.ready_timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            user_agent: self.user_agent.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            retry: self.retry_policy(),
        }
    }

    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            session: self.session_config(),
            batch_size: self.batch_size,
            request_delay: Duration::from_millis(self.request_delay_ms),
            ad_phrases: self.ad_phrases.clone(),
        }
    }
}
