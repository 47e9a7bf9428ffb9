use nc_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::CrawlerConfig;
use crate::extractor::PageExtractor;
use crate::selector::SelectorExtractor;

/// Known sources by name.
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<String, Arc<dyn PageExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`SelectorExtractor`] per configured source.
    pub fn from_config(config: &CrawlerConfig) -> Result<Self> {
        let mut registry = Self::new();
        for definition in &config.sources {
            registry.register(Arc::new(SelectorExtractor::new(definition.clone())?));
        }
        Ok(registry)
    }

    /// Adds `extractor` under its source name, replacing any previous one.
    pub fn register(&mut self, extractor: Arc<dyn PageExtractor>) {
        self.extractors.insert(extractor.source().to_string(), extractor);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PageExtractor>> {
        self.extractors.get(name).cloned().ok_or_else(|| {
            Error::Config(format!(
                "Unknown source '{}'. Available: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.extractors.keys().map(String::as_str).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn PageExtractor>> {
        self.extractors.values()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}
