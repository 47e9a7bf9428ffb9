//! Idempotent, batched persistence of article records keyed by URL.

use chrono::Utc;
use nc_core::{ArticleRecord, ArticleStorage, Error, Result, SaveOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Counts of records made durable by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub inserted: usize,
    pub updated: usize,
}

impl FlushReport {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }

    fn add(&mut self, outcome: SaveOutcome) {
        match outcome {
            SaveOutcome::Inserted => self.inserted += 1,
            SaveOutcome::Updated => self.updated += 1,
        }
    }
}

/// Write buffer in front of an [`ArticleStorage`].
///
/// `save` decides insert vs update by looking the URL up first. The lookup
/// and the later write are not atomic: two stores sharing one storage and
/// racing on the same URL can both report `Inserted`. Backends keep a single
/// row per URL regardless, so only the reported counts can be off.
///
/// One `UpsertStore` belongs to one crawl run and is used sequentially.
pub struct UpsertStore {
    storage: Arc<dyn ArticleStorage>,
    batch_size: usize,
    pending: Vec<(ArticleRecord, SaveOutcome)>,
    pending_index: HashMap<String, usize>,
}

impl UpsertStore {
    pub fn new(storage: Arc<dyn ArticleStorage>) -> Self {
        Self::with_batch_size(storage, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(storage: Arc<dyn ArticleStorage>, batch_size: usize) -> Self {
        Self {
            storage,
            batch_size: batch_size.max(1),
            pending: Vec::new(),
            pending_index: HashMap::new(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn ArticleStorage> {
        &self.storage
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Stages `record` for writing and reports whether it is new.
    ///
    /// The returned outcome is provisional until the batch holding the record
    /// is flushed; the flush that writes it reports it in its
    /// [`FlushReport`]. When the buffer reaches the batch size the flush
    /// happens here and its report is returned alongside.
    pub async fn save(&mut self, mut record: ArticleRecord) -> Result<(SaveOutcome, Option<FlushReport>)> {
        let now = Utc::now();

        if let Some(&idx) = self.pending_index.get(&record.url) {
            let (staged, _) = &mut self.pending[idx];
            staged.overwrite_from(&record);
            staged.updated_at = Some(now);
            debug!(url = %record.url, "replaced staged article");
            return Ok((SaveOutcome::Updated, None));
        }

        let outcome = match self.storage.find_by_url(&record.url).await? {
            Some(existing) => {
                record.created_at = existing.created_at.or(Some(now));
                SaveOutcome::Updated
            }
            None => {
                record.created_at = Some(now);
                SaveOutcome::Inserted
            }
        };
        record.updated_at = Some(now);

        self.pending_index.insert(record.url.clone(), self.pending.len());
        self.pending.push((record, outcome));

        let report = if self.pending.len() >= self.batch_size {
            Some(self.flush().await?)
        } else {
            None
        };
        Ok((outcome, report))
    }

    /// Writes everything staged so far as one batch.
    ///
    /// On failure the batch is dropped and the error names every URL it held.
    pub async fn flush(&mut self) -> Result<FlushReport> {
        if self.pending.is_empty() {
            return Ok(FlushReport::default());
        }

        let batch = std::mem::take(&mut self.pending);
        self.pending_index.clear();

        let records: Vec<ArticleRecord> = batch.iter().map(|(r, _)| r.clone()).collect();
        if let Err(e) = self.storage.upsert_batch(&records).await {
            warn!(count = records.len(), error = %e, "batch write failed");
            return Err(Error::BatchWrite {
                urls: records.into_iter().map(|r| r.url).collect(),
                reason: e.to_string(),
            });
        }

        let mut report = FlushReport::default();
        for (_, outcome) in &batch {
            report.add(*outcome);
        }
        debug!(inserted = report.inserted, updated = report.updated, "flushed batch");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use nc_core::ArticleQuery;

    fn record(n: usize) -> ArticleRecord {
        ArticleRecord::new(
            format!("https://news.test/{}", n),
            "test",
            format!("Story {}", n),
            Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_flushes_every_batch_size_records() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut store = UpsertStore::with_batch_size(storage.clone(), 2);

        let (outcome, report) = store.save(record(1)).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Inserted);
        assert!(report.is_none());
        assert_eq!(storage.count().await.unwrap(), 0);

        let (_, report) = store.save(record(2)).await.unwrap();
        assert_eq!(report, Some(FlushReport { inserted: 2, updated: 0 }));
        assert_eq!(storage.count().await.unwrap(), 2);

        store.save(record(3)).await.unwrap();
        assert_eq!(store.pending(), 1);
        assert_eq!(store.flush().await.unwrap().inserted, 1);
        assert_eq!(store.flush().await.unwrap(), FlushReport::default());
    }

    #[tokio::test]
    async fn test_second_save_is_update_and_keeps_created_at() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut store = UpsertStore::with_batch_size(storage.clone(), 1);

        store.save(record(1)).await.unwrap();
        let first = storage.find_by_url("https://news.test/1").await.unwrap().unwrap();

        let (outcome, report) = store.save(record(1).with_content("revised")).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Updated);
        assert_eq!(report, Some(FlushReport { inserted: 0, updated: 1 }));

        let second = storage.find_by_url("https://news.test/1").await.unwrap().unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.content.as_deref(), Some("revised"));
        assert_eq!(storage.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_within_pending_batch_is_merged() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut store = UpsertStore::with_batch_size(storage.clone(), 10);

        store.save(record(1)).await.unwrap();
        let (outcome, _) = store.save(record(1).with_reporter("Chen")).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Updated);
        assert_eq!(store.pending(), 1);

        let report = store.flush().await.unwrap();
        assert_eq!(report, FlushReport { inserted: 1, updated: 0 });
        let stored = storage.find_by_url("https://news.test/1").await.unwrap().unwrap();
        assert_eq!(stored.reporter.as_deref(), Some("Chen"));
    }

    #[tokio::test]
    async fn test_recrawl_by_another_source_keeps_first_source() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut store = UpsertStore::with_batch_size(storage.clone(), 1);
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();

        store.save(ArticleRecord::new("https://x.test/1", "ltn", "Rents up", at)).await.unwrap();
        let (outcome, _) = store
            .save(ArticleRecord::new("https://x.test/1", "udn", "Rents up again", at))
            .await
            .unwrap();

        assert_eq!(outcome, SaveOutcome::Updated);
        let stored = storage.find_by_url("https://x.test/1").await.unwrap().unwrap();
        assert_eq!(stored.source, "ltn");
        assert_eq!(stored.title, "Rents up again");
        assert_eq!(storage.get_by_source("udn").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_staged_record_keeps_first_source() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut store = UpsertStore::with_batch_size(storage.clone(), 10);
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();

        store.save(ArticleRecord::new("https://x.test/1", "ltn", "Rents up", at)).await.unwrap();
        store.save(ArticleRecord::new("https://x.test/1", "udn", "Rents up", at)).await.unwrap();
        store.flush().await.unwrap();

        let stored = storage.find_by_url("https://x.test/1").await.unwrap().unwrap();
        assert_eq!(stored.source, "ltn");
    }

    struct BrokenStorage;

    #[async_trait]
    impl ArticleStorage for BrokenStorage {
        async fn find_by_url(&self, _url: &str) -> Result<Option<ArticleRecord>> {
            Ok(None)
        }

        async fn upsert_batch(&self, _records: &[ArticleRecord]) -> Result<()> {
            Err(Error::Database("database is locked".into()))
        }

        async fn get_by_source(&self, _source: &str) -> Result<Vec<ArticleRecord>> {
            Ok(Vec::new())
        }

        async fn search(&self, _query: &ArticleQuery) -> Result<Vec<ArticleRecord>> {
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_failed_flush_names_every_url() {
        let mut store = UpsertStore::with_batch_size(Arc::new(BrokenStorage), 3);
        store.save(record(1)).await.unwrap();
        store.save(record(2)).await.unwrap();

        match store.flush().await {
            Err(Error::BatchWrite { urls, reason }) => {
                assert_eq!(urls, ["https://news.test/1", "https://news.test/2"]);
                assert!(reason.contains("database is locked"));
            }
            other => panic!("expected batch write error, got {:?}", other),
        }
        assert_eq!(store.pending(), 0);
    }
}
