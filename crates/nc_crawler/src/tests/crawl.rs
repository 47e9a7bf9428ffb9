use async_trait::async_trait;
use nc_core::{
    ArticleQuery, ArticleRecord, ArticleStorage, DateWindow, Error, Result, StopReason,
};
use nc_storage::{InMemoryStorage, SqliteStorage};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::common::{at, url, CrawlHarness, FailingLauncher, Scripted, ScriptedExtractor};
use crate::cli::{crawl_sources, CommandContext};
use crate::config::CrawlerConfig;
use crate::extractor::PageExtractor;
use crate::run::CrawlRun;

fn three_articles(source: &str) -> ScriptedExtractor {
    let mut extractor = ScriptedExtractor::new(source);
    let stubs = vec![
        extractor.dated(1, at(2025, 1, 12, 8, 0)),
        extractor.dated(2, at(2025, 1, 11, 8, 0)),
        extractor.dated(3, at(2025, 1, 10, 8, 0)),
    ];
    extractor.page(stubs)
}

#[tokio::test]
async fn test_second_identical_run_only_updates() {
    let extractor = three_articles("test");
    let harness = CrawlHarness::new();

    let first = harness.run().execute(&extractor, DateWindow::unbounded(), 10).await.unwrap();
    assert_eq!((first.inserted, first.updated), (3, 0));

    let stored = harness.storage.find_by_url(&url(1)).await.unwrap().unwrap();

    let second = harness.run().execute(&extractor, DateWindow::unbounded(), 10).await.unwrap();
    assert_eq!((second.inserted, second.updated), (0, 3));
    assert_eq!(harness.storage.count().await.unwrap(), 3);

    let restored = harness.storage.find_by_url(&url(1)).await.unwrap().unwrap();
    assert_eq!(restored.created_at, stored.created_at);
    assert!(restored.updated_at >= stored.updated_at);
}

#[tokio::test]
async fn test_rerun_against_sqlite_keeps_one_row_per_url() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::new_with_path(&dir.path().join("articles.db")).await.unwrap();
    let harness = CrawlHarness::with_storage(Arc::new(storage));
    let extractor = three_articles("test");

    let first = harness.run().execute(&extractor, DateWindow::unbounded(), 10).await.unwrap();
    let second = harness.run().execute(&extractor, DateWindow::unbounded(), 10).await.unwrap();

    assert_eq!(first.inserted, 3);
    assert_eq!(second.updated, 3);
    assert_eq!(harness.storage.count().await.unwrap(), 3);
    assert_eq!(harness.storage.get_by_source("test").await.unwrap()[0].url, url(1));
}

#[tokio::test]
async fn test_setup_failure_aborts_before_any_work() {
    let storage: Arc<dyn ArticleStorage> = Arc::new(InMemoryStorage::new());
    let extractor = three_articles("test");

    let err = CrawlRun::new(Arc::new(FailingLauncher), storage.clone())
        .execute(&extractor, DateWindow::unbounded(), 10)
        .await
        .unwrap_err();

    assert_eq!(err.reason, "browser binary not found");
    assert!(extractor.requested_pages().is_empty());
    assert_eq!(storage.count().await.unwrap(), 0);
    assert!(Error::from(err).is_fatal());
}

#[tokio::test]
async fn test_session_is_closed_after_every_run() {
    let harness = CrawlHarness::new();
    let extractor = ScriptedExtractor::new("test").failing_page("boom").failing_page("boom");

    harness.run().execute(&extractor, DateWindow::unbounded(), 2).await.unwrap();
    harness.run().execute(&three_articles("test"), DateWindow::unbounded(), 2).await.unwrap();

    assert_eq!(harness.launcher.launches.load(Ordering::SeqCst), 2);
    assert_eq!(harness.quits(), 2);
}

#[tokio::test]
async fn test_content_is_sanitized_before_saving() {
    let mut extractor = ScriptedExtractor::new("ltn");
    extractor.ad_phrases = vec!["點我下載APP".into()];
    let stub = extractor.dated(1, at(2025, 1, 10, 8, 0)).with_image_url("https://img.test/1.jpg");
    let record = ArticleRecord::new(url(1), "", "  Housing   prices  ", at(2025, 1, 10, 8, 0))
        .with_content("Prices rose\n點我下載APP\nPrices rose\nSOCIAL FOOTER\nBuyers wait");
    extractor.script(1, Scripted::Article(record));
    let extractor = extractor.page(vec![stub]);

    let harness = CrawlHarness::new().ad_phrases(&["SOCIAL FOOTER"]);
    harness.run().execute(&extractor, DateWindow::unbounded(), 10).await.unwrap();

    let stored = harness.storage.find_by_url(&url(1)).await.unwrap().unwrap();
    assert_eq!(stored.title, "Housing prices");
    assert_eq!(stored.source, "ltn");
    assert_eq!(stored.content.as_deref(), Some("Prices rose\nBuyers wait"));
    assert_eq!(stored.description.as_deref(), Some("Prices rose Buyers wait"));
    assert_eq!(stored.image_url.as_deref(), Some("https://img.test/1.jpg"));
}

#[tokio::test]
async fn test_record_without_title_is_rejected() {
    let mut extractor = ScriptedExtractor::new("test");
    let stub = extractor.dated(1, at(2025, 1, 10, 8, 0));
    extractor.script(
        1,
        Scripted::Article(ArticleRecord::new(url(1), "test", "   ", at(2025, 1, 10, 8, 0))),
    );
    let extractor = extractor.page(vec![stub]);

    let harness = CrawlHarness::new();
    let result = harness.run().execute(&extractor, DateWindow::unbounded(), 10).await.unwrap();

    assert_eq!(result.fetched, 1);
    assert_eq!(result.saved(), 0);
    assert!(result.errors[0].reason.contains("no title"));
    assert_eq!(harness.storage.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancellation_keeps_flushed_work() {
    let harness = CrawlHarness::new();
    let mut extractor = ScriptedExtractor::new("test");
    let stubs: Vec<_> = (1..=4).map(|n| extractor.dated(n, at(2025, 1, 20 - n, 8, 0))).collect();
    extractor.cancel_after = Some((2, harness.cancel.clone()));
    let extractor = extractor.page(stubs);

    let result = harness.run().execute(&extractor, DateWindow::unbounded(), 10).await.unwrap();

    assert_eq!(result.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(result.fetched, 2);
    assert_eq!(result.inserted, 2);
    assert_eq!(harness.storage.count().await.unwrap(), 2);
    assert_eq!(harness.quits(), 1);
}

#[tokio::test]
async fn test_cancel_before_start_visits_nothing() {
    let harness = CrawlHarness::new();
    harness.cancel.cancel();
    let extractor = three_articles("test");

    let result = harness.run().execute(&extractor, DateWindow::unbounded(), 10).await.unwrap();

    assert_eq!(result.pages_visited, 0);
    assert_eq!(result.stop_reason, Some(StopReason::Cancelled));
    assert!(extractor.requested_pages().is_empty());
}

/// Accepts lookups but refuses every write.
struct ReadOnlyStorage;

#[async_trait]
impl ArticleStorage for ReadOnlyStorage {
    async fn find_by_url(&self, _url: &str) -> Result<Option<ArticleRecord>> {
        Ok(None)
    }

    async fn upsert_batch(&self, _records: &[ArticleRecord]) -> Result<()> {
        Err(Error::Database("attempt to write a readonly database".into()))
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
async fn test_failed_batches_name_every_lost_url() {
    let harness = CrawlHarness::with_storage(Arc::new(ReadOnlyStorage));
    let extractor = three_articles("test");

    let result = harness.run().execute(&extractor, DateWindow::unbounded(), 10).await.unwrap();

    assert_eq!(result.fetched, 3);
    assert_eq!(result.saved(), 0);
    let mut targets: Vec<_> = result.errors.iter().map(|f| f.target.clone()).collect();
    targets.sort();
    assert_eq!(targets, [url(1), url(2), url(3)]);
    assert!(result.errors.iter().all(|f| f.reason.contains("readonly")));
}

#[tokio::test]
async fn test_concurrent_runs_share_storage() {
    let storage: Arc<dyn ArticleStorage> = Arc::new(InMemoryStorage::new());
    let harness = CrawlHarness::with_storage(storage.clone());
    let ctx = CommandContext {
        config: CrawlerConfig {
            request_delay_ms: 0,
            ..CrawlerConfig::default()
        },
        registry: Default::default(),
        storage,
        launcher: harness.launcher.clone(),
        cancel: harness.cancel.clone(),
    };

    let mut second = ScriptedExtractor::new("other");
    let stubs = vec![second.dated(10, at(2025, 1, 5, 8, 0)), second.dated(11, at(2025, 1, 4, 8, 0))];
    let second = second.page(stubs);
    let extractors: Vec<Arc<dyn PageExtractor>> = vec![Arc::new(three_articles("test")), Arc::new(second)];

    let results = crawl_sources(&ctx, &extractors, DateWindow::unbounded(), 10).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].source, "test");
    assert_eq!(results[0].inserted, 3);
    assert_eq!(results[1].inserted, 2);
    assert_eq!(ctx.storage.count().await.unwrap(), 5);
    assert_eq!(harness.quits(), 2);
}
