use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use nc_core::{ArticleRecord, ArticleStorage, ArticleStub, Error, Result, SetupError};
use nc_storage::InMemoryStorage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::browser::{BrowserSession, Document, DriverLauncher, PageDriver, Readiness, SessionConfig};
use crate::extractor::PageExtractor;
use crate::pagination::CancelFlag;
use crate::retry::{ExponentialBackoff, RetryPolicy};
use crate::run::{CrawlOptions, CrawlRun};

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn url(n: u32) -> String {
    format!("https://news.test/articles/{}", n)
}

/// Driver that serves a blank page for every URL and counts quits.
pub struct StubDriver {
    current: Option<Document>,
    quits: Arc<AtomicUsize>,
}

#[async_trait]
impl PageDriver for StubDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.current = Some(Document::new(url, "<html><body>ok</body></html>"));
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<Document> {
        self.current.clone().ok_or_else(|| Error::Navigation("nothing loaded".into()))
    }

    async fn quit(&mut self) -> Result<()> {
        self.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct StubLauncher {
    pub launches: AtomicUsize,
    pub quits: Arc<AtomicUsize>,
}

#[async_trait]
impl DriverLauncher for StubLauncher {
    async fn launch(&self, _config: &SessionConfig) -> std::result::Result<Box<dyn PageDriver>, SetupError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubDriver {
            current: None,
            quits: self.quits.clone(),
        }))
    }
}

pub struct FailingLauncher;

#[async_trait]
impl DriverLauncher for FailingLauncher {
    async fn launch(&self, _config: &SessionConfig) -> std::result::Result<Box<dyn PageDriver>, SetupError> {
        Err(SetupError::new("browser binary not found"))
    }
}

/// What `fetch_article` yields for one URL.
#[derive(Clone)]
pub enum Scripted {
    Article(ArticleRecord),
    Nothing,
    Fails(String),
}

/// Extractor serving scripted listing pages and articles.
///
/// Listing and article requests still go through the session so retries and
/// lifecycle are exercised. Pages past the script are empty.
#[derive(Default)]
pub struct ScriptedExtractor {
    pub source: String,
    pub pages: Vec<Result<Vec<ArticleStub>>>,
    pub articles: HashMap<String, Scripted>,
    pub ad_phrases: Vec<String>,
    pub requested_pages: Mutex<Vec<u32>>,
    pub fetches: Mutex<HashMap<String, usize>>,
    /// Raised after the given number of article fetches.
    pub cancel_after: Option<(usize, CancelFlag)>,
}

impl ScriptedExtractor {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    pub fn page(mut self, stubs: Vec<ArticleStub>) -> Self {
        self.pages.push(Ok(stubs));
        self
    }

    pub fn failing_page(mut self, reason: &str) -> Self {
        self.pages.push(Err(Error::Navigation(reason.to_string())));
        self
    }

    /// Listing stub plus a matching article published at `published_at`.
    pub fn dated(&mut self, n: u32, published_at: DateTime<Utc>) -> ArticleStub {
        self.article(n, published_at);
        ArticleStub::new(url(n))
            .with_title(format!("Story {}", n))
            .with_published_at(published_at)
    }

    pub fn article(&mut self, n: u32, published_at: DateTime<Utc>) {
        let record = ArticleRecord::new(url(n), &self.source, format!("Story {}", n), published_at)
            .with_content(format!("Body of story {}", n));
        self.articles.insert(url(n), Scripted::Article(record));
    }

    pub fn script(&mut self, n: u32, outcome: Scripted) {
        self.articles.insert(url(n), outcome);
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested_pages.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PageExtractor for ScriptedExtractor {
    fn source(&self) -> &str {
        &self.source
    }

    fn ad_phrases(&self) -> &[String] {
        &self.ad_phrases
    }

    async fn list_page(&self, session: &mut BrowserSession, page: u32) -> Result<Vec<ArticleStub>> {
        self.requested_pages.lock().unwrap().push(page);
        session
            .get(&format!("https://news.test/list/{}", page), &Readiness::DocumentComplete)
            .await?;
        match self.pages.get(page as usize - 1) {
            Some(Ok(stubs)) => Ok(stubs.clone()),
            Some(Err(e)) => Err(Error::Navigation(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_article(&self, session: &mut BrowserSession, stub: &ArticleStub) -> Result<Option<ArticleRecord>> {
        let fetched = {
            let mut fetches = self.fetches.lock().unwrap();
            *fetches.entry(stub.url.clone()).or_default() += 1;
            fetches.values().sum::<usize>()
        };
        if let Some((limit, flag)) = &self.cancel_after {
            if fetched >= *limit {
                flag.cancel();
            }
        }

        session.get(&stub.url, &Readiness::DocumentComplete).await?;
        match self.articles.get(&stub.url) {
            Some(Scripted::Article(record)) => Ok(Some(record.clone())),
            Some(Scripted::Nothing) | None => Ok(None),
            Some(Scripted::Fails(reason)) => Err(Error::Extraction(reason.clone())),
        }
    }
}

pub fn fast_options() -> CrawlOptions {
    let retry = RetryPolicy::default()
        .with_max_attempts(2)
        .with_backoff(ExponentialBackoff::new(1, 2).with_jitter(0))
        .with_ready_timeout(Duration::from_millis(50))
        .with_poll_interval(Duration::from_millis(5));
    CrawlOptions {
        session: SessionConfig {
            retry,
            ..SessionConfig::default()
        },
        batch_size: 2,
        ..CrawlOptions::default()
    }
}

/// Storage, launcher and options shared by the runs of one test.
pub struct CrawlHarness {
    pub storage: Arc<dyn ArticleStorage>,
    pub launcher: Arc<StubLauncher>,
    pub options: CrawlOptions,
    pub cancel: CancelFlag,
}

impl CrawlHarness {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(InMemoryStorage::new()))
    }

    pub fn with_storage(storage: Arc<dyn ArticleStorage>) -> Self {
        Self {
            storage,
            launcher: Arc::new(StubLauncher::default()),
            options: fast_options(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn ad_phrases(mut self, phrases: &[&str]) -> Self {
        self.options.ad_phrases = phrases.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn run(&self) -> CrawlRun {
        CrawlRun::new(self.launcher.clone(), self.storage.clone())
            .with_options(self.options.clone())
            .with_cancel_flag(self.cancel.clone())
    }

    pub fn quits(&self) -> usize {
        self.launcher.quits.load(Ordering::SeqCst)
    }
}
