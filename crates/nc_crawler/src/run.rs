use nc_core::{ArticleStorage, ContentSanitizer, CrawlResult, DateWindow, SetupError};
use nc_storage::{UpsertStore, DEFAULT_BATCH_SIZE};
use std::sync::Arc;
use std::time::Duration;

use crate::browser::{BrowserSession, DriverLauncher, SessionConfig};
use crate::extractor::PageExtractor;
use crate::logging::Logger;
use crate::pagination::{apply_report, record_save_error, CancelFlag, PaginationController};

/// Knobs shared by every run started from one configuration.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub session: SessionConfig,
    pub batch_size: usize,
    pub request_delay: Duration,
    /// Phrases stripped from every source, on top of the extractor's own.
    pub ad_phrases: Vec<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            request_delay: Duration::ZERO,
            ad_phrases: Vec::new(),
        }
    }
}

/// One crawl of one source over one date window.
///
/// Runs may execute concurrently against the same storage; each opens its
/// own session and write buffer.
pub struct CrawlRun {
    launcher: Arc<dyn DriverLauncher>,
    storage: Arc<dyn ArticleStorage>,
    options: CrawlOptions,
    cancel: CancelFlag,
}

impl CrawlRun {
    pub fn new(launcher: Arc<dyn DriverLauncher>, storage: Arc<dyn ArticleStorage>) -> Self {
        Self {
            launcher,
            storage,
            options: CrawlOptions::default(),
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_options(mut self, options: CrawlOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Crawls `extractor` and reports what happened.
    ///
    /// Only a driver that cannot start is an error; every other failure is
    /// listed in the returned result. The session is closed on all paths.
    pub async fn execute(
        &self,
        extractor: &dyn PageExtractor,
        window: DateWindow,
        max_pages: u32,
    ) -> Result<CrawlResult, SetupError> {
        let log = Logger::for_source(extractor.source());
        let window = window.with_offset(extractor.utc_offset());
        log.info(&format!(
            "starting crawl: window {:?}..={:?}, max {} page(s)",
            window.start(),
            window.end(),
            max_pages
        ));

        let mut session = match BrowserSession::open(self.launcher.as_ref(), &self.options.session).await {
            Ok(session) => session,
            Err(e) => {
                log.error(&format!("browser session failed to start: {}", e));
                return Err(e);
            }
        };

        let mut result = CrawlResult::new(extractor.source());
        let mut store = UpsertStore::with_batch_size(self.storage.clone(), self.options.batch_size);
        let mut controller = PaginationController::new(window, max_pages)
            .with_request_delay(self.options.request_delay)
            .with_sanitizer(ContentSanitizer::new(self.options.ad_phrases.iter().cloned()))
            .with_cancel_flag(self.cancel.clone());

        controller
            .run(extractor, &mut session, &mut store, &mut result)
            .await;

        match store.flush().await {
            Ok(report) => apply_report(&mut result, report),
            Err(e) => record_save_error(&mut result, extractor.source(), e),
        }

        if let Err(e) = session.close().await {
            log.warn(&format!("failed to close browser session: {}", e));
        }

        log.info(&format!(
            "finished: {} fetched, {} inserted, {} updated, {} skipped, {} error(s), stop {:?}",
            result.fetched,
            result.inserted,
            result.updated,
            result.skipped,
            result.errors.len(),
            result.stop_reason
        ));
        Ok(result)
    }
}
