use nc_core::{
    ArticleRecord, ArticleStub, ContentSanitizer, CrawlFailure, CrawlResult, DateWindow, Error,
    StopReason,
};
use nc_storage::{FlushReport, UpsertStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::browser::BrowserSession;
use crate::extractor::PageExtractor;
use crate::logging::Logger;

pub const DEFAULT_MAX_PAGES: u32 = 10;

/// Cooperative stop signal shared between a caller and running crawls.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Walks an extractor's listing pages and feeds in-window articles to the store.
///
/// Pagination ends on the first empty page, on `max_pages`, on cancellation,
/// or once every dated new stub on a page is older than the window start.
/// That last rule assumes the source lists articles newest first
/// (non-increasing `published_at`); a source that does not will be cut short.
///
/// Stubs are deduplicated by URL for the lifetime of the controller, so one
/// controller serves exactly one run.
pub struct PaginationController {
    window: DateWindow,
    max_pages: u32,
    request_delay: Duration,
    sanitizer: ContentSanitizer,
    cancel: CancelFlag,
    seen: HashSet<String>,
}

impl PaginationController {
    pub fn new(window: DateWindow, max_pages: u32) -> Self {
        Self {
            window,
            max_pages,
            request_delay: Duration::ZERO,
            sanitizer: ContentSanitizer::default(),
            cancel: CancelFlag::default(),
            seen: HashSet::new(),
        }
    }

    /// Pause after each article fetch.
    pub fn with_request_delay(mut self, request_delay: Duration) -> Self {
        self.request_delay = request_delay;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: ContentSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn window(&self) -> &DateWindow {
        &self.window
    }

    pub async fn run(
        &mut self,
        extractor: &dyn PageExtractor,
        session: &mut BrowserSession,
        store: &mut UpsertStore,
        result: &mut CrawlResult,
    ) {
        let log = Logger::for_source(extractor.source());
        let sanitizer = self.sanitizer.extended(extractor.ad_phrases().iter().cloned());

        for page in 1..=self.max_pages {
            if self.cancel.is_cancelled() {
                result.stop_reason = Some(StopReason::Cancelled);
                return;
            }
            result.pages_visited += 1;

            let stubs = match extractor.list_page(session, page).await {
                Ok(stubs) => stubs,
                Err(e) => {
                    log.warn(&format!("page {} failed: {}", page, e));
                    result.record_failure(CrawlFailure::page(page, e));
                    continue;
                }
            };
            if stubs.is_empty() {
                log.info(&format!("page {} is empty, stopping", page));
                result.stop_reason = Some(StopReason::EmptyPage);
                return;
            }

            let fresh: Vec<ArticleStub> = stubs
                .into_iter()
                .filter(|stub| self.seen.insert(stub.url.clone()))
                .collect();
            let exhausted = self.page_exhausted(&fresh);
            log.debug(&format!("page {}: {} new stub(s)", page, fresh.len()));

            for stub in &fresh {
                if self.cancel.is_cancelled() {
                    result.stop_reason = Some(StopReason::Cancelled);
                    return;
                }
                if stub.published_at.is_some() && !self.window.includes(stub.published_at.as_ref()) {
                    result.skipped += 1;
                    continue;
                }

                self.process_stub(extractor, session, store, &sanitizer, stub, result, &log)
                    .await;

                if !self.request_delay.is_zero() {
                    tokio::time::sleep(self.request_delay).await;
                }
            }

            if exhausted {
                log.info(&format!("page {} is older than the window, stopping", page));
                result.stop_reason = Some(StopReason::Exhausted);
                return;
            }
        }

        result.stop_reason = Some(StopReason::MaxPages);
    }

    fn page_exhausted(&self, stubs: &[ArticleStub]) -> bool {
        let mut dated = stubs.iter().filter_map(|s| s.published_at.as_ref()).peekable();
        dated.peek().is_some() && dated.all(|ts| self.window.precedes_start(ts))
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_stub(
        &self,
        extractor: &dyn PageExtractor,
        session: &mut BrowserSession,
        store: &mut UpsertStore,
        sanitizer: &ContentSanitizer,
        stub: &ArticleStub,
        result: &mut CrawlResult,
        log: &Logger,
    ) {
        let record = match extractor.fetch_article(session, stub).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                log.warn(&format!("no article extracted from {}", stub.url));
                result.record_failure(CrawlFailure::new(&stub.url, "extractor returned no article"));
                return;
            }
            Err(e) => {
                log.warn(&format!("failed to fetch {}: {}", stub.url, e));
                result.record_failure(CrawlFailure::new(&stub.url, e));
                return;
            }
        };
        result.fetched += 1;

        if !self.window.includes(Some(&record.published_at)) {
            log.debug(&format!("{} is outside the window", stub.url));
            result.skipped += 1;
            return;
        }

        let record = match self.prepare(record, stub, extractor.source(), sanitizer) {
            Ok(record) => record,
            Err(e) => {
                result.record_failure(CrawlFailure::new(&stub.url, e));
                return;
            }
        };

        match store.save(record).await {
            Ok((_, Some(report))) => apply_report(result, report),
            Ok((_, None)) => {}
            Err(e) => record_save_error(result, &stub.url, e),
        }
    }

    fn prepare(
        &self,
        mut record: ArticleRecord,
        stub: &ArticleStub,
        source: &str,
        sanitizer: &ContentSanitizer,
    ) -> Result<ArticleRecord, Error> {
        record.merge_stub(stub);
        if record.url.is_empty() {
            record.url = stub.url.clone();
        }
        if record.source.is_empty() {
            record.source = source.to_string();
        }
        sanitizer.sanitize_record(&mut record);
        if record.title.is_empty() {
            return Err(Error::Extraction("article has no title".to_string()));
        }
        Ok(record)
    }
}

pub(crate) fn apply_report(result: &mut CrawlResult, report: FlushReport) {
    result.inserted += report.inserted;
    result.updated += report.updated;
}

/// Attributes a persistence failure to every URL it lost.
pub(crate) fn record_save_error(result: &mut CrawlResult, url: &str, error: Error) {
    match error {
        Error::BatchWrite { urls, reason } => {
            for lost in urls {
                result.record_failure(CrawlFailure::new(lost, format!("batch write failed: {}", reason)));
            }
        }
        other => result.record_failure(CrawlFailure::new(url, other)),
    }
}
