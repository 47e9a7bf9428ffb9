use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use nc_core::{ArticleRecord, ArticleStub, Result};

use crate::browser::BrowserSession;

/// Site-specific capability set driven by the pagination controller.
///
/// Implementations only parse; navigation and retries go through the
/// session they are handed.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Source name recorded on every article this extractor produces.
    fn source(&self) -> &str;

    /// Boilerplate phrases stripped from this source's article bodies.
    fn ad_phrases(&self) -> &[String] {
        &[]
    }

    /// Offset in which this source's publication dates are local.
    fn utc_offset(&self) -> FixedOffset {
        Utc.fix()
    }

    /// Stubs on listing page `page` (1-based). Empty means no more pages.
    async fn list_page(&self, session: &mut BrowserSession, page: u32) -> Result<Vec<ArticleStub>>;

    /// Full article for `stub`, or `None` when the page has nothing usable.
    async fn fetch_article(&self, session: &mut BrowserSession, stub: &ArticleStub) -> Result<Option<ArticleRecord>>;
}
