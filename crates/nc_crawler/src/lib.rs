pub mod browser;
pub mod cli;
pub mod config;
pub mod extractor;
pub mod logging;
pub mod pagination;
pub mod registry;
pub mod retry;
pub mod run;
pub mod selector;


pub use browser::{
    BrowserSession, Document, DriverLauncher, HttpLauncher, PageDriver, Readiness, SessionConfig,
    SessionState,
};
pub use cli::{handle_command, CommandContext, CrawlerCommands};
pub use config::{CrawlerConfig, SourceDefinition};
pub use extractor::PageExtractor;
pub use logging::{init_logging, Logger};
pub use pagination::{CancelFlag, PaginationController};
pub use registry::ExtractorRegistry;
pub use retry::{ExponentialBackoff, RetryPolicy};
pub use run::{CrawlOptions, CrawlRun};
pub use selector::SelectorExtractor;

pub mod prelude {
    pub use super::browser::{BrowserSession, Readiness};
    pub use super::extractor::PageExtractor;
    pub use super::run::CrawlRun;
    pub use nc_core::{ArticleRecord, ArticleStub, CrawlResult, DateWindow, Error, Result};
}
