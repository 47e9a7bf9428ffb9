pub mod date_window;
pub mod error;
pub mod sanitizer;
pub mod storage;
pub mod types;

pub use date_window::DateWindow;
pub use error::{Error, Result, SetupError};
pub use sanitizer::ContentSanitizer;
pub use storage::{ArticleQuery, ArticleStorage};
pub use types::{
    ArticleRecord, ArticleStub, CrawlFailure, CrawlResult, SaveOutcome, StopReason,
};

pub mod prelude {
    pub use super::{
        ArticleRecord, ArticleStorage, ArticleStub, CrawlResult, DateWindow, Error, Result,
    };
}
