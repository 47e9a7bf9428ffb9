use clap::Subcommand;
use futures::future::join_all;
use nc_core::{ArticleQuery, ArticleStorage, CrawlResult, DateWindow, Error, Result};
use std::sync::Arc;

use crate::browser::DriverLauncher;
use crate::config::CrawlerConfig;
use crate::extractor::PageExtractor;
use crate::logging::Logger;
use crate::pagination::CancelFlag;
use crate::registry::ExtractorRegistry;
use crate::run::CrawlRun;

/// Failures listed per source in printed crawl results.
const MAX_REPORTED_ERRORS: usize = 20;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CrawlerCommands {
    /// Crawl one source, or every configured source with --all
    Crawl {
        /// Source name as listed by `sources`
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        source: Option<String>,
        #[arg(long)]
        all: bool,
        /// First publication date to keep (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Last publication date to keep (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
        /// Listing pages to visit at most; defaults to the config value
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// List configured sources
    Sources,
    /// Browse stored articles, newest first
    Articles {
        #[arg(long)]
        source: Option<String>,
        /// Case-insensitive match on title or content
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

/// Everything a command needs, assembled once by the binary.
pub struct CommandContext {
    pub config: CrawlerConfig,
    pub registry: ExtractorRegistry,
    pub storage: Arc<dyn ArticleStorage>,
    pub launcher: Arc<dyn DriverLauncher>,
    pub cancel: CancelFlag,
}

impl CommandContext {
    pub fn new(config: CrawlerConfig, storage: Arc<dyn ArticleStorage>, launcher: Arc<dyn DriverLauncher>) -> Result<Self> {
        let registry = ExtractorRegistry::from_config(&config)?;
        Ok(Self {
            config,
            registry,
            storage,
            launcher,
            cancel: CancelFlag::default(),
        })
    }

    fn crawl_run(&self) -> CrawlRun {
        CrawlRun::new(self.launcher.clone(), self.storage.clone())
            .with_options(self.config.crawl_options())
            .with_cancel_flag(self.cancel.clone())
    }
}

pub async fn handle_command(command: CrawlerCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        CrawlerCommands::Crawl {
            source,
            all,
            start,
            end,
            max_pages,
        } => {
            let window = DateWindow::parse(start.as_deref(), end.as_deref())?;
            let max_pages = max_pages.unwrap_or(ctx.config.max_pages);
            let extractors = if all {
                ctx.registry.all().cloned().collect()
            } else {
                let name = source.ok_or_else(|| Error::Config("a source name or --all is required".to_string()))?;
                vec![ctx.registry.get(&name)?]
            };

            let results = crawl_sources(ctx, &extractors, window, max_pages).await?;
            let printable: Vec<CrawlResult> = results.iter().map(|r| r.truncated(MAX_REPORTED_ERRORS)).collect();
            if let [single] = printable.as_slice() {
                println!("{}", serde_json::to_string_pretty(single)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&printable)?);
            }
        }
        CrawlerCommands::Sources => {
            println!("Available sources:");
            for extractor in ctx.registry.all() {
                let listing = ctx
                    .config
                    .source(extractor.source())
                    .map(|s| s.list_url.as_str())
                    .unwrap_or("-");
                println!("  {:<12} {}", extractor.source(), listing);
            }
        }
        CrawlerCommands::Articles {
            source,
            keyword,
            category,
            start,
            end,
            limit,
            offset,
        } => {
            let query = ArticleQuery {
                keyword,
                source,
                category,
                window: DateWindow::parse(start.as_deref(), end.as_deref())?,
                limit: Some(limit),
                offset,
            };
            let articles = ctx.storage.search(&query).await?;
            for article in &articles {
                println!(
                    "{} [{}] {} - {}",
                    article.published_at.format("%Y-%m-%d %H:%M"),
                    article.source,
                    article.title,
                    article.url
                );
            }
            println!("{} article(s), {} stored in total", articles.len(), ctx.storage.count().await?);
        }
    }
    Ok(())
}

/// Runs every extractor concurrently, each with its own session.
///
/// All runs are awaited; if any could not start, the first such failure is
/// returned after the others have finished.
pub async fn crawl_sources(
    ctx: &CommandContext,
    extractors: &[Arc<dyn PageExtractor>],
    window: DateWindow,
    max_pages: u32,
) -> Result<Vec<CrawlResult>> {
    let runs = extractors.iter().map(|extractor| {
        let run = ctx.crawl_run();
        async move { run.execute(extractor.as_ref(), window, max_pages).await }
    });

    let mut results = Vec::new();
    let mut setup_failure = None;
    for (extractor, outcome) in extractors.iter().zip(join_all(runs).await) {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                Logger::for_source(extractor.source()).error(&format!("crawl aborted: {}", e));
                setup_failure.get_or_insert(e);
            }
        }
    }

    match setup_failure {
        Some(e) => Err(e.into()),
        None => Ok(results),
    }
}
