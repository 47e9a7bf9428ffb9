use anyhow::Context;
use clap::Parser;
use nc_core::{ArticleStorage, Error};
use nc_crawler::{handle_command, init_logging, CommandContext, CrawlerCommands, CrawlerConfig, HttpLauncher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Date-bounded news crawler", long_about = None)]
pub struct Cli {
    /// Crawler configuration (YAML); the built-in sources are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Storage backend: sqlite or memory
    #[arg(long, global = true, default_value = "sqlite")]
    storage: String,
    /// Database file for the sqlite backend
    #[arg(long, global = true, default_value = "articles.db")]
    db: String,
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: CrawlerCommands,
}

async fn check_storage_with_retry(
    storage: &Arc<dyn ArticleStorage>,
    storage_type: &str,
    max_retries: u32,
    timeout: Duration,
) -> nc_core::Result<()> {
    let mut retries = 0;
    loop {
        let err = match tokio::time::timeout(timeout, storage.count()).await {
            Ok(Ok(count)) => {
                info!("Storage backend ready (using {}, {} article(s))", storage_type, count);
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(elapsed) => Error::Storage(format!("Storage health check timed out: {}", elapsed)),
        };
        retries += 1;
        if retries >= max_retries {
            return Err(err);
        }
        warn!("Storage health check failed ({}), retrying {}/{}...", err, retries, max_retries);
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = CrawlerConfig::load(cli.config.as_deref())
        .with_context(|| format!("failed to load config {:?}", cli.config))?;

    let storage = nc_storage::create_storage(&cli.storage, Some(&cli.db))
        .await
        .with_context(|| format!("failed to open {} storage", cli.storage))?;
    check_storage_with_retry(&storage, &cli.storage, 3, Duration::from_secs(10)).await?;

    let ctx = CommandContext::new(config, storage, Arc::new(HttpLauncher))?;

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing current article and stopping");
            cancel.cancel();
        }
    });

    handle_command(cli.command, &ctx).await?;
    Ok(())
}
