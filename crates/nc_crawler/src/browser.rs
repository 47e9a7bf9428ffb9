//! Page fetching behind a single owned driver handle.
//!
//! A [`BrowserSession`] is the only thing allowed to touch its driver. It is
//! not shared between concurrent crawl runs; each run opens its own.

use async_trait::async_trait;
use nc_core::{Error, Result, SetupError};
use scraper::{Html, Selector};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A loaded page: its final URL and the HTML at the time of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    url: String,
    html: String,
}

impl Document {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Parsed DOM. Not `Send`, so keep it out of `.await` spans.
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }

    pub fn has_element(&self, selector: &str) -> Result<bool> {
        let selector = parse_selector(selector)?;
        Ok(self.parse().select(&selector).next().is_some())
    }
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::Config(format!("Invalid selector '{}': {}", selector, e)))
}

/// Signal that a navigated page has settled enough to be read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Readiness {
    /// The document has a non-empty body.
    #[default]
    DocumentComplete,
    /// A CSS selector that must match at least one element.
    Marker(String),
}

impl Readiness {
    pub fn marker(selector: impl Into<String>) -> Self {
        Readiness::Marker(selector.into())
    }

    pub fn from_marker(selector: Option<&str>) -> Self {
        selector.map_or(Readiness::DocumentComplete, Readiness::marker)
    }

    pub fn is_ready(&self, document: &Document) -> Result<bool> {
        match self {
            Readiness::DocumentComplete => Ok(!document.html().trim().is_empty()),
            Readiness::Marker(selector) => document.has_element(selector),
        }
    }
}

/// The automation handle a session drives.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Current state of the page last navigated to.
    async fn snapshot(&mut self) -> Result<Document>;

    /// Release the handle. `Error::Disconnected` means it was already gone.
    async fn quit(&mut self) -> Result<()>;
}

/// Starts drivers. A launch failure is fatal for the crawl run.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self, config: &SessionConfig) -> std::result::Result<Box<dyn PageDriver>, SetupError>;
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Plain HTTP driver: navigation is a GET and the snapshot is the body.
pub struct HttpDriver {
    client: reqwest::Client,
    current: Option<Document>,
}

impl HttpDriver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, current: None }
    }
}

#[async_trait]
impl PageDriver for HttpDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.current = None;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = response.url().to_string();
        let html = response.text().await?;
        self.current = Some(Document::new(final_url, html));
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<Document> {
        self.current
            .clone()
            .ok_or_else(|| Error::Navigation("no page loaded".to_string()))
    }

    async fn quit(&mut self) -> Result<()> {
        self.current = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpLauncher;

#[async_trait]
impl DriverLauncher for HttpLauncher {
    async fn launch(&self, config: &SessionConfig) -> std::result::Result<Box<dyn PageDriver>, SetupError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SetupError::new(format!("failed to build HTTP client: {}", e)))?;
        Ok(Box::new(HttpDriver::new(client)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Owns one driver for the lifetime of a crawl run.
///
/// `Uninitialized → Ready → Closed`. `fetch` needs `Ready`; `close` is valid
/// from any state and idempotent. A session dropped while still holding its
/// driver spawns the shutdown on the current tokio runtime.
pub struct BrowserSession {
    driver: Option<Box<dyn PageDriver>>,
    state: SessionState,
    policy: RetryPolicy,
}

impl Default for BrowserSession {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl BrowserSession {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            driver: None,
            state: SessionState::Uninitialized,
            policy,
        }
    }

    /// Launches a driver and returns a `Ready` session.
    pub async fn open(launcher: &dyn DriverLauncher, config: &SessionConfig) -> std::result::Result<Self, SetupError> {
        let mut session = Self::new(config.retry);
        session.start(launcher, config).await?;
        Ok(session)
    }

    pub async fn start(&mut self, launcher: &dyn DriverLauncher, config: &SessionConfig) -> std::result::Result<(), SetupError> {
        if self.state != SessionState::Uninitialized {
            return Err(SetupError::new(format!("session is already {}", self.state)));
        }
        let driver = launcher.launch(config).await?;
        self.attach(driver);
        Ok(())
    }

    /// Wraps an already running driver.
    pub fn with_driver(driver: Box<dyn PageDriver>, policy: RetryPolicy) -> Self {
        let mut session = Self::new(policy);
        session.attach(driver);
        session
    }

    fn attach(&mut self, driver: Box<dyn PageDriver>) {
        self.driver = Some(driver);
        self.state = SessionState::Ready;
        debug!("browser session ready");
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// [`fetch`](Self::fetch) with the session's own retry policy.
    pub async fn get(&mut self, url: &str, readiness: &Readiness) -> Result<Document> {
        let policy = self.policy;
        self.fetch(url, &policy, readiness).await
    }

    /// Navigates to `url` and waits for `readiness`, retrying transient
    /// failures with backoff. Exhaustion yields `Error::FetchTimeout`.
    pub async fn fetch(&mut self, url: &str, policy: &RetryPolicy, readiness: &Readiness) -> Result<Document> {
        let driver = match (self.state, self.driver.as_mut()) {
            (SessionState::Ready, Some(driver)) => driver,
            (SessionState::Closed, _) => return Err(Error::SessionUnavailable("closed")),
            _ => return Err(Error::SessionUnavailable("not started")),
        };

        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match fetch_once(driver.as_mut(), url, policy, readiness).await {
                Ok(document) => {
                    debug!(url, attempt, "page ready");
                    return Ok(document);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if attempt >= max_attempts {
                        warn!(url, attempt, error = %e, "giving up on page");
                        return Err(Error::FetchTimeout {
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = policy.backoff.delay(attempt - 1);
                    warn!(url, attempt, error = %e, ?delay, "fetch attempt failed, retrying");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Releases the driver once. Safe to call repeatedly and from any state.
    pub async fn close(&mut self) -> Result<()> {
        self.state = SessionState::Closed;
        let Some(mut driver) = self.driver.take() else {
            return Ok(());
        };
        match driver.quit().await {
            Ok(()) => {
                info!("browser session closed");
                Ok(())
            }
            Err(Error::Disconnected(reason)) => {
                debug!(%reason, "driver already disconnected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = driver.quit().await {
                        warn!(error = %e, "driver cleanup on drop failed");
                    }
                });
            }
            Err(_) => warn!("browser session dropped outside a runtime; driver not quit"),
        }
    }
}

async fn fetch_once(driver: &mut dyn PageDriver, url: &str, policy: &RetryPolicy, readiness: &Readiness) -> Result<Document> {
    let deadline = Instant::now() + policy.ready_timeout;

    match timeout(policy.ready_timeout, driver.navigate(url)).await {
        Ok(result) => result?,
        Err(_) => return Err(Error::Navigation(format!("navigation to {} timed out", url))),
    }

    loop {
        let document = driver.snapshot().await?;
        if readiness.is_ready(&document)? {
            return Ok(document);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Navigation(format!(
                "{} not ready after {:?}",
                url, policy.ready_timeout
            )));
        }
        sleep(policy.poll_interval.min(deadline - now)).await;
    }
}
