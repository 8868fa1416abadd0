//! Driver semantics on top of a page backend

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::element::ElementSnapshot;
use super::expect::ExpectationCondition;
use super::{Driver, NavigationEntry, Viewport};
use crate::error::{DriverError, DriverResult};

/// Page primitives a browser backend has to provide.
///
/// Every action reports the main-frame URL afterwards, so the driver sees
/// navigations caused by form submits, `onchange` handlers or redirects and
/// can keep the navigation history.
#[async_trait]
pub trait PageBackend: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<String>;
    async fn reload(&self) -> DriverResult<String>;
    async fn back(&self) -> DriverResult<String>;
    async fn forward(&self) -> DriverResult<String>;
    async fn click(&self, selector: &str) -> DriverResult<String>;
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<String>;
    async fn type_text(&self, selector: &str, text: &str) -> DriverResult<String>;
    async fn select(&self, selector: &str, values: &[String]) -> DriverResult<String>;

    /// Look up the first element matching `selector`
    async fn inspect(&self, selector: &str) -> DriverResult<Inspection>;

    async fn screenshot(&self, full_page: bool) -> DriverResult<Vec<u8>>;
    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()>;
    async fn viewport(&self) -> DriverResult<Viewport>;
    async fn url(&self) -> DriverResult<String>;
    async fn close(&self) -> DriverResult<()>;
}

/// Result of [`PageBackend::inspect`]
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    /// `None` when nothing matches
    pub element: Option<ElementSnapshot>,
    /// Main-frame URL at the time of the lookup
    pub url: String,
}

/// Timing knobs for a [`BrowserDriver`]
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Element waits and expectations
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub navigation_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// [`Driver`] implementation shared by every backend
pub struct BrowserDriver<P: PageBackend> {
    page: P,
    options: DriverOptions,
    history: Mutex<Vec<NavigationEntry>>,
    destroyed: AtomicBool,
}

impl<P: PageBackend> BrowserDriver<P> {
    pub fn new(page: P) -> Self {
        Self::with_options(page, DriverOptions::default())
    }

    pub fn with_options(page: P, options: DriverOptions) -> Self {
        Self {
            page,
            options,
            history: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    fn ensure_live(&self) -> DriverResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(DriverError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Append `url` unless it repeats the last entry. The blank page a
    /// fresh browser starts on is not a navigation.
    fn record(&self, url: String) {
        let mut history = self.history.lock();
        let repeated = match history.last() {
            Some(entry) => entry.url == url,
            None => url == "about:blank",
        };
        if repeated {
            return;
        }
        debug!("Navigated to {}", url);
        history.push(NavigationEntry {
            url,
            timestamp: Utc::now(),
        });
    }

    async fn inspect(&self, selector: &str) -> DriverResult<Option<ElementSnapshot>> {
        let inspection = self.page.inspect(selector).await?;
        self.record(inspection.url);
        Ok(inspection.element)
    }

    /// Poll until `selector` is present, returning its snapshot
    async fn locate(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<Option<ElementSnapshot>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.inspect(selector).await? {
                return Ok(Some(element));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(self.options.poll_interval).await;
        }
    }

    async fn require(&self, selector: &str) -> DriverResult<ElementSnapshot> {
        self.locate(selector, self.options.timeout)
            .await?
            .ok_or_else(|| DriverError::ElementNotFound {
                selector: selector.to_string(),
            })
    }
}

#[async_trait]
impl<P: PageBackend> Driver for BrowserDriver<P> {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.ensure_live()?;
        let landed = self.page.goto(url, self.options.navigation_timeout).await?;
        self.record(landed);
        Ok(())
    }

    async fn reload(&self) -> DriverResult<()> {
        self.ensure_live()?;
        let landed = self.page.reload().await?;
        self.record(landed);
        Ok(())
    }

    async fn back(&self) -> DriverResult<()> {
        self.ensure_live()?;
        let landed = self.page.back().await?;
        self.record(landed);
        Ok(())
    }

    async fn forward(&self) -> DriverResult<()> {
        self.ensure_live()?;
        let landed = self.page.forward().await?;
        self.record(landed);
        Ok(())
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        self.ensure_live()?;
        self.require(selector).await?;
        let landed = self.page.click(selector).await?;
        self.record(landed);
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> DriverResult<()> {
        self.ensure_live()?;
        self.require(selector).await?;
        let landed = self.page.type_text(selector, text).await?;
        self.record(landed);
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.ensure_live()?;
        self.require(selector).await?;
        let landed = self.page.fill(selector, value).await?;
        self.record(landed);
        Ok(())
    }

    async fn select(&self, selector: &str, values: &[String]) -> DriverResult<()> {
        self.ensure_live()?;
        self.require(selector).await?;
        let landed = self.page.select(selector, values).await?;
        self.record(landed);
        Ok(())
    }

    async fn wait_for(&self, selector: &str, timeout: Option<Duration>) -> DriverResult<()> {
        self.ensure_live()?;
        let timeout = timeout.unwrap_or(self.options.timeout);
        match self.locate(selector, timeout).await? {
            Some(_) => Ok(()),
            None => Err(DriverError::Timeout {
                what: format!("selector {}", selector),
                timeout,
            }),
        }
    }

    async fn expect(&self, selector: &str, condition: &str) -> DriverResult<()> {
        self.ensure_live()?;
        let condition = ExpectationCondition::parse(condition)?;

        let deadline = Instant::now() + self.options.timeout;
        let observed = loop {
            let element = self.inspect(selector).await?;
            let observed = match condition.evaluate(element.as_ref()) {
                Ok(()) => return Ok(()),
                Err(observed) => observed,
            };
            if Instant::now() >= deadline {
                break observed;
            }
            sleep(self.options.poll_interval).await;
        };

        Err(DriverError::ExpectationFailed {
            selector: selector.to_string(),
            expected: condition.to_string(),
            actual: observed,
        })
    }

    async fn get_text(&self, selector: &str) -> DriverResult<String> {
        self.ensure_live()?;
        Ok(self.require(selector).await?.text.trim().to_string())
    }

    async fn get_value(&self, selector: &str) -> DriverResult<String> {
        self.ensure_live()?;
        Ok(self.require(selector).await?.extract_value())
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        self.ensure_live()?;
        self.page.screenshot(false).await
    }

    async fn full_page_screenshot(&self) -> DriverResult<Vec<u8>> {
        self.ensure_live()?;
        self.page.screenshot(true).await
    }

    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()> {
        self.ensure_live()?;
        self.page.set_viewport(viewport).await
    }

    async fn get_viewport(&self) -> DriverResult<Viewport> {
        self.ensure_live()?;
        self.page.viewport().await
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.ensure_live()?;
        self.page.url().await
    }

    fn navigation_history(&self) -> Vec<NavigationEntry> {
        self.history.lock().clone()
    }

    fn clear_navigation_history(&self) {
        self.history.lock().clear();
    }

    async fn destroy(&self) -> DriverResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.history.lock().clear();
        self.page.close().await
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}
