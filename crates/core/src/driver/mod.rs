//! Browser driver abstraction
//!
//! [`Driver`] is the capability surface the step library works against.
//! [`BrowserDriver`] implements its semantics once (destroyed state, history
//! tracking, value extraction, expectation polling) over a narrow
//! [`PageBackend`]: either the Playwright bridge or the in-memory page.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::config::{DriverKind, WorldConfig};
use crate::error::DriverResult;

mod browser;
mod element;
pub mod expect;
mod memory;
mod playwright;

pub use browser::{BrowserDriver, DriverOptions, Inspection, PageBackend};
pub use element::ElementSnapshot;
pub use expect::{ExpectationCondition, TextMode, SUPPORTED_CONDITIONS};
pub use memory::MemoryPage;
pub use playwright::PlaywrightBackend;

/// Browser window size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One main-frame URL change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEntry {
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Capabilities a scenario can use to drive a page.
///
/// Every method fails with [`crate::error::DriverError::Destroyed`] once
/// [`Driver::destroy`] has been called. `destroy` itself is idempotent.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn goto(&self, url: &str) -> DriverResult<()>;
    async fn reload(&self) -> DriverResult<()>;
    async fn back(&self) -> DriverResult<()>;
    async fn forward(&self) -> DriverResult<()>;

    async fn click(&self, selector: &str) -> DriverResult<()>;

    /// Append `text` to the element's current value
    async fn type_text(&self, selector: &str, text: &str) -> DriverResult<()>;

    /// Replace the element's current value
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;

    /// Select options by value; more than one value needs a `multiple` select
    async fn select(&self, selector: &str, values: &[String]) -> DriverResult<()>;

    /// Poll until the selector is present. `None` uses the driver timeout.
    async fn wait_for(&self, selector: &str, timeout: Option<Duration>) -> DriverResult<()>;

    /// Evaluate an expectation condition string, see [`expect`]
    async fn expect(&self, selector: &str, condition: &str) -> DriverResult<()>;

    async fn get_text(&self, selector: &str) -> DriverResult<String>;
    async fn get_value(&self, selector: &str) -> DriverResult<String>;

    /// PNG of the visible viewport
    async fn screenshot(&self) -> DriverResult<Vec<u8>>;
    async fn full_page_screenshot(&self) -> DriverResult<Vec<u8>>;

    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()>;
    async fn get_viewport(&self) -> DriverResult<Viewport>;

    async fn current_url(&self) -> DriverResult<String>;
    fn navigation_history(&self) -> Vec<NavigationEntry>;
    fn clear_navigation_history(&self);

    async fn destroy(&self) -> DriverResult<()>;
    fn is_destroyed(&self) -> bool;
}

/// Builds a fresh driver for one world
pub type DriverFactory =
    Arc<dyn Fn(WorldConfig) -> BoxFuture<'static, DriverResult<Box<dyn Driver>>> + Send + Sync>;

/// Factory that picks the backend from `driver.kind`
pub fn default_factory() -> DriverFactory {
    Arc::new(|config: WorldConfig| {
        async move {
            let driver: Box<dyn Driver> = match config.driver.kind {
                DriverKind::Mock => Box::new(BrowserDriver::new(MemoryPage::new())),
                DriverKind::Playwright => {
                    let backend = PlaywrightBackend::launch(&config).await?;
                    Box::new(BrowserDriver::new(backend))
                }
            };
            Ok(driver)
        }
        .boxed()
    })
}

/// Factory that gives every world its own copy of `page`, so a seeded page
/// acts as a template.
pub fn memory_factory(page: MemoryPage) -> DriverFactory {
    Arc::new(move |_config: WorldConfig| {
        let page = page.fork();
        async move { Ok(Box::new(BrowserDriver::new(page)) as Box<dyn Driver>) }.boxed()
    })
}
