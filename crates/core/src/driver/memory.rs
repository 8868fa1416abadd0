//! In-memory page backing the `mock` driver kind

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use url::Url;

use super::browser::{Inspection, PageBackend};
use super::element::ElementSnapshot;
use super::Viewport;
use crate::error::{DriverError, DriverResult};

/// 1x1 transparent PNG
const BLANK_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

const BLANK_URL: &str = "about:blank";

#[derive(Debug, Clone)]
struct PageState {
    url: String,
    back: Vec<String>,
    forward: Vec<String>,
    viewport: Viewport,
    elements: BTreeMap<String, ElementSnapshot>,
    closed: bool,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            url: BLANK_URL.to_string(),
            back: Vec::new(),
            forward: Vec::new(),
            viewport: Viewport::default(),
            elements: BTreeMap::new(),
            closed: false,
        }
    }
}

/// A page with a session history, a viewport and elements addressed by exact
/// selector. Clones share state; use [`MemoryPage::fork`] for an independent
/// copy.
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    state: Arc<Mutex<PageState>>,
}

impl MemoryPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemoryPage::insert`]
    pub fn with_element(self, selector: &str, element: ElementSnapshot) -> Self {
        self.insert(selector, element);
        self
    }

    pub fn insert(&self, selector: &str, element: ElementSnapshot) {
        self.state.lock().elements.insert(selector.to_string(), element);
    }

    pub fn element(&self, selector: &str) -> Option<ElementSnapshot> {
        self.state.lock().elements.get(selector).cloned()
    }

    /// Independent copy of the current state
    pub fn fork(&self) -> Self {
        let mut state = self.state.lock().clone();
        state.closed = false;
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn with_element_mut<T>(
        &self,
        selector: &str,
        f: impl FnOnce(&mut ElementSnapshot) -> DriverResult<T>,
    ) -> DriverResult<T> {
        let mut state = self.state.lock();
        let element = state
            .elements
            .get_mut(selector)
            .ok_or_else(|| DriverError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        f(element)
    }

    fn current_url(&self) -> String {
        self.state.lock().url.clone()
    }

    fn navigate(&self, target: &str) -> DriverResult<String> {
        let mut state = self.state.lock();
        let resolved = resolve(&state.url, target)?;
        let previous = std::mem::replace(&mut state.url, resolved.clone());
        state.back.push(previous);
        state.forward.clear();
        Ok(resolved)
    }
}

fn resolve(current: &str, target: &str) -> DriverResult<String> {
    let parsed = match Url::parse(target) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(current)
            .and_then(|base| base.join(target))
            .map_err(|e| DriverError::Navigation {
                url: target.to_string(),
                reason: e.to_string(),
            })?,
        Err(e) => {
            return Err(DriverError::Navigation {
                url: target.to_string(),
                reason: e.to_string(),
            })
        }
    };
    Ok(parsed.to_string())
}

#[async_trait]
impl PageBackend for MemoryPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> DriverResult<String> {
        self.navigate(url)
    }

    async fn reload(&self) -> DriverResult<String> {
        Ok(self.current_url())
    }

    async fn back(&self) -> DriverResult<String> {
        let mut state = self.state.lock();
        if let Some(previous) = state.back.pop() {
            let current = std::mem::replace(&mut state.url, previous);
            state.forward.push(current);
        }
        Ok(state.url.clone())
    }

    async fn forward(&self) -> DriverResult<String> {
        let mut state = self.state.lock();
        if let Some(next) = state.forward.pop() {
            let current = std::mem::replace(&mut state.url, next);
            state.back.push(current);
        }
        Ok(state.url.clone())
    }

    async fn click(&self, selector: &str) -> DriverResult<String> {
        let href = self.with_element_mut(selector, |element| {
            if element.is_checkbox() {
                element.checked = !element.checked;
            } else if element.is_radio() {
                element.checked = true;
            }
            Ok(element.href.clone())
        })?;

        match href {
            Some(target) => self.navigate(&target),
            None => Ok(self.current_url()),
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<String> {
        self.with_element_mut(selector, |element| {
            element.value = Some(value.to_string());
            Ok(())
        })?;
        Ok(self.current_url())
    }

    async fn type_text(&self, selector: &str, text: &str) -> DriverResult<String> {
        self.with_element_mut(selector, |element| {
            element.value.get_or_insert_with(String::new).push_str(text);
            Ok(())
        })?;
        Ok(self.current_url())
    }

    async fn select(&self, selector: &str, values: &[String]) -> DriverResult<String> {
        self.with_element_mut(selector, |element| {
            if element.tag != "select" {
                return Err(DriverError::Backend(format!(
                    "{} is a <{}>, not a <select>",
                    selector, element.tag
                )));
            }
            if values.len() > 1 && !element.multiple {
                return Err(DriverError::Backend(format!(
                    "{} does not allow multiple selections",
                    selector
                )));
            }
            if let Some(missing) = values.iter().find(|v| !element.options.contains(v)) {
                return Err(DriverError::Backend(format!(
                    "{} has no option {:?}",
                    selector, missing
                )));
            }
            // keep DOM order regardless of the order values were given in
            element.selected_values = element
                .options
                .iter()
                .filter(|option| values.contains(option))
                .cloned()
                .collect();
            Ok(())
        })?;
        Ok(self.current_url())
    }

    async fn inspect(&self, selector: &str) -> DriverResult<Inspection> {
        Ok(Inspection {
            element: self.element(selector),
            url: self.current_url(),
        })
    }

    async fn screenshot(&self, _full_page: bool) -> DriverResult<Vec<u8>> {
        STANDARD
            .decode(BLANK_PNG)
            .map_err(|e| DriverError::Backend(format!("screenshot encoding: {}", e)))
    }

    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()> {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(DriverError::Backend(format!("invalid viewport {}", viewport)));
        }
        self.state.lock().viewport = viewport;
        Ok(())
    }

    async fn viewport(&self) -> DriverResult<Viewport> {
        Ok(self.state.lock().viewport)
    }

    async fn url(&self) -> DriverResult<String> {
        Ok(self.current_url())
    }

    async fn close(&self) -> DriverResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relative_navigation_resolves_against_current_url() {
        let page = MemoryPage::new();
        page.goto("http://app.test/shop/", Duration::from_secs(1)).await.unwrap();
        let landed = page.goto("cart", Duration::from_secs(1)).await.unwrap();
        assert_eq!(landed, "http://app.test/shop/cart");
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_navigation_error() {
        let page = MemoryPage::new();
        let err = page.goto("cart", Duration::from_secs(1)).await.unwrap_err();
        match err {
            DriverError::Navigation { url, .. } => assert_eq!(url, "cart"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_click_toggles_checkbox_and_follows_links() {
        let page = MemoryPage::new()
            .with_element("#terms", ElementSnapshot::checkbox(false))
            .with_element("a.next", ElementSnapshot::link("/step-2"));
        page.goto("http://app.test/step-1", Duration::from_secs(1)).await.unwrap();

        page.click("#terms").await.unwrap();
        assert!(page.element("#terms").unwrap().checked);

        let landed = page.click("a.next").await.unwrap();
        assert_eq!(landed, "http://app.test/step-2");
    }

    #[tokio::test]
    async fn test_select_keeps_dom_order_and_rejects_unknown_options() {
        let page = MemoryPage::new().with_element(
            "#colors",
            ElementSnapshot::select(&["red", "green", "blue"], true),
        );
        page.select("#colors", &["blue".to_string(), "red".to_string()]).await.unwrap();
        assert_eq!(page.element("#colors").unwrap().extract_value(), "red,blue");

        let err = page.select("#colors", &["purple".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("purple"));
    }

    #[tokio::test]
    async fn test_fork_is_independent() {
        let template = MemoryPage::new().with_element("#name", ElementSnapshot::input("text"));
        let copy = template.fork();
        copy.fill("#name", "changed").await.unwrap();
        assert_eq!(template.element("#name").unwrap().extract_value(), "");
        assert_eq!(copy.element("#name").unwrap().extract_value(), "changed");
    }

    #[tokio::test]
    async fn test_screenshot_is_png() {
        let png = MemoryPage::new().screenshot(false).await.unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
