//! Page handle: navigation, locator entry points and event waits.

use crate::config::{HarnessConfig, DEFAULT_TEST_ID_ATTRIBUTE};
use crate::driver::PageDriver;
use crate::locator::{AriaRole, Locator, Selector, TextMatch};
use crate::network::{ResponseEvent, UrlPattern};
use crate::result::{HarnessError, HarnessResult};
use crate::wait::{self, WaitOptions, WaitResult};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-page settings derived from [`HarnessConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSettings {
    /// Attribute read by `get_by_test_id`
    pub test_id_attribute: String,
    /// Base for relative URLs passed to [`Page::goto`]
    pub base_url: String,
    /// Auto-wait budget for locator actions
    pub action_timeout: Duration,
    /// Budget for navigations
    pub navigation_timeout: Duration,
    /// Budget for assertions and event waits
    pub assertion_timeout: Duration,
    /// Initial polling interval
    pub poll_interval: Duration,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::new())
    }
}

impl PageSettings {
    /// Settings from the harness configuration
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        let test_id_attribute = if config.test_id_attribute.is_empty() {
            DEFAULT_TEST_ID_ATTRIBUTE.to_string()
        } else {
            config.test_id_attribute.clone()
        };
        Self {
            test_id_attribute,
            base_url: config.base_url.clone(),
            action_timeout: config.action_timeout(),
            navigation_timeout: config.navigation_timeout(),
            assertion_timeout: config.assertion_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Wait options for event waits and assertions
    #[must_use]
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new()
            .with_timeout(millis(self.assertion_timeout))
            .with_poll_interval(millis(self.poll_interval))
    }

    /// Resolve `url` against the base URL unless it is already absolute
    #[must_use]
    pub fn resolve_url(&self, url: &str) -> String {
        if url.contains("://") || url.starts_with("about:") || url.starts_with("data:") {
            return url.to_string();
        }
        if self.base_url.is_empty() {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// One open tab. Cloning shares the tab.
#[derive(Clone)]
pub struct Page {
    driver: Arc<dyn PageDriver>,
    settings: Arc<PageSettings>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("driver", &self.driver)
            .field("test_id_attribute", &self.settings.test_id_attribute)
            .finish_non_exhaustive()
    }
}

impl Page {
    /// Wrap a page driver
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>, settings: PageSettings) -> Self {
        Self {
            driver,
            settings: Arc::new(settings),
        }
    }

    /// Underlying driver
    #[must_use]
    pub const fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    /// Page settings
    #[must_use]
    pub fn settings(&self) -> &PageSettings {
        &self.settings
    }

    /// Navigate and wait for the load event.
    ///
    /// Relative URLs resolve against the configured base URL.
    pub async fn goto(&self, url: &str) -> HarnessResult<()> {
        let target = self.settings.resolve_url(url);
        info!(url = %target, "navigating");
        match tokio::time::timeout(self.settings.navigation_timeout, self.driver.navigate(&target)).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Navigation {
                url: target,
                message: format!(
                    "load did not finish within {}ms",
                    millis(self.settings.navigation_timeout)
                ),
            }),
        }
    }

    /// Current URL
    pub async fn url(&self) -> HarnessResult<String> {
        self.driver.url().await
    }

    /// Document title
    pub async fn title(&self) -> HarnessResult<String> {
        self.driver.title().await
    }

    /// Wait until the URL matches `pattern`
    pub async fn wait_for_url(&self, pattern: impl Into<UrlPattern>) -> HarnessResult<String> {
        let pattern = pattern.into().compile()?;
        let description = format!("page {pattern}");
        let (pattern, driver) = (&pattern, &self.driver);
        wait::wait_until(&description, self.settings.wait_options(), || async move {
            Ok(pattern.matches(&driver.url().await?))
        })
        .await?;
        self.url().await
    }

    // -------------------------------------------------------------------------
    // Locators
    // -------------------------------------------------------------------------

    /// Elements matching a CSS selector
    #[must_use]
    pub fn locator(&self, css: impl Into<String>) -> Locator {
        Locator::new(self.clone(), Selector::Css(css.into()))
    }

    /// Innermost elements containing `text` (case-insensitive)
    #[must_use]
    pub fn get_by_text(&self, text: impl Into<String>) -> Locator {
        Locator::new(self.clone(), Selector::Text(TextMatch::substring(text)))
    }

    /// Elements whose whole text equals `text`
    #[must_use]
    pub fn get_by_text_exact(&self, text: impl Into<String>) -> Locator {
        Locator::new(self.clone(), Selector::Text(TextMatch::exact(text)))
    }

    /// Elements whose `alt` contains `text`
    #[must_use]
    pub fn get_by_alt_text(&self, text: impl Into<String>) -> Locator {
        Locator::new(self.clone(), Selector::AltText(TextMatch::substring(text)))
    }

    /// Controls whose label contains `text`
    #[must_use]
    pub fn get_by_label(&self, text: impl Into<String>) -> Locator {
        Locator::new(self.clone(), Selector::Label(TextMatch::substring(text)))
    }

    /// Controls whose placeholder contains `text`
    #[must_use]
    pub fn get_by_placeholder(&self, text: impl Into<String>) -> Locator {
        Locator::new(self.clone(), Selector::Placeholder(TextMatch::substring(text)))
    }

    /// Visible elements with an ARIA role
    #[must_use]
    pub fn get_by_role(&self, role: AriaRole) -> Locator {
        Locator::new(self.clone(), Selector::Role { role, name: None })
    }

    /// Visible elements with an ARIA role and an accessible name containing `name`
    #[must_use]
    pub fn get_by_role_named(&self, role: AriaRole, name: impl Into<String>) -> Locator {
        Locator::new(
            self.clone(),
            Selector::Role {
                role,
                name: Some(TextMatch::substring(name)),
            },
        )
    }

    /// Elements whose test-id attribute equals `id`
    #[must_use]
    pub fn get_by_test_id(&self, id: impl Into<String>) -> Locator {
        Locator::new(self.clone(), Selector::TestId(id.into()))
    }

    // -------------------------------------------------------------------------
    // Event waits
    // -------------------------------------------------------------------------

    /// Run `trigger` and wait for the response it causes.
    ///
    /// The subscription is made before `trigger` starts, so a fast response
    /// cannot be missed.
    pub async fn wait_for_response<T, Fut>(
        &self,
        pattern: impl Into<UrlPattern>,
        trigger: Fut,
    ) -> HarnessResult<ResponseEvent>
    where
        Fut: Future<Output = HarnessResult<T>>,
    {
        let pattern = pattern.into();
        let (_, event) = wait::perform_and_await_response(
            self.driver.as_ref(),
            &pattern,
            trigger,
            self.settings.wait_options(),
        )
        .await?;
        debug!(url = %event.url, status = event.status, "awaited response");
        Ok(event)
    }

    /// Run `trigger`, then poll `predicate` until it holds
    pub async fn wait_for_condition<T, Fut, P, PFut>(
        &self,
        description: &str,
        trigger: Fut,
        predicate: P,
    ) -> HarnessResult<WaitResult>
    where
        Fut: Future<Output = HarnessResult<T>>,
        P: FnMut() -> PFut,
        PFut: Future<Output = HarnessResult<bool>>,
    {
        let (_, result) = wait::perform_and_await_condition(
            description,
            trigger,
            predicate,
            self.settings.wait_options(),
        )
        .await?;
        Ok(result)
    }

    /// Close the tab
    pub async fn close(&self) -> HarnessResult<()> {
        self.driver.close().await
    }
}
