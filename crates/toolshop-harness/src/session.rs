//! Browser session and isolated browsing contexts.
//!
//! A [`Session`] owns one browser process for the lifetime of a suite. Each
//! case gets its own [`BrowsingContext`] (cookie/storage sandbox) and
//! [`Page`]; [`Session::with_page`] releases both on every exit path.
//!
//! ## Lifecycle
//!
//! ```text
//! Session::open ──▶ new_context ──▶ new_page ──▶ (case body) ──▶ context.close
//!      │                 ▲                                            │
//!      │                 └──────────── next case ◀────────────────────┘
//!      └──────────────────────────────────────────────────▶ Session::close
//! ```

use crate::config::HarnessConfig;
use crate::driver::{BrowserDriver, BrowserLauncher, ContextDriver, LaunchOptions};
use crate::page::{Page, PageSettings};
use crate::result::{HarnessError, HarnessResult};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

struct SessionInner {
    config: HarnessConfig,
    settings: PageSettings,
    browser: Arc<dyn BrowserDriver>,
    closed: AtomicBool,
}

/// One running browser process. Cloning shares the process.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("browser", &self.inner.browser)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Launch a browser.
    ///
    /// # Errors
    ///
    /// Invalid configuration yields `Config`; any launcher failure is
    /// reported as `LaunchFailure`, which is fatal to the suite.
    #[instrument(skip(config, launcher), fields(headless = config.headless))]
    pub async fn open(config: HarnessConfig, launcher: &dyn BrowserLauncher) -> HarnessResult<Self> {
        config.validate()?;
        let options = LaunchOptions::from_config(&config);
        let browser = launcher.launch(&options).await.map_err(|e| match e {
            HarnessError::LaunchFailure { .. } => e,
            other => HarnessError::LaunchFailure {
                message: other.to_string(),
            },
        })?;
        info!(args = ?options.args, "browser launched");
        Ok(Self {
            inner: Arc::new(SessionInner {
                settings: PageSettings::from_config(&config),
                config,
                browser,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Configuration the session was opened with
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.inner.config
    }

    /// Settings handed to every page
    #[must_use]
    pub fn page_settings(&self) -> &PageSettings {
        &self.inner.settings
    }

    /// Whether new contexts can still be created
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst) && self.inner.browser.is_connected()
    }

    fn crashed() -> HarnessError {
        HarnessError::SessionCrashed {
            message: "browser process disconnected".to_string(),
        }
    }

    /// Create an isolated browsing context
    pub async fn new_context(&self) -> HarnessResult<BrowsingContext> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(HarnessError::driver("session already closed"));
        }
        if !self.inner.browser.is_connected() {
            return Err(Self::crashed());
        }
        let driver = self.inner.browser.new_context().await.map_err(|e| {
            if self.inner.browser.is_connected() {
                e
            } else {
                Self::crashed()
            }
        })?;
        info!(context = driver.id(), "context created");
        Ok(BrowsingContext {
            driver,
            settings: self.inner.settings.clone(),
            closed: false,
        })
    }

    /// Run `body` with a page in a fresh context.
    ///
    /// The context is closed whether `body` succeeds, fails or panics; a
    /// panic is resumed after cleanup.
    pub async fn with_page<T, F, Fut>(&self, body: F) -> HarnessResult<T>
    where
        F: FnOnce(Page) -> Fut,
        Fut: Future<Output = HarnessResult<T>>,
    {
        let context = self.new_context().await?;
        let page = match context.new_page().await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = context.close().await {
                    warn!(error = %close_err, "failed to close context after page creation error");
                }
                return Err(e);
            }
        };
        let outcome = AssertUnwindSafe(body(page)).catch_unwind().await;
        let closed = context.close().await;
        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(Err(e)) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "failed to close context after case error");
                }
                Err(e)
            }
            Ok(Ok(value)) => closed.map(|()| value),
        }
    }

    /// Terminate the browser process. Idempotent.
    #[instrument(skip(self))]
    pub async fn close(&self) -> HarnessResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("closing browser");
        self.inner.browser.close().await
    }
}

/// An isolated cookie/storage sandbox, exclusively owned by one case
pub struct BrowsingContext {
    driver: Arc<dyn ContextDriver>,
    settings: PageSettings,
    closed: bool,
}

impl fmt::Debug for BrowsingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowsingContext")
            .field("id", &self.driver.id())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl BrowsingContext {
    /// Context identifier
    #[must_use]
    pub fn id(&self) -> &str {
        self.driver.id()
    }

    /// Whether the context has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed || self.driver.is_closed()
    }

    /// Open a page in this context
    pub async fn new_page(&self) -> HarnessResult<Page> {
        if self.is_closed() {
            return Err(HarnessError::ContextClosed {
                context: self.id().to_string(),
            });
        }
        let driver = self.driver.new_page().await?;
        Ok(Page::new(driver, self.settings.clone()))
    }

    /// Close the context and every page in it
    pub async fn close(mut self) -> HarnessResult<()> {
        self.closed = true;
        info!(context = self.driver.id(), "closing context");
        self.driver.close().await
    }
}

impl Drop for BrowsingContext {
    fn drop(&mut self) {
        if self.closed || self.driver.is_closed() {
            return;
        }
        warn!(context = self.driver.id(), "context dropped without close; closing in background");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let driver = Arc::clone(&self.driver);
            handle.spawn(async move {
                if let Err(e) = driver.close().await {
                    warn!(context = driver.id(), error = %e, "background context close failed");
                }
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::memory::{FnSite, MemoryLauncher, MockNode};
    use std::time::Duration;

    fn launcher() -> MemoryLauncher {
        MemoryLauncher::new(FnSite::new(|page, _| {
            let body = page.dom.append(None, MockNode::new("body"));
            page.dom.append(Some(body), MockNode::new("h1").text("Toolshop"));
            Ok(())
        }))
    }

    mod open_tests {
        use super::*;

        #[tokio::test]
        async fn test_open_passes_launch_options() {
            let launcher = launcher();
            let config = HarnessConfig::toolshop().with_headless(false);
            let session = Session::open(config, &launcher).await.unwrap();
            let launches = launcher.launches();
            assert_eq!(launches.len(), 1);
            assert!(!launches[0].headless);
            assert!(launches[0].args.contains(&"--disable-gpu".to_string()));
            assert_eq!(session.page_settings().test_id_attribute, "data-test");
            assert!(session.is_usable());
        }

        #[tokio::test]
        async fn test_launch_failure_is_suite_fatal() {
            let launcher = MemoryLauncher::failing("chromium not found");
            let err = Session::open(HarnessConfig::toolshop(), &launcher)
                .await
                .unwrap_err();
            assert!(matches!(err, HarnessError::LaunchFailure { .. }));
            assert!(err.is_suite_fatal());
        }

        #[tokio::test]
        async fn test_close_is_idempotent() {
            let launcher = launcher();
            let session = Session::open(HarnessConfig::toolshop(), &launcher).await.unwrap();
            session.close().await.unwrap();
            session.close().await.unwrap();
            assert!(!session.is_usable());
            assert!(session.new_context().await.is_err());
        }
    }

    mod scope_tests {
        use super::*;

        #[tokio::test]
        async fn test_with_page_closes_on_success_and_error() {
            let launcher = launcher();
            let browser = launcher.browser();
            let session = Session::open(HarnessConfig::toolshop(), &launcher).await.unwrap();

            let heading = session
                .with_page(|page| async move {
                    page.goto("https://shop.test/").await?;
                    page.locator("h1").inner_text().await
                })
                .await
                .unwrap();
            assert_eq!(heading, "Toolshop");
            assert_eq!(browser.open_contexts(), 0);

            let err = session
                .with_page(|page| async move {
                    page.goto("https://shop.test/").await?;
                    page.locator("h2").with_timeout(Duration::from_millis(10)).click().await
                })
                .await
                .unwrap_err();
            assert!(matches!(err, HarnessError::NotFound { .. }));
            assert_eq!(browser.contexts_created(), 2);
            assert_eq!(browser.open_contexts(), 0);
        }

        #[tokio::test]
        async fn test_with_page_closes_on_panic() {
            let launcher = launcher();
            let browser = launcher.browser();
            let session = Session::open(HarnessConfig::toolshop(), &launcher).await.unwrap();
            let result = AssertUnwindSafe(session.with_page(|_page| async move {
                let blow_up = true;
                if blow_up {
                    panic!("case body blew up");
                }
                Ok(())
            }))
            .catch_unwind()
            .await;
            assert!(result.is_err());
            assert_eq!(browser.open_contexts(), 0);
        }

        #[tokio::test]
        async fn test_dropped_context_is_closed_in_background() {
            let launcher = launcher();
            let browser = launcher.browser();
            let session = Session::open(HarnessConfig::toolshop(), &launcher).await.unwrap();
            {
                let context = session.new_context().await.unwrap();
                let _page = context.new_page().await.unwrap();
                assert_eq!(browser.open_contexts(), 1);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(browser.open_contexts(), 0);
        }

        #[tokio::test]
        async fn test_closed_context_rejects_pages() {
            let launcher = launcher();
            let session = Session::open(HarnessConfig::toolshop(), &launcher).await.unwrap();
            let context = session.new_context().await.unwrap();
            let id = context.id().to_string();
            launcher
                .browser()
                .contexts()
                .into_iter()
                .find(|c| c.id() == id)
                .unwrap()
                .close()
                .await
                .unwrap();
            let err = context.new_page().await.unwrap_err();
            assert!(matches!(err, HarnessError::ContextClosed { .. }));
        }
    }

    mod crash_tests {
        use super::*;

        #[tokio::test]
        async fn test_crash_marks_session_unusable() {
            let launcher = launcher();
            let session = Session::open(HarnessConfig::toolshop(), &launcher).await.unwrap();
            launcher.browser().crash();
            assert!(!session.is_usable());
            let err = session.new_context().await.unwrap_err();
            assert!(matches!(err, HarnessError::SessionCrashed { .. }));
            assert!(err.is_suite_fatal());
        }
    }

    mod isolation_tests {
        use super::*;
        use crate::driver::memory::DomEvent;

        #[tokio::test]
        async fn test_contexts_do_not_share_storage() {
            let site = FnSite::new(|page, _| {
                let body = page.dom.append(None, MockNode::new("body"));
                let count = page
                    .storage_get("cart")
                    .and_then(|v| v.as_u64())
                    .unwrap_or_default();
                page.dom.append(Some(body), MockNode::new("span").id("count").text(count.to_string()));
                page.dom.append(Some(body), MockNode::new("button").text("Add"));
                Ok(())
            })
            .on_event(|page, event| {
                if let DomEvent::Click(_) = event {
                    let count = page
                        .storage_get("cart")
                        .and_then(|v| v.as_u64())
                        .unwrap_or_default();
                    page.storage_set("cart", serde_json::json!(count + 1));
                }
                Ok(())
            });
            let launcher = MemoryLauncher::new(site);
            let session = Session::open(HarnessConfig::toolshop(), &launcher).await.unwrap();

            let first = session.new_context().await.unwrap();
            let page = first.new_page().await.unwrap();
            page.goto("https://shop.test/").await.unwrap();
            page.get_by_text_exact("Add").click().await.unwrap();
            page.goto("https://shop.test/").await.unwrap();
            assert_eq!(page.locator("#count").inner_text().await.unwrap(), "1");

            let second = session.new_context().await.unwrap();
            let other = second.new_page().await.unwrap();
            other.goto("https://shop.test/").await.unwrap();
            assert_eq!(other.locator("#count").inner_text().await.unwrap(), "0");

            first.close().await.unwrap();
            second.close().await.unwrap();
        }
    }
}
