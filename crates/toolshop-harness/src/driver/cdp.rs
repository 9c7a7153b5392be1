//! Chromium backend over the DevTools protocol (chromiumoxide).
//!
//! Elements are tagged with a `data-harness-ref` attribute the first time a
//! query reports them, so follow-up actions can find the same node again.
//! A node that was re-rendered away no longer carries its tag and the action
//! fails with `StaleElement`, which makes the locator resolve again.

use super::{
    BrowserDriver, BrowserLauncher, ContextDriver, ElementRef, ElementSnapshot, LaunchOptions,
    PageDriver, SelectOption, RESPONSE_CHANNEL_CAPACITY,
};
use crate::network::{HttpMethod, ResponseEvent};
use crate::result::{HarnessError, HarnessResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

const REF_ATTRIBUTE: &str = "data-harness-ref";

const QUERY_SCRIPT: &str = r"(() => {
  const ATTR = 'data-harness-ref';
  const css = __CSS__;
  const scopeRef = __SCOPE__;
  const stamp = (el) => {
    let id = el.getAttribute(ATTR);
    if (!id) {
      window.__harnessNextRef = (window.__harnessNextRef || 0) + 1;
      id = String(window.__harnessNextRef);
      el.setAttribute(ATTR, id);
    }
    return id;
  };
  let root = document;
  if (scopeRef !== null) {
    root = document.querySelector('[' + ATTR + '=\x22' + scopeRef + '\x22]');
    if (!root) return { stale: true, elements: [] };
  }
  const visible = (el) => {
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 || rect.height > 0;
  };
  const elements = Array.from(root.querySelectorAll(css)).map((el) => ({
    id: stamp(el),
    parent: el.parentElement ? stamp(el.parentElement) : null,
    tag: el.tagName.toLowerCase(),
    attributes: Object.fromEntries(Array.from(el.attributes)
      .filter((a) => a.name !== ATTR)
      .map((a) => [a.name, a.value])),
    text: (el.innerText !== undefined ? el.innerText : el.textContent) || '',
    value: ('value' in el && typeof el.value === 'string') ? el.value : null,
    labels: el.labels ? Array.from(el.labels).map((l) => l.innerText || l.textContent || '') : [],
    visible: visible(el),
  }));
  return { stale: false, elements };
})()";

const FILL_SCRIPT: &str = r"(() => {
  const el = document.querySelector(__SELECTOR__);
  if (!el) return 'stale';
  if (!['INPUT', 'TEXTAREA'].includes(el.tagName) && !el.isContentEditable) return 'not-fillable';
  el.focus();
  if (el.isContentEditable) { el.innerText = __VALUE__; } else { el.value = __VALUE__; }
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return 'ok';
})()";

const OPTIONS_SCRIPT: &str = r"(() => {
  const el = document.querySelector(__SELECTOR__);
  if (!el) return null;
  if (el.tagName !== 'SELECT') return [];
  return Array.from(el.options).map((o) => ({ value: o.value, text: o.text }));
})()";

const SELECT_SCRIPT: &str = r"(() => {
  const el = document.querySelector(__SELECTOR__);
  if (!el) return false;
  el.value = __VALUE__;
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
})()";

#[derive(Debug, Deserialize)]
struct RawQuery {
    stale: bool,
    elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    id: String,
    parent: Option<String>,
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    value: Option<String>,
    labels: Vec<String>,
    visible: bool,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    value: String,
    text: String,
}

fn cdp_error(e: impl fmt::Display) -> HarnessError {
    HarnessError::driver(e.to_string())
}

fn ref_selector(element: &ElementRef) -> String {
    format!("[{REF_ATTRIBUTE}=\"{}\"]", element.id)
}

fn js_string(value: &str) -> HarnessResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Launches a local Chromium
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> HarnessResult<Arc<dyn BrowserDriver>> {
        let launch_failure = |e: &dyn fmt::Display| HarnessError::LaunchFailure {
            message: e.to_string(),
        };
        let mut builder = CdpConfig::builder()
            .window_size(options.viewport.width, options.viewport.height)
            .request_timeout(Duration::from_millis(options.navigation_timeout_ms));
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &options.args {
            builder = builder.arg(arg.clone());
        }
        let config = builder.build().map_err(|e| launch_failure(&e))?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| launch_failure(&e))?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&connected);
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "cdp handler event error");
                }
            }
            warn!("browser connection closed");
            flag.store(false, Ordering::SeqCst);
        });
        info!(headless = options.headless, "chromium launched");

        Ok(Arc::new(ChromiumBrowser {
            inner: Arc::new(Mutex::new(browser)),
            connected,
            handle,
            navigation_timeout: Duration::from_millis(options.navigation_timeout_ms),
        }))
    }
}

/// A running Chromium process
pub struct ChromiumBrowser {
    inner: Arc<Mutex<CdpBrowser>>,
    connected: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
    navigation_timeout: Duration,
}

impl fmt::Debug for ChromiumBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumBrowser")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrowserDriver for ChromiumBrowser {
    async fn new_context(&self) -> HarnessResult<Arc<dyn ContextDriver>> {
        if !self.is_connected() {
            return Err(HarnessError::SessionCrashed {
                message: "chromium connection closed".to_string(),
            });
        }
        let browser = self.inner.lock().await;
        let created = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(cdp_error)?;
        let context_id = created.result.browser_context_id.clone();
        Ok(Arc::new(ChromiumContext {
            id: context_id.inner().clone(),
            context_id,
            browser: Arc::clone(&self.inner),
            connected: Arc::clone(&self.connected),
            closed: AtomicBool::new(false),
            navigation_timeout: self.navigation_timeout,
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.handle.is_finished()
    }

    async fn close(&self) -> HarnessResult<()> {
        let mut browser = self.inner.lock().await;
        browser.close().await.map_err(cdp_error)?;
        let _ = browser.wait().await;
        self.handle.abort();
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A CDP browser context
pub struct ChromiumContext {
    id: String,
    context_id: BrowserContextId,
    browser: Arc<Mutex<CdpBrowser>>,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
    navigation_timeout: Duration,
}

impl fmt::Debug for ChromiumContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumContext")
            .field("id", &self.id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ContextDriver for ChromiumContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> HarnessResult<Arc<dyn PageDriver>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HarnessError::ContextClosed {
                context: self.id.clone(),
            });
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(HarnessError::SessionCrashed {
                message: "chromium connection closed".to_string(),
            });
        }
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(cdp_error)?;
        let page = {
            let browser = self.browser.lock().await;
            browser.new_page(params).await.map_err(cdp_error)?
        };
        ChromiumPage::attach(page, self.id.clone(), self.navigation_timeout).await
    }

    async fn close(&self) -> HarnessResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let browser = self.browser.lock().await;
        browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
            .map_err(cdp_error)?;
        debug!(context = %self.id, "browser context disposed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A CDP tab
pub struct ChromiumPage {
    page: CdpPage,
    context_id: String,
    generation: AtomicU64,
    closed: AtomicBool,
    action_lock: Mutex<()>,
    events: broadcast::Sender<ResponseEvent>,
    listener: tokio::task::JoinHandle<()>,
    navigation_timeout: Duration,
}

impl fmt::Debug for ChromiumPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromiumPage")
            .field("context", &self.context_id)
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ChromiumPage {
    async fn attach(
        page: CdpPage,
        context_id: String,
        navigation_timeout: Duration,
    ) -> HarnessResult<Arc<dyn PageDriver>> {
        page.execute(EnableParams::default()).await.map_err(cdp_error)?;
        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(cdp_error)?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(cdp_error)?;

        let (events, _) = broadcast::channel(RESPONSE_CHANNEL_CAPACITY);
        let sender = events.clone();
        let listener = tokio::spawn(async move {
            let mut methods: HashMap<String, HttpMethod> = HashMap::new();
            loop {
                tokio::select! {
                    Some(request) = requests.next() => {
                        methods.insert(
                            request.request_id.inner().clone(),
                            HttpMethod::parse(&request.request.method),
                        );
                    }
                    Some(response) = responses.next() => {
                        let method = methods
                            .remove(response.request_id.inner())
                            .unwrap_or(HttpMethod::Other);
                        let _ = sender.send(ResponseEvent {
                            url: response.response.url.clone(),
                            status: u16::try_from(response.response.status).unwrap_or(0),
                            method,
                        });
                    }
                    else => break,
                }
            }
        });

        Ok(Arc::new(Self {
            page,
            context_id,
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            action_lock: Mutex::new(()),
            events,
            listener,
            navigation_timeout,
        }))
    }

    fn check_open(&self) -> HarnessResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HarnessError::ContextClosed {
                context: self.context_id.clone(),
            });
        }
        Ok(())
    }

    fn check_generation(&self, element: &ElementRef) -> HarnessResult<()> {
        if element.generation == self.generation.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HarnessError::StaleElement {
                element: element.to_string(),
            })
        }
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> HarnessResult<T> {
        let result = self.page.evaluate(script).await.map_err(cdp_error)?;
        result.into_value::<T>().map_err(cdp_error)
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        self.check_open()?;
        let _guard = self.action_lock.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HarnessError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(HarnessError::Navigation {
                url: url.to_string(),
                message: format!("no load event within {:?}", self.navigation_timeout),
            }),
        }
    }

    async fn url(&self) -> HarnessResult<String> {
        self.check_open()?;
        Ok(self.page.url().await.map_err(cdp_error)?.unwrap_or_default())
    }

    async fn title(&self) -> HarnessResult<String> {
        self.check_open()?;
        Ok(self.page.get_title().await.map_err(cdp_error)?.unwrap_or_default())
    }

    async fn query(
        &self,
        css: &str,
        scope: Option<&ElementRef>,
    ) -> HarnessResult<Vec<ElementSnapshot>> {
        self.check_open()?;
        if let Some(scope) = scope {
            self.check_generation(scope)?;
        }
        let _guard = self.action_lock.lock().await;
        let scope_literal = match scope {
            Some(s) => js_string(&s.id)?,
            None => "null".to_string(),
        };
        let script = QUERY_SCRIPT
            .replace("__CSS__", &js_string(css)?)
            .replace("__SCOPE__", &scope_literal);
        let raw: RawQuery = self.eval(script).await?;
        if raw.stale {
            return Err(HarnessError::StaleElement {
                element: scope.map(ToString::to_string).unwrap_or_default(),
            });
        }
        let generation = self.generation.load(Ordering::SeqCst);
        Ok(raw
            .elements
            .into_iter()
            .map(|e| ElementSnapshot {
                element: ElementRef::new(e.id, generation),
                parent: e.parent.map(|p| ElementRef::new(p, generation)),
                tag: e.tag,
                attributes: e.attributes,
                text: e.text,
                value: e.value,
                labels: e.labels,
                visible: e.visible,
            })
            .collect())
    }

    async fn click(&self, element: &ElementRef) -> HarnessResult<()> {
        self.check_open()?;
        self.check_generation(element)?;
        let _guard = self.action_lock.lock().await;
        let handle = self
            .page
            .find_element(ref_selector(element))
            .await
            .map_err(|_| HarnessError::StaleElement {
                element: element.to_string(),
            })?;
        handle.click().await.map_err(cdp_error)?;
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> HarnessResult<()> {
        self.check_open()?;
        self.check_generation(element)?;
        let _guard = self.action_lock.lock().await;
        let script = FILL_SCRIPT
            .replace("__SELECTOR__", &js_string(&ref_selector(element))?)
            .replace("__VALUE__", &js_string(value)?);
        let outcome: String = self.eval(script).await?;
        match outcome.as_str() {
            "ok" => Ok(()),
            "stale" => Err(HarnessError::StaleElement {
                element: element.to_string(),
            }),
            _ => Err(HarnessError::driver(format!(
                "element {element} is not an input, textarea or contenteditable"
            ))),
        }
    }

    async fn select_option(
        &self,
        element: &ElementRef,
        option: &SelectOption,
    ) -> HarnessResult<String> {
        self.check_open()?;
        self.check_generation(element)?;
        let _guard = self.action_lock.lock().await;
        let selector = js_string(&ref_selector(element))?;
        let options: Option<Vec<RawOption>> = self
            .eval(OPTIONS_SCRIPT.replace("__SELECTOR__", &selector))
            .await?;
        let options = options.ok_or_else(|| HarnessError::StaleElement {
            element: element.to_string(),
        })?;
        let value = options
            .iter()
            .enumerate()
            .find(|(index, o)| option.matches(&o.value, &o.text, *index))
            .map(|(_, o)| o.value.clone())
            .ok_or_else(|| {
                HarnessError::driver(format!("no option matching {option} in {element}"))
            })?;
        let script = SELECT_SCRIPT
            .replace("__SELECTOR__", &selector)
            .replace("__VALUE__", &js_string(&value)?);
        let applied: bool = self.eval(script).await?;
        if applied {
            Ok(value)
        } else {
            Err(HarnessError::StaleElement {
                element: element.to_string(),
            })
        }
    }

    async fn set_input_files(&self, element: &ElementRef, files: &[PathBuf]) -> HarnessResult<()> {
        self.check_open()?;
        self.check_generation(element)?;
        if let Some(missing) = files.iter().find(|f| !f.is_file()) {
            return Err(HarnessError::Fixture {
                message: format!("file {} does not exist", missing.display()),
            });
        }
        let _guard = self.action_lock.lock().await;
        let handle = self
            .page
            .find_element(ref_selector(element))
            .await
            .map_err(|_| HarnessError::StaleElement {
                element: element.to_string(),
            })?;
        let params = SetFileInputFilesParams::builder()
            .files(files.iter().map(|f| f.to_string_lossy().to_string()))
            .backend_node_id(handle.backend_node_id)
            .build()
            .map_err(cdp_error)?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }

    fn subscribe_responses(&self) -> broadcast::Receiver<ResponseEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> HarnessResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.listener.abort();
        self.page.clone().close().await.map_err(cdp_error)?;
        Ok(())
    }
}
