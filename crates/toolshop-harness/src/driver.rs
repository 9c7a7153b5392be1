//! Browser driver boundary.
//!
//! The harness never talks to a browser directly. Everything it needs from
//! the engine goes through three object-safe traits:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  BrowserLauncher ──launch──▶ BrowserDriver (one process)         │
//! │                                 │ new_context                    │
//! │                                 ▼                                │
//! │                             ContextDriver (cookie/storage jail)  │
//! │                                 │ new_page                       │
//! │                                 ▼                                │
//! │                             PageDriver (one tab)                 │
//! │                               query / click / fill / select ...  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  memory::MemoryLauncher   scripted DOM, used by the test suite   │
//! │  cdp::ChromiumLauncher    chromiumoxide, feature = "browser"     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drivers only report raw element snapshots. Selection policy (roles,
//! accessible names, text matching, strictness) lives in [`crate::locator`].

pub mod memory;

#[cfg(feature = "browser")]
pub mod cdp;

use crate::config::{HarnessConfig, Viewport};
use crate::network::ResponseEvent;
use crate::result::HarnessResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the per-page response channel
pub const RESPONSE_CHANNEL_CAPACITY: usize = 256;

/// Reference to a DOM element, valid for one render of the page
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    /// Driver-assigned identifier
    pub id: String,
    /// Navigation generation the identifier belongs to
    pub generation: u64,
}

impl ElementRef {
    /// Create a new element reference
    pub fn new(id: impl Into<String>, generation: u64) -> Self {
        Self {
            id: id.into(),
            generation,
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.generation)
    }
}

/// Point-in-time view of one element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Reference for follow-up actions
    pub element: ElementRef,
    /// Parent element, if any
    pub parent: Option<ElementRef>,
    /// Lower-case tag name
    pub tag: String,
    /// All attributes
    pub attributes: BTreeMap<String, String>,
    /// Rendered text of the element and its descendants
    pub text: String,
    /// Current value of form controls
    pub value: Option<String>,
    /// Text of associated `<label>` elements
    pub labels: Vec<String>,
    /// Whether the element is rendered and not hidden
    pub visible: bool,
}

impl ElementSnapshot {
    /// Attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Check for an attribute
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// Option selection for `<select>` elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectOption {
    /// Option whose visible text equals the string
    ByText(String),
    /// Option at a zero-based index
    ByIndex(usize),
    /// Option whose `value` attribute equals the string
    ByValue(String),
    /// Option whose value, or failing that whose text, equals the string
    ByLabelOrValue(String),
}

impl SelectOption {
    /// Check whether an option (value, text, index) satisfies this selection
    #[must_use]
    pub fn matches(&self, value: &str, text: &str, index: usize) -> bool {
        match self {
            Self::ByText(t) => text.trim() == t.trim(),
            Self::ByIndex(i) => *i == index,
            Self::ByValue(v) => value == v,
            Self::ByLabelOrValue(s) => value == s || text.trim() == s.trim(),
        }
    }
}

impl From<&str> for SelectOption {
    fn from(value: &str) -> Self {
        Self::ByLabelOrValue(value.to_string())
    }
}

impl fmt::Display for SelectOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByText(t) => write!(f, "text '{t}'"),
            Self::ByIndex(i) => write!(f, "index {i}"),
            Self::ByValue(v) => write!(f, "value '{v}'"),
            Self::ByLabelOrValue(s) => write!(f, "'{s}'"),
        }
    }
}

/// Options passed to a launcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    /// Run without a window
    pub headless: bool,
    /// Extra process arguments
    pub args: Vec<String>,
    /// Explicit browser executable
    pub executable: Option<PathBuf>,
    /// Window size
    pub viewport: Viewport,
    /// Per-navigation budget in milliseconds
    pub navigation_timeout_ms: u64,
}

impl LaunchOptions {
    /// Derive launch options from the harness configuration
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            headless: config.headless,
            args: config.launch_args.clone(),
            executable: config.chromium_path.clone(),
            viewport: config.viewport,
            navigation_timeout_ms: config.navigation_timeout_ms,
        }
    }
}

/// Starts a browser process
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser; failures map to `LaunchFailure`
    async fn launch(&self, options: &LaunchOptions) -> HarnessResult<Arc<dyn BrowserDriver>>;
}

/// One running browser process
#[async_trait]
pub trait BrowserDriver: Send + Sync + fmt::Debug {
    /// Create an isolated browsing context
    async fn new_context(&self) -> HarnessResult<Arc<dyn ContextDriver>>;

    /// Whether the process is still reachable
    fn is_connected(&self) -> bool;

    /// Terminate the process
    async fn close(&self) -> HarnessResult<()>;
}

/// An isolated cookie/storage sandbox
#[async_trait]
pub trait ContextDriver: Send + Sync + fmt::Debug {
    /// Context identifier
    fn id(&self) -> &str;

    /// Open a tab in this context
    async fn new_page(&self) -> HarnessResult<Arc<dyn PageDriver>>;

    /// Dispose the context and all of its pages
    async fn close(&self) -> HarnessResult<()>;

    /// Whether the context has been closed
    fn is_closed(&self) -> bool;
}

/// One tab. Calls on the same page are serialised by the driver.
#[async_trait]
pub trait PageDriver: Send + Sync + fmt::Debug {
    /// Navigate and wait for the load event
    async fn navigate(&self, url: &str) -> HarnessResult<()>;

    /// Current URL
    async fn url(&self) -> HarnessResult<String>;

    /// Document title
    async fn title(&self) -> HarnessResult<String>;

    /// Elements matching a CSS selector, in document order, optionally
    /// restricted to descendants of `scope`
    async fn query(
        &self,
        css: &str,
        scope: Option<&ElementRef>,
    ) -> HarnessResult<Vec<ElementSnapshot>>;

    /// Click an element
    async fn click(&self, element: &ElementRef) -> HarnessResult<()>;

    /// Replace the value of an input, textarea or contenteditable
    async fn fill(&self, element: &ElementRef, value: &str) -> HarnessResult<()>;

    /// Choose an option of a `<select>`; returns the selected value
    async fn select_option(
        &self,
        element: &ElementRef,
        option: &SelectOption,
    ) -> HarnessResult<String>;

    /// Attach files to an `<input type=file>`
    async fn set_input_files(&self, element: &ElementRef, files: &[PathBuf]) -> HarnessResult<()>;

    /// Subscribe to responses received from now on
    fn subscribe_responses(&self) -> broadcast::Receiver<ResponseEvent>;

    /// Close the tab
    async fn close(&self) -> HarnessResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod select_option_tests {
        use super::*;

        #[test]
        fn test_by_text_ignores_surrounding_whitespace() {
            assert!(SelectOption::ByText("Warranty".into()).matches("warranty", " Warranty ", 3));
            assert!(!SelectOption::ByText("warranty".into()).matches("warranty", "Warranty", 3));
        }

        #[test]
        fn test_by_index_and_value() {
            assert!(SelectOption::ByIndex(2).matches("x", "y", 2));
            assert!(SelectOption::ByValue("return".into()).matches("return", "Return", 0));
            assert!(!SelectOption::ByValue("Return".into()).matches("return", "Return", 0));
        }

        #[test]
        fn test_bare_string_matches_value_or_text() {
            let option = SelectOption::from("warranty");
            assert!(option.matches("warranty", "Warranty", 0));
            let option = SelectOption::from("Warranty");
            assert!(option.matches("warranty", "Warranty", 0));
        }
    }

    mod element_tests {
        use super::*;

        #[test]
        fn test_ref_display() {
            assert_eq!(ElementRef::new("17", 3).to_string(), "17@3");
        }

        #[test]
        fn test_snapshot_attributes() {
            let mut snapshot = ElementSnapshot {
                tag: "input".to_string(),
                ..ElementSnapshot::default()
            };
            snapshot
                .attributes
                .insert("placeholder".to_string(), "Search".to_string());
            assert_eq!(snapshot.attribute("placeholder"), Some("Search"));
            assert!(!snapshot.has_attribute("alt"));
        }

        #[test]
        fn test_launch_options_from_config() {
            let config = HarnessConfig::toolshop().with_headless(false);
            let options = LaunchOptions::from_config(&config);
            assert!(!options.headless);
            assert!(options.args.contains(&"--no-sandbox".to_string()));
        }
    }
}
