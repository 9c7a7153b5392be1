//! Harness configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file named by
//! `HARNESS_CONFIG`, then individual `HARNESS_*` environment variables.

use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a YAML configuration file
pub const CONFIG_FILE_ENV: &str = "HARNESS_CONFIG";

/// Storefront under test
pub const TOOLSHOP_BASE_URL: &str = "https://practicesoftwaretesting.com";

/// REST API of the storefront under test
pub const TOOLSHOP_API_URL: &str = "https://api.practicesoftwaretesting.com";

/// Test-id attribute used when nothing else is configured
pub const DEFAULT_TEST_ID_ATTRIBUTE: &str = "data-testid";

/// How the cases of one suite are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Independent cases run concurrently, each in its own context
    #[default]
    Parallel,
    /// Cases run one after another
    SameThread,
}

impl ExecutionMode {
    fn parse(value: &str) -> HarnessResult<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "parallel" | "concurrent" => Ok(Self::Parallel),
            "same_thread" | "sequential" => Ok(Self::SameThread),
            other => Err(HarnessError::config(format!(
                "unknown execution mode '{other}'"
            ))),
        }
    }
}

/// Lifetime of the browsing context a case runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextScope {
    /// Fresh context for every case
    #[default]
    PerCase,
    /// One context (and page) shared by the whole suite
    PerSuite,
}

/// Browser viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Run the browser without a window
    pub headless: bool,
    /// Extra command-line arguments for the browser process
    pub launch_args: Vec<String>,
    /// Explicit browser executable
    pub chromium_path: Option<PathBuf>,
    /// Browser viewport
    pub viewport: Viewport,
    /// Storefront base URL; relative navigations resolve against it
    pub base_url: String,
    /// REST API base URL
    pub api_base_url: String,
    /// Attribute consulted by `get_by_test_id`
    pub test_id_attribute: String,
    /// Case scheduling
    pub execution_mode: ExecutionMode,
    /// Context lifetime
    pub context_scope: ContextScope,
    /// Auto-wait budget for locator actions
    pub action_timeout_ms: u64,
    /// Budget for navigations and event waits
    pub navigation_timeout_ms: u64,
    /// Budget for web-first assertions
    pub assertion_timeout_ms: u64,
    /// Initial polling interval (doubled on each retry up to a cap)
    pub poll_interval_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            headless: true,
            launch_args: Vec::new(),
            chromium_path: None,
            viewport: Viewport::default(),
            base_url: TOOLSHOP_BASE_URL.to_string(),
            api_base_url: TOOLSHOP_API_URL.to_string(),
            test_id_attribute: DEFAULT_TEST_ID_ATTRIBUTE.to_string(),
            execution_mode: ExecutionMode::Parallel,
            context_scope: ContextScope::PerCase,
            action_timeout_ms: 5_000,
            navigation_timeout_ms: 30_000,
            assertion_timeout_ms: 5_000,
            poll_interval_ms: 50,
        }
    }
}

impl HarnessConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset used by the Toolshop suites
    #[must_use]
    pub fn toolshop() -> Self {
        Self::default()
            .with_test_id_attribute("data-test")
            .with_launch_args(["--no-sandbox", "--disable-extensions", "--disable-gpu"])
    }

    /// Toolshop preset overlaid with the config file and environment
    pub fn load() -> HarnessResult<Self> {
        Self::toolshop().layered(|key| std::env::var(key).ok())
    }

    /// Overlay the file named by `HARNESS_CONFIG` and the `HARNESS_*`
    /// variables, both looked up through `lookup`
    pub fn layered<F>(self, lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = match lookup(CONFIG_FILE_ENV) {
            Some(path) if !path.trim().is_empty() => self.overlay_yaml_file(path.trim())?,
            _ => self,
        };
        config.apply_env(lookup)
    }

    /// Parse configuration from YAML; missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> HarnessResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Read configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Overlay the keys present in a YAML file onto this configuration
    pub fn overlay_yaml_file(self, path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let overlay: serde_yaml_ng::Value = serde_yaml_ng::from_str(&text)?;
        let mut base = serde_yaml_ng::to_value(&self)?;
        merge_yaml(&mut base, overlay);
        Ok(serde_yaml_ng::from_value(base)?)
    }

    /// Apply `HARNESS_*` overrides
    pub fn apply_env<F>(mut self, lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("HARNESS_HEADLESS") {
            self.headless = parse_bool("HARNESS_HEADLESS", &value)?;
        }
        if let Some(value) = lookup("HARNESS_BASE_URL") {
            self.base_url = value;
        }
        if let Some(value) = lookup("HARNESS_API_URL") {
            self.api_base_url = value;
        }
        if let Some(value) = lookup("HARNESS_TEST_ID_ATTRIBUTE") {
            self.test_id_attribute = value;
        }
        if let Some(value) = lookup("HARNESS_EXECUTION_MODE") {
            self.execution_mode = ExecutionMode::parse(&value)?;
        }
        if let Some(value) = lookup("HARNESS_CHROMIUM_PATH") {
            self.chromium_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("HARNESS_ARGS") {
            self.launch_args = value.split_whitespace().map(str::to_string).collect();
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations that cannot drive a browser
    pub fn validate(&self) -> HarnessResult<()> {
        if self.test_id_attribute.trim().is_empty() {
            return Err(HarnessError::config("test_id_attribute must not be empty"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(HarnessError::config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(HarnessError::config("poll_interval_ms must be positive"));
        }
        Ok(())
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Replace the launch arguments
    #[must_use]
    pub fn with_launch_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launch_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the browser executable
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Set the storefront base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the API base URL
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the test-id attribute
    #[must_use]
    pub fn with_test_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.test_id_attribute = attribute.into();
        self
    }

    /// Set the execution mode
    #[must_use]
    pub const fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Set the context scope
    #[must_use]
    pub const fn with_context_scope(mut self, scope: ContextScope) -> Self {
        self.context_scope = scope;
        self
    }

    /// Set the action (auto-wait) timeout
    #[must_use]
    pub const fn with_action_timeout_ms(mut self, ms: u64) -> Self {
        self.action_timeout_ms = ms;
        self
    }

    /// Set the navigation and event-wait timeout
    #[must_use]
    pub const fn with_navigation_timeout_ms(mut self, ms: u64) -> Self {
        self.navigation_timeout_ms = ms;
        self
    }

    /// Set the web-first assertion timeout
    #[must_use]
    pub const fn with_assertion_timeout_ms(mut self, ms: u64) -> Self {
        self.assertion_timeout_ms = ms;
        self
    }

    /// Set the initial polling interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Action timeout as a duration
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Navigation timeout as a duration
    #[must_use]
    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Assertion timeout as a duration
    #[must_use]
    pub const fn assertion_timeout(&self) -> Duration {
        Duration::from_millis(self.assertion_timeout_ms)
    }

    /// Polling interval as a duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn merge_yaml(base: &mut serde_yaml_ng::Value, overlay: serde_yaml_ng::Value) {
    match (base, overlay) {
        (serde_yaml_ng::Value::Mapping(base), serde_yaml_ng::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_yaml(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, serde_yaml_ng::Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

fn parse_bool(key: &str, value: &str) -> HarnessResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(HarnessError::config(format!(
            "{key} expects a boolean, got '{other}'"
        ))),
    }
}
