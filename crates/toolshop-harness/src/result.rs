//! Result and error types for the harness.

use thiserror::Error;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while driving the storefront
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Browser process could not be started
    #[error("Failed to launch browser: {message}")]
    LaunchFailure {
        /// Error message
        message: String,
    },

    /// Browser process went away; the session cannot be used any more
    #[error("Browser session crashed: {message}")]
    SessionCrashed {
        /// Error message
        message: String,
    },

    /// Context (or one of its pages) was used after close
    #[error("Browser context {context} is closed")]
    ContextClosed {
        /// Context identifier
        context: String,
    },

    /// Navigation did not complete
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// Target URL
        url: String,
        /// Error message
        message: String,
    },

    /// No element matched after auto-waiting
    #[error("No element matches {selector} after waiting {waited_ms}ms")]
    NotFound {
        /// Selector description
        selector: String,
        /// Time spent waiting in milliseconds
        waited_ms: u64,
    },

    /// More than one element matched where exactly one was required
    #[error("{selector} resolved to {count} elements where exactly one was expected")]
    Ambiguous {
        /// Selector description
        selector: String,
        /// Number of matches
        count: usize,
    },

    /// Element reference belongs to a previous render of the page
    #[error("Element {element} is no longer attached to the page")]
    StaleElement {
        /// Element reference
        element: String,
    },

    /// A bounded wait expired
    #[error("Timed out after {ms}ms waiting for {waited_for}{}", trigger_note(.trigger_fired))]
    Timeout {
        /// What was awaited (URL pattern or condition)
        waited_for: String,
        /// Timeout in milliseconds
        ms: u64,
        /// Whether the coupled trigger action completed (`None` for plain waits)
        trigger_fired: Option<bool>,
    },

    /// The action coupled with a wait failed before the event arrived
    #[error("Trigger failed while waiting for {waited_for}: {source}")]
    TriggerFailed {
        /// What was awaited
        waited_for: String,
        /// Underlying error raised by the trigger
        source: Box<HarnessError>,
    },

    /// Non-success response from the REST API
    #[error("Request to {url} returned HTTP {status}: {body}")]
    DataFetchFailure {
        /// Requested URL
        url: String,
        /// HTTP status
        status: u16,
        /// Response body excerpt
        body: String,
    },

    /// A record in an API document was malformed
    #[error("Malformed record {record}: {message}")]
    ParseFailure {
        /// Location of the record (e.g. `data[3]`)
        record: String,
        /// Error message
        message: String,
    },

    /// Workflow step attempted from the wrong state
    #[error("Cannot {action} while the cart workflow is in state {state}")]
    PreconditionViolation {
        /// Current workflow state
        state: String,
        /// Attempted action
        action: String,
    },

    /// Driver-level failure not covered by a more specific variant
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Web-first or soft assertion did not hold
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Fixture resource could not be resolved
    #[error("Fixture error: {message}")]
    Fixture {
        /// Error message
        message: String,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

const fn trigger_note(fired: &Option<bool>) -> &'static str {
    match fired {
        Some(true) => " (trigger fired)",
        Some(false) => " (trigger did not complete)",
        None => "",
    }
}

impl HarnessError {
    /// Errors after which no further case in the suite can run
    #[must_use]
    pub const fn is_suite_fatal(&self) -> bool {
        matches!(self, Self::LaunchFailure { .. } | Self::SessionCrashed { .. })
    }

    /// Errors the locator resolver recovers from by re-resolving
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleElement { .. })
    }

    /// Create a driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create a parse failure for one record
    pub fn parse(record: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseFailure {
            record: record.into(),
            message: message.into(),
        }
    }
}
