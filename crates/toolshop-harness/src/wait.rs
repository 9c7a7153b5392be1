//! Bounded waits and perform-and-await coordination.
//!
//! Every suspension point in the harness goes through here, so nothing
//! waits without a deadline. Polling starts at the configured interval and
//! doubles up to [`MAX_POLL_INTERVAL_MS`].

use crate::driver::PageDriver;
use crate::network::{ResponseEvent, UrlPattern};
use crate::result::{HarnessError, HarnessResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::debug;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for event waits (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default initial polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Polling never backs off beyond this
pub const MAX_POLL_INTERVAL_MS: u64 = 500;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Initial polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// ELEMENT STATES
// =============================================================================

/// Element states for `Locator::wait_for`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WaitState {
    /// At least one element is present
    Attached,
    /// No element is present
    Detached,
    /// An element is present and rendered
    #[default]
    Visible,
    /// No element is rendered (absent counts as hidden)
    Hidden,
}

impl std::fmt::Display for WaitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Attached => "attached",
            Self::Detached => "detached",
            Self::Visible => "visible",
            Self::Hidden => "hidden",
        };
        write!(f, "{name}")
    }
}

// =============================================================================
// DEADLINE
// =============================================================================

/// Deadline with exponential polling backoff
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
    next_delay: Duration,
}

impl Deadline {
    /// Start a deadline now
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            next_delay: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Time since the deadline started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time in whole milliseconds
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Budget left
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    /// Whether the budget is spent
    #[must_use]
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Sleep for the next backoff step (clamped to the remaining budget).
    /// Returns `false` without sleeping once the deadline has passed.
    pub async fn pause(&mut self) -> bool {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return false;
        }
        let delay = self.next_delay.min(remaining);
        self.next_delay = (self.next_delay * 2).min(Duration::from_millis(MAX_POLL_INTERVAL_MS));
        tokio::time::sleep(delay).await;
        true
    }
}

// =============================================================================
// WAIT RESULT
// =============================================================================

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    /// Time spent waiting
    pub elapsed: Duration,
    /// Description of what was waited for
    pub waited_for: String,
    /// Number of times the condition was evaluated
    pub attempts: u32,
}

// =============================================================================
// WAIT FUNCTIONS
// =============================================================================

/// Poll `predicate` until it returns `true` or the timeout expires.
///
/// Errors returned by the predicate abort the wait.
pub async fn wait_until<P, Fut>(
    description: &str,
    options: WaitOptions,
    mut predicate: P,
) -> HarnessResult<WaitResult>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<bool>>,
{
    poll_condition(description, options, &mut predicate, None).await
}

async fn poll_condition<P, Fut>(
    description: &str,
    options: WaitOptions,
    predicate: &mut P,
    trigger_fired: Option<bool>,
) -> HarnessResult<WaitResult>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<bool>>,
{
    let mut deadline = Deadline::new(options.timeout(), options.poll_interval());
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if predicate().await? {
            debug!(condition = description, attempts, "condition met");
            return Ok(WaitResult {
                elapsed: deadline.elapsed(),
                waited_for: description.to_string(),
                attempts,
            });
        }
        if !deadline.pause().await {
            return Err(HarnessError::Timeout {
                waited_for: description.to_string(),
                ms: options.timeout_ms,
                trigger_fired,
            });
        }
    }
}

/// Subscribe to responses, run `trigger`, then wait for the first response
/// whose URL matches `pattern`.
///
/// Responses that arrived before the subscription are never considered.
pub async fn perform_and_await_response<T, Fut>(
    driver: &dyn PageDriver,
    pattern: &UrlPattern,
    trigger: Fut,
    options: WaitOptions,
) -> HarnessResult<(T, ResponseEvent)>
where
    Fut: Future<Output = HarnessResult<T>>,
{
    let pattern = pattern.compile()?;
    let waited_for = format!("response with {pattern}");
    let mut responses = driver.subscribe_responses();

    let value = trigger.await.map_err(|e| HarnessError::TriggerFailed {
        waited_for: waited_for.clone(),
        source: Box::new(e),
    })?;

    let matching = async {
        loop {
            match responses.recv().await {
                Ok(event) if pattern.matches(&event.url) => return Ok(event),
                Ok(event) => debug!(url = %event.url, "ignoring response"),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "response subscriber lagged");
                }
                Err(RecvError::Closed) => {
                    return Err(HarnessError::driver(format!(
                        "page closed while waiting for {waited_for}"
                    )));
                }
            }
        }
    };

    match tokio::time::timeout(options.timeout(), matching).await {
        Ok(event) => Ok((value, event?)),
        Err(_) => Err(HarnessError::Timeout {
            waited_for,
            ms: options.timeout_ms,
            trigger_fired: Some(true),
        }),
    }
}

/// Run `trigger`, then poll `predicate` until it holds.
pub async fn perform_and_await_condition<T, Fut, P, PFut>(
    description: &str,
    trigger: Fut,
    mut predicate: P,
    options: WaitOptions,
) -> HarnessResult<(T, WaitResult)>
where
    Fut: Future<Output = HarnessResult<T>>,
    P: FnMut() -> PFut,
    PFut: Future<Output = HarnessResult<bool>>,
{
    let value = trigger.await.map_err(|e| HarnessError::TriggerFailed {
        waited_for: description.to_string(),
        source: Box::new(e),
    })?;
    let result = poll_condition(description, options, &mut predicate, Some(true)).await?;
    Ok((value, result))
}
