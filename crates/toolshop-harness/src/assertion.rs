//! Web-first assertions.
//!
//! [`expect`] wraps a [`Locator`] in an [`Expectation`] whose checks retry
//! until they hold or the assertion timeout expires. Every probe resolves
//! the locator afresh, so checks survive re-renders.

pub mod soft;

pub use soft::{AssertionFailure, AssertionSummary, SoftAssertions};

use crate::locator::{normalize_whitespace, Locator};
use crate::result::{HarnessError, HarnessResult};
use crate::wait::Deadline;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// What a single probe saw: `Ok` when the check holds, otherwise a
/// description of the actual state
type Observation = Result<(), String>;

/// Start a web-first assertion on `locator`
#[must_use]
pub fn expect(locator: &Locator) -> Expectation {
    let settings = locator.page().settings();
    Expectation {
        locator: locator.clone(),
        timeout: settings.assertion_timeout,
        poll_interval: settings.poll_interval,
    }
}

/// Retrying checks over one locator
#[derive(Debug, Clone)]
pub struct Expectation {
    locator: Locator,
    timeout: Duration,
    poll_interval: Duration,
}

impl Expectation {
    /// Override the assertion timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Locator under test
    #[must_use]
    pub const fn locator(&self) -> &Locator {
        &self.locator
    }

    /// The single match is rendered
    pub async fn to_be_visible(&self) -> HarnessResult<()> {
        self.poll("to be visible", |probe| async move {
            Ok(if probe.is_visible().await? {
                Ok(())
            } else {
                Err("hidden or absent".to_string())
            })
        })
        .await
    }

    /// No match is rendered
    pub async fn to_be_hidden(&self) -> HarnessResult<()> {
        self.poll("to be hidden", |probe| async move {
            Ok(if probe.is_hidden().await? {
                Ok(())
            } else {
                Err("visible".to_string())
            })
        })
        .await
    }

    /// The form control's value equals `expected`
    pub async fn to_have_value(&self, expected: &str) -> HarnessResult<()> {
        let description = format!("to have value {expected:?}");
        self.poll(&description, |probe| async move {
            let actual = probe.input_value().await?;
            Ok(if actual == expected {
                Ok(())
            } else {
                Err(format!("value {actual:?}"))
            })
        })
        .await
    }

    /// The text equals `expected` after whitespace normalisation
    pub async fn to_have_text(&self, expected: &str) -> HarnessResult<()> {
        let description = format!("to have text {expected:?}");
        let wanted = normalize_whitespace(expected);
        let wanted = wanted.as_str();
        self.poll(&description, |probe| async move {
            let actual = normalize_whitespace(&probe.inner_text().await?);
            Ok(if actual == wanted {
                Ok(())
            } else {
                Err(format!("text {actual:?}"))
            })
        })
        .await
    }

    /// The text contains `expected` after whitespace normalisation
    pub async fn to_contain_text(&self, expected: &str) -> HarnessResult<()> {
        let description = format!("to contain text {expected:?}");
        let wanted = normalize_whitespace(expected);
        let wanted = wanted.as_str();
        self.poll(&description, |probe| async move {
            let actual = normalize_whitespace(&probe.inner_text().await?);
            Ok(if actual.contains(wanted) {
                Ok(())
            } else {
                Err(format!("text {actual:?}"))
            })
        })
        .await
    }

    /// Exactly `expected` elements match
    pub async fn to_have_count(&self, expected: usize) -> HarnessResult<()> {
        let description = format!("to have count {expected}");
        self.poll(&description, |probe| async move {
            let actual = probe.count().await?;
            Ok(if actual == expected {
                Ok(())
            } else {
                Err(format!("count {actual}"))
            })
        })
        .await
    }

    /// Run `probe` against a one-shot copy of the locator until it reports
    /// success. Missing elements keep the assertion polling; ambiguity and
    /// driver failures end it at once.
    async fn poll<F, Fut>(&self, description: &str, mut probe: F) -> HarnessResult<()>
    where
        F: FnMut(Locator) -> Fut,
        Fut: Future<Output = HarnessResult<Observation>>,
    {
        let one_shot = self.locator.clone().with_timeout(Duration::ZERO);
        let mut deadline = Deadline::new(self.timeout, self.poll_interval);
        let mut last_seen = String::from("nothing");
        loop {
            match probe(one_shot.clone()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(actual)) => last_seen = actual,
                Err(HarnessError::NotFound { .. }) => last_seen = "no matching element".to_string(),
                Err(e @ HarnessError::Timeout { .. }) => last_seen = e.to_string(),
                Err(e) if e.is_stale() => {}
                Err(e) => return Err(e),
            }
            debug!(locator = %self.locator, expectation = description, %last_seen, "assertion pending");
            if !deadline.pause().await {
                return Err(HarnessError::assertion(format!(
                    "expected {} {description} within {}ms, last saw {last_seen}",
                    self.locator,
                    self.timeout.as_millis()
                )));
            }
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expect({})", self.locator)
    }
}
