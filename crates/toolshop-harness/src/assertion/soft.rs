//! Soft assertions.
//!
//! Collect several failures before failing the case, e.g. checking the
//! status and the body of one API response together.

use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A single recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    /// Message describing the failure
    pub message: String,
    /// Position of the failing check among all checks
    pub index: usize,
}

/// Counts of checks made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionSummary {
    /// Checks made
    pub total: usize,
    /// Checks that held
    pub passed: usize,
    /// Checks that failed
    pub failed: usize,
}

/// Failure collector
///
/// ```ignore
/// let mut soft = SoftAssertions::new();
/// soft.assert_eq(&response.status, &201, "status");
/// soft.check(expect(&alert).to_be_visible().await, "alert");
/// soft.verify()?;
/// ```
#[derive(Debug, Default)]
pub struct SoftAssertions {
    failures: Vec<AssertionFailure>,
    checks: usize,
}

impl SoftAssertions {
    /// Empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, holds: bool, message: impl FnOnce() -> String) {
        if !holds {
            self.failures.push(AssertionFailure {
                message: message(),
                index: self.checks,
            });
        }
        self.checks += 1;
    }

    /// Values are equal
    pub fn assert_eq<T: PartialEq + Debug>(&mut self, actual: &T, expected: &T, message: &str) {
        self.record(actual == expected, || {
            format!("{message}: expected {expected:?}, got {actual:?}")
        });
    }

    /// Condition holds
    pub fn assert_true(&mut self, condition: bool, message: &str) {
        self.record(condition, || message.to_string());
    }

    /// Option is `None`
    pub fn assert_none<T: Debug>(&mut self, value: &Option<T>, message: &str) {
        self.record(value.is_none(), || format!("{message}: expected None, got {value:?}"));
    }

    /// `haystack` contains `needle`
    pub fn assert_contains(&mut self, haystack: &str, needle: &str, message: &str) {
        self.record(haystack.contains(needle), || {
            format!("{message}: expected {haystack:?} to contain {needle:?}")
        });
    }

    /// Record the outcome of a hard check (e.g. an awaited expectation)
    pub fn check<T>(&mut self, outcome: HarnessResult<T>, message: &str) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.record(true, String::new);
                Some(value)
            }
            Err(e) => {
                self.record(false, || format!("{message}: {e}"));
                None
            }
        }
    }

    /// Recorded failures
    #[must_use]
    pub fn failures(&self) -> &[AssertionFailure] {
        &self.failures
    }

    /// Whether every check held
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Counts of checks made
    #[must_use]
    pub fn summary(&self) -> AssertionSummary {
        AssertionSummary {
            total: self.checks,
            passed: self.checks - self.failures.len(),
            failed: self.failures.len(),
        }
    }

    /// Fail with every recorded message if any check failed
    pub fn verify(&self) -> HarnessResult<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("  #{}: {}", f.index + 1, f.message))
            .collect();
        Err(HarnessError::assertion(format!(
            "{} of {} checks failed:\n{}",
            self.failures.len(),
            self.checks,
            lines.join("\n")
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod collect_tests {
        use super::*;

        #[test]
        fn test_passing_checks() {
            let mut soft = SoftAssertions::new();
            soft.assert_eq(&201, &201, "status");
            soft.assert_true(true, "body present");
            soft.assert_contains("sarah@example.com", "@", "email");
            soft.assert_none(&None::<String>, "password");
            assert!(soft.all_passed());
            assert!(soft.verify().is_ok());
            assert_eq!(
                soft.summary(),
                AssertionSummary {
                    total: 4,
                    passed: 4,
                    failed: 0
                }
            );
        }

        #[test]
        fn test_failures_are_all_reported() {
            let mut soft = SoftAssertions::new();
            soft.assert_eq(&500, &201, "status");
            soft.assert_true(true, "fine");
            soft.assert_none(&Some("secret"), "password");
            assert_eq!(soft.failures().len(), 2);
            assert_eq!(soft.failures()[1].index, 2);
            let message = soft.verify().unwrap_err().to_string();
            assert!(message.contains("2 of 3 checks failed"));
            assert!(message.contains("status: expected 201, got 500"));
            assert!(message.contains("password: expected None"));
        }

        #[test]
        fn test_check_absorbs_errors() {
            let mut soft = SoftAssertions::new();
            assert_eq!(soft.check(Ok::<_, HarnessError>(3), "value"), Some(3));
            let missing: HarnessResult<()> = Err(HarnessError::NotFound {
                selector: "get_by_text(\"x\")".to_string(),
                waited_ms: 10,
            });
            assert_eq!(soft.check(missing, "alert"), None);
            assert_eq!(soft.summary().failed, 1);
            assert!(soft.failures()[0].message.starts_with("alert: "));
        }
    }
}
