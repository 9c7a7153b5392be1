//! Suite runner.
//!
//! A [`Suite`] owns one [`Session`] and runs [`Case`]s against it. With
//! [`ContextScope::PerCase`] every case gets a fresh context; with
//! [`ContextScope::PerSuite`] cases share one page and run in order.
//! `LaunchFailure` and `SessionCrashed` abort the remaining cases.

use crate::config::{ContextScope, ExecutionMode, HarnessConfig};
use crate::driver::BrowserLauncher;
use crate::page::Page;
use crate::result::{HarnessError, HarnessResult};
use crate::session::{BrowsingContext, Session};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

type CaseBody = Box<dyn FnOnce(Page) -> BoxFuture<'static, HarnessResult<()>> + Send>;

/// A named test body taking the page it runs on
pub struct Case {
    name: String,
    body: CaseBody,
}

impl Case {
    /// Create a case
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Page) -> Fut + Send + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(move |page| body(page).boxed()),
        }
    }

    /// Case name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case").field("name", &self.name).finish_non_exhaustive()
    }
}

/// How a case ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Body returned `Ok`
    Passed,
    /// Body returned an error or panicked
    Failed(String),
    /// Body hit an error that ends the suite
    Aborted(String),
    /// Not run because the suite was already aborted
    Skipped(String),
}

impl Outcome {
    fn from_error(err: &HarnessError) -> Self {
        if err.is_suite_fatal() {
            Self::Aborted(err.to_string())
        } else {
            Self::Failed(err.to_string())
        }
    }
}

/// Result of one case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    /// Case name
    pub name: String,
    /// How it ended
    pub outcome: Outcome,
    /// Wall-clock time spent
    pub duration: Duration,
}

impl CaseReport {
    /// Whether the case passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

/// Counts per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    /// Passed cases
    pub passed: usize,
    /// Failed cases
    pub failed: usize,
    /// Cases that aborted the suite
    pub aborted: usize,
    /// Cases never run
    pub skipped: usize,
}

impl SuiteSummary {
    /// Total number of cases
    #[must_use]
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.aborted + self.skipped
    }
}

impl fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} aborted, {} skipped",
            self.passed, self.failed, self.aborted, self.skipped
        )
    }
}

/// Cases sharing one browser session
pub struct Suite {
    name: String,
    session: Session,
    shared: Option<(BrowsingContext, Page)>,
    reports: Vec<CaseReport>,
    abort_reason: Option<String>,
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("session", &self.session)
            .field("reports", &self.reports.len())
            .field("aborted", &self.abort_reason.is_some())
            .finish_non_exhaustive()
    }
}

impl Suite {
    /// Launch the browser for a suite.
    ///
    /// # Errors
    ///
    /// `LaunchFailure` if the browser cannot start.
    pub async fn open(
        name: impl Into<String>,
        config: HarnessConfig,
        launcher: &dyn BrowserLauncher,
    ) -> HarnessResult<Self> {
        let name = name.into();
        let session = Session::open(config, launcher).await?;
        info!(suite = %name, "suite opened");
        Ok(Self {
            name,
            session,
            shared: None,
            reports: Vec::new(),
            abort_reason: None,
        })
    }

    /// Suite name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying session
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Reports of every case run so far, in submission order
    #[must_use]
    pub fn reports(&self) -> &[CaseReport] {
        &self.reports
    }

    /// Outcome counts
    #[must_use]
    pub fn summary(&self) -> SuiteSummary {
        self.reports
            .iter()
            .fold(SuiteSummary::default(), |mut acc, report| {
                match report.outcome {
                    Outcome::Passed => acc.passed += 1,
                    Outcome::Failed(_) => acc.failed += 1,
                    Outcome::Aborted(_) => acc.aborted += 1,
                    Outcome::Skipped(_) => acc.skipped += 1,
                }
                acc
            })
    }

    /// Whether every case passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(CaseReport::passed)
    }

    /// Whether a suite-fatal error has occurred
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    fn skipped(&self, name: String) -> CaseReport {
        CaseReport {
            name,
            outcome: Outcome::Skipped(self.abort_reason.clone().unwrap_or_default()),
            duration: Duration::ZERO,
        }
    }

    fn record(&mut self, report: CaseReport) -> &CaseReport {
        if let Outcome::Aborted(reason) = &report.outcome {
            error!(suite = %self.name, case = %report.name, %reason, "suite aborted");
            self.abort_reason.get_or_insert_with(|| reason.clone());
        }
        let index = self.reports.len();
        self.reports.push(report);
        &self.reports[index]
    }

    async fn shared_page(&mut self) -> HarnessResult<Page> {
        if let Some((_, page)) = &self.shared {
            return Ok(page.clone());
        }
        let context = self.session.new_context().await?;
        let page = context.new_page().await?;
        self.shared = Some((context, page.clone()));
        Ok(page)
    }

    /// Run one case and record its report
    #[instrument(skip_all, fields(suite = %self.name, case = %case.name))]
    pub async fn case(&mut self, case: Case) -> &CaseReport {
        if self.is_aborted() {
            let report = self.skipped(case.name);
            return self.record(report);
        }
        let report = match self.session.config().context_scope {
            ContextScope::PerCase => run_isolated(self.session.clone(), case).await,
            ContextScope::PerSuite => {
                let started = Instant::now();
                let Case { name, body } = case;
                let outcome = match self.shared_page().await {
                    Ok(page) => settle(AssertUnwindSafe(body(page)).catch_unwind().await),
                    Err(e) => Outcome::from_error(&e),
                };
                finish(name, outcome, started)
            }
        };
        self.record(report)
    }

    /// Run independent cases, concurrently when the configuration allows.
    ///
    /// Same-thread mode and a per-suite context fall back to running the
    /// cases in order. Reports keep the order of `cases`.
    pub async fn run_parallel(&mut self, cases: Vec<Case>) -> &[CaseReport] {
        let first = self.reports.len();
        let config = self.session.config();
        let concurrent = config.execution_mode == ExecutionMode::Parallel
            && config.context_scope == ContextScope::PerCase;
        if !concurrent || self.is_aborted() {
            for case in cases {
                self.case(case).await;
            }
            return &self.reports[first..];
        }

        let mut tasks = JoinSet::new();
        let mut names = Vec::with_capacity(cases.len());
        for (index, case) in cases.into_iter().enumerate() {
            names.push(case.name.clone());
            let session = self.session.clone();
            tasks.spawn(async move { (index, run_isolated(session, case).await) });
        }

        let mut finished: Vec<Option<CaseReport>> = vec![None; names.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => finished[index] = Some(report),
                Err(e) => warn!(suite = %self.name, error = %e, "case task did not complete"),
            }
        }
        for (name, report) in names.into_iter().zip(finished) {
            let report = report.unwrap_or_else(|| CaseReport {
                name,
                outcome: Outcome::Failed("case task was cancelled".to_string()),
                duration: Duration::ZERO,
            });
            self.record(report);
        }
        &self.reports[first..]
    }

    /// Close the shared context (if any) and the browser
    pub async fn close(mut self) -> HarnessResult<SuiteSummary> {
        let summary = self.summary();
        if let Some((context, _)) = self.shared.take() {
            if let Err(e) = context.close().await {
                warn!(suite = %self.name, error = %e, "failed to close shared context");
            }
        }
        self.session.close().await?;
        info!(suite = %self.name, %summary, "suite finished");
        Ok(summary)
    }
}

async fn run_isolated(session: Session, case: Case) -> CaseReport {
    let started = Instant::now();
    let Case { name, body } = case;
    let outcome = settle(
        AssertUnwindSafe(session.with_page(body))
            .catch_unwind()
            .await,
    );
    finish(name, outcome, started)
}

fn settle(result: Result<HarnessResult<()>, Box<dyn Any + Send>>) -> Outcome {
    match result {
        Ok(Ok(())) => Outcome::Passed,
        Ok(Err(e)) => Outcome::from_error(&e),
        Err(panic) => Outcome::Failed(format!("panicked: {}", panic_message(panic.as_ref()))),
    }
}

fn finish(name: String, outcome: Outcome, started: Instant) -> CaseReport {
    let duration = started.elapsed();
    match &outcome {
        Outcome::Passed => info!(case = %name, ?duration, "case passed"),
        Outcome::Failed(reason) | Outcome::Aborted(reason) | Outcome::Skipped(reason) => {
            warn!(case = %name, %reason, "case did not pass");
        }
    }
    CaseReport {
        name,
        outcome,
        duration,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
