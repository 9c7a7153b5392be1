//! Toolshop Harness: end-to-end testing for the Toolshop storefront
//!
//! Drives a browser against the Practice Software Testing "Toolshop" site
//! through auto-waiting locators and page objects, and seeds or checks data
//! through the storefront's REST API.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                    TOOLSHOP HARNESS Architecture                   │
//! ├───────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐              │
//! │   │ Suite /    │    │ Page       │    │ Locator    │              │
//! │   │ Case       │───►│ Objects    │───►│ Resolver   │──┐           │
//! │   │ (harness)  │    │ (pages)    │    │ + expect   │  │           │
//! │   └─────┬──────┘    └─────┬──────┘    └────────────┘  ▼           │
//! │         │                 │ event sync   ┌───────────────────┐    │
//! │         ▼                 └─────────────►│ Page / Context /  │    │
//! │   ┌────────────┐                         │ Browser drivers   │    │
//! │   │ Session    │────────────────────────►│ (memory | CDP)    │    │
//! │   └────────────┘                         └───────────────────┘    │
//! │   ┌────────────┐                                                  │
//! │   │ API Data   │──► REST (products, users)                        │
//! │   │ Provider   │                                                  │
//! │   └────────────┘                                                  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The in-memory driver ([`driver::memory`]) scripts a site with closures so
//! the whole stack runs without a browser; the `browser` feature adds a
//! Chromium backend over the DevTools protocol.

#![warn(missing_docs)]

pub mod api;
pub mod assertion;
pub mod cart_workflow;
pub mod config;
pub mod driver;
pub mod fixture;
pub mod harness;
pub mod locator;
pub mod logging;
pub mod network;
pub mod page;
pub mod page_object;
pub mod pages;
pub mod result;
pub mod session;
pub mod wait;

pub use api::{ApiClient, Product, ProductFeed, RegisteredUser, User, UsersApi};
pub use assertion::{expect, Expectation, SoftAssertions};
pub use cart_workflow::{CartAction, CartState, CartWorkflow};
pub use config::{ContextScope, ExecutionMode, HarnessConfig};
pub use driver::{BrowserLauncher, SelectOption};
pub use fixture::FixtureFiles;
pub use harness::{Case, CaseReport, Outcome, Suite, SuiteSummary};
pub use locator::{AriaRole, FilterOptions, Locator};
pub use network::{CompiledUrlPattern, ResponseEvent, UrlPattern};
pub use page::{Page, PageSettings};
pub use page_object::{PageObject, UrlMatcher};
pub use pages::Storefront;
pub use result::{HarnessError, HarnessResult};
pub use session::{BrowsingContext, Session};
pub use wait::{WaitOptions, WaitState};

/// Glob import for test files
pub mod prelude {
    pub use super::api::*;
    pub use super::assertion::*;
    pub use super::cart_workflow::*;
    pub use super::config::*;
    pub use super::driver::{BrowserLauncher, SelectOption};
    pub use super::fixture::*;
    pub use super::harness::*;
    pub use super::locator::{AriaRole, FilterOptions, Locator};
    pub use super::network::{CompiledUrlPattern, ResponseEvent, UrlPattern};
    pub use super::page::*;
    pub use super::page_object::*;
    pub use super::pages::*;
    pub use super::result::*;
    pub use super::session::*;
    pub use super::wait::{WaitOptions, WaitState};
}
