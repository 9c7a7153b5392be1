//! Page Object Model support.
//!
//! A page object wraps a cloned [`Page`] handle and exposes task-level
//! operations. It never hands raw locators to callers: reads come back as
//! plain values and checks as [`crate::assertion::Expectation`]s.
//!
//! # Example
//!
//! ```ignore
//! struct ContactPage {
//!     page: Page,
//! }
//!
//! #[async_trait]
//! impl PageObject for ContactPage {
//!     fn page(&self) -> &Page {
//!         &self.page
//!     }
//!
//!     fn route(&self) -> &str {
//!         "/contact"
//!     }
//! }
//! ```

use crate::page::Page;
use crate::result::HarnessResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

/// A page or component of the storefront
#[async_trait]
pub trait PageObject: Send + Sync {
    /// Page the object operates on
    fn page(&self) -> &Page;

    /// Route pattern (`/contact`, `/product/:id`)
    fn route(&self) -> &str;

    /// Name used in logs
    fn page_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Wait until page-specific content is ready
    async fn wait_until_loaded(&self) -> HarnessResult<()> {
        Ok(())
    }

    /// Navigate to the route and wait until loaded
    async fn open(&self) -> HarnessResult<()> {
        info!(page = self.page_name(), route = self.route(), "opening page");
        self.page().goto(self.route()).await?;
        self.wait_until_loaded().await
    }

    /// Whether the current URL matches the route
    async fn is_current(&self) -> HarnessResult<bool> {
        let url = self.page().url().await?;
        Ok(UrlMatcher::new(self.route()).matches(&url))
    }
}

/// Route matcher over the path of a URL
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: String,
    segments: Vec<RouteSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RouteSegment {
    Literal(String),
    Wildcard,
    Parameter(String),
}

/// Path of a URL without scheme, host, query or fragment
fn path_of(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = if url.contains("://") {
        without_scheme.find('/').map_or("", |i| &without_scheme[i..])
    } else {
        without_scheme
    };
    path.split(['?', '#']).next().unwrap_or_default()
}

impl UrlMatcher {
    /// Patterns support literal segments, `*` and `:name` parameters;
    /// each of the latter consumes exactly one segment
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let segments = path_of(pattern)
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    RouteSegment::Wildcard
                } else if let Some(name) = s.strip_prefix(':') {
                    RouteSegment::Parameter(name.to_string())
                } else {
                    RouteSegment::Literal(s.to_string())
                }
            })
            .collect();
        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    /// Check the path of `url` against the pattern
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        let parts: Vec<&str> = path_of(url).split('/').filter(|s| !s.is_empty()).collect();
        parts.len() == self.segments.len()
            && self.segments.iter().zip(&parts).all(|(segment, part)| match segment {
                RouteSegment::Literal(literal) => literal == part,
                RouteSegment::Wildcard | RouteSegment::Parameter(_) => true,
            })
    }

    /// Named parameters of a matching URL
    #[must_use]
    pub fn params(&self, url: &str) -> HashMap<String, String> {
        if !self.matches(url) {
            return HashMap::new();
        }
        let parts: Vec<&str> = path_of(url).split('/').filter(|s| !s.is_empty()).collect();
        self.segments
            .iter()
            .zip(parts)
            .filter_map(|(segment, part)| match segment {
                RouteSegment::Parameter(name) => Some((name.clone(), part.to_string())),
                _ => None,
            })
            .collect()
    }

    /// Pattern as given
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
