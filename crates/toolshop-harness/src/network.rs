//! Network response observation and URL matching.
//!
//! Drivers publish every response the page receives as a [`ResponseEvent`]
//! on a broadcast channel; the event sync helper filters them with a
//! [`UrlPattern`].

use crate::result::{HarnessError, HarnessResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP methods for response matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HttpMethod {
    /// GET request
    #[default]
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// Anything else (HEAD, OPTIONS, unknown)
    Other,
}

impl HttpMethod {
    /// Parse from a protocol string
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            _ => Self::Other,
        }
    }

    /// Protocol string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Other => "OTHER",
        }
    }
}

/// A response observed by the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    /// Full request URL, including query string
    pub url: String,
    /// HTTP status
    pub status: u16,
    /// Request method
    pub method: HttpMethod,
}

impl ResponseEvent {
    /// Create a GET response event
    pub fn get(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            method: HttpMethod::Get,
        }
    }

    /// Create a POST response event
    pub fn post(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            method: HttpMethod::Post,
        }
    }

    /// Check for a 2xx status
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// URL pattern for matching responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlPattern {
    /// Exact URL match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Contains substring
    Contains(String),
    /// Regex match
    Regex(String),
    /// Glob pattern (e.g., "**/products/search?q=tape")
    Glob(String),
    /// Match any URL
    Any,
}

impl UrlPattern {
    /// Glob pattern: `**` crosses `/`, `*` does not, `?` is literal
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::Glob(pattern.into())
    }

    /// Check if a URL matches this pattern. Compiles the pattern on every
    /// call; waits use [`UrlPattern::compile`] instead.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.compile().is_ok_and(|matcher| matcher.matches(url))
    }

    /// Compile once for repeated matching
    pub fn compile(&self) -> HarnessResult<CompiledUrlPattern> {
        let regex = match self {
            Self::Regex(pattern) => Some(Regex::new(pattern).map_err(|e| {
                HarnessError::config(format!("invalid URL regex '{pattern}': {e}"))
            })?),
            Self::Glob(pattern) => Some(glob_to_regex(pattern)?),
            _ => None,
        };
        Ok(CompiledUrlPattern {
            pattern: self.clone(),
            regex,
        })
    }

    /// Fail early on patterns that can never match
    pub fn validate(&self) -> HarnessResult<()> {
        self.compile().map(|_| ())
    }
}

/// A [`UrlPattern`] with its regex built
#[derive(Debug, Clone)]
pub struct CompiledUrlPattern {
    pattern: UrlPattern,
    regex: Option<Regex>,
}

impl CompiledUrlPattern {
    /// Source pattern
    #[must_use]
    pub const fn pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    /// Check if a URL matches
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        if let Some(regex) = &self.regex {
            return regex.is_match(url);
        }
        match &self.pattern {
            UrlPattern::Exact(pattern) => url == pattern,
            UrlPattern::Prefix(pattern) => url.starts_with(pattern.as_str()),
            UrlPattern::Contains(pattern) => url.contains(pattern.as_str()),
            UrlPattern::Any => true,
            UrlPattern::Regex(_) | UrlPattern::Glob(_) => false,
        }
    }
}

impl fmt::Display for CompiledUrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pattern.fmt(f)
    }
}

impl From<&str> for UrlPattern {
    fn from(pattern: &str) -> Self {
        Self::Glob(pattern.to_string())
    }
}

impl From<String> for UrlPattern {
    fn from(pattern: String) -> Self {
        Self::Glob(pattern)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(p) => write!(f, "url == {p}"),
            Self::Prefix(p) => write!(f, "url starting with {p}"),
            Self::Contains(p) => write!(f, "url containing {p}"),
            Self::Regex(p) => write!(f, "url matching /{p}/"),
            Self::Glob(p) => write!(f, "url matching {p}"),
            Self::Any => write!(f, "any url"),
        }
    }
}

/// Translate a URL glob into an anchored regex
pub fn glob_to_regex(glob: &str) -> HarnessResult<Regex> {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                out.push_str(".*");
            } else {
                out.push_str("[^/]*");
            }
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| HarnessError::config(format!("invalid URL glob '{glob}': {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    mod glob_tests {
        use super::*;

        #[test]
        fn test_double_star_crosses_slashes() {
            let pattern = UrlPattern::glob("**/products/search?q=tape");
            assert!(pattern.matches("https://api.practicesoftwaretesting.com/products/search?q=tape"));
            assert!(!pattern.matches("https://api.practicesoftwaretesting.com/products/search?q=tapes"));
        }

        #[test]
        fn test_question_mark_is_literal() {
            let pattern = UrlPattern::glob("**/search?q=*");
            assert!(pattern.matches("https://x.test/search?q=pliers"));
            assert!(!pattern.matches("https://x.test/searchXq=pliers"));
        }

        #[test]
        fn test_single_star_stops_at_slash() {
            let pattern = UrlPattern::glob("https://x.test/*/details");
            assert!(pattern.matches("https://x.test/product/details"));
            assert!(!pattern.matches("https://x.test/a/b/details"));
        }

        #[test]
        fn test_regex_metacharacters_are_literal() {
            let pattern = UrlPattern::glob("**/products?page=2");
            assert!(pattern.matches("https://api.test/products?page=2"));
            assert!(!pattern.matches("https://api.test/productsXpage=2"));
            let dotted = UrlPattern::glob("https://api.test/a.b");
            assert!(!dotted.matches("https://api.test/aXb"));
        }

        #[test]
        fn test_from_str_is_glob() {
            assert_eq!(UrlPattern::from("**/carts"), UrlPattern::Glob("**/carts".to_string()));
        }
    }

    mod pattern_tests {
        use super::*;

        #[test]
        fn test_variants() {
            let url = "https://api.test/products/search?q=tape";
            assert!(UrlPattern::Exact(url.to_string()).matches(url));
            assert!(UrlPattern::Prefix("https://api.test".to_string()).matches(url));
            assert!(UrlPattern::Contains("search".to_string()).matches(url));
            assert!(UrlPattern::Regex(r"q=\w+$".to_string()).matches(url));
            assert!(UrlPattern::Any.matches(url));
        }

        #[test]
        fn test_invalid_regex_never_matches_and_fails_validation() {
            let pattern = UrlPattern::Regex("(".to_string());
            assert!(!pattern.matches("("));
            assert!(pattern.validate().is_err());
        }

        #[test]
        fn test_compiled_pattern_is_reusable() {
            let compiled = UrlPattern::glob("**/products/search?q=*").compile().unwrap();
            assert!(compiled.matches("https://api.test/products/search?q=tape"));
            assert!(compiled.matches("https://api.test/products/search?q=saw"));
            assert!(!compiled.matches("https://api.test/products?page=2"));
            assert_eq!(compiled.to_string(), "url matching **/products/search?q=*");

            let contains = UrlPattern::Contains("/carts".to_string()).compile().unwrap();
            assert!(contains.matches("https://api.test/carts/01"));
            assert!(matches!(
                UrlPattern::Regex("(".to_string()).compile(),
                Err(HarnessError::Config { .. })
            ));
        }

        #[test]
        fn test_display_names_pattern() {
            let text = UrlPattern::glob("**/users/register").to_string();
            assert!(text.contains("**/users/register"));
        }
    }

    mod event_tests {
        use super::*;

        #[test]
        fn test_success_range() {
            assert!(ResponseEvent::get("u", 200).is_success());
            assert!(ResponseEvent::post("u", 201).is_success());
            assert!(!ResponseEvent::get("u", 404).is_success());
        }

        #[test]
        fn test_method_parse() {
            assert_eq!(HttpMethod::parse("post"), HttpMethod::Post);
            assert_eq!(HttpMethod::parse("OPTIONS"), HttpMethod::Other);
        }
    }

    proptest! {
        #[test]
        fn prop_literal_glob_matches_itself(s in "[a-zA-Z0-9/?.=&:_-]{0,40}") {
            prop_assert!(UrlPattern::glob(s.clone()).matches(&s));
        }

        #[test]
        fn prop_double_star_prefix_matches_any_host(host in "[a-z]{1,10}", path in "[a-z/]{0,20}") {
            let url = format!("https://{host}.test/{path}/products");
            prop_assert!(UrlPattern::glob("**/products").matches(&url));
        }

        #[test]
        fn prop_single_star_never_spans_slash(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            let url = format!("https://x.test/{a}/{b}/end");
            prop_assert!(!UrlPattern::glob("https://x.test/*/end").matches(&url));
        }
    }
}
