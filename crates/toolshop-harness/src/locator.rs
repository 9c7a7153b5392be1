//! Locator abstraction for element selection and interaction.
//!
//! A [`Locator`] is a deferred query. Nothing is looked up when it is built;
//! every action resolves it again against the live page, so a locator keeps
//! working across re-renders and navigations.
//!
//! # Design Philosophy
//!
//! - **Auto-Waiting**: actions retry resolution with backoff until the
//!   locator's timeout before reporting `NotFound`
//! - **Strict Selection**: single-element actions fail with `Ambiguous` when
//!   more than one element matches
//! - **Semantic Queries**: text, alt text, label, placeholder, role and
//!   test-id lookups mirror how users and assistive technology see the page
//! - **Fluent API**: chainable scoping (`locator(".card").get_by_text(..)`)
//!   and narrowing (`filter`, `first`, `nth`)

use crate::driver::{ElementRef, ElementSnapshot, PageDriver, SelectOption};
use crate::page::{Page, PageSettings};
use crate::result::{HarnessError, HarnessResult};
use crate::wait::{Deadline, WaitState};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default timeout for auto-waiting (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default polling interval for auto-waiting (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Tags whose text never renders
const NON_RENDERED_TAGS: [&str; 6] = ["script", "style", "head", "title", "noscript", "template"];

/// Collapse whitespace runs to one space and trim
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// TEXT MATCHING
// =============================================================================

/// Text condition used by the semantic selectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    /// Expected text
    pub text: String,
    /// Whole-string, case-sensitive comparison (after whitespace normalisation)
    pub exact: bool,
}

impl TextMatch {
    /// Case-insensitive substring match
    pub fn substring(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exact: false,
        }
    }

    /// Exact match
    pub fn exact(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exact: true,
        }
    }

    /// Check a candidate string
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = normalize_whitespace(candidate);
        let wanted = normalize_whitespace(&self.text);
        if self.exact {
            candidate == wanted
        } else {
            candidate.to_lowercase().contains(&wanted.to_lowercase())
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exact {
            write!(f, "{:?}, exact", self.text)
        } else {
            write!(f, "{:?}", self.text)
        }
    }
}

// =============================================================================
// ARIA ROLES
// =============================================================================

/// ARIA roles understood by `get_by_role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AriaRole {
    /// `role=alert`
    Alert,
    /// `<header>`
    Banner,
    /// `<button>`, `<input type=submit|button|reset|image>`
    Button,
    /// `<td>`
    Cell,
    /// `<input type=checkbox>`
    Checkbox,
    /// `<th>`
    ColumnHeader,
    /// single `<select>`
    Combobox,
    /// `<footer>`
    ContentInfo,
    /// `<dialog>`
    Dialog,
    /// `<form>`
    Form,
    /// `<h1>`..`<h6>`
    Heading,
    /// `<img>` with non-empty alt
    Img,
    /// `<a href>`
    Link,
    /// `<ul>`, `<ol>`
    List,
    /// multiple `<select>`
    Listbox,
    /// `<li>`
    ListItem,
    /// `<main>`
    Main,
    /// `<nav>`
    Navigation,
    /// `<option>`
    Option,
    /// `<input type=radio>`
    Radio,
    /// `<tr>`
    Row,
    /// `<input type=search>`
    Searchbox,
    /// `<input type=range>`
    Slider,
    /// `<input type=number>`
    Spinbutton,
    /// `<output>`, `role=status`
    Status,
    /// `role=tab`
    Tab,
    /// `<table>`
    Table,
    /// text inputs and `<textarea>`
    Textbox,
}

impl AriaRole {
    /// Role name as used in the `role` attribute
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Banner => "banner",
            Self::Button => "button",
            Self::Cell => "cell",
            Self::Checkbox => "checkbox",
            Self::ColumnHeader => "columnheader",
            Self::Combobox => "combobox",
            Self::ContentInfo => "contentinfo",
            Self::Dialog => "dialog",
            Self::Form => "form",
            Self::Heading => "heading",
            Self::Img => "img",
            Self::Link => "link",
            Self::List => "list",
            Self::Listbox => "listbox",
            Self::ListItem => "listitem",
            Self::Main => "main",
            Self::Navigation => "navigation",
            Self::Option => "option",
            Self::Radio => "radio",
            Self::Row => "row",
            Self::Searchbox => "searchbox",
            Self::Slider => "slider",
            Self::Spinbutton => "spinbutton",
            Self::Status => "status",
            Self::Tab => "tab",
            Self::Table => "table",
            Self::Textbox => "textbox",
        }
    }

    const ALL: [Self; 28] = [
        Self::Alert,
        Self::Banner,
        Self::Button,
        Self::Cell,
        Self::Checkbox,
        Self::ColumnHeader,
        Self::Combobox,
        Self::ContentInfo,
        Self::Dialog,
        Self::Form,
        Self::Heading,
        Self::Img,
        Self::Link,
        Self::List,
        Self::Listbox,
        Self::ListItem,
        Self::Main,
        Self::Navigation,
        Self::Option,
        Self::Radio,
        Self::Row,
        Self::Searchbox,
        Self::Slider,
        Self::Spinbutton,
        Self::Status,
        Self::Tab,
        Self::Table,
        Self::Textbox,
    ];
}

impl FromStr for AriaRole {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == wanted)
            .ok_or_else(|| HarnessError::driver(format!("unknown ARIA role '{s}'")))
    }
}

impl fmt::Display for AriaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_input_button(el: &ElementSnapshot) -> bool {
    el.tag == "input"
        && matches!(
            el.attribute("type").map(str::to_ascii_lowercase).as_deref(),
            Some("button" | "submit" | "reset" | "image")
        )
}

/// Explicit `role` attribute, or the role implied by the element's tag
#[must_use]
pub fn aria_role(el: &ElementSnapshot) -> Option<AriaRole> {
    if let Some(explicit) = el.attribute("role").and_then(|r| r.split_whitespace().next()) {
        return explicit.parse().ok();
    }
    let input_type = el
        .attribute("type")
        .map_or_else(|| "text".to_string(), str::to_ascii_lowercase);
    match el.tag.as_str() {
        "a" | "area" if el.has_attribute("href") => Some(AriaRole::Link),
        "button" => Some(AriaRole::Button),
        "input" => match input_type.as_str() {
            "button" | "submit" | "reset" | "image" => Some(AriaRole::Button),
            "checkbox" => Some(AriaRole::Checkbox),
            "radio" => Some(AriaRole::Radio),
            "number" => Some(AriaRole::Spinbutton),
            "range" => Some(AriaRole::Slider),
            "search" => Some(AriaRole::Searchbox),
            "text" | "email" | "tel" | "url" => Some(AriaRole::Textbox),
            _ => None,
        },
        "textarea" => Some(AriaRole::Textbox),
        "select" => {
            let multi = el.has_attribute("multiple")
                || el
                    .attribute("size")
                    .and_then(|s| s.parse::<u32>().ok())
                    .is_some_and(|s| s > 1);
            Some(if multi {
                AriaRole::Listbox
            } else {
                AriaRole::Combobox
            })
        }
        "option" => Some(AriaRole::Option),
        "img" if el.attribute("alt") != Some("") => Some(AriaRole::Img),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some(AriaRole::Heading),
        "nav" => Some(AriaRole::Navigation),
        "ul" | "ol" => Some(AriaRole::List),
        "li" => Some(AriaRole::ListItem),
        "table" => Some(AriaRole::Table),
        "tr" => Some(AriaRole::Row),
        "td" => Some(AriaRole::Cell),
        "th" => Some(AriaRole::ColumnHeader),
        "form" => Some(AriaRole::Form),
        "main" => Some(AriaRole::Main),
        "header" => Some(AriaRole::Banner),
        "footer" => Some(AriaRole::ContentInfo),
        "dialog" => Some(AriaRole::Dialog),
        "output" => Some(AriaRole::Status),
        _ => None,
    }
}

/// Accessible name: `aria-label`, associated labels, button value, text,
/// then `alt` / `title` / `placeholder`
#[must_use]
pub fn accessible_name(el: &ElementSnapshot) -> String {
    if let Some(label) = el.attribute("aria-label").filter(|l| !l.trim().is_empty()) {
        return normalize_whitespace(label);
    }
    if !el.labels.is_empty() {
        return normalize_whitespace(&el.labels.join(" "));
    }
    if is_input_button(el) {
        if let Some(value) = el.attribute("value").or(el.value.as_deref()) {
            return normalize_whitespace(value);
        }
    }
    let text = normalize_whitespace(&el.text);
    if !text.is_empty() {
        return text;
    }
    ["alt", "title", "placeholder"]
        .into_iter()
        .filter_map(|attr| el.attribute(attr))
        .map(normalize_whitespace)
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// Text used by `get_by_text`: input buttons match on their value
fn match_text(el: &ElementSnapshot) -> &str {
    if is_input_button(el) {
        el.attribute("value")
            .or(el.value.as_deref())
            .unwrap_or_default()
    } else {
        &el.text
    }
}

// =============================================================================
// SELECTORS
// =============================================================================

/// Immutable element descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// Rendered text; only the innermost matching element is kept
    Text(TextMatch),
    /// `alt` attribute
    AltText(TextMatch),
    /// Associated `<label>` text or `aria-label`
    Label(TextMatch),
    /// `placeholder` attribute
    Placeholder(TextMatch),
    /// ARIA role, optionally filtered by accessible name
    Role {
        /// Role to match
        role: AriaRole,
        /// Accessible name condition
        name: Option<TextMatch>,
    },
    /// Configured test-id attribute equals the value
    TestId(String),
}

impl Selector {
    /// CSS that returns a superset of the candidates for this selector
    #[must_use]
    pub fn candidate_css(&self, test_id_attribute: &str) -> String {
        match self {
            Self::Css(css) => css.clone(),
            Self::Text(_) | Self::Role { .. } => "*".to_string(),
            Self::AltText(_) => "[alt]".to_string(),
            Self::Label(_) => "input, textarea, select, button, [aria-label]".to_string(),
            Self::Placeholder(_) => "[placeholder]".to_string(),
            Self::TestId(id) => format!("[{test_id_attribute}=\"{}\"]", id.replace('"', "\\\"")),
        }
    }

    /// Whether a single element satisfies this selector
    #[must_use]
    pub fn accepts(&self, el: &ElementSnapshot, test_id_attribute: &str) -> bool {
        match self {
            Self::Css(_) => true,
            Self::Text(m) => {
                !NON_RENDERED_TAGS.contains(&el.tag.as_str()) && m.matches(match_text(el))
            }
            Self::AltText(m) => el.attribute("alt").is_some_and(|alt| m.matches(alt)),
            Self::Label(m) => {
                el.labels.iter().any(|l| m.matches(l))
                    || el.attribute("aria-label").is_some_and(|l| m.matches(l))
            }
            Self::Placeholder(m) => el.attribute("placeholder").is_some_and(|p| m.matches(p)),
            Self::Role { role, name } => {
                el.visible
                    && aria_role(el) == Some(*role)
                    && name.as_ref().map_or(true, |n| n.matches(&accessible_name(el)))
            }
            Self::TestId(id) => el.attribute(test_id_attribute) == Some(id.as_str()),
        }
    }

    /// Narrow driver candidates (all from one scope) to the matches
    fn select(&self, candidates: Vec<ElementSnapshot>, test_id_attribute: &str) -> Vec<ElementSnapshot> {
        match self {
            Self::Text(_) => {
                let matched: Vec<ElementSnapshot> = candidates
                    .iter()
                    .filter(|c| self.accepts(c, test_id_attribute))
                    .cloned()
                    .collect();
                innermost(&candidates, matched)
            }
            _ => candidates
                .into_iter()
                .filter(|c| self.accepts(c, test_id_attribute))
                .collect(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "locator({css:?})"),
            Self::Text(m) => write!(f, "get_by_text({m})"),
            Self::AltText(m) => write!(f, "get_by_alt_text({m})"),
            Self::Label(m) => write!(f, "get_by_label({m})"),
            Self::Placeholder(m) => write!(f, "get_by_placeholder({m})"),
            Self::Role { role, name: None } => write!(f, "get_by_role({role})"),
            Self::Role {
                role,
                name: Some(name),
            } => write!(f, "get_by_role({role}, name={name})"),
            Self::TestId(id) => write!(f, "get_by_test_id({id:?})"),
        }
    }
}

/// Drop every matched element that is an ancestor of another match
fn innermost(candidates: &[ElementSnapshot], matched: Vec<ElementSnapshot>) -> Vec<ElementSnapshot> {
    let parents: HashMap<&str, &str> = candidates
        .iter()
        .filter_map(|c| c.parent.as_ref().map(|p| (c.element.id.as_str(), p.id.as_str())))
        .collect();
    let mut ancestors: HashSet<&str> = HashSet::new();
    for m in &matched {
        let mut current = parents.get(m.element.id.as_str()).copied();
        while let Some(parent) = current {
            if !ancestors.insert(parent) {
                break;
            }
            current = parents.get(parent).copied();
        }
    }
    matched
        .into_iter()
        .filter(|m| !ancestors.contains(m.element.id.as_str()))
        .collect()
}

// =============================================================================
// FILTERS
// =============================================================================

/// Conjunctive narrowing conditions for a multi-match locator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Every entry must occur in the element text (case-insensitive)
    pub has_text: Vec<String>,
    /// No entry may occur in the element text (case-insensitive)
    pub has_not_text: Vec<String>,
    /// Attributes that must be present, optionally with a given value
    pub has_attribute: Vec<(String, Option<String>)>,
}

impl FilterOptions {
    /// Empty filter (accepts everything)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require text
    #[must_use]
    pub fn has_text(mut self, text: impl Into<String>) -> Self {
        self.has_text.push(text.into());
        self
    }

    /// Forbid text
    #[must_use]
    pub fn has_not_text(mut self, text: impl Into<String>) -> Self {
        self.has_not_text.push(text.into());
        self
    }

    /// Require an attribute, with any value
    #[must_use]
    pub fn has_attribute(mut self, name: impl Into<String>) -> Self {
        self.has_attribute.push((name.into(), None));
        self
    }

    /// Require an attribute with a specific value
    #[must_use]
    pub fn has_attribute_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.has_attribute.push((name.into(), Some(value.into())));
        self
    }

    /// Whether an element passes every condition
    #[must_use]
    pub fn accepts(&self, el: &ElementSnapshot) -> bool {
        self.has_text
            .iter()
            .all(|t| TextMatch::substring(t.as_str()).matches(&el.text))
            && !self
                .has_not_text
                .iter()
                .any(|t| TextMatch::substring(t.as_str()).matches(&el.text))
            && self.has_attribute.iter().all(|(name, value)| match value {
                Some(v) => el.attribute(name) == Some(v.as_str()),
                None => el.has_attribute(name),
            })
    }
}

impl fmt::Display for FilterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        parts.extend(self.has_text.iter().map(|t| format!("has_text={t:?}")));
        parts.extend(self.has_not_text.iter().map(|t| format!("has_not_text={t:?}")));
        parts.extend(self.has_attribute.iter().map(|(n, v)| match v {
            Some(v) => format!("has_attribute={n:?}={v:?}"),
            None => format!("has_attribute={n:?}"),
        }));
        write!(f, "filter({})", parts.join(", "))
    }
}

// =============================================================================
// LOCATOR
// =============================================================================

/// Locator options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatorOptions {
    /// Auto-wait budget
    pub timeout: Duration,
    /// Initial polling interval
    pub poll_interval: Duration,
    /// Reject multiple matches for single-element operations
    pub strict: bool,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            strict: true,
        }
    }
}

impl LocatorOptions {
    /// Options derived from page settings
    #[must_use]
    pub const fn from_settings(settings: &PageSettings) -> Self {
        Self {
            timeout: settings.action_timeout,
            poll_interval: settings.poll_interval,
            strict: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Index(usize),
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Select(Selector),
    Filter(FilterOptions),
    Nth(Position),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select(selector) => selector.fmt(f),
            Self::Filter(filter) => filter.fmt(f),
            Self::Nth(Position::Index(0)) => write!(f, "first()"),
            Self::Nth(Position::Index(i)) => write!(f, "nth({i})"),
            Self::Nth(Position::Last) => write!(f, "last()"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actionability {
    Attached,
    Visible,
}

/// A deferred, re-evaluated element query bound to a page
#[derive(Debug, Clone)]
pub struct Locator {
    page: Page,
    steps: Vec<Step>,
    options: LocatorOptions,
}

impl Locator {
    /// Create a locator on `page`
    #[must_use]
    pub fn new(page: Page, selector: Selector) -> Self {
        let options = LocatorOptions::from_settings(page.settings());
        Self {
            page,
            steps: vec![Step::Select(selector)],
            options,
        }
    }

    fn push(&self, step: Step) -> Self {
        let mut next = self.clone();
        next.steps.push(step);
        next
    }

    /// Page this locator resolves against
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Current options
    #[must_use]
    pub const fn options(&self) -> LocatorOptions {
        self.options
    }

    /// Override the auto-wait timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Override strictness
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    // -------------------------------------------------------------------------
    // Chaining
    // -------------------------------------------------------------------------

    /// Descendants matching a CSS selector
    #[must_use]
    pub fn locator(&self, css: impl Into<String>) -> Self {
        self.push(Step::Select(Selector::Css(css.into())))
    }

    /// Descendants containing text (case-insensitive substring)
    #[must_use]
    pub fn get_by_text(&self, text: impl Into<String>) -> Self {
        self.push(Step::Select(Selector::Text(TextMatch::substring(text))))
    }

    /// Descendants whose whole text equals `text`
    #[must_use]
    pub fn get_by_text_exact(&self, text: impl Into<String>) -> Self {
        self.push(Step::Select(Selector::Text(TextMatch::exact(text))))
    }

    /// Descendants with matching `alt` text
    #[must_use]
    pub fn get_by_alt_text(&self, text: impl Into<String>) -> Self {
        self.push(Step::Select(Selector::AltText(TextMatch::substring(text))))
    }

    /// Descendant controls with a matching label
    #[must_use]
    pub fn get_by_label(&self, text: impl Into<String>) -> Self {
        self.push(Step::Select(Selector::Label(TextMatch::substring(text))))
    }

    /// Descendant controls with a matching placeholder
    #[must_use]
    pub fn get_by_placeholder(&self, text: impl Into<String>) -> Self {
        self.push(Step::Select(Selector::Placeholder(TextMatch::substring(text))))
    }

    /// Descendants with an ARIA role
    #[must_use]
    pub fn get_by_role(&self, role: AriaRole) -> Self {
        self.push(Step::Select(Selector::Role { role, name: None }))
    }

    /// Descendants with an ARIA role and accessible name
    #[must_use]
    pub fn get_by_role_named(&self, role: AriaRole, name: impl Into<String>) -> Self {
        self.push(Step::Select(Selector::Role {
            role,
            name: Some(TextMatch::substring(name)),
        }))
    }

    /// Descendants whose test-id attribute equals `id`
    #[must_use]
    pub fn get_by_test_id(&self, id: impl Into<String>) -> Self {
        self.push(Step::Select(Selector::TestId(id.into())))
    }

    /// Keep matches satisfying every condition of `filter`
    #[must_use]
    pub fn filter(&self, filter: FilterOptions) -> Self {
        self.push(Step::Filter(filter))
    }

    /// First match
    #[must_use]
    pub fn first(&self) -> Self {
        self.push(Step::Nth(Position::Index(0)))
    }

    /// Last match
    #[must_use]
    pub fn last(&self) -> Self {
        self.push(Step::Nth(Position::Last))
    }

    /// Match at a zero-based index
    #[must_use]
    pub fn nth(&self, index: usize) -> Self {
        self.push(Step::Nth(Position::Index(index)))
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    /// Resolve once, without waiting, to every current match
    pub async fn resolve_all(&self) -> HarnessResult<Vec<ElementSnapshot>> {
        let driver = self.page.driver();
        let test_id_attribute = self.page.settings().test_id_attribute.as_str();
        let mut current: Option<Vec<ElementSnapshot>> = None;
        for step in &self.steps {
            let next = match step {
                Step::Select(selector) => {
                    let css = selector.candidate_css(test_id_attribute);
                    let scopes: Vec<Option<&ElementRef>> = match &current {
                        None => vec![None],
                        Some(parents) => parents.iter().map(|p| Some(&p.element)).collect(),
                    };
                    let mut seen = HashSet::new();
                    let mut found = Vec::new();
                    for scope in scopes {
                        let candidates = driver.query(&css, scope).await?;
                        for el in selector.select(candidates, test_id_attribute) {
                            if seen.insert(el.element.clone()) {
                                found.push(el);
                            }
                        }
                    }
                    found
                }
                Step::Filter(filter) => current
                    .take()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|el| filter.accepts(el))
                    .collect(),
                Step::Nth(position) => {
                    let mut all = current.take().unwrap_or_default();
                    let picked = match position {
                        Position::Index(i) if *i < all.len() => Some(all.swap_remove(*i)),
                        Position::Index(_) => None,
                        Position::Last => all.pop(),
                    };
                    picked.into_iter().collect()
                }
            };
            current = Some(next);
        }
        Ok(current.unwrap_or_default())
    }

    /// Resolve once, retrying only while references go stale mid-query
    async fn snapshot_all(&self) -> HarnessResult<Vec<ElementSnapshot>> {
        let mut deadline = Deadline::new(self.options.timeout, self.options.poll_interval);
        loop {
            match self.resolve_all().await {
                Err(e) if e.is_stale() && deadline.pause().await => {}
                other => return other,
            }
        }
    }

    /// Wait up to `budget` for exactly one actionable match
    async fn resolve_single(&self, needs: Actionability, budget: Duration) -> HarnessResult<ElementSnapshot> {
        let mut deadline = Deadline::new(budget, self.options.poll_interval);
        let mut seen_hidden = false;
        loop {
            match self.resolve_all().await {
                Ok(found) if found.len() > 1 && self.options.strict => {
                    return Err(HarnessError::Ambiguous {
                        selector: self.to_string(),
                        count: found.len(),
                    });
                }
                Ok(found) => {
                    if let Some(el) = found.into_iter().next() {
                        if needs == Actionability::Attached || el.visible {
                            return Ok(el);
                        }
                        seen_hidden = true;
                    }
                }
                Err(e) if e.is_stale() => {}
                Err(e) => return Err(e),
            }
            debug!(locator = %self, elapsed_ms = deadline.elapsed_ms(), "waiting for element");
            if !deadline.pause().await {
                return Err(if seen_hidden {
                    HarnessError::Timeout {
                        waited_for: format!("{self} to be visible"),
                        ms: deadline.elapsed_ms(),
                        trigger_fired: None,
                    }
                } else {
                    HarnessError::NotFound {
                        selector: self.to_string(),
                        waited_ms: deadline.elapsed_ms(),
                    }
                });
            }
        }
    }

    async fn act<T, F, Fut>(&self, action: &'static str, needs: Actionability, op: F) -> HarnessResult<T>
    where
        F: Fn(Arc<dyn PageDriver>, ElementRef) -> Fut,
        Fut: Future<Output = HarnessResult<T>>,
    {
        let mut deadline = Deadline::new(self.options.timeout, self.options.poll_interval);
        loop {
            let el = self.resolve_single(needs, deadline.remaining()).await?;
            debug!(locator = %self, action, element = %el.element, "acting");
            match op(Arc::clone(self.page.driver()), el.element).await {
                Err(e) if e.is_stale() && deadline.pause().await => {
                    debug!(locator = %self, action, "element went stale, resolving again");
                }
                other => return other,
            }
        }
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// Click the element
    pub async fn click(&self) -> HarnessResult<()> {
        self.act("click", Actionability::Visible, |driver, el| async move {
            driver.click(&el).await
        })
        .await
    }

    /// Replace the value of a text control
    pub async fn fill(&self, value: impl Into<String>) -> HarnessResult<()> {
        let value: String = value.into();
        self.act("fill", Actionability::Visible, |driver, el| {
            let value = value.clone();
            async move { driver.fill(&el, &value).await }
        })
        .await
    }

    /// Empty a text control
    pub async fn clear(&self) -> HarnessResult<()> {
        self.fill("").await
    }

    /// Choose an option; returns the selected value
    pub async fn select_option(&self, option: impl Into<SelectOption>) -> HarnessResult<String> {
        let option: SelectOption = option.into();
        self.act("select_option", Actionability::Visible, |driver, el| {
            let option = option.clone();
            async move { driver.select_option(&el, &option).await }
        })
        .await
    }

    /// Attach files to a file input
    pub async fn set_input_files<P: Into<PathBuf> + Clone>(&self, files: &[P]) -> HarnessResult<()> {
        let files: Vec<PathBuf> = files.iter().cloned().map(Into::into).collect();
        self.act("set_input_files", Actionability::Attached, |driver, el| {
            let files = files.clone();
            async move { driver.set_input_files(&el, &files).await }
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Text of the single match, as reported by the driver
    pub async fn text_content(&self) -> HarnessResult<String> {
        Ok(self.resolve_single(Actionability::Attached, self.options.timeout).await?.text)
    }

    /// Rendered text of the single match, trimmed
    pub async fn inner_text(&self) -> HarnessResult<String> {
        Ok(self
            .resolve_single(Actionability::Attached, self.options.timeout)
            .await?
            .text
            .trim()
            .to_string())
    }

    /// Current value of the single form control
    pub async fn input_value(&self) -> HarnessResult<String> {
        let el = self.resolve_single(Actionability::Attached, self.options.timeout).await?;
        el.value.ok_or_else(|| {
            HarnessError::driver(format!("{self} resolved to a <{}>, not a form control", el.tag))
        })
    }

    /// Attribute of the single match
    pub async fn get_attribute(&self, name: &str) -> HarnessResult<Option<String>> {
        let el = self.resolve_single(Actionability::Attached, self.options.timeout).await?;
        Ok(el.attribute(name).map(str::to_string))
    }

    /// Trimmed text of every match (no waiting)
    pub async fn all_inner_texts(&self) -> HarnessResult<Vec<String>> {
        Ok(self
            .snapshot_all()
            .await?
            .into_iter()
            .map(|el| el.text.trim().to_string())
            .collect())
    }

    /// Number of matches (no waiting)
    pub async fn count(&self) -> HarnessResult<usize> {
        Ok(self.snapshot_all().await?.len())
    }

    /// Whether the single match is rendered; absent counts as not visible
    pub async fn is_visible(&self) -> HarnessResult<bool> {
        let found = self.snapshot_all().await?;
        if found.len() > 1 && self.options.strict {
            return Err(HarnessError::Ambiguous {
                selector: self.to_string(),
                count: found.len(),
            });
        }
        Ok(found.first().is_some_and(|el| el.visible))
    }

    /// Inverse of [`Locator::is_visible`]
    pub async fn is_hidden(&self) -> HarnessResult<bool> {
        Ok(!self.is_visible().await?)
    }

    /// Wait until the locator reaches `state`
    pub async fn wait_for(&self, state: WaitState) -> HarnessResult<()> {
        let mut deadline = Deadline::new(self.options.timeout, self.options.poll_interval);
        loop {
            match self.resolve_all().await {
                Ok(found)
                    if found.len() > 1
                        && self.options.strict
                        && matches!(state, WaitState::Attached | WaitState::Visible) =>
                {
                    return Err(HarnessError::Ambiguous {
                        selector: self.to_string(),
                        count: found.len(),
                    });
                }
                Ok(found) => {
                    let satisfied = match state {
                        WaitState::Attached => !found.is_empty(),
                        WaitState::Detached => found.is_empty(),
                        WaitState::Visible => found.first().is_some_and(|el| el.visible),
                        WaitState::Hidden => found.iter().all(|el| !el.visible),
                    };
                    if satisfied {
                        return Ok(());
                    }
                }
                Err(e) if e.is_stale() => {}
                Err(e) => return Err(e),
            }
            if !deadline.pause().await {
                return Err(HarnessError::Timeout {
                    waited_for: format!("{self} to be {state}"),
                    ms: deadline.elapsed_ms(),
                    trigger_fired: None,
                });
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.steps.iter().map(ToString::to_string).collect();
        f.write_str(&steps.join(" >> "))
    }
}
