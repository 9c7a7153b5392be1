//! In-memory scripted browser.
//!
//! A [`MockSite`] renders each URL into a [`MockDom`] and reacts to clicks
//! and input. Sites can schedule mutations and network responses with a
//! delay ([`PageState::defer`]), which is how the test suite exercises
//! auto-wait and perform-and-await without a real browser.
//!
//! Only a CSS subset is understood: type, `*`, `.class`, `#id`, `[attr]`,
//! `[attr=value]` compounds joined by descendant combinators, and
//! comma-separated selector lists.

use super::{
    BrowserDriver, BrowserLauncher, ContextDriver, ElementRef, ElementSnapshot, LaunchOptions,
    PageDriver, SelectOption, RESPONSE_CHANNEL_CAPACITY,
};
use crate::network::ResponseEvent;
use crate::result::{HarnessError, HarnessResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Index of a node in a [`MockDom`]
pub type NodeId = usize;

// =============================================================================
// DOM
// =============================================================================

/// One element of the scripted document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockNode {
    /// Lower-case tag name
    pub tag: String,
    /// Attributes
    pub attributes: BTreeMap<String, String>,
    /// Text owned by this node (descendant text is added on read)
    pub text: String,
    /// Form control value
    pub value: Option<String>,
    /// Rendered (CSS visibility)
    pub visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    removed: bool,
}

impl MockNode {
    /// Create an element
    #[must_use]
    pub fn new(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        let value = matches!(tag.as_str(), "input" | "textarea" | "select").then(String::new);
        Self {
            tag,
            attributes: BTreeMap::new(),
            text: String::new(),
            value,
            visible: true,
            parent: None,
            children: Vec::new(),
            removed: false,
        }
    }

    /// Set an attribute (`value` also seeds the control value)
    #[must_use]
    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if name == "value" && self.value.is_some() {
            self.value = Some(value.clone());
        }
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    /// Set the `class` attribute
    #[must_use]
    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    /// Set own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set the control value
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Mark as not rendered
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Check the class list
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|list| list.split_whitespace().any(|c| c == class))
    }
}

/// Scripted document: a forest of [`MockNode`]s
#[derive(Debug, Clone, Default)]
pub struct MockDom {
    nodes: Vec<MockNode>,
}

impl MockDom {
    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every node
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Append a node as the last child of `parent` (or as a root)
    pub fn append(&mut self, parent: Option<NodeId>, mut node: MockNode) -> NodeId {
        let id = self.nodes.len();
        node.parent = parent.filter(|p| self.is_attached(*p));
        node.children.clear();
        node.removed = false;
        if let Some(p) = node.parent {
            self.nodes[p].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    /// Live node
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&MockNode> {
        self.nodes.get(id).filter(|n| !n.removed)
    }

    /// Live node, mutably
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut MockNode> {
        self.nodes.get_mut(id).filter(|n| !n.removed)
    }

    /// Whether the node exists and has not been removed
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Parent of a node
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Live children of a node
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| n.children.iter().copied().filter(|c| self.is_attached(*c)).collect())
            .unwrap_or_default()
    }

    /// Remove a node and its subtree
    pub fn remove(&mut self, id: NodeId) {
        let mut subtree = vec![id];
        subtree.extend(self.descendants(id));
        if let Some(parent) = self.parent(id) {
            self.nodes[parent].children.retain(|c| *c != id);
        }
        for n in subtree {
            if let Some(node) = self.nodes.get_mut(n) {
                node.removed = true;
            }
        }
    }

    /// Remove all children of a node
    pub fn remove_children(&mut self, id: NodeId) {
        for child in self.children(id) {
            self.remove(child);
        }
    }

    /// Descendants in document order
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).into_iter().rev().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).into_iter().rev());
        }
        out
    }

    /// Every live node in document order
    #[must_use]
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            if !node.removed && node.parent.is_none() {
                out.push(id);
                out.extend(self.descendants(id));
            }
        }
        out
    }

    /// Nodes matching a selector, in document order
    pub fn select(&self, css: &str) -> HarnessResult<Vec<NodeId>> {
        self.select_within(None, css)
    }

    /// Nodes matching a selector among the descendants of `scope`
    pub fn select_within(&self, scope: Option<NodeId>, css: &str) -> HarnessResult<Vec<NodeId>> {
        let selector = CssSelector::parse(css)?;
        let candidates = match scope {
            Some(s) => self.descendants(s),
            None => self.document_order(),
        };
        Ok(candidates
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect())
    }

    /// First node matching a selector; invalid selectors match nothing
    #[must_use]
    pub fn select_first(&self, css: &str) -> Option<NodeId> {
        self.select(css).ok().and_then(|ids| ids.first().copied())
    }

    /// Nearest inclusive ancestor matching a selector
    #[must_use]
    pub fn closest(&self, id: NodeId, css: &str) -> Option<NodeId> {
        let selector = CssSelector::parse(css).ok()?;
        let mut current = Some(id);
        while let Some(n) = current {
            if selector.matches(self, n) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// Own text plus descendant text, whitespace separated
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        std::iter::once(id)
            .chain(self.descendants(id))
            .filter_map(|n| self.node(n))
            .map(|n| n.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Node and all of its ancestors are rendered
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(n) = current {
            match self.node(n) {
                Some(node) if node.visible => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// Text of labels associated via `for` or by nesting
    #[must_use]
    pub fn labels_for(&self, id: NodeId) -> Vec<String> {
        let mut labels = Vec::new();
        if let Some(element_id) = self.node(id).and_then(|n| n.attribute("id")) {
            for label in self.select("label").unwrap_or_default() {
                if self.node(label).and_then(|l| l.attribute("for")) == Some(element_id) {
                    labels.push(self.text_content(label));
                }
            }
        }
        let mut current = self.parent(id);
        while let Some(n) = current {
            if self.node(n).is_some_and(|node| node.tag == "label") {
                labels.push(self.text_content(n));
            }
            current = self.parent(n);
        }
        labels
    }

    /// Control value
    #[must_use]
    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.node(id).and_then(|n| n.value.as_deref())
    }

    /// Set the control value
    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        if let Some(node) = self.node_mut(id) {
            node.value = Some(value.into());
        }
    }

    /// Replace own text
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        if let Some(node) = self.node_mut(id) {
            node.text = text.into();
        }
    }

    /// Show or hide a node
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.node_mut(id) {
            node.visible = visible;
        }
    }
}

// =============================================================================
// CSS subset
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, node: &MockNode) -> bool {
        self.tag.as_ref().map_or(true, |t| *t == node.tag)
            && self
                .id
                .as_ref()
                .map_or(true, |id| node.attribute("id") == Some(id.as_str()))
            && self.classes.iter().all(|c| node.has_class(c))
            && self.attributes.iter().all(|(name, value)| match value {
                Some(v) => node.attribute(name) == Some(v.as_str()),
                None => node.attributes.contains_key(name),
            })
    }
}

/// Parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
struct CssSelector {
    alternatives: Vec<Vec<Compound>>,
}

impl CssSelector {
    fn parse(css: &str) -> HarnessResult<Self> {
        let mut alternatives = Vec::new();
        for part in split_top_level(css, |c| c == ',') {
            let chain = split_top_level(&part, char::is_whitespace)
                .iter()
                .map(|token| parse_compound(token, css))
                .collect::<HarnessResult<Vec<_>>>()?;
            if chain.is_empty() {
                return Err(unsupported(css, "empty selector"));
            }
            alternatives.push(chain);
        }
        if alternatives.is_empty() {
            return Err(unsupported(css, "empty selector"));
        }
        Ok(Self { alternatives })
    }

    fn matches(&self, dom: &MockDom, id: NodeId) -> bool {
        self.alternatives.iter().any(|chain| chain_matches(dom, id, chain))
    }
}

fn chain_matches(dom: &MockDom, id: NodeId, chain: &[Compound]) -> bool {
    let Some((last, ancestors)) = chain.split_last() else {
        return false;
    };
    if !dom.node(id).is_some_and(|n| last.matches(n)) {
        return false;
    }
    let mut remaining = ancestors.iter().rev().peekable();
    let mut current = dom.parent(id);
    while let (Some(compound), Some(n)) = (remaining.peek(), current) {
        if dom.node(n).is_some_and(|node| compound.matches(node)) {
            remaining.next();
        }
        current = dom.parent(n);
    }
    remaining.peek().is_none()
}

fn unsupported(css: &str, reason: &str) -> HarnessError {
    HarnessError::driver(format!("unsupported selector '{css}': {reason}"))
}

fn split_top_level(input: &str, is_separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), _) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[') => {
                depth += 1;
                current.push(c);
            }
            (None, ']') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, _) if depth == 0 && is_separator(c) => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn read_ident(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && (chars[*i].is_alphanumeric() || matches!(chars[*i], '-' | '_')) {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn parse_compound(token: &str, css: &str) -> HarnessResult<Compound> {
    let chars: Vec<char> = token.chars().collect();
    let mut i = 0;
    let mut compound = Compound::default();
    let tag = read_ident(&chars, &mut i);
    if !tag.is_empty() {
        compound.tag = Some(tag.to_ascii_lowercase());
    } else if chars.first() == Some(&'*') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                let class = read_ident(&chars, &mut i);
                if class.is_empty() {
                    return Err(unsupported(css, "missing class name"));
                }
                compound.classes.push(class);
            }
            '#' => {
                i += 1;
                let id = read_ident(&chars, &mut i);
                if id.is_empty() {
                    return Err(unsupported(css, "missing id"));
                }
                compound.id = Some(id);
            }
            '[' => {
                i += 1;
                let name = read_ident(&chars, &mut i);
                if name.is_empty() {
                    return Err(unsupported(css, "missing attribute name"));
                }
                match chars.get(i) {
                    Some(']') => {
                        i += 1;
                        compound.attributes.push((name, None));
                    }
                    Some('=') => {
                        i += 1;
                        let value = read_attribute_value(&chars, &mut i)
                            .ok_or_else(|| unsupported(css, "unterminated attribute"))?;
                        compound.attributes.push((name, Some(value)));
                    }
                    _ => return Err(unsupported(css, "only [attr] and [attr=value] are supported")),
                }
            }
            other => return Err(unsupported(css, &format!("unexpected '{other}'"))),
        }
    }
    Ok(compound)
}

fn read_attribute_value(chars: &[char], i: &mut usize) -> Option<String> {
    let value = match chars.get(*i) {
        Some(q @ ('"' | '\'')) => {
            let q = *q;
            *i += 1;
            let start = *i;
            while *i < chars.len() && chars[*i] != q {
                *i += 1;
            }
            let value: String = chars.get(start..*i)?.iter().collect();
            *i += 1;
            value
        }
        _ => {
            let start = *i;
            while *i < chars.len() && chars[*i] != ']' {
                *i += 1;
            }
            chars[start..*i].iter().collect::<String>().trim().to_string()
        }
    };
    if chars.get(*i) == Some(&']') {
        *i += 1;
        Some(value)
    } else {
        None
    }
}

// =============================================================================
// Page state and scripted sites
// =============================================================================

type Job = Box<dyn FnOnce(&mut PageState) + Send>;

struct Deferred {
    delay: Duration,
    generation: u64,
    job: Job,
}

/// Per-context key/value storage (cookies and local storage stand-in)
pub type Storage = Arc<Mutex<HashMap<String, serde_json::Value>>>;

/// Mutable state of one scripted page, handed to [`MockSite`] hooks
pub struct PageState {
    /// Current document
    pub dom: MockDom,
    /// Document title
    pub title: String,
    url: String,
    generation: u64,
    storage: Storage,
    outbox: Vec<ResponseEvent>,
    deferred: Vec<Deferred>,
    pending_route: Option<String>,
    history: Vec<String>,
}

impl fmt::Debug for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageState")
            .field("url", &self.url)
            .field("title", &self.title)
            .field("generation", &self.generation)
            .field("pending_jobs", &self.deferred.len())
            .finish_non_exhaustive()
    }
}

impl PageState {
    fn new(storage: Storage) -> Self {
        Self {
            dom: MockDom::new(),
            title: String::new(),
            url: "about:blank".to_string(),
            generation: 0,
            storage,
            outbox: Vec::new(),
            deferred: Vec::new(),
            pending_route: None,
            history: Vec::new(),
        }
    }

    /// Current URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Navigation generation
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Driver calls made against this page
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Publish a network response once the current call returns
    pub fn respond(&mut self, event: ResponseEvent) {
        self.outbox.push(event);
    }

    /// Run `job` after `delay` unless the page navigates first
    pub fn defer(&mut self, delay: Duration, job: impl FnOnce(&mut PageState) + Send + 'static) {
        self.deferred.push(Deferred {
            delay,
            generation: self.generation,
            job: Box::new(job),
        });
    }

    /// Client-side route change; the site re-renders for `url`
    pub fn navigate_within(&mut self, url: impl Into<String>) {
        self.pending_route = Some(url.into());
    }

    /// Read from context storage
    #[must_use]
    pub fn storage_get(&self, key: &str) -> Option<serde_json::Value> {
        self.storage.lock().ok().and_then(|s| s.get(key).cloned())
    }

    /// Write to context storage
    pub fn storage_set(&mut self, key: &str, value: serde_json::Value) {
        if let Ok(mut storage) = self.storage.lock() {
            storage.insert(key.to_string(), value);
        }
    }

    fn load(&mut self, url: &str) {
        self.dom.clear();
        self.title.clear();
        self.url = url.to_string();
        self.generation += 1;
    }

    fn snapshot(&self, id: NodeId) -> Option<ElementSnapshot> {
        let node = self.dom.node(id)?;
        Some(ElementSnapshot {
            element: ElementRef::new(id.to_string(), self.generation),
            parent: self
                .dom
                .parent(id)
                .map(|p| ElementRef::new(p.to_string(), self.generation)),
            tag: node.tag.clone(),
            attributes: node.attributes.clone(),
            text: self.dom.text_content(id),
            value: node.value.clone(),
            labels: self.dom.labels_for(id),
            visible: self.dom.is_visible(id),
        })
    }

    fn resolve(&self, element: &ElementRef) -> HarnessResult<NodeId> {
        let stale = || HarnessError::StaleElement {
            element: element.to_string(),
        };
        if element.generation != self.generation {
            return Err(stale());
        }
        let id: NodeId = element
            .id
            .parse()
            .map_err(|_| HarnessError::driver(format!("foreign element reference {element}")))?;
        if self.dom.is_attached(id) {
            Ok(id)
        } else {
            Err(stale())
        }
    }
}

/// DOM event delivered to a [`MockSite`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomEvent {
    /// Element was clicked
    Click(NodeId),
    /// Value of a text control changed
    Input(NodeId),
    /// Selection or file list changed
    Change(NodeId),
}

/// Behaviour of a scripted web application
pub trait MockSite: Send + Sync + 'static {
    /// Build the document for `url` (the DOM is empty on entry)
    fn render(&self, page: &mut PageState, url: &str) -> HarnessResult<()>;

    /// React to user interaction
    fn on_event(&self, page: &mut PageState, event: DomEvent) -> HarnessResult<()> {
        let _ = (page, event);
        Ok(())
    }
}

type RenderFn = dyn Fn(&mut PageState, &str) -> HarnessResult<()> + Send + Sync;
type EventFn = dyn Fn(&mut PageState, DomEvent) -> HarnessResult<()> + Send + Sync;

/// Site defined by closures
pub struct FnSite {
    render: Box<RenderFn>,
    events: Option<Box<EventFn>>,
}

impl FnSite {
    /// Site whose pages are built by `render`
    pub fn new<R>(render: R) -> Self
    where
        R: Fn(&mut PageState, &str) -> HarnessResult<()> + Send + Sync + 'static,
    {
        Self {
            render: Box::new(render),
            events: None,
        }
    }

    /// Site that renders empty documents
    #[must_use]
    pub fn blank() -> Self {
        Self::new(|_, _| Ok(()))
    }

    /// Attach an event handler
    #[must_use]
    pub fn on_event<E>(mut self, handler: E) -> Self
    where
        E: Fn(&mut PageState, DomEvent) -> HarnessResult<()> + Send + Sync + 'static,
    {
        self.events = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for FnSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSite")
            .field("handles_events", &self.events.is_some())
            .finish()
    }
}

impl MockSite for FnSite {
    fn render(&self, page: &mut PageState, url: &str) -> HarnessResult<()> {
        (self.render)(page, url)
    }

    fn on_event(&self, page: &mut PageState, event: DomEvent) -> HarnessResult<()> {
        self.events.as_ref().map_or(Ok(()), |handler| handler(page, event))
    }
}

// =============================================================================
// Driver implementations
// =============================================================================

struct PageInner {
    context_id: String,
    site: Arc<dyn MockSite>,
    state: Mutex<PageState>,
    events: broadcast::Sender<ResponseEvent>,
    closed: AtomicBool,
    context_closed: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

impl PageInner {
    fn check_open(&self) -> HarnessResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(HarnessError::SessionCrashed {
                message: "in-memory browser disconnected".to_string(),
            });
        }
        if self.closed.load(Ordering::SeqCst) || self.context_closed.load(Ordering::SeqCst) {
            return Err(HarnessError::ContextClosed {
                context: self.context_id.clone(),
            });
        }
        Ok(())
    }

    /// Run `op` against the page state, then settle routes, publish
    /// responses and schedule deferred jobs
    fn with_state<T>(
        self: &Arc<Self>,
        op: impl FnOnce(&mut PageState, &dyn MockSite) -> HarnessResult<T>,
    ) -> HarnessResult<T> {
        self.check_open()?;
        let (result, outbox, deferred) = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| HarnessError::driver("page state lock poisoned"))?;
            let result = op(&mut state, self.site.as_ref());
            let settled = Self::settle_routes(&mut state, self.site.as_ref());
            (
                result.and_then(|value| settled.map(|()| value)),
                std::mem::take(&mut state.outbox),
                std::mem::take(&mut state.deferred),
            )
        };
        self.publish(outbox, deferred);
        result
    }

    fn settle_routes(state: &mut PageState, site: &dyn MockSite) -> HarnessResult<()> {
        while let Some(url) = state.pending_route.take() {
            state.load(&url);
            site.render(state, &url)?;
        }
        Ok(())
    }

    fn publish(self: &Arc<Self>, outbox: Vec<ResponseEvent>, deferred: Vec<Deferred>) {
        for event in outbox {
            debug!(url = %event.url, status = event.status, "response");
            // no subscribers is fine
            let _ = self.events.send(event);
        }
        for Deferred {
            delay,
            generation,
            job,
        } in deferred
        {
            let inner = Arc::clone(self);
            let run = move || {
                let _ = inner.with_state(|state, _| {
                    if state.generation == generation {
                        job(state);
                    }
                    Ok(())
                });
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        tokio::time::sleep(delay).await;
                        run();
                    });
                }
                Err(_) => run(),
            }
        }
    }
}

/// Scripted tab
pub struct MemoryPage {
    inner: Arc<PageInner>,
}

impl fmt::Debug for MemoryPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPage")
            .field("context", &self.inner.context_id)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MemoryPage {
    /// Inspect the page state (for assertions in tests)
    pub fn inspect<T>(&self, f: impl FnOnce(&PageState) -> T) -> HarnessResult<T> {
        let state = self
            .inner
            .state
            .lock()
            .map_err(|_| HarnessError::driver("page state lock poisoned"))?;
        Ok(f(&state))
    }

    /// Driver calls made against this page
    pub fn history(&self) -> Vec<String> {
        self.inspect(|s| s.history.clone()).unwrap_or_default()
    }

    /// Whether the tab has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst) || self.inner.context_closed.load(Ordering::SeqCst)
    }

    fn act(
        &self,
        element: &ElementRef,
        verb: &str,
        op: impl FnOnce(&mut PageState, &dyn MockSite, NodeId) -> HarnessResult<()>,
    ) -> HarnessResult<()> {
        self.inner.with_state(|state, site| {
            let id = state.resolve(element)?;
            state.history.push(format!("{verb} {element}"));
            op(state, site, id)
        })
    }
}

fn require_tag(state: &PageState, id: NodeId, tags: &[&str], action: &str) -> HarnessResult<()> {
    let tag = state.dom.node(id).map(|n| n.tag.as_str()).unwrap_or_default();
    if tags.contains(&tag) {
        Ok(())
    } else {
        Err(HarnessError::driver(format!(
            "cannot {action} a <{tag}> element"
        )))
    }
}

#[async_trait]
impl PageDriver for MemoryPage {
    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        self.inner.with_state(|state, site| {
            state.history.push(format!("navigate {url}"));
            state.load(url);
            site.render(state, url).map_err(|e| HarnessError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })
        })
    }

    async fn url(&self) -> HarnessResult<String> {
        self.inner.with_state(|state, _| Ok(state.url.clone()))
    }

    async fn title(&self) -> HarnessResult<String> {
        self.inner.with_state(|state, _| Ok(state.title.clone()))
    }

    async fn query(
        &self,
        css: &str,
        scope: Option<&ElementRef>,
    ) -> HarnessResult<Vec<ElementSnapshot>> {
        self.inner.with_state(|state, _| {
            let scope = scope.map(|s| state.resolve(s)).transpose()?;
            let ids = state.dom.select_within(scope, css)?;
            Ok(ids.into_iter().filter_map(|id| state.snapshot(id)).collect())
        })
    }

    async fn click(&self, element: &ElementRef) -> HarnessResult<()> {
        self.act(element, "click", |state, site, id| {
            if !state.dom.is_visible(id) {
                return Err(HarnessError::driver(format!(
                    "element {element} is not visible"
                )));
            }
            site.on_event(state, DomEvent::Click(id))
        })
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> HarnessResult<()> {
        self.act(element, "fill", |state, site, id| {
            require_tag(state, id, &["input", "textarea"], "fill")?;
            state.dom.set_value(id, value);
            site.on_event(state, DomEvent::Input(id))
        })
    }

    async fn select_option(
        &self,
        element: &ElementRef,
        option: &SelectOption,
    ) -> HarnessResult<String> {
        let mut selected = String::new();
        self.act(element, "select", |state, site, id| {
            require_tag(state, id, &["select"], "select an option of")?;
            let options = state.dom.select_within(Some(id), "option")?;
            let chosen = options.iter().enumerate().find_map(|(index, option_id)| {
                let node = state.dom.node(*option_id)?;
                let text = state.dom.text_content(*option_id);
                let value = node.attribute("value").map_or_else(|| text.clone(), str::to_string);
                option.matches(&value, &text, index).then_some(value)
            });
            let value = chosen.ok_or_else(|| {
                HarnessError::driver(format!("no option matching {option} in {element}"))
            })?;
            state.dom.set_value(id, value.clone());
            selected = value;
            site.on_event(state, DomEvent::Change(id))
        })?;
        Ok(selected)
    }

    async fn set_input_files(&self, element: &ElementRef, files: &[PathBuf]) -> HarnessResult<()> {
        self.act(element, "set_input_files", |state, site, id| {
            require_tag(state, id, &["input"], "attach files to")?;
            if state.dom.node(id).and_then(|n| n.attribute("type")) != Some("file") {
                return Err(HarnessError::driver(format!(
                    "element {element} is not an <input type=file>"
                )));
            }
            if let Some(missing) = files.iter().find(|f| !f.is_file()) {
                return Err(HarnessError::Fixture {
                    message: format!("file {} does not exist", missing.display()),
                });
            }
            let value = files
                .first()
                .and_then(|f| f.file_name())
                .map(|name| format!("C:\\fakepath\\{}", name.to_string_lossy()))
                .unwrap_or_default();
            state.dom.set_value(id, value);
            site.on_event(state, DomEvent::Change(id))
        })
    }

    fn subscribe_responses(&self) -> broadcast::Receiver<ResponseEvent> {
        self.inner.events.subscribe()
    }

    async fn close(&self) -> HarnessResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted browsing context
pub struct MemoryContext {
    id: String,
    site: Arc<dyn MockSite>,
    storage: Storage,
    closed: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    pages: Mutex<Vec<Arc<MemoryPage>>>,
}

impl fmt::Debug for MemoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryContext")
            .field("id", &self.id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MemoryContext {
    /// Pages opened in this context
    pub fn pages(&self) -> Vec<Arc<MemoryPage>> {
        self.pages.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ContextDriver for MemoryContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> HarnessResult<Arc<dyn PageDriver>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(HarnessError::SessionCrashed {
                message: "in-memory browser disconnected".to_string(),
            });
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(HarnessError::ContextClosed {
                context: self.id.clone(),
            });
        }
        let (events, _) = broadcast::channel(RESPONSE_CHANNEL_CAPACITY);
        let page = Arc::new(MemoryPage {
            inner: Arc::new(PageInner {
                context_id: self.id.clone(),
                site: Arc::clone(&self.site),
                state: Mutex::new(PageState::new(Arc::clone(&self.storage))),
                events,
                closed: AtomicBool::new(false),
                context_closed: Arc::clone(&self.closed),
                connected: Arc::clone(&self.connected),
            }),
        });
        if let Ok(mut pages) = self.pages.lock() {
            pages.push(Arc::clone(&page));
        }
        Ok(page)
    }

    async fn close(&self) -> HarnessResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Scripted browser process
pub struct MemoryBrowser {
    site: Arc<dyn MockSite>,
    connected: Arc<AtomicBool>,
    next_context: AtomicU64,
    contexts: Mutex<Vec<Arc<MemoryContext>>>,
}

impl fmt::Debug for MemoryBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBrowser")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("contexts", &self.contexts_created())
            .finish_non_exhaustive()
    }
}

impl MemoryBrowser {
    /// Create a browser serving `site`
    pub fn new(site: impl MockSite) -> Arc<Self> {
        Arc::new(Self {
            site: Arc::new(site),
            connected: Arc::new(AtomicBool::new(true)),
            next_context: AtomicU64::new(1),
            contexts: Mutex::new(Vec::new()),
        })
    }

    /// Simulate the browser process dying
    pub fn crash(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Contexts created so far
    pub fn contexts(&self) -> Vec<Arc<MemoryContext>> {
        self.contexts.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of contexts created so far
    pub fn contexts_created(&self) -> usize {
        self.contexts.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Number of contexts not yet closed
    pub fn open_contexts(&self) -> usize {
        self.contexts()
            .iter()
            .filter(|c| !c.closed.load(Ordering::SeqCst))
            .count()
    }
}

#[async_trait]
impl BrowserDriver for MemoryBrowser {
    async fn new_context(&self) -> HarnessResult<Arc<dyn ContextDriver>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(HarnessError::SessionCrashed {
                message: "in-memory browser disconnected".to_string(),
            });
        }
        let n = self.next_context.fetch_add(1, Ordering::SeqCst);
        let context = Arc::new(MemoryContext {
            id: format!("memory-ctx-{n}"),
            site: Arc::clone(&self.site),
            storage: Arc::default(),
            closed: Arc::new(AtomicBool::new(false)),
            connected: Arc::clone(&self.connected),
            pages: Mutex::new(Vec::new()),
        });
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(Arc::clone(&context));
        }
        Ok(context)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> HarnessResult<()> {
        for context in self.contexts() {
            context.closed.store(true, Ordering::SeqCst);
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher handing out one shared [`MemoryBrowser`]
pub struct MemoryLauncher {
    browser: Arc<MemoryBrowser>,
    failure: Option<String>,
    launches: Mutex<Vec<LaunchOptions>>,
}

impl fmt::Debug for MemoryLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLauncher")
            .field("browser", &self.browser)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

impl MemoryLauncher {
    /// Launcher for a browser serving `site`
    pub fn new(site: impl MockSite) -> Self {
        Self {
            browser: MemoryBrowser::new(site),
            failure: None,
            launches: Mutex::new(Vec::new()),
        }
    }

    /// Launcher whose every launch fails
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(FnSite::blank())
        }
    }

    /// The browser handed out by `launch`
    #[must_use]
    pub fn browser(&self) -> Arc<MemoryBrowser> {
        Arc::clone(&self.browser)
    }

    /// Options received by each launch
    pub fn launches(&self) -> Vec<LaunchOptions> {
        self.launches.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BrowserLauncher for MemoryLauncher {
    async fn launch(&self, options: &LaunchOptions) -> HarnessResult<Arc<dyn BrowserDriver>> {
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(options.clone());
        }
        if let Some(message) = &self.failure {
            return Err(HarnessError::LaunchFailure {
                message: message.clone(),
            });
        }
        Ok(self.browser())
    }
}
