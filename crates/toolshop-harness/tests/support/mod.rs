//! Scripted Toolshop storefront for integration tests.
//!
//! Mirrors the markup the page objects rely on (test ids, labels, alert
//! roles) and the timing that makes auto-wait matter: search results,
//! quantity changes and the cart badge all update a little after the click.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};
use toolshop_harness::config::{TOOLSHOP_API_URL, TOOLSHOP_BASE_URL};
use toolshop_harness::driver::memory::{
    DomEvent, MemoryLauncher, MockDom, MockNode, MockSite, NodeId, PageState,
};
use toolshop_harness::pages::search::encode_query_value;
use toolshop_harness::prelude::*;

/// Title of every storefront page
pub const TITLE: &str = "Practice Software Testing - Toolshop - v5.0";

const CART_KEY: &str = "cart";
const SEARCH_LATENCY: Duration = Duration::from_millis(40);
const CART_LATENCY: Duration = Duration::from_millis(60);
const QUANTITY_LATENCY: Duration = Duration::from_millis(5);

/// One catalogue entry
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: u32,
    pub name: &'static str,
    pub price: f64,
    pub brand: &'static str,
}

/// Catalogue served by the simulation
pub fn catalogue() -> Vec<Item> {
    let rows: [(&'static str, f64, &'static str); 12] = [
        ("Combination Pliers", 14.15, "ForgeFlex Tools"),
        ("Pliers", 12.01, "ForgeFlex Tools"),
        ("Bolt Cutters", 48.41, "MightyCraft Hardware"),
        ("Long Nose Pliers", 14.24, "MightyCraft Hardware"),
        ("Slip Joint Pliers", 9.17, "ForgeFlex Tools"),
        ("Claw Hammer with Shock Reduction Grip", 13.41, "ForgeFlex Tools"),
        ("Hammer", 12.58, "MightyCraft Hardware"),
        ("Thor Hammer", 11.14, "ForgeFlex Tools"),
        ("Tape Measure 7.5m", 7.23, "MightyCraft Hardware"),
        ("Measuring Tape", 10.07, "ForgeFlex Tools"),
        ("Tape Measure 5m", 12.91, "MightyCraft Hardware"),
        ("Wood Saw", 12.18, "ForgeFlex Tools"),
    ];
    rows.iter()
        .zip(1..)
        .map(|(&(name, price, brand), id)| Item { id, name, price, brand })
        .collect()
}

/// The simulated storefront
#[derive(Debug, Clone)]
pub struct Toolshop {
    items: Vec<Item>,
}

impl Default for Toolshop {
    fn default() -> Self {
        Self { items: catalogue() }
    }
}

fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = rest.find('/').map_or("/", |i| &rest[i..]);
    path.split(['?', '#']).next().unwrap_or("/")
}

fn origin_of(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split('/').next().unwrap_or_default();
            format!("{scheme}://{host}")
        }
        None => TOOLSHOP_BASE_URL.to_string(),
    }
}

fn money(amount: f64) -> String {
    format!("${amount:.2}")
}

fn cart_of(state: &PageState) -> Vec<(u32, u32)> {
    state
        .storage_get(CART_KEY)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

impl Toolshop {
    fn item(&self, id: u32) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    fn layout(&self, state: &mut PageState) -> NodeId {
        let nav = state.dom.append(None, MockNode::new("nav").class("navbar"));
        for (test_id, href, label) in [
            ("nav-home", "/", "Home"),
            ("nav-contact", "/contact", "Contact"),
            ("nav-sign-in", "/auth/login", "Sign in"),
        ] {
            state.dom.append(
                Some(nav),
                MockNode::new("a").attr("data-test", test_id).attr("href", href).text(label),
            );
        }
        let cart = state.dom.append(
            Some(nav),
            MockNode::new("a")
                .attr("data-test", "nav-cart")
                .attr("href", "/checkout")
                .attr("aria-label", "cart"),
        );
        let quantity: u32 = cart_of(state).iter().map(|(_, q)| q).sum();
        if quantity > 0 {
            state.dom.append(
                Some(cart),
                MockNode::new("span")
                    .attr("data-test", "cart-quantity")
                    .text(quantity.to_string()),
            );
        }
        let form = state.dom.append(Some(nav), MockNode::new("form").attr("data-test", "search-form"));
        state.dom.append(
            Some(form),
            MockNode::new("input")
                .attr("type", "text")
                .attr("placeholder", "Search")
                .attr("data-test", "search-query"),
        );
        state.dom.append(
            Some(form),
            MockNode::new("button")
                .attr("type", "submit")
                .attr("data-test", "search-submit")
                .text("Search"),
        );
        state.dom.append(None, MockNode::new("main").class("container"))
    }

    fn render_cards(dom: &mut MockDom, grid: NodeId, items: &[Item]) {
        dom.remove_children(grid);
        for item in items {
            let card = dom.append(
                Some(grid),
                MockNode::new("a")
                    .class("card")
                    .attr("data-test", format!("product-{}", item.id))
                    .attr("href", format!("/product/{}", item.id)),
            );
            dom.append(Some(card), MockNode::new("img").attr("alt", item.name));
            let body = dom.append(Some(card), MockNode::new("div").class("card-body"));
            dom.append(
                Some(body),
                MockNode::new("h5").class("card-title").attr("data-test", "product-name").text(item.name),
            );
            let footer = dom.append(Some(card), MockNode::new("div").class("card-footer"));
            dom.append(
                Some(footer),
                MockNode::new("span").attr("data-test", "product-price").text(money(item.price)),
            );
        }
    }

    fn home(&self, state: &mut PageState, main: NodeId) {
        let grid = state
            .dom
            .append(Some(main), MockNode::new("div").class("grid").attr("data-test", "product-grid"));
        Self::render_cards(&mut state.dom, grid, &self.items);
    }

    fn details(&self, state: &mut PageState, main: NodeId, item: &Item) {
        state.title = format!("{} - {TITLE}", item.name);
        let dom = &mut state.dom;
        dom.append(Some(main), MockNode::new("img").attr("alt", item.name));
        dom.append(
            Some(main),
            MockNode::new("h1").attr("data-test", "product-name").text(item.name),
        );
        dom.append(
            Some(main),
            MockNode::new("span").class("badge").attr("aria-label", "brand").text(item.brand),
        );
        dom.append(
            Some(main),
            MockNode::new("span")
                .attr("data-test", "unit-price")
                .text(format!("{:.2}", item.price)),
        );
        let group = dom.append(Some(main), MockNode::new("div").class("input-group"));
        dom.append(
            Some(group),
            MockNode::new("button").attr("data-test", "decrease-quantity").text("-"),
        );
        dom.append(
            Some(group),
            MockNode::new("input")
                .attr("type", "number")
                .attr("data-test", "quantity")
                .attr("data-product", item.id.to_string())
                .value("1"),
        );
        dom.append(
            Some(group),
            MockNode::new("button").attr("data-test", "increase-quantity").text("+"),
        );
        dom.append(
            Some(main),
            MockNode::new("button").attr("data-test", "add-to-cart").text("Add to cart"),
        );
    }

    fn checkout(&self, state: &mut PageState, main: NodeId) {
        let lines = cart_of(state);
        if lines.is_empty() {
            state.dom.append(
                Some(main),
                MockNode::new("p").text("The cart is empty. Nothing to display."),
            );
            return;
        }
        let table = state.dom.append(Some(main), MockNode::new("table").class("table"));
        let head = state.dom.append(Some(table), MockNode::new("thead"));
        let head_row = state.dom.append(Some(head), MockNode::new("tr"));
        for title in ["Item", "Quantity", "Price", "Total"] {
            state.dom.append(Some(head_row), MockNode::new("th").text(title));
        }
        let body = state.dom.append(Some(table), MockNode::new("tbody"));
        let mut total = 0.0;
        for (id, quantity) in lines {
            let Some(item) = self.item(id) else { continue };
            let line_total = item.price * f64::from(quantity);
            total += line_total;
            let row = state.dom.append(Some(body), MockNode::new("tr"));
            let cell = state.dom.append(Some(row), MockNode::new("td"));
            state.dom.append(
                Some(cell),
                MockNode::new("span")
                    .class("product-title")
                    .attr("data-test", "product-title")
                    .text(item.name),
            );
            let cell = state.dom.append(Some(row), MockNode::new("td"));
            state.dom.append(
                Some(cell),
                MockNode::new("input")
                    .attr("type", "number")
                    .attr("data-test", "product-quantity")
                    .value(quantity.to_string()),
            );
            let cell = state.dom.append(Some(row), MockNode::new("td"));
            state.dom.append(
                Some(cell),
                MockNode::new("span").attr("data-test", "product-price").text(money(item.price)),
            );
            let cell = state.dom.append(Some(row), MockNode::new("td"));
            state.dom.append(
                Some(cell),
                MockNode::new("span").attr("data-test", "line-price").text(money(line_total)),
            );
        }
        let foot = state.dom.append(Some(table), MockNode::new("tfoot"));
        let row = state.dom.append(Some(foot), MockNode::new("tr"));
        state
            .dom
            .append(Some(row), MockNode::new("td").attr("data-test", "cart-total").text(money(total)));
    }

    fn contact(state: &mut PageState, main: NodeId) {
        let form = state
            .dom
            .append(Some(main), MockNode::new("form").attr("data-test", "contact-form"));
        for (id, label, tag) in [
            ("first_name", "First name", "input"),
            ("last_name", "Last name", "input"),
            ("email", "Email address", "input"),
        ] {
            let group = state.dom.append(Some(form), MockNode::new("div").class("form-group"));
            state
                .dom
                .append(Some(group), MockNode::new("label").attr("for", id).text(label));
            state.dom.append(
                Some(group),
                MockNode::new(tag)
                    .id(id)
                    .attr("type", "text")
                    .attr("data-test", id.replace('_', "-")),
            );
        }

        let group = state.dom.append(Some(form), MockNode::new("div").class("form-group"));
        state
            .dom
            .append(Some(group), MockNode::new("label").attr("for", "subject").text("Subject"));
        let select = state
            .dom
            .append(Some(group), MockNode::new("select").id("subject").attr("data-test", "subject"));
        for (value, text) in [
            ("", "Select a subject"),
            ("customer-service", "Customer service"),
            ("webmaster", "Webmaster"),
            ("return", "Return"),
            ("payments", "Payments"),
            ("warranty", "Warranty"),
            ("status-of-order", "Status of my order"),
        ] {
            state
                .dom
                .append(Some(select), MockNode::new("option").attr("value", value).text(text));
        }

        let group = state.dom.append(Some(form), MockNode::new("div").class("form-group"));
        state
            .dom
            .append(Some(group), MockNode::new("label").attr("for", "message").text("Message *"));
        state.dom.append(
            Some(group),
            MockNode::new("textarea").id("message").attr("data-test", "message"),
        );

        let group = state.dom.append(Some(form), MockNode::new("div").class("form-group"));
        state.dom.append(
            Some(group),
            MockNode::new("label").attr("for", "attachment").text("Attachment"),
        );
        state.dom.append(
            Some(group),
            MockNode::new("input")
                .id("attachment")
                .attr("type", "file")
                .attr("data-test", "attachment"),
        );

        state.dom.append(
            Some(form),
            MockNode::new("input")
                .attr("type", "submit")
                .attr("data-test", "contact-submit")
                .attr("value", "Send"),
        );
    }

    fn search(state: &mut PageState, items: Vec<Item>) {
        let keyword = state
            .dom
            .select_first("[data-test=search-query]")
            .and_then(|id| state.dom.value(id))
            .unwrap_or_default()
            .trim()
            .to_string();
        let lowered = keyword.to_lowercase();
        let found: Vec<Item> = items
            .into_iter()
            .filter(|item| item.name.to_lowercase().contains(&lowered))
            .collect();
        let url = format!("{TOOLSHOP_API_URL}/products/search?q={}", encode_query_value(&keyword));
        state.defer(SEARCH_LATENCY / 2, move |s| s.respond(ResponseEvent::get(url, 200)));
        state.defer(SEARCH_LATENCY, move |s| {
            let Some(grid) = s.dom.select_first("[data-test=product-grid]") else {
                return;
            };
            Toolshop::render_cards(&mut s.dom, grid, &found);
            if let Some(main) = s.dom.select_first("main") {
                if let Some(old) = s.dom.select_first("[data-test=search-caption]") {
                    s.dom.remove(old);
                }
                s.dom.append(
                    Some(main),
                    MockNode::new("h3")
                        .attr("data-test", "search-caption")
                        .text(format!("Searched for: {keyword}")),
                );
            }
        });
    }

    fn step_quantity(state: &mut PageState, delta: i64) {
        state.defer(QUANTITY_LATENCY, move |s| {
            let Some(input) = s.dom.select_first("[data-test=quantity]") else {
                return;
            };
            let current: i64 = s.dom.value(input).and_then(|v| v.parse().ok()).unwrap_or(1);
            s.dom.set_value(input, (current + delta).max(1).to_string());
        });
    }

    fn add_to_cart(state: &mut PageState) {
        let Some(input) = state.dom.select_first("[data-test=quantity]") else {
            return;
        };
        let quantity: u32 = state.dom.value(input).and_then(|v| v.parse().ok()).unwrap_or(1);
        let Some(product) = state
            .dom
            .node(input)
            .and_then(|n| n.attribute("data-product"))
            .and_then(|p| p.parse::<u32>().ok())
        else {
            return;
        };
        let mut cart = cart_of(state);
        match cart.iter_mut().find(|(id, _)| *id == product) {
            Some(line) => line.1 += quantity,
            None => cart.push((product, quantity)),
        }
        state.storage_set(CART_KEY, json!(cart));
        let total: u32 = cart.iter().map(|(_, q)| q).sum();
        state.defer(CART_LATENCY, move |s| {
            s.respond(ResponseEvent::post(format!("{TOOLSHOP_API_URL}/carts"), 200));
            let Some(link) = s.dom.select_first("[data-test=nav-cart]") else {
                return;
            };
            match s.dom.select_first("[data-test=cart-quantity]") {
                Some(badge) => s.dom.set_text(badge, total.to_string()),
                None => {
                    s.dom.append(
                        Some(link),
                        MockNode::new("span")
                            .attr("data-test", "cart-quantity")
                            .text(total.to_string()),
                    );
                }
            }
            s.dom.append(
                None,
                MockNode::new("div")
                    .attr("role", "alert")
                    .class("toast")
                    .text("Product added to shopping cart."),
            );
        });
    }

    fn submit_contact(state: &mut PageState) {
        for old in state.dom.select("[data-error]").unwrap_or_default() {
            state.dom.remove(old);
        }
        let value_of = |state: &PageState, id: &str| {
            state
                .dom
                .select_first(&format!("#{id}"))
                .and_then(|n| state.dom.value(n))
                .unwrap_or_default()
                .trim()
                .to_string()
        };
        let mut errors = Vec::new();
        for (id, name) in [
            ("first_name", "First name"),
            ("last_name", "Last name"),
            ("email", "Email"),
            ("message", "Message"),
        ] {
            let value = value_of(state, id);
            if value.is_empty() {
                errors.push((id, format!("{name} is required")));
            } else if id == "email" && !value.contains('@') {
                errors.push((id, "Email format is invalid".to_string()));
            } else if id == "message" && value.chars().count() < 50 {
                errors.push((id, "Message must be minimal 50 characters".to_string()));
            }
        }
        if errors.is_empty() {
            state.defer(SEARCH_LATENCY, |s| {
                s.respond(ResponseEvent::post(format!("{TOOLSHOP_API_URL}/messages"), 200));
                if let Some(form) = s.dom.select_first("[data-test=contact-form]") {
                    s.dom.remove(form);
                }
                if let Some(main) = s.dom.select_first("main") {
                    let alert = s.dom.append(
                        Some(main),
                        MockNode::new("div").attr("role", "alert").class("alert-success"),
                    );
                    s.dom.append(
                        Some(alert),
                        MockNode::new("div").text("Thanks for your message! We will contact you shortly."),
                    );
                }
            });
            return;
        }
        for (id, message) in errors {
            let Some(field) = state.dom.select_first(&format!("#{id}")) else {
                continue;
            };
            let group = state.dom.parent(field);
            let alert = state.dom.append(
                group,
                MockNode::new("div")
                    .attr("role", "alert")
                    .attr("data-error", id)
                    .class("alert-danger"),
            );
            state.dom.append(Some(alert), MockNode::new("div").text(message));
        }
    }

    fn test_id_of(state: &PageState, id: NodeId) -> Option<String> {
        state
            .dom
            .closest(id, "[data-test]")
            .and_then(|n| state.dom.node(n))
            .and_then(|n| n.attribute("data-test"))
            .map(str::to_string)
    }
}

impl MockSite for Toolshop {
    fn render(&self, state: &mut PageState, url: &str) -> HarnessResult<()> {
        state.title = TITLE.to_string();
        let main = self.layout(state);
        let path = path_of(url);
        match path.trim_end_matches('/') {
            "" => self.home(state, main),
            "/checkout" => self.checkout(state, main),
            "/contact" => Self::contact(state, main),
            other => match other
                .strip_prefix("/product/")
                .and_then(|id| id.parse().ok())
                .and_then(|id| self.item(id).cloned())
            {
                Some(item) => self.details(state, main, &item),
                None => {
                    state
                        .dom
                        .append(Some(main), MockNode::new("h1").text("Page not found"));
                }
            },
        }
        Ok(())
    }

    fn on_event(&self, state: &mut PageState, event: DomEvent) -> HarnessResult<()> {
        let DomEvent::Click(target) = event else {
            return Ok(());
        };
        match Self::test_id_of(state, target).as_deref() {
            Some("search-submit") => Self::search(state, self.items.clone()),
            Some("increase-quantity") => Self::step_quantity(state, 1),
            Some("decrease-quantity") => Self::step_quantity(state, -1),
            Some("add-to-cart") => Self::add_to_cart(state),
            Some("contact-submit") => Self::submit_contact(state),
            _ => {
                if let Some(href) = state
                    .dom
                    .closest(target, "a[href]")
                    .and_then(|a| state.dom.node(a))
                    .and_then(|a| a.attribute("href"))
                    .map(str::to_string)
                {
                    let url = format!("{}{href}", origin_of(state.url()));
                    state.navigate_within(url);
                }
            }
        }
        Ok(())
    }
}

/// Launcher serving the simulated storefront
pub fn launcher() -> MemoryLauncher {
    MemoryLauncher::new(Toolshop::default())
}

/// Toolshop preset with timeouts suited to the simulation
pub fn config() -> HarnessConfig {
    let mut config = HarnessConfig::toolshop();
    config.action_timeout_ms = 2_000;
    config.assertion_timeout_ms = 2_000;
    config.navigation_timeout_ms = 2_000;
    config
}

/// Open a session against the simulation
pub async fn session() -> (Session, MemoryLauncher) {
    toolshop_harness::logging::init_for_tests();
    let launcher = launcher();
    let session = Session::open(config(), &launcher)
        .await
        .expect("simulated browser launches");
    (session, launcher)
}

/// Fresh context and page on the home page
pub async fn home(session: &Session) -> (BrowsingContext, Page) {
    let context = session.new_context().await.expect("context");
    let page = context.new_page().await.expect("page");
    page.goto("/").await.expect("home page loads");
    (context, page)
}

/// Product JSON as served by `GET /products`
pub fn product_json(item: &Item) -> Value {
    json!({ "id": item.id.to_string(), "name": item.name, "price": item.price })
}
