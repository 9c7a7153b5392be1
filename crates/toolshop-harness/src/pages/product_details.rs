//! Product details page.

use crate::assertion::expect;
use crate::locator::Locator;
use crate::page::Page;
use crate::page_object::PageObject;
use crate::result::{HarnessError, HarnessResult};
use crate::wait::WaitState;
use async_trait::async_trait;
use tracing::debug;

/// `/product/{id}`
#[derive(Debug, Clone)]
pub struct ProductDetails {
    page: Page,
}

impl ProductDetails {
    /// Page object on `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    fn quantity_input(&self) -> Locator {
        self.page.get_by_test_id("quantity")
    }

    /// Product name heading
    pub async fn name(&self) -> HarnessResult<String> {
        self.page.get_by_test_id("product-name").inner_text().await
    }

    /// Unit price
    pub async fn unit_price(&self) -> HarnessResult<f64> {
        let text = self.page.get_by_test_id("unit-price").inner_text().await?;
        parse_money(&text)
    }

    /// Brand badge text
    pub async fn brand(&self) -> HarnessResult<String> {
        self.page.locator("[aria-label=brand]").inner_text().await
    }

    /// Value of the quantity input
    pub async fn quantity(&self) -> HarnessResult<u32> {
        let value = self.quantity_input().input_value().await?;
        value
            .trim()
            .parse()
            .map_err(|_| HarnessError::parse("quantity", format!("not a number: {value:?}")))
    }

    /// Press "+" `times` times and wait for the input to reflect it
    pub async fn increase_quantity(&self, times: u32) -> HarnessResult<u32> {
        self.step_quantity("increase-quantity", times, |q| q.saturating_add(times))
            .await
    }

    /// Press "-" `times` times; the quantity never drops below one
    pub async fn decrease_quantity(&self, times: u32) -> HarnessResult<u32> {
        self.step_quantity("decrease-quantity", times, |q| q.saturating_sub(times).max(1))
            .await
    }

    async fn step_quantity(&self, button: &str, times: u32, expected: impl Fn(u32) -> u32) -> HarnessResult<u32> {
        let target = expected(self.quantity().await?);
        let control = self.page.get_by_test_id(button);
        for _ in 0..times {
            control.click().await?;
        }
        expect(&self.quantity_input())
            .to_have_value(&target.to_string())
            .await?;
        debug!(button, target, "quantity updated");
        Ok(target)
    }

    /// Press "Add to cart"
    pub async fn add_to_cart(&self) -> HarnessResult<()> {
        self.page.get_by_test_id("add-to-cart").click().await
    }
}

#[async_trait]
impl PageObject for ProductDetails {
    fn page(&self) -> &Page {
        &self.page
    }

    fn route(&self) -> &str {
        "/product/:id"
    }

    async fn wait_until_loaded(&self) -> HarnessResult<()> {
        self.page
            .get_by_test_id("add-to-cart")
            .wait_for(WaitState::Visible)
            .await
    }
}

/// Parse a rendered amount such as `$1,048.41`
pub fn parse_money(text: &str) -> HarnessResult<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned
        .parse()
        .map_err(|_| HarnessError::parse("amount", format!("not an amount: {text:?}")))
}
