//! Cart (checkout step one).

use super::product_details::parse_money;
use crate::assertion::{expect, Expectation};
use crate::page::Page;
use crate::page_object::PageObject;
use crate::result::{HarnessError, HarnessResult};
use crate::wait::WaitState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One row of the cart table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Product title
    pub title: String,
    /// Units ordered
    pub quantity: u32,
    /// Unit price
    pub price: f64,
    /// Line total
    pub total: f64,
}

/// `/checkout`
#[derive(Debug, Clone)]
pub struct CartPage {
    page: Page,
}

impl CartPage {
    /// Page object on `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    /// Every line item, in table order
    pub async fn line_items(&self) -> HarnessResult<Vec<CartLine>> {
        let rows = self.page.locator("tbody tr");
        let mut lines = Vec::new();
        for index in 0..rows.count().await? {
            let row = rows.nth(index);
            let title = row.locator(".product-title").inner_text().await?;
            let quantity_text = row.get_by_test_id("product-quantity").input_value().await?;
            let quantity = quantity_text.trim().parse().map_err(|_| {
                HarnessError::parse(format!("cart row {index}"), format!("bad quantity {quantity_text:?}"))
            })?;
            let price = parse_money(&row.get_by_test_id("product-price").inner_text().await?)?;
            let total = parse_money(&row.get_by_test_id("line-price").inner_text().await?)?;
            lines.push(CartLine {
                title,
                quantity,
                price,
                total,
            });
        }
        Ok(lines)
    }

    /// Cart total
    pub async fn cart_total(&self) -> HarnessResult<f64> {
        parse_money(&self.page.get_by_test_id("cart-total").inner_text().await?)
    }

    /// Row title containing `name`
    #[must_use]
    pub fn product(&self, name: &str) -> Expectation {
        expect(&self.page.locator(".product-title").get_by_text(name))
    }
}

#[async_trait]
impl PageObject for CartPage {
    fn page(&self) -> &Page {
        &self.page
    }

    fn route(&self) -> &str {
        "/checkout"
    }

    async fn wait_until_loaded(&self) -> HarnessResult<()> {
        self.page
            .locator("tbody tr")
            .first()
            .wait_for(WaitState::Visible)
            .await
    }
}
