//! Navigation bar with the cart badge.

use crate::assertion::{expect, Expectation};
use crate::locator::Locator;
use crate::page::Page;
use crate::result::{HarnessError, HarnessResult};

/// Top navigation
#[derive(Debug, Clone)]
pub struct NavBar {
    page: Page,
}

impl NavBar {
    /// Component on `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    fn badge(&self) -> Locator {
        self.page.get_by_test_id("cart-quantity")
    }

    /// Number on the cart badge; `None` while the cart is empty
    pub async fn cart_quantity(&self) -> HarnessResult<Option<u32>> {
        let texts = self.badge().all_inner_texts().await?;
        match texts.as_slice() {
            [] => Ok(None),
            [text] => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| HarnessError::parse("cart-quantity", format!("not a number: {text:?}"))),
            _ => Err(HarnessError::Ambiguous {
                selector: self.badge().to_string(),
                count: texts.len(),
            }),
        }
    }

    /// Assertable cart badge
    #[must_use]
    pub fn cart_badge(&self) -> Expectation {
        expect(&self.badge())
    }

    /// Wait until the badge shows `quantity`
    pub async fn wait_for_cart_quantity(&self, quantity: u32) -> HarnessResult<()> {
        self.cart_badge().to_have_text(&quantity.to_string()).await
    }

    /// Go to the cart
    pub async fn open_cart(&self) -> HarnessResult<()> {
        self.page.get_by_test_id("nav-cart").click().await?;
        self.page.wait_for_url("**/checkout").await?;
        Ok(())
    }

    /// Go to the contact page
    pub async fn open_contact(&self) -> HarnessResult<()> {
        self.page.get_by_test_id("nav-contact").click().await?;
        self.page.wait_for_url("**/contact").await?;
        Ok(())
    }
}
