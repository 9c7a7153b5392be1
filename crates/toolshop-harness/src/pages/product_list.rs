//! Product card grid on the home and search result pages.

use crate::api::Product;
use crate::assertion::{expect, Expectation};
use crate::locator::{FilterOptions, Locator};
use crate::page::Page;
use crate::result::HarnessResult;

/// Grid of product cards
#[derive(Debug, Clone)]
pub struct ProductList {
    page: Page,
}

impl ProductList {
    /// Component on `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    fn cards(&self) -> Locator {
        self.page.locator(".card")
    }

    /// Names of the listed products, in display order
    pub async fn product_names(&self) -> HarnessResult<Vec<String>> {
        self.page.get_by_test_id("product-name").all_inner_texts().await
    }

    /// Number of cards shown
    pub async fn count(&self) -> HarnessResult<usize> {
        self.cards().count().await
    }

    /// Open the details page of the product named exactly `name`
    pub async fn open_product(&self, name: &str) -> HarnessResult<()> {
        self.cards().get_by_text_exact(name).click().await?;
        self.page.wait_for_url("**/product/*").await?;
        Ok(())
    }

    /// Card showing both the name and the two-decimal price of `product`
    #[must_use]
    pub fn card(&self, product: &Product) -> Expectation {
        let filter = FilterOptions::new()
            .has_text(product.name.as_str())
            .has_text(product.price_label());
        expect(&self.cards().filter(filter))
    }

    /// Every card in the grid, e.g. for `to_have_count`
    #[must_use]
    pub fn results(&self) -> Expectation {
        expect(&self.cards())
    }
}
