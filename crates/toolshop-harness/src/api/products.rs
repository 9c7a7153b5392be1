//! Product catalogue data.

use super::client::{f64_field, str_field, ApiClient, Records};
use crate::result::HarnessResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A product as listed by the catalogue API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Display name
    pub name: String,
    /// Unit price
    pub price: f64,
}

impl Product {
    /// Map one `data[]` element
    pub fn from_json(value: &Value) -> HarnessResult<Self> {
        Ok(Self {
            name: str_field(value, "name")?.to_string(),
            price: f64_field(value, "price")?,
        })
    }

    /// Price as rendered on product cards (two decimals, no currency)
    #[must_use]
    pub fn price_label(&self) -> String {
        format!("{:.2}", self.price)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (${})", self.name, self.price_label())
    }
}

/// One page of the product listing. Every `fetch` re-issues the request.
#[derive(Debug, Clone)]
pub struct ProductFeed {
    client: ApiClient,
    page: u32,
}

impl ProductFeed {
    /// Feed for listing page `page`
    #[must_use]
    pub const fn new(client: ApiClient, page: u32) -> Self {
        Self { client, page }
    }

    /// `GET /products?page=N`, mapped lazily
    pub async fn fetch(&self) -> HarnessResult<Records<Product>> {
        let page = self.page.to_string();
        let document = self.client.fetch_json("/products", &[("page", page.as_str())]).await?;
        document.records("data", Product::from_json)
    }
}

/// `GET /products/search?q=keyword`; any malformed record fails the call
pub async fn search_products(client: &ApiClient, keyword: &str) -> HarnessResult<Vec<Product>> {
    let document = client.fetch_json("/products/search", &[("q", keyword)]).await?;
    document.records("data", Product::from_json)?.collect()
}
