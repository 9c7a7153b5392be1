//! Storefront landing page.

use super::search::SearchComponent;
use crate::page::Page;
use crate::page_object::PageObject;
use crate::result::HarnessResult;
use async_trait::async_trait;

/// `/`
#[derive(Debug, Clone)]
pub struct HomePage {
    page: Page,
}

impl HomePage {
    /// Page object on `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    /// Document title
    pub async fn title(&self) -> HarnessResult<String> {
        self.page.title().await
    }
}

#[async_trait]
impl PageObject for HomePage {
    fn page(&self) -> &Page {
        &self.page
    }

    fn route(&self) -> &str {
        "/"
    }

    async fn wait_until_loaded(&self) -> HarnessResult<()> {
        SearchComponent::new(&self.page).wait_until_ready().await
    }
}
