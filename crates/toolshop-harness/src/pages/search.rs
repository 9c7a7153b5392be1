//! Search box in the storefront header.

use crate::locator::{AriaRole, Locator};
use crate::network::ResponseEvent;
use crate::page::Page;
use crate::result::HarnessResult;
use crate::wait::WaitState;
use tracing::info;

/// Keyword search component
#[derive(Debug, Clone)]
pub struct SearchComponent {
    page: Page,
}

impl SearchComponent {
    /// Component on `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self { page: page.clone() }
    }

    fn search_box(&self) -> Locator {
        self.page.get_by_placeholder("Search")
    }

    fn search_button(&self) -> Locator {
        self.page.get_by_role_named(AriaRole::Button, "Search")
    }

    /// Wait until the search box can be used
    pub async fn wait_until_ready(&self) -> HarnessResult<()> {
        self.search_box().wait_for(WaitState::Visible).await
    }

    /// Type `keyword`, press Search and wait for the search request to
    /// return
    pub async fn search_by(&self, keyword: &str) -> HarnessResult<ResponseEvent> {
        let pattern = search_pattern(keyword);
        let search_box = self.search_box();
        let button = self.search_button();
        let typed = keyword.to_string();
        let response = self
            .page
            .wait_for_response(pattern.as_str(), async move {
                search_box.fill(typed).await?;
                button.click().await
            })
            .await?;
        info!(keyword, status = response.status, "search completed");
        Ok(response)
    }

    /// Current text of the search box
    pub async fn keyword(&self) -> HarnessResult<String> {
        self.search_box().input_value().await
    }
}

/// Glob for the search request issued for `keyword`
#[must_use]
pub fn search_pattern(keyword: &str) -> String {
    format!("**/products/search?q={}", encode_query_value(keyword))
}

/// Percent-encode everything except RFC 3986 unreserved characters
#[must_use]
pub fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
