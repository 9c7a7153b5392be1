//! Toolshop page objects.
//!
//! Each object holds a cloned [`Page`] and is cheap to build, so cases
//! construct them on demand through [`Storefront`].

pub mod cart;
pub mod contact;
pub mod home;
pub mod navbar;
pub mod product_details;
pub mod product_list;
pub mod search;

pub use cart::{CartLine, CartPage};
pub use contact::{ContactField, ContactForm, ContactFormFields};
pub use home::HomePage;
pub use navbar::NavBar;
pub use product_details::ProductDetails;
pub use product_list::ProductList;
pub use search::SearchComponent;

use crate::page::Page;

/// Entry point to every page object of one tab
#[derive(Debug, Clone)]
pub struct Storefront {
    page: Page,
}

impl Storefront {
    /// Page objects over `page`
    #[must_use]
    pub const fn new(page: Page) -> Self {
        Self { page }
    }

    /// Underlying page
    #[must_use]
    pub const fn page(&self) -> &Page {
        &self.page
    }

    /// Landing page
    #[must_use]
    pub fn home(&self) -> HomePage {
        HomePage::new(&self.page)
    }

    /// Header search box
    #[must_use]
    pub fn search(&self) -> SearchComponent {
        SearchComponent::new(&self.page)
    }

    /// Product card grid
    #[must_use]
    pub fn products(&self) -> ProductList {
        ProductList::new(&self.page)
    }

    /// Product details page
    #[must_use]
    pub fn product_details(&self) -> ProductDetails {
        ProductDetails::new(&self.page)
    }

    /// Navigation bar
    #[must_use]
    pub fn navbar(&self) -> NavBar {
        NavBar::new(&self.page)
    }

    /// Cart page
    #[must_use]
    pub fn cart(&self) -> CartPage {
        CartPage::new(&self.page)
    }

    /// Contact form
    #[must_use]
    pub fn contact(&self) -> ContactForm {
        ContactForm::new(&self.page)
    }
}
