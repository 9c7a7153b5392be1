//! Cart workflow state machine.
//!
//! A shopper moves through
//! `Browsing → ProductSelected → QuantitySet → AddedToCart → CartOpen`.
//! [`CartState::transition`] is pure and decides whether an action is
//! allowed; [`CartWorkflow`] drives the page objects and only commits the
//! next state once the UI step succeeded.

use crate::assertion::expect;
use crate::network::ResponseEvent;
use crate::page::Page;
use crate::page_object::PageObject;
use crate::pages::{CartLine, Storefront};
use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument};

/// Quantity shown on a freshly opened product page
pub const BASE_QUANTITY: u32 = 1;

/// Where the shopper currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CartState {
    /// On the home page or a search result list
    Browsing,
    /// On a product details page with the default quantity
    ProductSelected {
        /// Product name
        product: String,
    },
    /// Quantity adjusted on the details page
    QuantitySet {
        /// Product name
        product: String,
        /// Value of the quantity input
        quantity: u32,
    },
    /// Product is in the cart; the badge shows `quantity`
    AddedToCart {
        /// Product name
        product: String,
        /// Units added
        quantity: u32,
    },
    /// Cart page is open
    CartOpen {
        /// Product name
        product: String,
        /// Units in the cart
        quantity: u32,
    },
}

/// Step a shopper can take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    /// Keyword search
    Search(String),
    /// Open a product's details page
    SelectProduct(String),
    /// Press "+" n times
    IncreaseQuantity(u32),
    /// Press "Add to cart"
    AddToCart,
    /// Open the cart page
    OpenCart,
    /// Read the cart table
    ReadLineItems,
}

impl fmt::Display for CartAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search(keyword) => write!(f, "search for {keyword:?}"),
            Self::SelectProduct(name) => write!(f, "select {name:?}"),
            Self::IncreaseQuantity(n) => write!(f, "increase the quantity by {n}"),
            Self::AddToCart => f.write_str("add to cart"),
            Self::OpenCart => f.write_str("open the cart"),
            Self::ReadLineItems => f.write_str("read cart line items"),
        }
    }
}

impl CartState {
    /// State after `action`, or `PreconditionViolation` if the action is not
    /// allowed here
    pub fn transition(&self, action: &CartAction) -> HarnessResult<Self> {
        let next = match (self, action) {
            (Self::Browsing, CartAction::Search(_)) => Some(Self::Browsing),
            (Self::Browsing, CartAction::SelectProduct(name)) => Some(Self::ProductSelected {
                product: name.clone(),
            }),
            (Self::ProductSelected { product }, CartAction::IncreaseQuantity(n)) => {
                Some(Self::QuantitySet {
                    product: product.clone(),
                    quantity: BASE_QUANTITY.saturating_add(*n),
                })
            }
            (Self::QuantitySet { product, quantity }, CartAction::IncreaseQuantity(n)) => {
                Some(Self::QuantitySet {
                    product: product.clone(),
                    quantity: quantity.saturating_add(*n),
                })
            }
            (Self::ProductSelected { product }, CartAction::AddToCart) => Some(Self::AddedToCart {
                product: product.clone(),
                quantity: BASE_QUANTITY,
            }),
            (Self::QuantitySet { product, quantity }, CartAction::AddToCart) => {
                Some(Self::AddedToCart {
                    product: product.clone(),
                    quantity: *quantity,
                })
            }
            (Self::AddedToCart { product, quantity }, CartAction::OpenCart) => {
                Some(Self::CartOpen {
                    product: product.clone(),
                    quantity: *quantity,
                })
            }
            (Self::CartOpen { .. }, CartAction::ReadLineItems) => Some(self.clone()),
            _ => None,
        };
        next.ok_or_else(|| HarnessError::PreconditionViolation {
            state: self.to_string(),
            action: action.to_string(),
        })
    }

    /// Product the shopper is working with, if any
    #[must_use]
    pub fn product(&self) -> Option<&str> {
        match self {
            Self::Browsing => None,
            Self::ProductSelected { product }
            | Self::QuantitySet { product, .. }
            | Self::AddedToCart { product, .. }
            | Self::CartOpen { product, .. } => Some(product),
        }
    }

    /// Quantity the UI should currently show
    #[must_use]
    pub const fn quantity(&self) -> Option<u32> {
        match self {
            Self::Browsing => None,
            Self::ProductSelected { .. } => Some(BASE_QUANTITY),
            Self::QuantitySet { quantity, .. }
            | Self::AddedToCart { quantity, .. }
            | Self::CartOpen { quantity, .. } => Some(*quantity),
        }
    }
}

impl fmt::Display for CartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Browsing => f.write_str("Browsing"),
            Self::ProductSelected { product } => write!(f, "ProductSelected({product})"),
            Self::QuantitySet { product, quantity } => write!(f, "QuantitySet({product} x{quantity})"),
            Self::AddedToCart { product, quantity } => write!(f, "AddedToCart({product} x{quantity})"),
            Self::CartOpen { product, quantity } => write!(f, "CartOpen({product} x{quantity})"),
        }
    }
}

/// Badge value after adding `quantity` units to a cart whose badge showed
/// `before` (no badge means an empty cart)
#[must_use]
pub fn expected_badge(before: Option<u32>, quantity: u32) -> u32 {
    before.unwrap_or(0).saturating_add(quantity)
}

/// Shopper journey over one page
#[derive(Debug)]
pub struct CartWorkflow {
    shop: Storefront,
    state: CartState,
}

impl CartWorkflow {
    /// Start browsing on `page`
    #[must_use]
    pub fn new(page: &Page) -> Self {
        Self {
            shop: Storefront::new(page.clone()),
            state: CartState::Browsing,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &CartState {
        &self.state
    }

    /// Page objects used by the workflow
    #[must_use]
    pub const fn storefront(&self) -> &Storefront {
        &self.shop
    }

    fn commit(&mut self, next: CartState) {
        info!(from = %self.state, to = %next, "cart workflow transition");
        self.state = next;
    }

    /// Search for `keyword` and wait for the results
    #[instrument(skip(self), fields(state = %self.state))]
    pub async fn search(&mut self, keyword: &str) -> HarnessResult<ResponseEvent> {
        let next = self.state.transition(&CartAction::Search(keyword.to_string()))?;
        let response = self.shop.search().search_by(keyword).await?;
        self.commit(next);
        Ok(response)
    }

    /// Open the details page of the product named `name`
    #[instrument(skip(self), fields(state = %self.state))]
    pub async fn select_product(&mut self, name: &str) -> HarnessResult<()> {
        let next = self.state.transition(&CartAction::SelectProduct(name.to_string()))?;
        self.shop.products().open_product(name).await?;
        self.shop.product_details().wait_until_loaded().await?;
        self.commit(next);
        Ok(())
    }

    /// Press "+" `times` times; returns the new quantity
    #[instrument(skip(self), fields(state = %self.state))]
    pub async fn increase_quantity(&mut self, times: u32) -> HarnessResult<u32> {
        let next = self.state.transition(&CartAction::IncreaseQuantity(times))?;
        let shown = self.shop.product_details().increase_quantity(times).await?;
        let expected = next.quantity().unwrap_or(BASE_QUANTITY);
        if shown != expected {
            return Err(HarnessError::assertion(format!(
                "quantity input shows {shown}, expected {expected}"
            )));
        }
        self.commit(next);
        Ok(shown)
    }

    /// Add the product to the cart and wait for the badge to grow by the
    /// quantity; returns the badge value
    #[instrument(skip(self), fields(state = %self.state))]
    pub async fn add_to_cart(&mut self) -> HarnessResult<u32> {
        let next = self.state.transition(&CartAction::AddToCart)?;
        let quantity = next.quantity().unwrap_or(BASE_QUANTITY);
        let details = self.shop.product_details();

        let quantity_input = self.shop.page().get_by_test_id("quantity");
        expect(&quantity_input)
            .to_have_value(&quantity.to_string())
            .await?;

        let navbar = self.shop.navbar();
        let badge = expected_badge(navbar.cart_quantity().await?, quantity);
        self.shop
            .page()
            .wait_for_condition(
                &format!("cart badge to show {badge}"),
                details.add_to_cart(),
                move || {
                    let navbar = navbar.clone();
                    async move { Ok(navbar.cart_quantity().await? == Some(badge)) }
                },
            )
            .await?;
        self.commit(next);
        Ok(badge)
    }

    /// Go to the cart page
    #[instrument(skip(self), fields(state = %self.state))]
    pub async fn open_cart(&mut self) -> HarnessResult<()> {
        let next = self.state.transition(&CartAction::OpenCart)?;
        self.shop.navbar().open_cart().await?;
        self.shop.cart().wait_until_loaded().await?;
        self.commit(next);
        Ok(())
    }

    /// Rows of the open cart
    pub async fn line_items(&self) -> HarnessResult<Vec<CartLine>> {
        self.state.transition(&CartAction::ReadLineItems)?;
        self.shop.cart().line_items().await
    }
}
