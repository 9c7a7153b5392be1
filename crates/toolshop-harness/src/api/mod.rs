//! API Data Provider: REST access to the storefront backend.
//!
//! - **Client**: JSON requests with default headers and status checking
//! - **Products**: restartable catalogue feeds for parameterised cases
//! - **Users**: generated customers, registration and login

pub mod client;
pub mod products;
pub mod users;

pub use client::{ApiClient, Document, Records};
pub use products::{search_products, Product, ProductFeed};
pub use users::{Address, RegisteredUser, User, UsersApi};
