//! Smoke cases against the public Toolshop site with a real Chromium.
//!
//! Needs network access and a local Chromium:
//!
//! ```text
//! cargo test --features browser --test live_storefront -- --ignored
//! ```
#![cfg(feature = "browser")]

use toolshop_harness::driver::cdp::ChromiumLauncher;
use toolshop_harness::prelude::*;

async fn live_session() -> Session {
    toolshop_harness::logging::init_for_tests();
    let config = HarnessConfig::load().unwrap();
    Session::open(config, &ChromiumLauncher).await.unwrap()
}

#[tokio::test]
#[ignore = "needs Chromium and network access"]
async fn home_page_has_the_storefront_title() {
    let session = live_session().await;
    session
        .with_page(|page| async move {
            page.goto("/").await?;
            let home = Storefront::new(page).home();
            home.wait_until_loaded().await?;
            assert!(home.title().await?.contains("Practice Software Testing"));
            Ok(())
        })
        .await
        .unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "needs Chromium and network access"]
async fn search_and_add_to_cart() {
    let session = live_session().await;
    session
        .with_page(|page| async move {
            page.goto("/").await?;
            let mut workflow = CartWorkflow::new(&page);
            workflow.search("Bolt Cutters").await?;
            workflow.select_product("Bolt Cutters").await?;
            workflow.increase_quantity(2).await?;
            assert_eq!(workflow.add_to_cart().await?, 3);
            workflow.open_cart().await?;
            let lines = workflow.line_items().await?;
            assert_eq!(lines.len(), 1);
            assert_eq!(lines[0].quantity, 3);
            Ok(())
        })
        .await
        .unwrap();
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "needs network access"]
async fn catalogue_page_two_is_searchable() {
    let client = ApiClient::from_config(&HarnessConfig::load().unwrap()).unwrap();
    let (products, failures) = ProductFeed::new(client, 2).fetch().await.unwrap().collect_valid();
    assert!(failures.is_empty(), "{failures:?}");
    assert!(!products.is_empty());
}
