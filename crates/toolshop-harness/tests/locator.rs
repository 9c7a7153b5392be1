//! Locator resolution against the simulated storefront.

mod support;

use std::time::Duration;

use toolshop_harness::prelude::*;

#[tokio::test]
async fn by_text_opens_product_details() {
    let (session, _launcher) = support::session().await;
    session
        .with_page(|page| async move {
            page.goto("/").await?;
            page.get_by_text("Bolt Cutters").click().await?;
            page.wait_for_url("**/product/*").await?;
            expect(&page.get_by_text("MightyCraft Hardware")).to_be_visible().await
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn by_alt_text_opens_product_details() {
    let (session, _launcher) = support::session().await;
    session
        .with_page(|page| async move {
            page.goto("/").await?;
            page.get_by_alt_text("Combination Pliers").click().await?;
            expect(&page.get_by_text("ForgeFlex Tools")).to_be_visible().await?;
            assert_eq!(
                page.title().await?,
                format!("Combination Pliers - {}", support::TITLE)
            );
            Ok(())
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn home_page_title_and_readiness() {
    let (session, _launcher) = support::session().await;
    let (context, page) = support::home(&session).await;
    let home = Storefront::new(page.clone()).home();
    home.wait_until_loaded().await.unwrap();
    assert!(home.is_current().await.unwrap());
    assert_eq!(home.title().await.unwrap(), support::TITLE);
    context.close().await.unwrap();
}

#[tokio::test]
async fn test_id_and_role_lookups() {
    let (session, _launcher) = support::session().await;
    let (context, page) = support::home(&session).await;

    let names = page.get_by_test_id("product-name");
    assert_eq!(names.count().await.unwrap(), support::catalogue().len());
    assert_eq!(names.first().inner_text().await.unwrap(), "Combination Pliers");
    assert_eq!(names.last().inner_text().await.unwrap(), "Wood Saw");

    let search = page.get_by_role_named(AriaRole::Button, "Search");
    assert!(search.is_visible().await.unwrap());

    let links = page.get_by_role_named(AriaRole::Link, "Contact");
    links.click().await.unwrap();
    page.wait_for_url("**/contact").await.unwrap();
    context.close().await.unwrap();
}

#[tokio::test]
async fn strict_locator_reports_ambiguity_immediately() {
    let (session, _launcher) = support::session().await;
    let (context, page) = support::home(&session).await;
    let started = std::time::Instant::now();
    let err = page.get_by_text("Pliers").click().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    match err {
        HarnessError::Ambiguous { selector, count } => {
            assert!(selector.contains("get_by_text"));
            assert_eq!(count, 4);
        }
        other => panic!("expected Ambiguous, got {other}"),
    }
    context.close().await.unwrap();
}

#[tokio::test]
async fn missing_element_times_out_with_selector() {
    let (session, _launcher) = support::session().await;
    let (context, page) = support::home(&session).await;
    let err = page
        .get_by_test_id("nope")
        .with_timeout(Duration::from_millis(120))
        .click()
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::NotFound { .. }));
    assert!(err.to_string().contains("get_by_test_id(\"nope\")"));
    context.close().await.unwrap();
}

#[tokio::test]
async fn filter_keeps_cards_matching_every_condition() {
    let (session, _launcher) = support::session().await;
    let (context, page) = support::home(&session).await;
    let cards = page.locator(".card");
    let pliers = cards.filter(FilterOptions::new().has_text("Pliers"));
    let cheap = cards.filter(FilterOptions::new().has_text("Pliers").has_text("$9.17"));
    let not_combination = pliers.filter(FilterOptions::new().has_not_text("Combination"));

    assert_eq!(pliers.count().await.unwrap(), 4);
    assert_eq!(cheap.count().await.unwrap(), 1);
    assert_eq!(
        cheap.get_by_test_id("product-name").inner_text().await.unwrap(),
        "Slip Joint Pliers"
    );
    assert_eq!(not_combination.count().await.unwrap(), 3);
    context.close().await.unwrap();
}

#[tokio::test]
async fn is_visible_is_stable_without_mutation() {
    let (session, _launcher) = support::session().await;
    let (context, page) = support::home(&session).await;
    let search = page.get_by_placeholder("Search");
    let first = search.is_visible().await.unwrap();
    let second = search.is_visible().await.unwrap();
    assert!(first);
    assert_eq!(first, second);
    context.close().await.unwrap();
}
