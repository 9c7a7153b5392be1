//! Keyword search and API-seeded product checks.

mod support;

use serde_json::json;
use test_case::test_case;
use toolshop_harness::prelude::*;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Page objects of one search case
struct SearchScenario {
    context: BrowsingContext,
    shop: Storefront,
}

impl SearchScenario {
    async fn open(session: &Session) -> Self {
        let (context, page) = support::home(session).await;
        let shop = Storefront::new(page);
        shop.home().wait_until_loaded().await.unwrap();
        Self { context, shop }
    }

    async fn close(self) {
        self.context.close().await.unwrap();
    }
}

#[tokio::test]
async fn search_for_pliers_returns_results() {
    let (session, _launcher) = support::session().await;
    let scenario = SearchScenario::open(&session).await;

    let response = scenario.shop.search().search_by("Pliers").await.unwrap();
    assert!(response.is_success());
    assert!(response.url.ends_with("/products/search?q=Pliers"));

    expect(&scenario.shop.page().get_by_test_id("search-caption"))
        .to_have_text("Searched for: Pliers")
        .await
        .unwrap();
    assert!(scenario.shop.products().count().await.unwrap() > 0);
    scenario.close().await;
}

#[tokio::test]
async fn search_for_tape_lists_only_tape_products() {
    let (session, _launcher) = support::session().await;
    let scenario = SearchScenario::open(&session).await;
    let products = scenario.shop.products();

    scenario.shop.search().search_by("tape").await.unwrap();
    products.results().to_have_count(3).await.unwrap();

    let names = products.product_names().await.unwrap();
    assert_eq!(names, vec!["Tape Measure 7.5m", "Measuring Tape", "Tape Measure 5m"]);
    assert_eq!(scenario.shop.search().keyword().await.unwrap(), "tape");
    scenario.close().await;
}

#[tokio::test]
async fn search_without_matches_empties_the_grid() {
    let (session, _launcher) = support::session().await;
    let scenario = SearchScenario::open(&session).await;
    scenario.shop.search().search_by("chainsaw").await.unwrap();
    scenario.shop.products().results().to_have_count(0).await.unwrap();
    scenario.close().await;
}

async fn catalogue_api() -> MockServer {
    let server = MockServer::start().await;
    let page_two: Vec<_> = support::catalogue()
        .iter()
        .skip(6)
        .map(support::product_json)
        .collect();
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": page_two })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn every_product_from_the_api_is_found_by_search() {
    let server = catalogue_api().await;
    let client = ApiClient::new(server.uri()).unwrap();
    let products: Vec<Product> = ProductFeed::new(client, 2)
        .fetch()
        .await
        .unwrap()
        .collect::<HarnessResult<_>>()
        .unwrap();
    assert_eq!(products.len(), 6);

    let (session, _launcher) = support::session().await;
    let scenario = SearchScenario::open(&session).await;
    for product in &products {
        scenario.shop.search().search_by(&product.name).await.unwrap();
        scenario.shop.products().card(product).to_be_visible().await.unwrap();
    }
    scenario.close().await;
}

#[test_case("Hammer", 3 ; "hammer matches three products")]
#[test_case("saw", 1 ; "lower case keyword")]
#[test_case("Bolt Cutters", 1 ; "keyword with a space")]
#[tokio::test]
async fn search_result_counts(keyword: &str, expected: usize) {
    let (session, _launcher) = support::session().await;
    let scenario = SearchScenario::open(&session).await;
    let response = scenario.shop.search().search_by(keyword).await.unwrap();
    assert!(UrlPattern::glob(toolshop_harness::pages::search::search_pattern(keyword)).matches(&response.url));
    scenario.shop.products().results().to_have_count(expected).await.unwrap();
    scenario.close().await;
}
