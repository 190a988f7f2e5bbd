//! Tests for the batched listing fetcher.

use std::time::Instant;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn listing(id: &str, seller: &str) -> RawListing {
    RawListing {
        listing_id: id.to_string(),
        release: format!("release-{id}"),
        seller: seller.to_string(),
        seller_ratings: "99.5%".to_string(),
        price: "$10.00".to_string(),
        shipping: "$2.00".to_string(),
    }
}

fn detail_json(value: f64) -> serde_json::Value {
    json!({
        "original_price": { "curr_abbr": "EUR", "value": value },
        "original_shipping_price": { "curr_abbr": "EUR", "value": 3.0 }
    })
}

fn temp_cache() -> (Arc<Mutex<ListingCache>>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let cache = ListingCache::new(temp_dir.path().join("cache.json"));
    (Arc::new(Mutex::new(cache)), temp_dir)
}

#[tokio::test]
async fn cached_listing_skips_the_network() {
    let mock_server = MockServer::start().await;

    // Any request at all would violate the cache short-circuit.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(detail_json(1.0)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (cache, _temp_dir) = temp_cache();
    cache.lock().unwrap().put("42", detail_json(12.5));

    let fetcher = ListingFetcher::new(mock_server.uri(), cache);
    let records = fetcher.fetch_all(&[listing("42", "s1")], "tok").await;

    assert_eq!(records.len(), 1);
    let price = records[0].detail_price.as_ref().unwrap();
    assert_eq!(price.currency, "EUR");
    assert_eq!(price.value, 12.5);
}

#[tokio::test]
async fn rate_limited_fetch_honors_retry_after() {
    let mock_server = MockServer::start().await;

    // First attempt is throttled with an explicit retry-after of 2 seconds,
    // the second attempt succeeds.
    Mock::given(method("GET"))
        .and(path("/marketplace/listings/7"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/marketplace/listings/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(detail_json(8.0)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (cache, _temp_dir) = temp_cache();
    let fetcher = ListingFetcher::new(mock_server.uri(), cache);

    let started = Instant::now();
    let records = fetcher.fetch_all(&[listing("7", "s1")], "tok").await;

    assert!(
        started.elapsed() >= Duration::from_millis(2000),
        "should have waited out the retry-after window"
    );
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].detail_price.as_ref().unwrap().value, 8.0);
}

#[tokio::test]
async fn exhausted_retries_degrade_to_scraped_fields() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/marketplace/listings/1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/marketplace/listings/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(detail_json(4.0)))
        .mount(&mock_server)
        .await;

    let (cache, _temp_dir) = temp_cache();
    let fetcher = ListingFetcher::new(mock_server.uri(), cache);

    let input = [listing("1", "s1"), listing("2", "s2")];
    let records = fetcher.fetch_all(&input, "tok").await;

    // One record per input even though listing 1 kept failing.
    assert_eq!(records.len(), 2);
    assert!(records[0].detail_price.is_none());
    assert_eq!(records[0].raw.price, "$10.00");
    assert_eq!(records[1].detail_price.as_ref().unwrap().value, 4.0);
}

#[tokio::test]
async fn successful_batch_persists_the_cache() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/marketplace/listings/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(detail_json(6.0)))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("cache.json");
    let cache = Arc::new(Mutex::new(ListingCache::new(&cache_path)));

    let fetcher = ListingFetcher::new(mock_server.uri(), Arc::clone(&cache));
    fetcher.fetch_all(&[listing("9", "s1")], "tok").await;

    // The payload survives a fresh load from disk.
    let reloaded = ListingCache::load(&cache_path);
    assert_eq!(reloaded.len(), 1);
    assert_eq!(
        reloaded.get("9").unwrap()["original_price"]["value"],
        6.0
    );
}

#[tokio::test]
async fn duplicate_ids_reuse_the_first_fetch() {
    let mock_server = MockServer::start().await;

    // Three waves of 2 at a time; the duplicate in the last batch must hit
    // the cache entry written by the first fetch instead of the network.
    Mock::given(method("GET"))
        .and(path("/marketplace/listings/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(detail_json(1.0)))
        .expect(1)
        .mount(&mock_server)
        .await;
    for id in ["2", "3", "4"] {
        Mock::given(method("GET"))
            .and(path(format!("/marketplace/listings/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(detail_json(2.0)))
            .mount(&mock_server)
            .await;
    }

    let (cache, _temp_dir) = temp_cache();
    let fetcher = ListingFetcher::new(mock_server.uri(), cache);

    let input = [
        listing("1", "s1"),
        listing("2", "s1"),
        listing("3", "s2"),
        listing("4", "s2"),
        listing("1", "s1"),
    ];
    let records = fetcher.fetch_all(&input, "tok").await;

    assert_eq!(records.len(), 5);
    assert_eq!(records[4].detail_price.as_ref().unwrap().value, 1.0);
}
