//! REST last-price provider against a local mock server

use chrono::Utc;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trade_lifecycle::{EngineError, PriceCache, PriceProvider, RestPriceProvider};

const LTP: &str = "/v2/market-quote/ltp";

fn provider(server: &MockServer) -> RestPriceProvider {
    RestPriceProvider::new(&format!("{}/v2", server.uri())).unwrap()
}

fn keys(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|k| k.to_string()).collect()
}

fn quote(key: &str, price: f64) -> serde_json::Value {
    json!({ "instrument_token": key, "last_price": price })
}

#[tokio::test]
async fn test_batch_last_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LTP))
        .and(query_param("instrument_key", "NSE_FO|1,NSE_FO|2"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "NSE_FO:NIFTY24500CE": quote("NSE_FO|1", 245.5),
                "NSE_FO:NIFTY24700CE": quote("NSE_FO|2", 98.05),
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let prices = provider(&server)
        .with_access_token("tok")
        .batch_last_price(&keys(&["NSE_FO|1", "NSE_FO|2"]))
        .await
        .unwrap();

    assert_eq!(prices.len(), 2);
    assert_eq!(prices["NSE_FO|1"], dec!(245.5));
    assert_eq!(prices["NSE_FO|2"], dec!(98.05));
}

#[tokio::test]
async fn test_partial_and_unrequested_quotes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LTP))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "NSE_FO:NIFTY24500CE": quote("NSE_FO|1", 245.5),
                "NSE_FO:BANKNIFTY52000PE": quote("NSE_FO|9", 310.0),
            }
        })))
        .mount(&server)
        .await;

    let prices = provider(&server)
        .batch_last_price(&keys(&["NSE_FO|1", "NSE_FO|2"]))
        .await
        .unwrap();

    // Missing means unknown, never zero
    assert_eq!(prices.len(), 1);
    assert!(!prices.contains_key("NSE_FO|2"));
    assert!(!prices.contains_key("NSE_FO|9"));
}

#[tokio::test]
async fn test_quote_without_token_uses_map_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LTP))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "NSE_FO|1": { "last_price": 12.35 } }
        })))
        .mount(&server)
        .await;

    let prices = provider(&server)
        .batch_last_price(&keys(&["NSE_FO|1"]))
        .await
        .unwrap();
    assert_eq!(prices.get("NSE_FO|1"), Some(&dec!(12.35)));
}

#[tokio::test]
async fn test_error_status_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LTP))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "error",
            "errors": [{ "errorCode": "UDAPI100050", "message": "Invalid token used to access API" }]
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .batch_last_price(&keys(&["NSE_FO|1"]))
        .await
        .unwrap_err();
    match err {
        EngineError::InvalidResponse(msg) => assert!(msg.contains("Invalid token")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LTP))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "data": {}
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .batch_last_price(&keys(&["NSE_FO|1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_empty_request_skips_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let prices = provider(&server).batch_last_price(&[]).await.unwrap();
    assert!(prices.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_cache_survives_failed_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LTP))
        .and(query_param("instrument_key", "NSE_FO|1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "NSE_FO:NIFTY24500CE": quote("NSE_FO|1", 245.5) }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LTP))
        .and(query_param("instrument_key", "NSE_FO|2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream timeout"))
        .mount(&server)
        .await;

    let cache = PriceCache::new(Arc::new(provider(&server)), 1, 2);
    let snapshot = cache.refresh(["NSE_FO|1", "NSE_FO|2", "NSE_FO|1"], Utc::now()).await;

    assert_eq!(snapshot.requested(), 2);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get("NSE_FO|1"), Some(dec!(245.5)));
    assert!(snapshot.get("NSE_FO|2").is_none());
    assert!(snapshot.require("NSE_FO|2").is_err());

    // The last snapshot is shared with readers
    assert_eq!(cache.snapshot().await.len(), 1);
}
