//! Integration tests for `ReverseGeocoder` and best-effort enrichment.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use distance_badge::api::{enrich_country, CountryLookup, ReverseGeocoder};
use distance_badge::{Coordinate, LocateError};

fn geocoder(server: &MockServer) -> ReverseGeocoder {
    ReverseGeocoder::new(server.uri(), 3, "distance-badge-test/0.1", Duration::from_secs(5))
        .expect("failed to build test ReverseGeocoder")
}

#[tokio::test]
async fn country_at_sends_coarse_lookup_and_reads_address_country() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .and(query_param("format", "jsonv2"))
        .and(query_param("lat", "47.4979"))
        .and(query_param("lon", "19.0402"))
        .and(query_param("zoom", "3"))
        .and(query_param("addressdetails", "1"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "place_id": 1,
            "display_name": "Magyarország",
            "address": { "country": "Hungary", "country_code": "hu" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let country = geocoder(&server)
        .country_at(Coordinate::new(47.4979, 19.0402))
        .await
        .unwrap();
    assert_eq!(country, "Hungary");
}

#[tokio::test]
async fn missing_country_field_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "Unable to geocode"})))
        .mount(&server)
        .await;

    let err = geocoder(&server)
        .country_at(Coordinate::new(0.0, -140.0))
        .await
        .unwrap_err();
    assert!(matches!(err, LocateError::MalformedResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn enrichment_absorbs_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let lookup: Arc<dyn CountryLookup> = Arc::new(geocoder(&server));
    assert_eq!(enrich_country(lookup, Coordinate::new(1.0, 1.0)).await, None);
}

#[tokio::test]
async fn enrichment_absorbs_garbage_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let lookup: Arc<dyn CountryLookup> = Arc::new(geocoder(&server));
    assert_eq!(enrich_country(lookup, Coordinate::new(1.0, 1.0)).await, None);
}
