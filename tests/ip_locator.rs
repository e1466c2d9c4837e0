//! Integration tests for `IpLocator` against a local `wiremock` server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use distance_badge::api::{IpLocator, IpLookup};
use distance_badge::{Coordinate, LocateError};

async fn locator(server: &MockServer) -> IpLocator {
    IpLocator::new(format!("{}/json/", server.uri()), Duration::from_secs(5))
        .expect("failed to build test IpLocator")
}

#[tokio::test]
async fn locate_reads_ipapi_co_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "203.0.113.7",
            "city": "Vienna",
            "latitude": 48.2082,
            "longitude": 16.3738,
            "country": "AT",
            "country_name": "Austria"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fix = locator(&server).await.locate().await.unwrap();
    assert_eq!(fix.coordinate, Coordinate::new(48.2082, 16.3738));
    assert_eq!(fix.country.as_deref(), Some("Austria"));
}

#[tokio::test]
async fn locate_reads_short_field_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "lat": -33.86,
            "lon": 151.21,
            "country": "Australia"
        })))
        .mount(&server)
        .await;

    let fix = locator(&server).await.locate().await.unwrap();
    assert_eq!(fix.coordinate, Coordinate::new(-33.86, 151.21));
    assert_eq!(fix.country.as_deref(), Some("Australia"));
}

#[tokio::test]
async fn non_success_status_is_a_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;

    let err = locator(&server).await.locate().await.unwrap_err();
    assert!(matches!(err, LocateError::NetworkError(_)), "got {err:?}");
}

#[tokio::test]
async fn missing_coordinates_are_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": true, "reason": "Reserved IP Address"})),
        )
        .mount(&server)
        .await;

    let err = locator(&server).await.locate().await.unwrap_err();
    assert!(matches!(err, LocateError::MalformedResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let server = MockServer::start().await;
    let url = format!("{}/json/", server.uri());
    drop(server);

    let err = IpLocator::new(url, Duration::from_secs(2))
        .unwrap()
        .locate()
        .await
        .unwrap_err();
    assert!(matches!(err, LocateError::NetworkError(_)), "got {err:?}");
}
