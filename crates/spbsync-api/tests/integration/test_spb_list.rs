//! Integration tests for the SPB list endpoint

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use spbsync_core::domain::FetchScope;
use spbsync_core::ports::ISpbSource;

use crate::common;

#[tokio::test]
async fn test_fetch_documents_passes_scope_and_parses_envelope() {
    let (server, provider) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/spb"))
        .and(query_param("user", "driver-01"))
        .and(query_param("vendor", "V01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "spbNumber": "SPB-100",
                    "vendorCode": "V01",
                    "driverName": "Budi",
                    "vehicleNumber": "B 1234 XY",
                    "destination": "Cikarang",
                    "status": "NEW",
                    "issuedAt": 1700000000
                },
                { "spbNumber": "SPB-101" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let docs = provider
        .fetch_documents(&FetchScope::new("driver-01", "V01"))
        .await
        .expect("fetch should succeed");

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].spb_number, "SPB-100");
    assert_eq!(docs[0].driver_name, "Budi");
    assert_eq!(docs[0].issued_at, 1_700_000_000);
    assert_eq!(docs[1].spb_number, "SPB-101");
    assert!(docs[1].driver_name.is_empty());
}

#[tokio::test]
async fn test_fetch_documents_empty_envelope() {
    let (server, provider) = common::setup_api_mock().await;
    Mock::given(method("GET"))
        .and(path("/spb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let docs = provider
        .fetch_documents(&FetchScope::new("u", "v"))
        .await
        .unwrap();
    assert!(docs.is_empty());
}

#[tokio::test]
async fn test_fetch_documents_error_has_context() {
    let (server, provider) = common::setup_api_mock().await;
    Mock::given(method("GET"))
        .and(path("/spb"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
        .mount(&server)
        .await;

    let err = provider
        .fetch_documents(&FetchScope::new("driver-01", "V01"))
        .await
        .unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("driver-01"), "chain was: {chain}");
    assert!(chain.contains("500"), "chain was: {chain}");
    assert!(chain.contains("database down"), "chain was: {chain}");
}
