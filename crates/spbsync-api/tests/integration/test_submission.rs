//! Integration tests for the adjust submission and processed check

use std::time::Duration;

use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use spbsync_core::ports::{ISubmissionClient, SubmissionError};

use crate::common;

// ============================================================================
// Adjust
// ============================================================================

#[tokio::test]
async fn test_submit_sends_wire_body_with_bearer_token() {
    let (server, provider) = common::setup_api_mock().await;

    Mock::given(method("PUT"))
        .and(path("/spb/adjust"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(body_json(serde_json::json!({
            "recordKey": "SPB-100",
            "status": "ISSUE",
            "createdBy": "driver-01",
            "latitude": "-6.2088",
            "longitude": "106.8456",
            "reason": "flat tire",
            "resourceChangedFlag": "1"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    provider
        .submit(&common::sample_request("SPB-100"))
        .await
        .expect("submit should succeed");
}

#[tokio::test]
async fn test_submit_server_error_includes_status() {
    let (server, provider) = common::setup_api_mock().await;
    common::mount_adjust(&server, 500).await;

    let err = provider
        .submit(&common::sample_request("SPB-200"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("500"), "message was: {err}");
}

#[tokio::test]
async fn test_submit_only_200_is_success() {
    let (server, provider) = common::setup_api_mock().await;
    common::mount_adjust(&server, 201).await;

    let err = provider
        .submit(&common::sample_request("SPB-201"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(201));
}

#[tokio::test]
async fn test_submit_unauthorized_is_reported_as_401() {
    let (server, provider) = common::setup_api_mock().await;
    common::mount_adjust(&server, 401).await;

    let err = provider
        .submit(&common::sample_request("SPB-1"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn test_submit_times_out() {
    let (server, provider) = common::setup_api_mock().await;

    Mock::given(method("PUT"))
        .and(path("/spb/adjust"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = provider
        .submit(&common::sample_request("SPB-SLOW"))
        .await
        .unwrap_err();
    assert_eq!(err, SubmissionError::Timeout);
    assert!(err.is_network());
}

#[tokio::test]
async fn test_submit_connection_refused_is_network_error() {
    let client = spbsync_api::ApiClient::with_timeout("http://127.0.0.1:1", Duration::from_millis(500))
        .expect("build client");
    let provider = spbsync_api::SpbApiProvider::new(client);

    let err = provider
        .submit(&common::sample_request("SPB-1"))
        .await
        .unwrap_err();
    assert!(err.is_network(), "expected network error, got {err:?}");
}

// ============================================================================
// Already-processed check
// ============================================================================

#[tokio::test]
async fn test_check_already_processed_true_and_false() {
    let (server, provider) = common::setup_api_mock().await;
    common::mount_processed(&server, "SPB-DONE", true).await;
    common::mount_processed(&server, "SPB-OPEN", false).await;

    assert!(provider.check_already_processed("SPB-DONE").await.unwrap());
    assert!(!provider.check_already_processed("SPB-OPEN").await.unwrap());
}

#[tokio::test]
async fn test_check_already_processed_404_means_false() {
    let (_server, provider) = common::setup_api_mock().await;
    // Nothing mounted: wiremock answers 404
    assert!(!provider.check_already_processed("SPB-NEW").await.unwrap());
}

#[tokio::test]
async fn test_check_already_processed_server_error() {
    let (server, provider) = common::setup_api_mock().await;
    Mock::given(method("GET"))
        .and(path("/spb/SPB-1/processed"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = provider.check_already_processed("SPB-1").await.unwrap_err();
    assert_eq!(err.status(), Some(502));
}

#[tokio::test]
async fn test_check_already_processed_malformed_body() {
    let (server, provider) = common::setup_api_mock().await;
    Mock::given(method("GET"))
        .and(path("/spb/SPB-1/processed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("yes"))
        .mount(&server)
        .await;

    let err = provider.check_already_processed("SPB-1").await.unwrap_err();
    assert!(matches!(err, SubmissionError::InvalidResponse(_)));
}
