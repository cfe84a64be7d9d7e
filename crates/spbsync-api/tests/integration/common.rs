//! Shared test helpers for SPB service integration tests
//!
//! Provides wiremock-based mock server setup. Each helper mounts the
//! necessary mock endpoints against a fresh server.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spbsync_api::{ApiClient, SpbApiProvider};
use spbsync_core::ports::AdjustRequest;

pub const TEST_TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a provider pointing at it
///
/// The client uses a short timeout so slow-response tests stay fast.
pub async fn setup_api_mock() -> (MockServer, SpbApiProvider) {
    let server = MockServer::start().await;
    let client = ApiClient::with_timeout(server.uri(), Duration::from_millis(500))
        .expect("build client")
        .with_token(TEST_TOKEN);
    (server, SpbApiProvider::new(client))
}

/// Mounts `PUT /spb/adjust` answering with `status`
pub async fn mount_adjust(server: &MockServer, status: u16) {
    Mock::given(method("PUT"))
        .and(path("/spb/adjust"))
        .respond_with(ResponseTemplate::new(status).set_body_string("adjust response"))
        .mount(server)
        .await;
}

/// Mounts the processed check for `record_key`
pub async fn mount_processed(server: &MockServer, record_key: &str, processed: bool) {
    Mock::given(method("GET"))
        .and(path(format!("/spb/{record_key}/processed")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "processed": processed })),
        )
        .mount(server)
        .await;
}

pub fn sample_request(record_key: &str) -> AdjustRequest {
    AdjustRequest {
        record_key: record_key.to_string(),
        status: "ISSUE".to_string(),
        created_by: "driver-01".to_string(),
        latitude: "-6.2088".to_string(),
        longitude: "106.8456".to_string(),
        reason: Some("flat tire".to_string()),
        resource_changed_flag: "1".to_string(),
    }
}
