//! Integration tests for the HTTP reachability probe

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spbsync_api::HttpConnectivityProbe;
use spbsync_core::ports::IConnectivityMonitor;

fn probe_for(server_uri: &str) -> HttpConnectivityProbe {
    HttpConnectivityProbe::new(
        format!("{server_uri}/health"),
        Duration::from_millis(20),
        Duration::from_millis(200),
    )
    .expect("build probe")
}

#[tokio::test]
async fn test_probe_starts_offline_and_goes_online() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let probe = probe_for(&server.uri());
    let rx = probe.subscribe();
    assert!(!rx.borrow().is_connected());

    let state = probe.check().await;
    assert!(state.is_connected());
    assert!(rx.borrow().is_connected());
}

#[tokio::test]
async fn test_any_http_status_counts_as_reachable() {
    let server = MockServer::start().await;
    // Nothing mounted: every request gets a 404
    let probe = probe_for(&server.uri());
    assert!(probe.check().await.is_connected());
}

#[tokio::test]
async fn test_unreachable_host_is_offline() {
    let probe = probe_for("http://127.0.0.1:1");
    assert!(!probe.check().await.is_connected());
}

#[tokio::test]
async fn test_run_publishes_changes_until_cancelled() {
    let server = MockServer::start().await;
    let probe = std::sync::Arc::new(probe_for(&server.uri()));
    let mut rx = probe.subscribe();

    let cancel = CancellationToken::new();
    let handle = {
        let probe = probe.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { probe.run(cancel).await })
    };

    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("probe should publish a change")
        .expect("sender alive");
    assert!(rx.borrow().is_connected());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("probe loop should stop")
        .unwrap();
}
