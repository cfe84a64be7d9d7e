//! HTTP reachability probe
//!
//! Implements [`IConnectivityMonitor`] by periodically requesting a probe
//! URL on the SPB host. Any HTTP response (whatever its status) means the
//! host is reachable; a transport error or timeout means it is not. The
//! latest state is published on a `watch` channel, and subscribers are
//! woken only when reachability actually changes.

use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use spbsync_core::config::ConnectivityConfig;
use spbsync_core::ports::{ConnectivityState, IConnectivityMonitor, Transport};

use crate::ApiError;

/// Periodic HTTP reachability monitor
pub struct HttpConnectivityProbe {
    client: Client,
    url: String,
    interval: Duration,
    state: watch::Sender<ConnectivityState>,
}

impl HttpConnectivityProbe {
    /// Creates a probe for `url`; the initial state is offline until the
    /// first probe completes
    pub fn new(url: impl Into<String>, interval: Duration, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        let (state, _) = watch::channel(ConnectivityState::offline());
        Ok(Self {
            client,
            url: url.into(),
            interval,
            state,
        })
    }

    /// Builds a probe against `{base_url}{probe_path}`
    pub fn from_config(base_url: &str, config: &ConnectivityConfig) -> Result<Self, ApiError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), config.probe_path);
        Self::new(url, config.probe_interval(), config.probe_timeout())
    }

    /// Probes once and publishes the result
    pub async fn probe_once(&self) -> ConnectivityState {
        let state = match self.client.get(&self.url).send().await {
            Ok(response) => {
                debug!(url = %self.url, status = response.status().as_u16(), "Probe reached host");
                ConnectivityState::new(vec![Transport::Other])
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Probe failed");
                ConnectivityState::offline()
            }
        };
        self.publish(state.clone());
        state
    }

    /// Probes every interval until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Connectivity probe stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
            }
        }
    }

    fn publish(&self, state: ConnectivityState) {
        self.state.send_if_modified(|current| {
            if current.is_connected() == state.is_connected() {
                return false;
            }
            info!(from = %current, to = %state, "Connectivity changed");
            *current = state;
            true
        });
    }
}

#[async_trait::async_trait]
impl IConnectivityMonitor for HttpConnectivityProbe {
    async fn check(&self) -> ConnectivityState {
        self.probe_once().await
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }
}
