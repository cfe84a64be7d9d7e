//! Connectivity monitor port (driven/secondary port)
//!
//! Reports the current network reachability and broadcasts changes.
//! Change notification uses a `tokio::sync::watch` channel so that any
//! number of independent subscribers (engine, controller) observe the
//! latest state without coordinating with each other.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A network transport the device may be using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Wifi,
    Mobile,
    Ethernet,
    Vpn,
    Other,
    None,
}

/// Snapshot of the active transports
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectivityState {
    transports: Vec<Transport>,
}

impl ConnectivityState {
    pub fn new(transports: Vec<Transport>) -> Self {
        Self { transports }
    }

    /// A single generic online transport
    pub fn online() -> Self {
        Self::new(vec![Transport::Other])
    }

    pub fn offline() -> Self {
        Self::new(vec![Transport::None])
    }

    pub fn transports(&self) -> &[Transport] {
        &self.transports
    }

    /// Connected means at least one transport other than `None`
    pub fn is_connected(&self) -> bool {
        self.transports.iter().any(|t| *t != Transport::None)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_connected() {
            write!(f, "online {:?}", self.transports)
        } else {
            f.write_str("offline")
        }
    }
}

/// Port trait for reachability monitoring
#[async_trait::async_trait]
pub trait IConnectivityMonitor: Send + Sync {
    /// Current reachability
    async fn check(&self) -> ConnectivityState;

    /// Subscribes to reachability changes
    ///
    /// The receiver's current value is the latest known state.
    fn subscribe(&self) -> watch::Receiver<ConnectivityState>;
}
