//! Background tasks of the sync engine
//!
//! Two long-running tasks keep the queue draining without user action:
//!
//! ```text
//! interval (15 min) ──→ periodic sweep ──→ sync_all_pending(silent = true)
//!
//! watch<ConnectivityState> ──→ connectivity listener
//!                                 │ down → up : sync_all_pending(silent = false)
//!                                 │ up → down : phase = Offline
//! ```
//!
//! Both tasks stop when their [`CancellationToken`] fires. They are spawned
//! by [`FormSyncEngine::start`](crate::engine::FormSyncEngine::start).

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use spbsync_core::ports::ConnectivityState;

use crate::engine::FormSyncEngine;

/// Edge between two consecutive connectivity observations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityTransition {
    Restored,
    Lost,
    Unchanged,
}

impl ConnectivityTransition {
    pub fn between(was_connected: bool, is_connected: bool) -> Self {
        match (was_connected, is_connected) {
            (false, true) => ConnectivityTransition::Restored,
            (true, false) => ConnectivityTransition::Lost,
            _ => ConnectivityTransition::Unchanged,
        }
    }
}

/// Spawns the silent periodic sweep
///
/// The first sweep runs one full `period` after spawning.
pub fn spawn_periodic_sweep(
    engine: FormSyncEngine,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_secs = period.as_secs(), "Periodic sweep started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = engine.sync_all_pending(true).await;
                    debug!(?outcome, "Periodic sweep finished");
                }
            }
        }

        info!("Periodic sweep stopped");
    })
}

/// Spawns the task reacting to connectivity transitions
///
/// The state current at spawn time is the baseline; only later changes
/// trigger work.
pub fn spawn_connectivity_listener(
    engine: FormSyncEngine,
    mut changes: watch::Receiver<ConnectivityState>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_connected = changes.borrow_and_update().is_connected();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        debug!("Connectivity channel closed");
                        break;
                    }
                    let connected = changes.borrow_and_update().is_connected();

                    match ConnectivityTransition::between(was_connected, connected) {
                        ConnectivityTransition::Restored => {
                            info!("Connectivity restored, syncing pending forms");
                            let outcome = engine.sync_all_pending(false).await;
                            debug!(?outcome, "Catch-up sync finished");
                        }
                        ConnectivityTransition::Lost => {
                            info!("Connectivity lost");
                            engine.status().mark_offline();
                        }
                        ConnectivityTransition::Unchanged => {}
                    }
                    was_connected = connected;
                }
            }
        }

        debug!("Connectivity listener stopped");
    })
}
