//! Observable sync status
//!
//! The [`SyncStatusBoard`] holds the three values a UI watches: the current
//! [`SyncPhase`], the last error message and the time of the last
//! successful bulk sync. Each value lives on its own `watch` channel so
//! subscribers only wake for the value they care about.
//!
//! Only non-silent engine operations write to the board.

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Phase of the most recent non-silent sync activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Success,
    Failed,
    Offline,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Syncing => "syncing",
            SyncPhase::Success => "success",
            SyncPhase::Failed => "failed",
            SyncPhase::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Point-in-time copy of the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatusSnapshot {
    pub phase: SyncPhase,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Watch-backed status values shared by the engine and its observers
#[derive(Debug)]
pub struct SyncStatusBoard {
    phase: watch::Sender<SyncPhase>,
    last_error: watch::Sender<Option<String>>,
    last_success_at: watch::Sender<Option<DateTime<Utc>>>,
}

impl Default for SyncStatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStatusBoard {
    pub fn new() -> Self {
        Self {
            phase: watch::channel(SyncPhase::Idle).0,
            last_error: watch::channel(None).0,
            last_success_at: watch::channel(None).0,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        *self.last_success_at.borrow()
    }

    pub fn snapshot(&self) -> SyncStatusSnapshot {
        SyncStatusSnapshot {
            phase: self.phase(),
            last_error: self.last_error(),
            last_success_at: self.last_success_at(),
        }
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn subscribe_last_error(&self) -> watch::Receiver<Option<String>> {
        self.last_error.subscribe()
    }

    pub fn subscribe_last_success(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_success_at.subscribe()
    }

    pub(crate) fn mark_syncing(&self) {
        self.set_phase(SyncPhase::Syncing);
    }

    /// Records a clean pass: clears the error and stamps the success time
    pub(crate) fn mark_success(&self, at: DateTime<Utc>) {
        self.last_error.send_replace(None);
        self.last_success_at.send_replace(Some(at));
        self.set_phase(SyncPhase::Success);
    }

    pub(crate) fn mark_failed(&self, message: impl Into<String>) {
        self.last_error.send_replace(Some(message.into()));
        self.set_phase(SyncPhase::Failed);
    }

    pub(crate) fn mark_offline(&self) {
        self.set_phase(SyncPhase::Offline);
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_board_is_idle() {
        let board = SyncStatusBoard::new();
        assert_eq!(
            board.snapshot(),
            SyncStatusSnapshot {
                phase: SyncPhase::Idle,
                last_error: None,
                last_success_at: None,
            }
        );
    }

    #[test]
    fn test_success_clears_previous_error() {
        let board = SyncStatusBoard::new();
        board.mark_failed("Server responded with status 500: boom");
        assert_eq!(board.phase(), SyncPhase::Failed);
        assert!(board.last_error().unwrap().contains("500"));

        let now = Utc::now();
        board.mark_success(now);
        assert_eq!(board.phase(), SyncPhase::Success);
        assert_eq!(board.last_error(), None);
        assert_eq!(board.last_success_at(), Some(now));
    }

    #[test]
    fn test_failure_keeps_last_success_time() {
        let board = SyncStatusBoard::new();
        let now = Utc::now();
        board.mark_success(now);
        board.mark_failed("timeout");
        assert_eq!(board.last_success_at(), Some(now));
    }

    #[tokio::test]
    async fn test_phase_subscribers_only_wake_on_change() {
        let board = SyncStatusBoard::new();
        let mut rx = board.subscribe_phase();

        board.mark_offline();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SyncPhase::Offline);

        board.mark_offline();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SyncPhase::Syncing.to_string(), "syncing");
        assert_eq!(SyncPhase::Offline.to_string(), "offline");
    }
}
