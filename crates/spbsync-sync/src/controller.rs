//! Sync orchestration controller
//!
//! A thin reactive layer over the [`FormSyncEngine`] for the SPB list
//! screen. It owns the list view state (sort, filter, pagination), loads
//! SPB documents cache-first, reacts to connectivity changes and forwards
//! sync requests to the engine. It never talks to the submission client.
//!
//! Events are applied through [`SyncController::dispatch`]; the resulting
//! [`ListViewState`] is published on a `watch` channel.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use spbsync_core::domain::{FetchScope, SpbDocument};
use spbsync_core::ports::{ConnectivityState, ISpbCache, ISpbSource};

use crate::engine::{FormSyncEngine, SyncAllOutcome};
use crate::scheduler::ConnectivityTransition;

// ============================================================================
// View state
// ============================================================================

/// Column the SPB list is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    SpbNumber,
    Driver,
    Vehicle,
    Destination,
    Status,
    IssuedAt,
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spb" | "spb_number" | "number" => Ok(SortColumn::SpbNumber),
            "driver" => Ok(SortColumn::Driver),
            "vehicle" => Ok(SortColumn::Vehicle),
            "destination" => Ok(SortColumn::Destination),
            "status" => Ok(SortColumn::Status),
            "issued" | "issued_at" | "date" => Ok(SortColumn::IssuedAt),
            other => Err(format!("unknown sort column: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// Load status of the list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    /// The remote refresh failed; the last good list is still shown
    RemoteError(String),
    /// The local cache could not be read
    LoadFailure(String),
}

impl fmt::Display for ViewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewStatus::Idle => f.write_str("idle"),
            ViewStatus::Loading => f.write_str("loading"),
            ViewStatus::Ready => f.write_str("ready"),
            ViewStatus::RemoteError(msg) => write!(f, "remote error: {msg}"),
            ViewStatus::LoadFailure(msg) => write!(f, "load failure: {msg}"),
        }
    }
}

/// Everything the SPB list screen renders
#[derive(Debug, Clone, PartialEq)]
pub struct ListViewState {
    /// Full unfiltered list, in source order
    pub documents: Vec<SpbDocument>,
    pub sort_column: SortColumn,
    pub sort_direction: SortDirection,
    /// Case-insensitive substring filter
    pub filter: String,
    /// 1-indexed current page
    pub page: usize,
    pub page_size: usize,
    pub status: ViewStatus,
    pub online: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl ListViewState {
    pub fn new(page_size: usize) -> Self {
        Self {
            documents: Vec::new(),
            sort_column: SortColumn::default(),
            sort_direction: SortDirection::default(),
            filter: String::new(),
            page: 1,
            page_size: page_size.max(1),
            status: ViewStatus::Idle,
            online: false,
            last_refreshed_at: None,
        }
    }

    /// Documents passing the filter, in display order
    pub fn filtered_sorted(&self) -> Vec<&SpbDocument> {
        let needle = self.filter.trim().to_lowercase();
        let mut rows: Vec<&SpbDocument> = self
            .documents
            .iter()
            .filter(|doc| doc.matches(&needle))
            .collect();

        let (column, direction) = (self.sort_column, self.sort_direction);
        rows.sort_by(|a, b| {
            let primary = compare_by(a, b, column);
            let primary = match direction {
                SortDirection::Ascending => primary,
                SortDirection::Descending => primary.reverse(),
            };
            primary.then_with(|| a.spb_number.cmp(&b.spb_number))
        });
        rows
    }

    pub fn filtered_count(&self) -> usize {
        let needle = self.filter.trim().to_lowercase();
        self.documents.iter().filter(|doc| doc.matches(&needle)).count()
    }

    /// Number of pages; an empty list still has one page
    pub fn total_pages(&self) -> usize {
        self.filtered_count().div_ceil(self.page_size).max(1)
    }

    /// Rows of the current page
    pub fn visible(&self) -> Vec<SpbDocument> {
        self.filtered_sorted()
            .into_iter()
            .skip((self.page - 1) * self.page_size)
            .take(self.page_size)
            .cloned()
            .collect()
    }

    pub fn set_documents(&mut self, documents: Vec<SpbDocument>) {
        self.documents = documents;
        self.clamp_page();
    }

    pub fn set_sort(&mut self, column: SortColumn, direction: SortDirection) {
        self.sort_column = column;
        self.sort_direction = direction;
    }

    /// Same column flips the direction; a new column sorts ascending
    pub fn toggle_sort(&mut self, column: SortColumn) {
        if self.sort_column == column {
            self.sort_direction = self.sort_direction.reversed();
        } else {
            self.set_sort(column, SortDirection::Ascending);
        }
    }

    /// Changing the filter returns to the first page
    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
        self.page = 1;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
        self.clamp_page();
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.clamp_page();
    }

    fn clamp_page(&mut self) {
        self.page = self.page.clamp(1, self.total_pages());
    }
}

fn compare_by(a: &SpbDocument, b: &SpbDocument, column: SortColumn) -> Ordering {
    fn text(a: &str, b: &str) -> Ordering {
        a.to_lowercase().cmp(&b.to_lowercase())
    }

    match column {
        SortColumn::SpbNumber => text(&a.spb_number, &b.spb_number),
        SortColumn::Driver => text(&a.driver_name, &b.driver_name),
        SortColumn::Vehicle => text(&a.vehicle_number, &b.vehicle_number),
        SortColumn::Destination => text(&a.destination, &b.destination),
        SortColumn::Status => text(&a.status, &b.status),
        SortColumn::IssuedAt => a.issued_at.cmp(&b.issued_at),
    }
}

// ============================================================================
// Events
// ============================================================================

/// Intents the controller reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Load the list; `force` bypasses a non-empty cache
    Load { force: bool },
    SortBy(SortColumn, SortDirection),
    ToggleSort(SortColumn),
    Filter(String),
    GoToPage(usize),
    SetPageSize(usize),
    ConnectivityChanged(bool),
    SyncRequested,
}

// ============================================================================
// SyncController
// ============================================================================

/// Orchestrates the SPB list view and connectivity-driven catch-up
pub struct SyncController {
    engine: FormSyncEngine,
    source: Arc<dyn ISpbSource>,
    cache: Arc<dyn ISpbCache>,
    scope: FetchScope,
    state: watch::Sender<ListViewState>,
    /// Serializes loads so two refreshes cannot interleave their writes
    load_lock: Mutex<()>,
}

impl SyncController {
    pub fn new(
        engine: FormSyncEngine,
        source: Arc<dyn ISpbSource>,
        cache: Arc<dyn ISpbCache>,
        scope: FetchScope,
        page_size: usize,
    ) -> Self {
        Self {
            engine,
            source,
            cache,
            scope,
            state: watch::channel(ListViewState::new(page_size)).0,
            load_lock: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &FormSyncEngine {
        &self.engine
    }

    pub fn scope(&self) -> &FetchScope {
        &self.scope
    }

    /// Current view state
    pub fn state(&self) -> ListViewState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListViewState> {
        self.state.subscribe()
    }

    /// Applies one event
    pub async fn dispatch(&self, event: ControllerEvent) {
        debug!(?event, "Controller event");
        match event {
            ControllerEvent::Load { force } => self.load(force).await,
            ControllerEvent::SortBy(column, direction) => {
                self.update(|s| s.set_sort(column, direction))
            }
            ControllerEvent::ToggleSort(column) => self.update(|s| s.toggle_sort(column)),
            ControllerEvent::Filter(filter) => self.update(|s| s.set_filter(filter)),
            ControllerEvent::GoToPage(page) => self.update(|s| s.set_page(page)),
            ControllerEvent::SetPageSize(size) => self.update(|s| s.set_page_size(size)),
            ControllerEvent::ConnectivityChanged(connected) => {
                self.on_connectivity_changed(connected).await
            }
            ControllerEvent::SyncRequested => {
                self.trigger_sync().await;
            }
        }
    }

    /// Cache-first load of the SPB list
    ///
    /// The remote source is used when `force` is set or the cache is
    /// empty. A remote failure keeps the last good list and reports
    /// [`ViewStatus::RemoteError`]; a cache failure reports
    /// [`ViewStatus::LoadFailure`].
    pub async fn load(&self, force: bool) {
        let _serial = self.load_lock.lock().await;
        self.update(|s| s.status = ViewStatus::Loading);

        let cached = match self.cache.load(&self.scope).await {
            Ok(documents) => documents,
            Err(e) => {
                let message = format!("{e:#}");
                error!(error = %message, "Failed to read SPB cache");
                self.update(|s| s.status = ViewStatus::LoadFailure(message));
                return;
            }
        };

        if !force && !cached.is_empty() {
            debug!(count = cached.len(), "SPB list served from cache");
            self.update(|s| {
                s.set_documents(cached);
                s.status = ViewStatus::Ready;
            });
            return;
        }

        match self.source.fetch_documents(&self.scope).await {
            Ok(documents) => {
                if let Err(e) = self.cache.replace(&self.scope, &documents).await {
                    warn!(error = %format!("{e:#}"), "Failed to write SPB cache");
                }
                info!(count = documents.len(), user = %self.scope.user_id, "SPB list refreshed");
                self.update(|s| {
                    s.set_documents(documents);
                    s.status = ViewStatus::Ready;
                    s.last_refreshed_at = Some(Utc::now());
                });
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(error = %message, "SPB list refresh failed, keeping last list");
                self.update(|s| {
                    if s.documents.is_empty() {
                        s.set_documents(cached);
                    }
                    s.status = ViewStatus::RemoteError(message);
                });
            }
        }
    }

    /// Remote refresh, then a non-silent engine sync, when coming back online
    pub async fn on_connectivity_changed(&self, connected: bool) {
        let mut was_online = false;
        self.state.send_modify(|s| {
            was_online = s.online;
            s.online = connected;
        });

        if ConnectivityTransition::between(was_online, connected) == ConnectivityTransition::Restored {
            info!("Connectivity restored, refreshing SPB list");
            self.load(true).await;
            let outcome = self.engine.sync_all_pending(false).await;
            debug!(?outcome, "Catch-up sync after reconnect finished");
        }
    }

    /// Delegates a user-requested sync to the engine
    pub async fn trigger_sync(&self) -> SyncAllOutcome {
        self.engine.sync_all_pending(false).await
    }

    /// Feeds connectivity changes into the controller until cancelled
    ///
    /// The state at spawn time is recorded as the baseline without
    /// triggering a refresh.
    pub fn spawn_connectivity_listener(
        self: &Arc<Self>,
        mut changes: watch::Receiver<ConnectivityState>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let baseline = changes.borrow_and_update().is_connected();
            controller.update(|s| s.online = baseline);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let connected = changes.borrow_and_update().is_connected();
                        controller.on_connectivity_changed(connected).await;
                    }
                }
            }

            debug!("Controller connectivity listener stopped");
        })
    }

    fn update(&self, apply: impl FnOnce(&mut ListViewState)) {
        self.state.send_modify(apply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(number: &str, driver: &str, destination: &str, issued_at: i64) -> SpbDocument {
        SpbDocument {
            spb_number: number.to_string(),
            vendor_code: "V01".to_string(),
            driver_name: driver.to_string(),
            vehicle_number: format!("B {issued_at} XY"),
            destination: destination.to_string(),
            status: "NEW".to_string(),
            issued_at,
        }
    }

    fn numbers(rows: &[SpbDocument]) -> Vec<&str> {
        rows.iter().map(|d| d.spb_number.as_str()).collect()
    }

    fn sample_state(page_size: usize) -> ListViewState {
        let mut state = ListViewState::new(page_size);
        state.set_documents(vec![
            doc("SPB-003", "budi", "Cikarang", 30),
            doc("SPB-001", "Andi", "Bekasi", 10),
            doc("SPB-002", "Citra", "Cikarang", 20),
            doc("SPB-004", "andi", "Depok", 40),
        ]);
        state
    }

    #[test]
    fn test_default_sort_is_by_number_ascending() {
        let state = sample_state(10);
        assert_eq!(
            numbers(&state.visible()),
            vec!["SPB-001", "SPB-002", "SPB-003", "SPB-004"]
        );
    }

    #[test]
    fn test_sort_is_case_insensitive_with_number_tiebreak() {
        let mut state = sample_state(10);
        state.set_sort(SortColumn::Driver, SortDirection::Ascending);
        // "Andi" and "andi" tie and fall back to the SPB number
        assert_eq!(
            numbers(&state.visible()),
            vec!["SPB-001", "SPB-004", "SPB-003", "SPB-002"]
        );
    }

    #[test]
    fn test_descending_keeps_ascending_tiebreak() {
        let mut state = sample_state(10);
        state.set_sort(SortColumn::Destination, SortDirection::Descending);
        assert_eq!(
            numbers(&state.visible()),
            vec!["SPB-004", "SPB-002", "SPB-003", "SPB-001"]
        );
    }

    #[test]
    fn test_toggle_sort() {
        let mut state = sample_state(10);
        state.toggle_sort(SortColumn::IssuedAt);
        assert_eq!(state.sort_direction, SortDirection::Ascending);
        state.toggle_sort(SortColumn::IssuedAt);
        assert_eq!(state.sort_direction, SortDirection::Descending);
        assert_eq!(numbers(&state.visible())[0], "SPB-004");
        state.toggle_sort(SortColumn::Driver);
        assert_eq!(state.sort_column, SortColumn::Driver);
        assert_eq!(state.sort_direction, SortDirection::Ascending);
    }

    #[test]
    fn test_filter_matches_across_columns_case_insensitively() {
        let mut state = sample_state(10);
        state.set_filter("CIKA");
        assert_eq!(numbers(&state.visible()), vec!["SPB-002", "SPB-003"]);

        state.set_filter("andi");
        assert_eq!(numbers(&state.visible()), vec!["SPB-001", "SPB-004"]);

        state.set_filter("b 30 xy");
        assert_eq!(numbers(&state.visible()), vec!["SPB-003"]);

        state.set_filter("no such thing");
        assert!(state.visible().is_empty());
        assert_eq!(state.total_pages(), 1);
    }

    #[test]
    fn test_pagination_is_one_indexed_and_clamped() {
        let mut state = sample_state(3);
        assert_eq!(state.total_pages(), 2);
        assert_eq!(numbers(&state.visible()), vec!["SPB-001", "SPB-002", "SPB-003"]);

        state.set_page(2);
        assert_eq!(numbers(&state.visible()), vec!["SPB-004"]);

        state.set_page(9);
        assert_eq!(state.page, 2);

        state.set_page(0);
        assert_eq!(state.page, 1);
    }

    #[test]
    fn test_page_size_change_clamps_page() {
        let mut state = sample_state(1);
        state.set_page(4);
        assert_eq!(numbers(&state.visible()), vec!["SPB-004"]);

        state.set_page_size(3);
        assert_eq!(state.page, 2);

        state.set_page_size(0);
        assert_eq!(state.page_size, 1);
    }

    #[test]
    fn test_filter_change_resets_page() {
        let mut state = sample_state(1);
        state.set_page(3);
        state.set_filter("andi");
        assert_eq!(state.page, 1);
    }

    #[test]
    fn test_sort_column_from_str() {
        assert_eq!("Driver".parse::<SortColumn>(), Ok(SortColumn::Driver));
        assert_eq!("issued".parse::<SortColumn>(), Ok(SortColumn::IssuedAt));
        assert!("color".parse::<SortColumn>().is_err());
    }

    #[test]
    fn test_view_status_display() {
        assert_eq!(
            ViewStatus::RemoteError("timeout".into()).to_string(),
            "remote error: timeout"
        );
    }
}
