//! Shared fixtures for the sync crate's integration tests
//!
//! Hand-written port implementations stand in for the network and the
//! reachability probe; records live in an in-memory SQLite database so
//! the engine runs against the real repository.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use spbsync_cache::{DatabasePool, SqliteFormRepository};
use spbsync_core::domain::{FetchScope, FormPayload, FormStatus, RecordKey, SpbDocument};
use spbsync_core::ports::{
    AdjustRequest, ConnectivityState, IConnectivityMonitor, ISpbCache, ISpbSource,
    ISubmissionClient, SubmissionError, Transport,
};
use spbsync_sync::{EngineConfig, FormSyncEngine};

// ============================================================================
// Connectivity
// ============================================================================

/// Connectivity monitor driven by the test
pub struct MockConnectivity {
    state: watch::Sender<ConnectivityState>,
}

impl MockConnectivity {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            state: watch::channel(Self::state_for(online)).0,
        })
    }

    pub fn set_online(&self, online: bool) {
        self.state.send_replace(Self::state_for(online));
    }

    fn state_for(online: bool) -> ConnectivityState {
        if online {
            ConnectivityState::new(vec![Transport::Wifi])
        } else {
            ConnectivityState::new(vec![Transport::None])
        }
    }
}

#[async_trait::async_trait]
impl IConnectivityMonitor for MockConnectivity {
    async fn check(&self) -> ConnectivityState {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }
}

// ============================================================================
// Submission
// ============================================================================

/// Status the mock answers with; 0 simulates a connection failure
pub const NETWORK_DOWN: u16 = 0;

/// Scriptable stand-in for the remote adjust endpoint
pub struct MockSubmission {
    status: AtomicU16,
    delay: Mutex<Duration>,
    processed: Mutex<HashSet<String>>,
    submissions: Mutex<Vec<(AdjustRequest, Instant)>>,
    checks: AtomicUsize,
}

impl MockSubmission {
    pub fn responding(status: u16) -> Arc<Self> {
        Arc::new(Self {
            status: AtomicU16::new(status),
            delay: Mutex::new(Duration::ZERO),
            processed: Mutex::new(HashSet::new()),
            submissions: Mutex::new(Vec::new()),
            checks: AtomicUsize::new(0),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::responding(200)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn mark_processed(&self, record_key: &str) {
        self.processed.lock().unwrap().insert(record_key.to_string());
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn submitted(&self) -> Vec<AdjustRequest> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    /// Time between consecutive submissions
    pub fn submission_gaps(&self) -> Vec<Duration> {
        let times: Vec<Instant> = self
            .submissions
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| *at)
            .collect();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ISubmissionClient for MockSubmission {
    async fn submit(&self, request: &AdjustRequest) -> Result<(), SubmissionError> {
        self.submissions
            .lock()
            .unwrap()
            .push((request.clone(), Instant::now()));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.status.load(Ordering::SeqCst) {
            200 => Ok(()),
            NETWORK_DOWN => Err(SubmissionError::Network("connection refused".into())),
            status => Err(SubmissionError::Server {
                status,
                message: "Internal Server Error".into(),
            }),
        }
    }

    async fn check_already_processed(&self, record_key: &str) -> Result<bool, SubmissionError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.status.load(Ordering::SeqCst) == NETWORK_DOWN {
            return Err(SubmissionError::Network("connection refused".into()));
        }
        Ok(self.processed.lock().unwrap().contains(record_key))
    }
}

// ============================================================================
// SPB list source and cache
// ============================================================================

/// Remote SPB list that can be switched to fail
pub struct MockSpbSource {
    documents: Mutex<Vec<SpbDocument>>,
    failing: Mutex<bool>,
    fetches: AtomicUsize,
}

impl MockSpbSource {
    pub fn with(documents: Vec<SpbDocument>) -> Arc<Self> {
        Arc::new(Self {
            documents: Mutex::new(documents),
            failing: Mutex::new(false),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_documents(&self, documents: Vec<SpbDocument>) {
        *self.documents.lock().unwrap() = documents;
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ISpbSource for MockSpbSource {
    async fn fetch_documents(&self, scope: &FetchScope) -> anyhow::Result<Vec<SpbDocument>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            anyhow::bail!("Server responded with status 503 for user {}", scope.user_id);
        }
        Ok(self.documents.lock().unwrap().clone())
    }
}

/// In-memory SPB cache that can be switched to fail
#[derive(Default)]
pub struct MockSpbCache {
    documents: Mutex<Vec<SpbDocument>>,
    failing: Mutex<bool>,
}

impl MockSpbCache {
    pub fn with(documents: Vec<SpbDocument>) -> Arc<Self> {
        Arc::new(Self {
            documents: Mutex::new(documents),
            failing: Mutex::new(false),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn stored(&self) -> Vec<SpbDocument> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ISpbCache for MockSpbCache {
    async fn load(&self, _scope: &FetchScope) -> anyhow::Result<Vec<SpbDocument>> {
        if *self.failing.lock().unwrap() {
            anyhow::bail!("database is locked");
        }
        Ok(self.documents.lock().unwrap().clone())
    }

    async fn replace(&self, _scope: &FetchScope, documents: &[SpbDocument]) -> anyhow::Result<()> {
        *self.documents.lock().unwrap() = documents.to_vec();
        Ok(())
    }
}

// ============================================================================
// Engine harness
// ============================================================================

pub struct Harness {
    pub engine: FormSyncEngine,
    pub repo: Arc<SqliteFormRepository>,
    pub submission: Arc<MockSubmission>,
    pub connectivity: Arc<MockConnectivity>,
}

/// Millisecond-scale backoff so retry scenarios finish quickly
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        max_retry_attempts: 3,
        initial_backoff: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        sweep_interval: Duration::from_secs(3600),
    }
}

pub async fn sqlite_repo() -> Arc<SqliteFormRepository> {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    Arc::new(SqliteFormRepository::new(pool.pool().clone()))
}

pub async fn harness(online: bool, submission: Arc<MockSubmission>, config: EngineConfig) -> Harness {
    let repo = sqlite_repo().await;
    let connectivity = MockConnectivity::new(online);
    let engine = FormSyncEngine::new(
        repo.clone(),
        submission.clone(),
        connectivity.clone(),
        config,
    );
    Harness {
        engine,
        repo,
        submission,
        connectivity,
    }
}

pub fn key(s: &str) -> RecordKey {
    RecordKey::new(s).unwrap()
}

pub fn issue_payload() -> FormPayload {
    FormPayload::new(FormStatus::Issue, "driver-01", "-6.2088", "106.8456")
        .with_reason("flat tire")
        .with_resource_changed(true)
        .with_timestamp(1_700_000_000)
}

pub fn accepted_payload() -> FormPayload {
    FormPayload::new(FormStatus::Accepted, "driver-02", "-6.3000", "106.9000")
}

pub fn spb(number: &str, driver: &str, status: &str) -> SpbDocument {
    SpbDocument {
        spb_number: number.to_string(),
        vendor_code: "V01".to_string(),
        driver_name: driver.to_string(),
        vehicle_number: "B 1234 XY".to_string(),
        destination: "Cikarang".to_string(),
        status: status.to_string(),
        issued_at: 1_700_000_000,
    }
}

/// Polls `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
