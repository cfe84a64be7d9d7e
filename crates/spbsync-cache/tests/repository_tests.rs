//! Integration tests for the form repositories and the SPB cache
//!
//! The SQLite repository runs against an in-memory database; the legacy
//! repository runs against an in-memory key-value store. Each test
//! creates fresh storage to ensure isolation.

use std::sync::Arc;

use spbsync_cache::{DatabasePool, JsonKvStore, KvFormRepository, SqliteFormRepository, SqliteSpbCache};
use spbsync_core::domain::{
    FetchScope, FormDraft, FormPayload, FormStatus, RecordKey, SpbDocument,
};
use spbsync_core::ports::{IFormRepository, IKeyValueStore, ISpbCache};

// ============================================================================
// Test helpers
// ============================================================================

/// Create a fresh in-memory SQLite repository
async fn setup() -> SqliteFormRepository {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteFormRepository::new(pool.pool().clone())
}

fn setup_kv() -> (Arc<JsonKvStore>, KvFormRepository) {
    let store = Arc::new(JsonKvStore::in_memory());
    let repo = KvFormRepository::new(store.clone());
    (store, repo)
}

fn key(s: &str) -> RecordKey {
    RecordKey::new(s).unwrap()
}

fn issue_draft(k: &str) -> FormDraft {
    let payload = FormPayload::new(FormStatus::Issue, "driver-01", "-6.2088", "106.8456")
        .with_reason("flat tire")
        .with_resource_changed(true)
        .with_timestamp(1_700_000_000);
    FormDraft::new(k, payload).unwrap()
}

fn accepted_draft(k: &str) -> FormDraft {
    let payload = FormPayload::new(FormStatus::Accepted, "driver-02", "-6.3", "106.9");
    FormDraft::new(k, payload).unwrap()
}

// ============================================================================
// Scenarios shared by both storage generations
// ============================================================================

async fn check_save_and_get(repo: &dyn IFormRepository) {
    let saved = repo.save_draft(issue_draft("SPB-100"), 1_000).await.unwrap();
    assert!(!saved.is_synced());
    assert_eq!(saved.retry_count(), 0);

    let loaded = repo.get(&key("SPB-100")).await.unwrap().expect("record exists");
    assert_eq!(loaded.status(), FormStatus::Issue);
    assert_eq!(loaded.created_by(), "driver-01");
    assert_eq!(loaded.latitude(), "-6.2088");
    assert_eq!(loaded.longitude(), "106.8456");
    assert_eq!(loaded.reason(), Some("flat tire"));
    assert!(loaded.resource_changed());
    assert_eq!(loaded.timestamp(), 1_700_000_000);
    assert_eq!(loaded.created_at(), 1_000);

    assert!(repo.get(&key("SPB-404")).await.unwrap().is_none());
}

async fn check_resave_preserves_retry_metadata(repo: &dyn IFormRepository) {
    repo.save_draft(issue_draft("SPB-1"), 1_000).await.unwrap();
    assert_eq!(
        repo.record_failure(&key("SPB-1"), "HTTP 500", 1_001).await.unwrap(),
        Some(1)
    );
    assert!(repo.mark_synced(&key("SPB-1"), 1_002).await.unwrap());
    repo.record_failure(&key("SPB-1"), "timeout", 1_003).await.unwrap();

    let resaved = repo.save_draft(accepted_draft("SPB-1"), 2_000).await.unwrap();
    assert!(!resaved.is_synced());
    assert_eq!(resaved.retry_count(), 1);
    assert_eq!(resaved.created_at(), 1_000);
    assert_eq!(resaved.updated_at(), 2_000);
    assert_eq!(resaved.status(), FormStatus::Accepted);
    // No explicit timestamp on the second draft: the original one stays
    assert_eq!(resaved.timestamp(), 1_700_000_000);
}

async fn check_queue_queries(repo: &dyn IFormRepository) {
    repo.save_draft(issue_draft("SPB-C"), 30).await.unwrap();
    repo.save_draft(issue_draft("SPB-A"), 10).await.unwrap();
    repo.save_draft(issue_draft("SPB-B"), 20).await.unwrap();
    repo.save_draft(accepted_draft("SPB-D"), 40).await.unwrap();

    repo.mark_synced(&key("SPB-D"), 50).await.unwrap();
    for _ in 0..3 {
        repo.record_failure(&key("SPB-B"), "HTTP 500", 60).await.unwrap();
    }

    let pending: Vec<String> = repo
        .query_pending(3)
        .await
        .unwrap()
        .iter()
        .map(|r| r.record_key().to_string())
        .collect();
    assert_eq!(pending, vec!["SPB-A", "SPB-C"]);

    let failed = repo.query_failed(3).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].record_key().as_str(), "SPB-B");
    assert_eq!(failed[0].last_error(), Some("HTTP 500"));

    let stats = repo.stats(3).await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.synced, 1);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.failed, 1);
    assert!((stats.sync_percentage - 25.0).abs() < f64::EPSILON);

    // A larger budget moves the failed record back to pending
    assert_eq!(repo.query_pending(5).await.unwrap().len(), 3);

    assert_eq!(repo.reset_all_failed(3, 70).await.unwrap(), 1);
    assert!(repo.query_failed(3).await.unwrap().is_empty());
    let b = repo.get(&key("SPB-B")).await.unwrap().unwrap();
    assert_eq!(b.retry_count(), 0);
    assert!(b.last_error().is_none());
}

async fn check_missing_keys(repo: &dyn IFormRepository) {
    let missing = key("SPB-NONE");
    assert!(!repo.mark_synced(&missing, 1).await.unwrap());
    assert_eq!(repo.record_failure(&missing, "x", 1).await.unwrap(), None);
    assert!(!repo.reset_retry(&missing, 1).await.unwrap());
    assert!(!repo.mark_exhausted(&missing, "x", 3, 1).await.unwrap());
    assert_eq!(repo.count().await.unwrap(), 0);
}

async fn check_insert_if_absent_and_delete_all(repo: &dyn IFormRepository) {
    let saved = repo.save_draft(issue_draft("SPB-9"), 5).await.unwrap();
    repo.mark_synced(&key("SPB-9"), 6).await.unwrap();

    // The stored row wins over the stale copy
    assert!(!repo.insert_if_absent(&saved).await.unwrap());
    assert_eq!(repo.count().await.unwrap(), 1);
    let stored = repo.get(&key("SPB-9")).await.unwrap().unwrap();
    assert!(stored.is_synced());

    assert_eq!(repo.delete_all().await.unwrap(), 1);
    assert!(repo.insert_if_absent(&saved).await.unwrap());
    assert_eq!(repo.list_all().await.unwrap()[0], saved);

    repo.save_draft(issue_draft("SPB-10"), 6).await.unwrap();
    assert_eq!(repo.delete_all().await.unwrap(), 2);
    assert_eq!(repo.count().await.unwrap(), 0);
}

async fn check_mark_exhausted(repo: &dyn IFormRepository) {
    repo.save_draft(issue_draft("SPB-X"), 1).await.unwrap();
    repo.record_failure(&key("SPB-X"), "HTTP 500", 2).await.unwrap();

    assert!(repo.mark_exhausted(&key("SPB-X"), "Invalid payload", 3, 3).await.unwrap());
    let stored = repo.get(&key("SPB-X")).await.unwrap().unwrap();
    assert_eq!(stored.retry_count(), 3);
    assert_eq!(stored.last_error(), Some("Invalid payload"));
    assert!(repo.query_pending(3).await.unwrap().is_empty());
    assert_eq!(repo.query_failed(3).await.unwrap().len(), 1);

    // Never lowers a count already past the budget
    repo.record_failure(&key("SPB-X"), "HTTP 500", 4).await.unwrap();
    repo.mark_exhausted(&key("SPB-X"), "Invalid payload", 3, 5).await.unwrap();
    assert_eq!(repo.get(&key("SPB-X")).await.unwrap().unwrap().retry_count(), 4);
}

// ============================================================================
// SQLite repository
// ============================================================================

#[tokio::test]
async fn test_sqlite_save_and_get() {
    check_save_and_get(&setup().await).await;
}

#[tokio::test]
async fn test_sqlite_resave_preserves_retry_metadata() {
    check_resave_preserves_retry_metadata(&setup().await).await;
}

#[tokio::test]
async fn test_sqlite_queue_queries() {
    check_queue_queries(&setup().await).await;
}

#[tokio::test]
async fn test_sqlite_missing_keys() {
    check_missing_keys(&setup().await).await;
}

#[tokio::test]
async fn test_sqlite_insert_if_absent_and_delete_all() {
    check_insert_if_absent_and_delete_all(&setup().await).await;
}

#[tokio::test]
async fn test_sqlite_mark_exhausted() {
    check_mark_exhausted(&setup().await).await;
}

#[tokio::test]
async fn test_sqlite_ensure_schema_is_idempotent() {
    let repo = setup().await;
    repo.save_draft(issue_draft("SPB-1"), 1).await.unwrap();
    repo.ensure_schema().await.unwrap();
    repo.ensure_schema().await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_sqlite_retry_count_monotonic_until_reset() {
    let repo = setup().await;
    repo.save_draft(issue_draft("SPB-1"), 1).await.unwrap();
    let mut last = 0;
    for i in 0..5 {
        let count = repo
            .record_failure(&key("SPB-1"), "HTTP 503", 10 + i)
            .await
            .unwrap()
            .unwrap();
        assert!(count > last);
        last = count;
    }
    assert!(repo.reset_retry(&key("SPB-1"), 20).await.unwrap());
    assert_eq!(repo.get(&key("SPB-1")).await.unwrap().unwrap().retry_count(), 0);
}

// ============================================================================
// Legacy key-value repository
// ============================================================================

#[tokio::test]
async fn test_kv_save_and_get() {
    let (_, repo) = setup_kv();
    check_save_and_get(&repo).await;
}

#[tokio::test]
async fn test_kv_resave_preserves_retry_metadata() {
    let (_, repo) = setup_kv();
    check_resave_preserves_retry_metadata(&repo).await;
}

#[tokio::test]
async fn test_kv_queue_queries() {
    let (_, repo) = setup_kv();
    check_queue_queries(&repo).await;
}

#[tokio::test]
async fn test_kv_missing_keys() {
    let (_, repo) = setup_kv();
    check_missing_keys(&repo).await;
}

#[tokio::test]
async fn test_kv_insert_if_absent_and_delete_all() {
    let (_, repo) = setup_kv();
    check_insert_if_absent_and_delete_all(&repo).await;
}

#[tokio::test]
async fn test_kv_mark_exhausted() {
    let (_, repo) = setup_kv();
    check_mark_exhausted(&repo).await;
}

#[tokio::test]
async fn test_kv_writes_legacy_layout_and_pending_index() {
    let (store, repo) = setup_kv();
    repo.save_draft(issue_draft("SPB-7"), 1).await.unwrap();

    assert!(store.get_string("form_data_SPB-7").await.unwrap().is_some());
    assert_eq!(store.get_bool("is_driver_changed_SPB-7").await.unwrap(), Some(true));
    assert_eq!(
        store.get_string("kendala_text_SPB-7").await.unwrap().as_deref(),
        Some("flat tire")
    );
    assert_eq!(store.get_bool("is_synced_SPB-7").await.unwrap(), Some(false));
    assert_eq!(store.get_int("retry_count_SPB-7").await.unwrap(), Some(0));
    assert_eq!(
        store.get_string_list("pending_forms").await.unwrap(),
        Some(vec!["SPB-7".to_string()])
    );

    repo.mark_synced(&key("SPB-7"), 2).await.unwrap();
    assert_eq!(store.get_bool("is_synced_SPB-7").await.unwrap(), Some(true));
    assert_eq!(
        store.get_string_list("pending_forms").await.unwrap(),
        Some(vec![])
    );
}

#[tokio::test]
async fn test_kv_skips_malformed_entries() {
    let (store, repo) = setup_kv();
    store.set_string("form_data_SPB-BAD", "{oops").await.unwrap();
    repo.save_draft(issue_draft("SPB-OK"), 1).await.unwrap();

    let all = repo.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].record_key().as_str(), "SPB-OK");
    assert!(repo.get(&key("SPB-BAD")).await.unwrap().is_none());
}

// ============================================================================
// SPB document cache
// ============================================================================

fn doc(number: &str, driver: &str) -> SpbDocument {
    SpbDocument {
        spb_number: number.to_string(),
        vendor_code: "V01".to_string(),
        driver_name: driver.to_string(),
        vehicle_number: "B 1234 XY".to_string(),
        destination: "Cikarang".to_string(),
        status: "NEW".to_string(),
        issued_at: 1_700_000_000,
    }
}

#[tokio::test]
async fn test_spb_cache_replace_and_load() {
    let pool = DatabasePool::in_memory().await.unwrap();
    let cache = SqliteSpbCache::new(pool.pool().clone());
    let scope = FetchScope::new("driver-01", "V01");
    let other = FetchScope::new("driver-02", "V01");

    assert!(cache.load(&scope).await.unwrap().is_empty());

    cache
        .replace(&scope, &[doc("SPB-2", "Budi"), doc("SPB-1", "Andi")])
        .await
        .unwrap();
    cache.replace(&other, &[doc("SPB-9", "Citra")]).await.unwrap();

    let loaded = cache.load(&scope).await.unwrap();
    assert_eq!(loaded.len(), 2);
    // Original order is kept
    assert_eq!(loaded[0].spb_number, "SPB-2");
    assert_eq!(loaded[1], doc("SPB-1", "Andi"));

    cache.replace(&scope, &[doc("SPB-3", "Dewi")]).await.unwrap();
    let loaded = cache.load(&scope).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].spb_number, "SPB-3");
    assert_eq!(cache.load(&other).await.unwrap().len(), 1);
}
