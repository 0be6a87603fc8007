//! End-to-end sync tests
//!
//! Drive `SyncOrchestrator` against a temp SQLite file with Universalis
//! response bodies from `tests/fixtures/`, decoded the same way the real
//! client decodes them.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use marketboard_sync::scrapers::universalis::{
    decode_history, FetchError, HistoryBatch, HistoryQuery, HistorySource,
};
use marketboard_sync::whitelist::parse_tracked_items;
use marketboard_sync::{SaleStore, SyncOptions, SyncOrchestrator, SyncPhase};

fn fixture(name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("missing fixture {}: {}", path.display(), e))
}

/// Serves one body for sample requests and another for full-history requests.
struct FixtureSource {
    sample_body: Vec<u8>,
    history_body: Option<Vec<u8>>,
    queries: Mutex<Vec<HistoryQuery>>,
}

impl FixtureSource {
    fn new(sample: &str, history: Option<&str>) -> Self {
        Self {
            sample_body: fixture(sample),
            history_body: history.map(fixture),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn queries(&self) -> Vec<HistoryQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait::async_trait]
impl HistorySource for FixtureSource {
    async fn fetch_history(&self, query: &HistoryQuery) -> Result<HistoryBatch, FetchError> {
        self.queries.lock().push(query.clone());

        let url = format!("fixture://history/{}", query.region);
        let body = if query.entries == 1 {
            &self.sample_body
        } else {
            self.history_body.as_ref().ok_or_else(|| FetchError::Transport {
                url: url.clone(),
                reason: "404 Not Found".to_string(),
            })?
        };

        decode_history(body).map_err(|e| FetchError::Decode {
            url,
            reason: e.to_string(),
        })
    }
}

fn open_store() -> (tempfile::TempDir, SaleStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SaleStore::open(dir.path().join("marketboard_data.sqlite")).unwrap();
    (dir, store)
}

#[tokio::test]
async fn test_first_and_repeat_sync() {
    let (_dir, store) = open_store();
    {
        let session = store.session().unwrap();
        session.upsert_watermark_if_newer(5333, 1000).unwrap();
    }

    let source = Arc::new(FixtureSource::new(
        "sample_5333_5.json",
        Some("history_5.json"),
    ));
    let sync = SyncOrchestrator::new(source.clone(), store, SyncOptions::default());
    let tracked = parse_tracked_items("# tracked\n5333 # ore\n5\n").unwrap();

    let report = sync.run(&tracked).await.unwrap();

    assert_eq!(report.tracked, 2);
    assert_eq!(report.refreshed, vec![5]);
    // Four entries served, one an exact repeat.
    assert_eq!(report.inserted, 3);
    assert_eq!(report.items[0].fetched, 4);

    let queries = source.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].item_ids, vec![5333, 5]);
    assert_eq!(queries[0].entries, 1);
    assert_eq!(queries[1].item_ids, vec![5]);
    assert_eq!(queries[1].entries, 99_999);

    let session = sync.store().session().unwrap();
    assert_eq!(session.watermark(5).unwrap(), Some(2000));
    assert_eq!(session.count_sales(5).unwrap(), 3);

    let stored = session.sales_for_item(5).unwrap();
    assert_eq!(stored[0].timestamp, 1_700_000_200);
    assert_eq!(stored[0].world_id, 33);
    assert!(stored.iter().all(|s| !s.aggregated && s.identity_hash.len() == 12));
    drop(session);

    let again = sync.run(&tracked).await.unwrap();
    assert!(again.refreshed.is_empty());
    assert_eq!(again.inserted, 0);
    assert_eq!(source.queries().len(), 3);
}

#[tokio::test]
async fn test_failed_history_fetch_aborts_run() {
    let (_dir, store) = open_store();
    let source = Arc::new(FixtureSource::new("sample_5333_5.json", None));
    let sync = SyncOrchestrator::new(source, store, SyncOptions::default());

    let tracked = parse_tracked_items("5\n").unwrap();
    let err = sync.run(&tracked).await.unwrap_err();

    assert_eq!(err.phase(), SyncPhase::HistoryIngest);
    // The watermark advance from detection is already committed.
    let session = sync.store().session().unwrap();
    assert_eq!(session.watermark(5).unwrap(), Some(2000));
    assert_eq!(session.total_sales().unwrap(), 0);
}
