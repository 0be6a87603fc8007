use chrono::{SecondsFormat, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::ItemId;
use crate::scrapers::universalis::{HistoryBatch, HistoryQuery, HistorySource, MAX_ITEMS_PER_REQUEST};
use crate::storage::StoreSession;
use crate::sync::error::SyncError;

/// Decides which tracked items have new remote sales since the last run.
pub struct ChangeDetector {
    source: Arc<dyn HistorySource>,
    region: String,
}

impl ChangeDetector {
    pub fn new(source: Arc<dyn HistorySource>, region: impl Into<String>) -> Self {
        Self {
            source,
            region: region.into(),
        }
    }

    /// Sample every tracked item, advance watermarks, and return the items
    /// whose watermark row changed, in tracked order.
    ///
    /// All samples are fetched before any watermark is written, so a failed
    /// request leaves storage untouched. Items missing from the sample count
    /// as uploaded at epoch 0.
    pub async fn detect(
        &self,
        session: &mut StoreSession,
        tracked: &[ItemId],
    ) -> Result<Vec<ItemId>, SyncError> {
        if tracked.is_empty() {
            return Ok(Vec::new());
        }

        let mut sample = HistoryBatch::with_capacity(tracked.len());
        for chunk in tracked.chunks(MAX_ITEMS_PER_REQUEST) {
            let query = HistoryQuery::sample(chunk.to_vec(), self.region.as_str());
            let batch = self
                .source
                .fetch_history(&query)
                .await
                .map_err(SyncError::detection_fetch)?;
            sample.extend(batch);
        }

        let mut refresh = Vec::new();
        for &item_id in tracked {
            let last_upload_time = sample.get(&item_id).map_or(0, |h| h.last_upload_time);
            let changed = session
                .upsert_watermark_if_newer(item_id, last_upload_time)
                .map_err(SyncError::detection_storage)?;

            debug!(
                item_id,
                last_upload = %format_upload_time(last_upload_time),
                changed,
                "Checked item for updates"
            );

            if changed {
                refresh.push(item_id);
            }
        }

        info!(
            tracked = tracked.len(),
            changed = refresh.len(),
            "🔎 Change detection complete"
        );

        Ok(refresh)
    }
}

/// Render an epoch-millis upload time as ISO-8601 UTC.
pub fn format_upload_time(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::error::SyncPhase;
    use crate::sync::test_support::{sale, FakeHistorySource};

    fn detector(source: &Arc<FakeHistorySource>) -> ChangeDetector {
        ChangeDetector::new(source.clone(), "europe")
    }

    #[tokio::test]
    async fn test_scenario_only_newer_items_flagged() {
        let source = Arc::new(FakeHistorySource::new());
        source.set_item(5333, 1000, vec![sale("Alyx Rhiannon", 120, 3, 1)]);
        source.set_item(5, 2000, vec![sale("Ser Bob", 9, 99, 2)]);

        let mut session = StoreSession::open_in_memory().unwrap();
        session.upsert_watermark_if_newer(5333, 1000).unwrap();

        let refresh = detector(&source)
            .detect(&mut session, &[5333, 5])
            .await
            .unwrap();

        assert_eq!(refresh, vec![5]);
        assert_eq!(session.watermark(5).unwrap(), Some(2000));
        assert_eq!(session.watermark(5333).unwrap(), Some(1000));

        let queries = source.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].item_ids, vec![5333, 5]);
        assert_eq!(queries[0].entries, 1);
    }

    #[tokio::test]
    async fn test_stale_upload_time_not_flagged() {
        let source = Arc::new(FakeHistorySource::new());
        source.set_item(7, 500, Vec::new());

        let mut session = StoreSession::open_in_memory().unwrap();
        session.upsert_watermark_if_newer(7, 900).unwrap();

        let refresh = detector(&source).detect(&mut session, &[7]).await.unwrap();
        assert!(refresh.is_empty());
        assert_eq!(session.watermark(7).unwrap(), Some(900));
    }

    #[tokio::test]
    async fn test_missing_item_counts_as_epoch() {
        let source = Arc::new(FakeHistorySource::new());
        let mut session = StoreSession::open_in_memory().unwrap();

        let first = detector(&source).detect(&mut session, &[42]).await.unwrap();
        assert_eq!(first, vec![42]);
        assert_eq!(session.watermark(42).unwrap(), Some(0));

        let second = detector(&source).detect(&mut session, &[42]).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_set_follows_tracked_order() {
        let source = Arc::new(FakeHistorySource::new());
        for (id, ts) in [(3, 30), (1, 10), (2, 20)] {
            source.set_item(id, ts, Vec::new());
        }
        let mut session = StoreSession::open_in_memory().unwrap();

        let refresh = detector(&source)
            .detect(&mut session, &[2, 3, 1])
            .await
            .unwrap();
        assert_eq!(refresh, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_large_tracked_set_is_chunked() {
        let source = Arc::new(FakeHistorySource::new());
        let tracked: Vec<ItemId> = (1..=150).collect();
        for &id in &tracked {
            source.set_item(id, 1_000 + id as i64, Vec::new());
        }
        let mut session = StoreSession::open_in_memory().unwrap();

        let refresh = detector(&source)
            .detect(&mut session, &tracked)
            .await
            .unwrap();

        assert_eq!(refresh, tracked);
        let sizes: Vec<usize> = source.queries().iter().map(|q| q.item_ids.len()).collect();
        assert_eq!(sizes, vec![100, 50]);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let source = Arc::new(FakeHistorySource::new());
        source.set_item(5, 2000, Vec::new());
        source.fail_samples();
        let mut session = StoreSession::open_in_memory().unwrap();

        let err = detector(&source)
            .detect(&mut session, &[5])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Fetch { .. }));
        assert_eq!(session.watermark(5).unwrap(), None);
    }

    #[tokio::test]
    async fn test_later_chunk_failure_writes_nothing() {
        let source = Arc::new(FakeHistorySource::new());
        let tracked: Vec<ItemId> = (1..=150).collect();
        for &id in &tracked {
            source.set_item(id, 1_000 + id as i64, Vec::new());
        }
        source.fail_nth_request(2);
        let mut session = StoreSession::open_in_memory().unwrap();

        let err = detector(&source)
            .detect(&mut session, &tracked)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Fetch {
                phase: SyncPhase::ChangeDetection,
                ..
            }
        ));
        assert_eq!(source.sample_queries().len(), 2);
        // The first chunk succeeded, but none of its items were persisted.
        assert!(session.watermarks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_tracked_set_makes_no_request() {
        let source = Arc::new(FakeHistorySource::new());
        let mut session = StoreSession::open_in_memory().unwrap();

        let refresh = detector(&source).detect(&mut session, &[]).await.unwrap();
        assert!(refresh.is_empty());
        assert!(source.queries().is_empty());
    }

    #[test]
    fn test_format_upload_time() {
        assert_eq!(format_upload_time(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_upload_time(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
    }
}
