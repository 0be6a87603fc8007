use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::models::{SyncReport, TrackedItemSet};
use crate::scrapers::universalis::HistorySource;
use crate::storage::SaleStore;
use crate::sync::detector::ChangeDetector;
use crate::sync::error::SyncError;
use crate::sync::ingestor::{HistoryIngestor, IngestSummary};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Universalis region, data center or world
    pub region: String,
    /// Keep ingesting other items when one item's history fails
    pub isolate_failures: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            region: "europe".to_string(),
            isolate_failures: false,
        }
    }
}

/// Runs change detection then history ingestion against one store.
///
/// Callers must not run two syncs against the same database at once.
pub struct SyncOrchestrator {
    store: SaleStore,
    detector: ChangeDetector,
    ingestor: HistoryIngestor,
}

impl SyncOrchestrator {
    pub fn new(source: Arc<dyn HistorySource>, store: SaleStore, options: SyncOptions) -> Self {
        let detector = ChangeDetector::new(source.clone(), options.region.as_str());
        let ingestor = HistoryIngestor::new(source, options.region)
            .with_isolated_failures(options.isolate_failures);

        Self {
            store,
            detector,
            ingestor,
        }
    }

    pub fn store(&self) -> &SaleStore {
        &self.store
    }

    /// One full synchronization pass over `tracked`.
    pub async fn run(&self, tracked: &TrackedItemSet) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        info!(tracked = tracked.len(), "🔄 Market board sync starting");

        // Released when this function returns, on every path.
        let mut session = self.store.session().map_err(SyncError::detection_storage)?;

        let refresh = self.detector.detect(&mut session, tracked.as_slice()).await?;

        let summary = if refresh.is_empty() {
            info!("No updates needed");
            IngestSummary::default()
        } else {
            self.ingestor.ingest(&mut session, &refresh).await?
        };

        info!(
            refreshed = refresh.len(),
            inserted = summary.inserted,
            failed = summary.failed.len(),
            "✅ {} total entries added to sale history",
            summary.inserted
        );

        Ok(SyncReport {
            tracked: tracked.len(),
            refreshed: refresh,
            items: summary.items,
            failed_items: summary.failed,
            inserted: summary.inserted,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
