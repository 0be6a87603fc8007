use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{ItemFailure, ItemId, ItemIngest};
use crate::scrapers::universalis::{HistoryQuery, HistorySource, MAX_ITEMS_PER_REQUEST};
use crate::storage::StoreSession;
use crate::sync::error::SyncError;
use crate::sync::formatter::format_sale_entries;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub items: Vec<ItemIngest>,
    pub failed: Vec<ItemFailure>,
}

/// Pulls full history for changed items and stores sales not seen before.
pub struct HistoryIngestor {
    source: Arc<dyn HistorySource>,
    region: String,
    isolate_failures: bool,
}

impl HistoryIngestor {
    pub fn new(source: Arc<dyn HistorySource>, region: impl Into<String>) -> Self {
        Self {
            source,
            region: region.into(),
            isolate_failures: false,
        }
    }

    /// Record fetch and consistency failures per item instead of aborting.
    pub fn with_isolated_failures(mut self, isolate: bool) -> Self {
        self.isolate_failures = isolate;
        self
    }

    /// Each item's sales are committed in their own transaction, so items
    /// finished before a failure stay stored.
    pub async fn ingest(
        &self,
        session: &mut StoreSession,
        refresh: &[ItemId],
    ) -> Result<IngestSummary, SyncError> {
        let mut summary = IngestSummary::default();

        for chunk in refresh.chunks(MAX_ITEMS_PER_REQUEST) {
            let query = HistoryQuery::full_history(chunk.to_vec(), self.region.as_str());
            let mut batch = match self.source.fetch_history(&query).await {
                Ok(batch) => batch,
                Err(e) if self.isolate_failures => {
                    warn!(items = chunk.len(), error = %e, "⚠️ History fetch failed, skipping items");
                    summary
                        .failed
                        .extend(chunk.iter().map(|&item_id| ItemFailure {
                            item_id,
                            error: e.to_string(),
                        }));
                    continue;
                }
                Err(e) => return Err(SyncError::ingest_fetch(e)),
            };

            for &item_id in chunk {
                let Some(history) = batch.remove(&item_id) else {
                    let err = SyncError::Consistency { item_id };
                    if self.isolate_failures {
                        warn!(item_id, error = %err, "⚠️ Skipping item");
                        summary.failed.push(ItemFailure {
                            item_id,
                            error: err.to_string(),
                        });
                        continue;
                    }
                    return Err(err);
                };

                let records = format_sale_entries(item_id, &history.entries);
                let inserted = session
                    .insert_sales_atomic(&records)
                    .map_err(SyncError::ingest_storage)?;

                info!(
                    item_id,
                    fetched = records.len(),
                    inserted,
                    "Inserted sale history entries"
                );

                summary.inserted += inserted;
                summary.items.push(ItemIngest {
                    item_id,
                    fetched: records.len(),
                    inserted,
                });
            }
        }

        Ok(summary)
    }
}
