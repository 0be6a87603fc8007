use chrono::{DateTime, Utc};
use serde::Serialize;

/// Market item identifier as used by the remote API.
pub type ItemId = u32;

/// A single stored sale, keyed by its content-derived identity hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleRecord {
    pub item_id: ItemId,
    pub hq: bool,
    pub price_per_unit: i64,
    pub quantity: i64,
    /// Epoch seconds
    pub timestamp: i64,
    pub world_id: u32,
    pub identity_hash: String,
    /// Reserved for a later aggregation pass; always false on insert.
    pub aggregated: bool,
}

/// Most recent remote `lastUploadTime` seen for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub item_id: ItemId,
    /// Epoch milliseconds
    pub last_upload_time: i64,
}

/// Ordered, duplicate-free list of item ids eligible for synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedItemSet {
    ids: Vec<ItemId>,
}

impl TrackedItemSet {
    /// Build from ids in order; later duplicates are dropped.
    pub fn new(ids: impl IntoIterator<Item = ItemId>) -> Self {
        let mut out: Vec<ItemId> = Vec::new();
        for id in ids {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        Self { ids: out }
    }

    pub fn as_slice(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Per-item ingestion outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemIngest {
    pub item_id: ItemId,
    pub fetched: usize,
    pub inserted: usize,
}

/// An item skipped when failures are isolated per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub error: String,
}

/// Summary of one synchronization run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub tracked: usize,
    pub refreshed: Vec<ItemId>,
    pub items: Vec<ItemIngest>,
    pub failed_items: Vec<ItemFailure>,
    pub inserted: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_items.is_empty()
    }
}
