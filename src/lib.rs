//! Marketboard Sync Library
//!
//! Keeps a local SQLite copy of Universalis sale history for a fixed set of
//! tracked items, downloading full history only for items with new uploads.

pub mod api;
pub mod models;
pub mod scrapers;
pub mod storage;
pub mod sync;
pub mod whitelist;

pub use models::{ItemId, SaleRecord, SyncReport, TrackedItemSet, Watermark};
pub use storage::{SaleStore, StoreSession};
pub use sync::{SyncError, SyncOptions, SyncOrchestrator, SyncPhase};
