//! Market board synchronization
//!
//! Two phases per run:
//! 1. [`ChangeDetector`] samples the newest sale of every tracked item in one
//!    request and advances per-item watermarks; items whose watermark moved
//!    form the refresh set.
//! 2. [`HistoryIngestor`] pulls full history for the refresh set only and
//!    inserts sales not already stored, keyed by [`sale_identity`].

pub mod detector;
pub mod error;
pub mod formatter;
pub mod identity;
pub mod ingestor;
pub mod orchestrator;

pub use detector::ChangeDetector;
pub use error::{SyncError, SyncPhase};
pub use formatter::format_sale_entries;
pub use identity::{sale_identity, IDENTITY_HASH_LEN};
pub use ingestor::{HistoryIngestor, IngestSummary};
pub use orchestrator::{SyncOptions, SyncOrchestrator};
