pub mod status;

pub use status::{status_router, SharedSyncStatus, SyncStatus};
