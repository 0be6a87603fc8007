use std::fmt;

use crate::models::ItemId;
use crate::scrapers::universalis::FetchError;

/// Which half of a sync run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    ChangeDetection,
    HistoryIngest,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::ChangeDetection => "change_detection",
            SyncPhase::HistoryIngest => "history_ingest",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a sync run.
#[derive(Debug)]
pub enum SyncError {
    /// The remote history source failed (transport or decode).
    Fetch { phase: SyncPhase, source: FetchError },
    /// An item flagged as changed was missing from its full-history response.
    Consistency { item_id: ItemId },
    Storage {
        phase: SyncPhase,
        source: rusqlite::Error,
    },
}

impl SyncError {
    pub fn phase(&self) -> SyncPhase {
        match self {
            Self::Fetch { phase, .. } | Self::Storage { phase, .. } => *phase,
            Self::Consistency { .. } => SyncPhase::HistoryIngest,
        }
    }

    pub(crate) fn detection_fetch(source: FetchError) -> Self {
        Self::Fetch {
            phase: SyncPhase::ChangeDetection,
            source,
        }
    }

    pub(crate) fn ingest_fetch(source: FetchError) -> Self {
        Self::Fetch {
            phase: SyncPhase::HistoryIngest,
            source,
        }
    }

    pub(crate) fn detection_storage(source: rusqlite::Error) -> Self {
        Self::Storage {
            phase: SyncPhase::ChangeDetection,
            source,
        }
    }

    pub(crate) fn ingest_storage(source: rusqlite::Error) -> Self {
        Self::Storage {
            phase: SyncPhase::HistoryIngest,
            source,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch { phase, source } => write!(f, "{} fetch failed: {}", phase, source),
            Self::Consistency { item_id } => write!(
                f,
                "item {} was flagged as changed but is missing from its history response",
                item_id
            ),
            Self::Storage { phase, source } => write!(f, "{} storage error: {}", phase, source),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch { source, .. } => Some(source),
            Self::Storage { source, .. } => Some(source),
            Self::Consistency { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reports_phase() {
        let err = SyncError::detection_fetch(FetchError::Transport {
            url: "https://universalis.app/api/v2/history/europe/5".to_string(),
            reason: "503 Service Unavailable".to_string(),
        });
        assert_eq!(err.phase(), SyncPhase::ChangeDetection);
        assert!(err.to_string().starts_with("change_detection fetch failed"));

        let err = SyncError::Consistency { item_id: 5 };
        assert_eq!(err.phase(), SyncPhase::HistoryIngest);
        assert!(err.to_string().contains("item 5"));
    }
}
