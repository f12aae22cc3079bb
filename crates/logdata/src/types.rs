//! Status and notification types shared by the worker and the coordinator.

use serde::{Deserialize, Serialize};

/// Outcome of a loading/indexing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingStatus {
    Success,
    Interrupted,
    Failure,
}

impl LoadingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Interrupted => "interrupted",
            Self::Failure => "failure",
        }
    }
}

/// How the attached file changed since it was last indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoredFileStatus {
    Unchanged,
    DataAdded,
    Truncated,
}

impl MonitoredFileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::DataAdded => "data_added",
            Self::Truncated => "truncated",
        }
    }
}

/// Notifications pushed to `LogData` subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDataEvent {
    /// Indexing progress of the running operation, 0 to 100.
    LoadingProgressed(u8),
    /// The running operation ended.
    LoadingFinished(LoadingStatus),
    /// The file on disk changed; may be followed by progress and a finish.
    FileChanged(MonitoredFileStatus),
}
