//! Asynchronous line indexing for log files.
//!
//! This crate provides the data core of a log viewer:
//! - Background full and partial indexing of line start offsets
//! - Interruptible operations with progress reporting
//! - Random access to line text while indexing continues
//! - Growth and truncation handling, with optional `notify` watching

pub mod cancel;
pub mod config;
pub mod decode;
pub mod error;
pub mod indexer;
pub mod log_data;
pub mod types;
pub mod watcher;
pub mod worker;

// Re-export main types
pub use cancel::CancellationToken;
pub use config::LogDataConfig;
pub use decode::{Latin1Decoder, TextDecoder, Utf8Decoder};
pub use error::{LogDataError, Result};
pub use indexer::{IndexSnapshot, IndexingData, LineIndex};
pub use log_data::{LogData, WeakLogData};
pub use types::{LoadingStatus, LogDataEvent, MonitoredFileStatus};
pub use watcher::FileWatcher;
pub use worker::WorkerState;
