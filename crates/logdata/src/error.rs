use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LogDataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Already attached to {0}")]
    AlreadyAttached(PathBuf),

    #[error("No file attached")]
    NotAttached,

    #[error("Line {line} out of range (line count {count})")]
    LineOutOfRange { line: usize, count: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Watcher error: {0}")]
    Watch(String),
}

pub type Result<T> = std::result::Result<T, LogDataError>;
