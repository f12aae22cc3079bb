//! The coordinator's view of the attached file.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::types::MonitoredFileStatus;

/// Size and modification time of a path; a missing file reads as empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileStat {
    pub fn of(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(metadata) => Self {
                size: metadata.len(),
                modified: metadata.modified().ok(),
            },
            Err(_) => Self::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct AttachedFile {
    pub path: Option<PathBuf>,
    handle: Option<File>,
    pub stat: FileStat,
    pub last_status: Option<MonitoredFileStatus>,
}

impl AttachedFile {
    /// Opens `path` for reading. A missing file is not an error.
    pub fn open(path: PathBuf) -> Self {
        let handle = File::open(&path).ok();
        let stat = FileStat::of(&path);
        Self {
            path: Some(path),
            handle,
            stat,
            last_status: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Reopens the read handle, e.g. after the file was replaced.
    pub fn reopen(&mut self) {
        self.handle = self.path.as_ref().and_then(|path| File::open(path).ok());
    }

    pub fn close(&mut self) {
        self.handle = None;
    }

    /// Installs `handle` unless one is already open.
    pub fn adopt_handle(&mut self, handle: File) {
        if self.handle.is_none() {
            self.handle = Some(handle);
        }
    }

    /// Compares the current state on disk with what was last recorded.
    pub fn classify(&self, current: FileStat) -> MonitoredFileStatus {
        let recorded = self.stat;
        if current.size < recorded.size {
            MonitoredFileStatus::Truncated
        } else if current.size > recorded.size {
            MonitoredFileStatus::DataAdded
        } else if current.size > 0
            && recorded.modified.is_some()
            && current.modified != recorded.modified
        {
            // Same size but rewritten: offsets can no longer be trusted.
            MonitoredFileStatus::Truncated
        } else {
            MonitoredFileStatus::Unchanged
        }
    }

    /// Reads `[start, end)`.
    pub fn read_range(&mut self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "attached file is not open",
            ));
        };
        let mut bytes = vec![0u8; (end - start) as usize];
        handle.seek(SeekFrom::Start(start))?;
        handle.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}
