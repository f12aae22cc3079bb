//! Optional file watching with `notify`.
//!
//! The watcher observes the attached file's parent directory, non-recursively,
//! so it keeps working when the file is deleted and recreated. Notify
//! callbacks only forward events through a crossbeam channel; a dispatch
//! thread drains them and calls `LogData::file_changed_on_disk` once per
//! batch. Only a weak handle is held, so watching never keeps a `LogData`
//! alive.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{LogDataError, Result};
use crate::log_data::{LogData, WeakLogData};

#[derive(Debug)]
enum WatchSignal {
    Changed,
    Error(String),
}

/// Watches the file attached to a `LogData` until dropped.
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    dispatcher: Option<JoinHandle<()>>,
    target: PathBuf,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("target", &self.target)
            .finish()
    }
}

impl FileWatcher {
    /// Starts watching the file currently attached to `log`.
    pub fn watch(log: &LogData) -> Result<Self> {
        let target = log.file_name().ok_or(LogDataError::NotAttached)?;
        let (signal_tx, signal_rx) = unbounded();

        let callback_target = target.clone();
        let mut watcher =
            recommended_watcher(move |event_result: notify::Result<Event>| match event_result {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    if event_targets(&event.paths, &callback_target) {
                        let _ = signal_tx.send(WatchSignal::Changed);
                    }
                }
                Err(error) => {
                    let _ = signal_tx.send(WatchSignal::Error(error.to_string()));
                }
            })
            .map_err(|error| {
                LogDataError::Watch(format!(
                    "failed to create file watcher for {}: {error}",
                    target.display()
                ))
            })?;

        let watch_dir = watch_dir(&target);
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|error| {
                LogDataError::Watch(format!("failed to watch {}: {error}", watch_dir.display()))
            })?;

        let weak = log.downgrade();
        let dispatcher = thread::Builder::new()
            .name("logdata-watch".to_string())
            .spawn(move || dispatch(&signal_rx, &weak))
            .map_err(|error| {
                LogDataError::Watch(format!("failed to spawn watch dispatcher: {error}"))
            })?;

        log::info!(
            "logdata watching path={} dir={}",
            target.display(),
            watch_dir.display()
        );
        Ok(Self {
            watcher: Some(watcher),
            dispatcher: Some(dispatcher),
            target,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        // Dropping the watcher drops the callback's sender, which ends the
        // dispatcher loop.
        self.watcher.take();
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                log::warn!("logdata watch dispatcher panicked");
            }
        }
    }
}

fn dispatch(signals: &Receiver<WatchSignal>, log: &WeakLogData) {
    while let Ok(first) = signals.recv() {
        let mut changed = false;
        for signal in std::iter::once(first).chain(signals.try_iter()) {
            match signal {
                WatchSignal::Changed => changed = true,
                WatchSignal::Error(error) => log::warn!("logdata watch error: {error}"),
            }
        }
        if !changed {
            continue;
        }
        let Some(log) = log.upgrade() else {
            break;
        };
        let status = log.file_changed_on_disk();
        log::debug!("logdata watch event status={}", status.as_str());
    }
    log::debug!("logdata watch dispatcher stopped");
}

fn watch_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether a notify event concerns `target`.
///
/// Only the target's directory is watched, so a matching file name is
/// enough. An event without paths means events were lost and is treated as
/// relevant.
fn event_targets(paths: &[PathBuf], target: &Path) -> bool {
    if paths.is_empty() {
        return true;
    }
    let name = target.file_name();
    paths
        .iter()
        .any(|path| path == target || (name.is_some() && path.file_name() == name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LoadingStatus, LogDataEvent, MonitoredFileStatus};
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn matches_target_by_path_or_name() {
        let target = PathBuf::from("/var/log/app.log");
        assert!(event_targets(&[PathBuf::from("/var/log/app.log")], &target));
        assert!(event_targets(&[PathBuf::from("/private/var/log/app.log")], &target));
        assert!(!event_targets(&[PathBuf::from("/var/log/other.log")], &target));
        assert!(event_targets(&[], &target));
    }

    #[test]
    fn relative_target_watches_current_dir() {
        assert_eq!(watch_dir(Path::new("app.log")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("/var/log/app.log")), PathBuf::from("/var/log"));
    }

    #[test]
    fn unattached_log_cannot_be_watched() {
        let log = LogData::new().unwrap();
        assert!(matches!(
            FileWatcher::watch(&log),
            Err(LogDataError::NotAttached)
        ));
    }

    #[test]
    fn append_is_picked_up() {
        let _ = env_logger::builder().is_test(true).try_init();
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.log");
        fs::write(&path, b"first\n").unwrap();

        let log = LogData::new().unwrap();
        let rx = log.subscribe();
        log.attach_file(&path).unwrap();
        loop {
            if let LogDataEvent::LoadingFinished(status) =
                rx.recv_timeout(Duration::from_secs(10)).unwrap()
            {
                assert_eq!(status, LoadingStatus::Success);
                break;
            }
        }

        let watcher = FileWatcher::watch(&log).unwrap();
        assert_eq!(watcher.target(), path.as_path());

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"second\n").unwrap();
        drop(file);

        let mut saw_data_added = false;
        while !(saw_data_added && log.line_count() == 2) {
            let event = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            if event == LogDataEvent::FileChanged(MonitoredFileStatus::DataAdded) {
                saw_data_added = true;
            }
        }
        assert_eq!(log.line_text(1).unwrap(), "second");
    }
}
