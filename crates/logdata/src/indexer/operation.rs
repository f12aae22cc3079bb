//! Full and partial index operations.
//!
//! Both read the file by path, read-only, in `chunk_size` pieces. Between
//! chunks they report progress and poll the cancellation token. Cancellation
//! yields `Ok(None)`; nothing is written anywhere by these functions, the
//! caller commits the returned data.

use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use super::data::{IndexSnapshot, LineIndex};
use super::scan::LineScanner;
use crate::cancel::CancellationToken;
use crate::config::LogDataConfig;
use crate::decode::TextDecoder;

/// Everything a scan needs besides the file path.
pub struct ScanContext<'a> {
    pub config: &'a LogDataConfig,
    pub decoder: &'a dyn TextDecoder,
    pub cancel: &'a CancellationToken,
    pub progress: &'a dyn Fn(u8),
}

/// Data produced by a partial scan, ready for `IndexingData::add_all`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexDelta {
    pub added_size: u64,
    pub max_line_length: usize,
    pub line_starts: LineIndex,
}

/// Indexes the whole file. A missing file indexes as empty.
pub fn full_index(path: &Path, ctx: &ScanContext<'_>) -> io::Result<Option<IndexSnapshot>> {
    let Some(mut file) = open_if_exists(path)? else {
        (ctx.progress)(100);
        return Ok(Some(IndexSnapshot::default()));
    };
    let size = file.metadata()?.len();

    let mut scanner = LineScanner::new(ctx.decoder, ctx.config.tab_stop);
    let Some(end) = scan_range(&mut file, 0, size, &mut scanner, ctx)? else {
        return Ok(None);
    };
    let output = scanner.finish();

    Ok(Some(IndexSnapshot {
        indexed_size: end,
        max_line_length: output.max_line_length,
        line_index: output.line_starts,
    }))
}

/// Indexes the bytes appended after `prior.indexed_size`.
///
/// When the prior content ends inside an unterminated line, that line is
/// re-read from its recorded start so it is measured whole, and its start is
/// not recorded a second time.
pub fn partial_index(
    path: &Path,
    prior: &IndexSnapshot,
    ctx: &ScanContext<'_>,
) -> io::Result<Option<IndexDelta>> {
    let Some(mut file) = open_if_exists(path)? else {
        (ctx.progress)(100);
        return Ok(Some(IndexDelta::default()));
    };
    let size = file.metadata()?.len();
    if size <= prior.indexed_size {
        (ctx.progress)(100);
        return Ok(Some(IndexDelta::default()));
    }

    let open_line_start = match prior.line_index.last() {
        Some(&last_start) if !ends_with_newline(&mut file, prior.indexed_size)? => {
            Some(last_start)
        }
        _ => None,
    };
    let (from, mut scanner) = match open_line_start {
        Some(start) => (
            start,
            LineScanner::inside_line(ctx.decoder, ctx.config.tab_stop),
        ),
        None => (
            prior.indexed_size,
            LineScanner::new(ctx.decoder, ctx.config.tab_stop),
        ),
    };

    let Some(end) = scan_range(&mut file, from, size, &mut scanner, ctx)? else {
        return Ok(None);
    };
    let output = scanner.finish();

    Ok(Some(IndexDelta {
        added_size: end.saturating_sub(prior.indexed_size),
        max_line_length: output.max_line_length,
        line_starts: output.line_starts,
    }))
}

/// Scans `[start, end)` and returns the offset actually reached, which is
/// short of `end` if the file shrank during the scan.
fn scan_range(
    file: &mut File,
    start: u64,
    end: u64,
    scanner: &mut LineScanner<'_>,
    ctx: &ScanContext<'_>,
) -> io::Result<Option<u64>> {
    file.seek(SeekFrom::Start(start))?;
    let total = end - start;
    let mut buffer = vec![0u8; ctx.config.chunk_size];
    let mut offset = start;
    let mut last_percent = None;

    while offset < end {
        if ctx.cancel.is_cancelled() {
            return Ok(None);
        }
        let wanted = (end - offset).min(buffer.len() as u64) as usize;
        let read = match file.read(&mut buffer[..wanted]) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        scanner.feed(&buffer[..read], offset);
        offset += read as u64;

        let percent = ((offset - start) * 100 / total) as u8;
        if last_percent != Some(percent) {
            (ctx.progress)(percent);
            last_percent = Some(percent);
        }
    }

    if ctx.cancel.is_cancelled() {
        return Ok(None);
    }
    if last_percent != Some(100) {
        (ctx.progress)(100);
    }
    Ok(Some(offset))
}

fn open_if_exists(path: &Path) -> io::Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

fn ends_with_newline(file: &mut File, size: u64) -> io::Result<bool> {
    if size == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(size - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
