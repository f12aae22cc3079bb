//! Line index data and its mutex-guarded store.

use parking_lot::Mutex;

/// Byte offsets of line starts, in line order.
pub type LineIndex = Vec<u64>;

/// A consistent view of indexed size, max line length and line starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub indexed_size: u64,
    pub max_line_length: usize,
    pub line_index: LineIndex,
}

impl IndexSnapshot {
    pub fn line_count(&self) -> usize {
        self.line_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line_index.is_empty()
    }

    /// Byte range `[start, end)` of `line`, terminator included.
    pub fn line_span(&self, line: usize) -> Option<(u64, u64)> {
        let start = *self.line_index.get(line)?;
        let end = self
            .line_index
            .get(line + 1)
            .copied()
            .unwrap_or(self.indexed_size);
        Some((start, end))
    }

    /// Byte range covering `count` lines from `first`.
    pub fn lines_span(&self, first: usize, count: usize) -> Option<(u64, u64)> {
        let last = first.checked_add(count)?.checked_sub(1)?;
        let (start, _) = self.line_span(first)?;
        let (_, end) = self.line_span(last)?;
        Some((start, end))
    }
}

/// Mutex-protected indexing data shared between the worker and its owner.
///
/// Every operation takes or returns the whole triple so a reader never sees
/// a line index that disagrees with the indexed size.
#[derive(Debug, Default)]
pub struct IndexingData {
    inner: Mutex<IndexSnapshot>,
}

impl IndexingData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all the indexing data.
    pub fn get_all(&self) -> IndexSnapshot {
        self.inner.lock().clone()
    }

    /// Replaces all the indexing data.
    pub fn set_all(&self, snapshot: IndexSnapshot) {
        *self.inner.lock() = snapshot;
    }

    /// Appends to the existing indexing data.
    ///
    /// `line_starts` must all lie at or past the current indexed size.
    pub fn add_all(&self, size: u64, max_line_length: usize, line_starts: &[u64]) {
        let mut data = self.inner.lock();
        debug_assert!(line_starts
            .first()
            .map_or(true, |&first| first >= data.indexed_size));
        data.indexed_size += size;
        data.max_line_length = data.max_line_length.max(max_line_length);
        data.line_index.extend_from_slice(line_starts);
    }

    pub fn clear(&self) {
        *self.inner.lock() = IndexSnapshot::default();
    }

    pub fn indexed_size(&self) -> u64 {
        self.inner.lock().indexed_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(size: u64, max: usize, starts: &[u64]) -> IndexSnapshot {
        IndexSnapshot {
            indexed_size: size,
            max_line_length: max,
            line_index: starts.to_vec(),
        }
    }

    #[test]
    fn set_then_get_returns_same_triple() {
        let data = IndexingData::new();
        data.set_all(snapshot(10, 4, &[0, 5]));
        assert_eq!(data.get_all(), snapshot(10, 4, &[0, 5]));
    }

    #[test]
    fn add_all_extends_and_keeps_max() {
        let data = IndexingData::new();
        data.set_all(snapshot(6, 5, &[0]));
        data.add_all(4, 3, &[6]);
        assert_eq!(data.get_all(), snapshot(10, 5, &[0, 6]));

        data.add_all(12, 11, &[10]);
        assert_eq!(data.get_all(), snapshot(22, 11, &[0, 6, 10]));
    }

    #[test]
    fn clear_resets_everything() {
        let data = IndexingData::new();
        data.set_all(snapshot(3, 2, &[0]));
        data.clear();
        assert_eq!(data.get_all(), IndexSnapshot::default());
        assert_eq!(data.indexed_size(), 0);
    }

    #[test]
    fn line_spans_use_next_start_or_indexed_size() {
        let snap = snapshot(7, 1, &[0, 2, 4, 6]);
        assert_eq!(snap.line_span(0), Some((0, 2)));
        assert_eq!(snap.line_span(3), Some((6, 7)));
        assert_eq!(snap.line_span(4), None);
        assert_eq!(snap.lines_span(1, 2), Some((2, 6)));
        assert_eq!(snap.lines_span(2, 3), None);
        assert_eq!(snap.lines_span(0, 0), None);
    }
}
