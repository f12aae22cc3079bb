//! Line indexing.
//!
//! - `data` - `IndexSnapshot` and the mutex-guarded `IndexingData` store
//! - `scan` - chunked newline scanner and line measurement
//! - `operation` - full and partial index operations over a file path

mod data;
mod operation;
mod scan;

pub use data::{IndexSnapshot, IndexingData, LineIndex};
pub use operation::{full_index, partial_index, IndexDelta, ScanContext};
pub use scan::{strip_terminator, LineScanner, ScanOutput};
