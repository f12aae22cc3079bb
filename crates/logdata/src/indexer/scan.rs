//! Chunked newline scanner.
//!
//! Records the start offset of every line and measures each line's width in
//! columns (tabs expanded). The current line's bytes carry across chunks, so
//! a line split over two reads is measured whole.

use memchr::memchr;

use super::data::LineIndex;
use crate::decode::TextDecoder;

/// Lines found by a scan and the widest of them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanOutput {
    pub line_starts: LineIndex,
    pub max_line_length: usize,
}

#[derive(Debug)]
pub struct LineScanner<'a> {
    decoder: &'a dyn TextDecoder,
    tab_stop: usize,
    at_line_start: bool,
    line: Vec<u8>,
    output: ScanOutput,
}

impl<'a> LineScanner<'a> {
    /// Scanner positioned at the start of a line.
    pub fn new(decoder: &'a dyn TextDecoder, tab_stop: usize) -> Self {
        Self {
            decoder,
            tab_stop,
            at_line_start: true,
            line: Vec::new(),
            output: ScanOutput::default(),
        }
    }

    /// Scanner positioned inside a line whose start is already recorded.
    pub fn inside_line(decoder: &'a dyn TextDecoder, tab_stop: usize) -> Self {
        Self {
            at_line_start: false,
            ..Self::new(decoder, tab_stop)
        }
    }

    /// Feeds the bytes that sit at `base_offset` in the file.
    pub fn feed(&mut self, chunk: &[u8], base_offset: u64) {
        let mut pos = 0;
        while pos < chunk.len() {
            if self.at_line_start {
                self.output.line_starts.push(base_offset + pos as u64);
                self.at_line_start = false;
            }
            match memchr(b'\n', &chunk[pos..]) {
                Some(newline) => {
                    self.line.extend_from_slice(&chunk[pos..pos + newline]);
                    self.end_line(true);
                    pos += newline + 1;
                    self.at_line_start = true;
                }
                None => {
                    self.line.extend_from_slice(&chunk[pos..]);
                    pos = chunk.len();
                }
            }
        }
    }

    pub fn finish(mut self) -> ScanOutput {
        if !self.line.is_empty() {
            self.end_line(false);
        }
        self.output
    }

    fn end_line(&mut self, terminated: bool) {
        // Same bytes the read accessors decode: a carriage return right
        // before the newline belongs to the terminator.
        let mut bytes = self.line.as_slice();
        if terminated {
            bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        }
        let width = self.decoder.line_width(bytes, self.tab_stop);
        self.output.max_line_length = self.output.max_line_length.max(width);
        self.line.clear();
    }
}

/// Strips a trailing `\n` and a `\r` right before it.
pub fn strip_terminator(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Utf8Decoder;

    fn scan(bytes: &[u8], chunk: usize) -> ScanOutput {
        let mut scanner = LineScanner::new(&Utf8Decoder, 8);
        for (i, piece) in bytes.chunks(chunk).enumerate() {
            scanner.feed(piece, (i * chunk) as u64);
        }
        scanner.finish()
    }

    #[test]
    fn empty_input_has_no_lines() {
        assert_eq!(scan(b"", 4), ScanOutput::default());
    }

    #[test]
    fn terminated_lines() {
        let out = scan(b"a\nbb\nccc\n", 64);
        assert_eq!(out.line_starts, vec![0, 2, 5]);
        assert_eq!(out.max_line_length, 3);
    }

    #[test]
    fn unterminated_tail_is_a_line() {
        let out = scan(b"a\nb\nc", 64);
        assert_eq!(out.line_starts, vec![0, 2, 4]);
    }

    #[test]
    fn empty_lines_are_lines() {
        let out = scan(b"\n\nx\n", 64);
        assert_eq!(out.line_starts, vec![0, 1, 2]);
        assert_eq!(out.max_line_length, 1);
    }

    #[test]
    fn chunking_does_not_change_result() {
        let text = b"first line\nsecond\t\tline\r\n\nlast without newline";
        let whole = scan(text, text.len());
        for chunk in 1..text.len() {
            assert_eq!(scan(text, chunk), whole, "chunk size {chunk}");
        }
    }

    #[test]
    fn crlf_terminator_is_not_counted() {
        let out = scan(b"abc\r\nde\r\n", 64);
        assert_eq!(out.line_starts, vec![0, 5]);
        assert_eq!(out.max_line_length, 3);
    }

    #[test]
    fn tabs_and_multibyte_chars_measure_columns() {
        assert_eq!(scan(b"a\tb\n", 64).max_line_length, 9);
        assert_eq!(scan("héllo\n".as_bytes(), 2).max_line_length, 5);
    }

    #[test]
    fn invalid_utf8_measures_like_decoded_text() {
        let out = scan(b"\x80\x80\x80\x80\nab\n", 3);
        assert_eq!(out.max_line_length, 4);
        assert_eq!(
            out.max_line_length,
            Utf8Decoder.decode(b"\x80\x80\x80\x80").chars().count()
        );
    }

    #[test]
    fn resumed_scanner_continues_open_line() {
        let mut scanner = LineScanner::inside_line(&Utf8Decoder, 8);
        scanner.feed(b"abc\nd", 10);
        let out = scanner.finish();
        assert_eq!(out.line_starts, vec![14]);
        assert_eq!(out.max_line_length, 3);
    }

    #[test]
    fn terminator_stripping() {
        assert_eq!(strip_terminator(b"abc\r\n"), b"abc");
        assert_eq!(strip_terminator(b"abc\n"), b"abc");
        assert_eq!(strip_terminator(b"abc"), b"abc");
        assert_eq!(strip_terminator(b"\n"), b"");
    }
}
