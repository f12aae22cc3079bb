//! Pluggable line decoding.
//!
//! The indexer works on raw bytes. Turning a line's bytes into text, and
//! measuring how wide that text is on screen, is delegated to a
//! `TextDecoder` so callers can plug in their own encoding detection.

use std::fmt::Debug;

/// Decodes raw line bytes into text.
pub trait TextDecoder: Debug + Send + Sync {
    /// Decodes one line's bytes (terminator already stripped).
    fn decode(&self, bytes: &[u8]) -> String;

    /// Display width of one line's bytes once decoded, tabs expanded.
    ///
    /// The scanner measures `max_line_length` and the read accessors measure
    /// single lines with this, so overrides must agree with `decode`.
    fn line_width(&self, bytes: &[u8], tab_stop: usize) -> usize {
        expanded_width(&self.decode(bytes), tab_stop)
    }
}

/// UTF-8 decoding; invalid sequences become U+FFFD.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Decoder;

impl TextDecoder for Utf8Decoder {
    fn decode(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    fn line_width(&self, bytes: &[u8], tab_stop: usize) -> usize {
        match std::str::from_utf8(bytes) {
            Ok(text) => expanded_width(text, tab_stop),
            Err(_) => expanded_width(&self.decode(bytes), tab_stop),
        }
    }
}

/// ISO-8859-1: every byte maps to the code point of the same value.
#[derive(Debug, Default, Clone, Copy)]
pub struct Latin1Decoder;

impl TextDecoder for Latin1Decoder {
    fn decode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&byte| char::from(byte)).collect()
    }

    fn line_width(&self, bytes: &[u8], tab_stop: usize) -> usize {
        bytes.iter().fold(0, |column, &byte| advance(column, byte == b'\t', tab_stop))
    }
}

/// Replaces tabs with spaces up to the next multiple of `tab_stop`.
pub fn expand_tabs(text: &str, tab_stop: usize) -> String {
    if !text.contains('\t') {
        return text.to_string();
    }
    let mut expanded = String::with_capacity(text.len() + tab_stop);
    let mut column = 0usize;
    for ch in text.chars() {
        if ch == '\t' {
            let spaces = tab_stop - column % tab_stop;
            expanded.extend(std::iter::repeat(' ').take(spaces));
            column += spaces;
        } else {
            expanded.push(ch);
            column += 1;
        }
    }
    expanded
}

/// Number of columns `text` occupies once tabs are expanded.
pub fn expanded_width(text: &str, tab_stop: usize) -> usize {
    text.chars()
        .fold(0, |column, ch| advance(column, ch == '\t', tab_stop))
}

#[inline]
fn advance(column: usize, is_tab: bool, tab_stop: usize) -> usize {
    if is_tab {
        column + tab_stop - column % tab_stop
    } else {
        column + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_lossy_decoding() {
        assert_eq!(Utf8Decoder.decode("héllo".as_bytes()), "héllo");
        assert_eq!(Utf8Decoder.decode(&[b'a', 0xFF]), "a\u{FFFD}");
    }

    #[test]
    fn utf8_width_counts_chars_not_bytes() {
        assert_eq!(Utf8Decoder.line_width("héllo".as_bytes(), 8), 5);
        assert_eq!(Utf8Decoder.line_width(b"a\tb", 8), 9);
    }

    #[test]
    fn utf8_width_counts_replacement_chars() {
        let invalid = b"\x80\x80\x80\x80";
        assert_eq!(Utf8Decoder.line_width(invalid, 8), 4);
        assert_eq!(
            Utf8Decoder.line_width(invalid, 8),
            Utf8Decoder.decode(invalid).chars().count()
        );
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        assert_eq!(Latin1Decoder.decode(&[b'a', 0xE9]), "aé");
        assert_eq!(Latin1Decoder.line_width(&[b'a', 0xE9, b'\t', 0xA9], 4), 5);
    }

    #[test]
    fn tabs_expand_to_next_stop() {
        assert_eq!(expand_tabs("a\tb", 4), "a   b");
        assert_eq!(expand_tabs("\t", 8), "        ");
        assert_eq!(expand_tabs("abcd\te", 4), "abcd    e");
        assert_eq!(expand_tabs("plain", 8), "plain");
    }

    #[test]
    fn width_matches_expansion() {
        for text in ["a\tb", "\t\tx", "abc", "abcdefgh\ti", ""] {
            assert_eq!(expanded_width(text, 8), expand_tabs(text, 8).chars().count());
        }
    }
}
