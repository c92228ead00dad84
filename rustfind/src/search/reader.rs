//! Streaming line reader.
//!
//! Bytes are read in fixed-size chunks and decoded incrementally, so memory
//! stays bounded by the per-worker budget no matter how large the file is.
use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};
use std::io::{self, Read};
use std::ops::ControlFlow;
use std::path::Path;
use unicode_categories::UnicodeCategories;

use super::pool::ScratchBuffers;
use crate::cancel::CancellationToken;
use crate::errors::{FindError, FindResult};

/// Largest single read
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Share of an oversized line kept as overlap for the next segment
const OVERLAP_PERCENT: usize = 60;

/// A line, or a segment of an oversized one, handed to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// 1-based line number; segments of one line share it
    pub number: u64,
    pub text: &'a str,
    /// Leading bytes of `text` already seen in the previous segment
    pub overlap: usize,
    /// Byte offset of `text` within the full trimmed line
    pub start: usize,
    /// More segments of this line follow
    pub partial: bool,
}

/// Where a delivered piece of text sits within its line
#[derive(Debug, Clone, Copy)]
struct Piece {
    number: u64,
    overlap: usize,
    /// Bytes of the line already dropped from the head buffer
    dropped: usize,
    partial: bool,
}

/// Format and control characters that never take part in matching
fn is_invisible(c: char) -> bool {
    c == '\u{1b}' || c == '\u{7}' || c.is_other_format()
}

/// Rounds `index` up to the next char boundary
fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index.min(text.len())
}

pub struct LineReader<'s> {
    scratch: &'s mut ScratchBuffers,
    decoder: Decoder,
    budget: usize,
    line_number: u64,
    overlap: usize,
    dropped: usize,
    /// Leading whitespace trimmed from the current line's first segment
    lead: usize,
    pending_cr: bool,
    bytes_read: u64,
}

impl<'s> LineReader<'s> {
    /// `encoding` defaults to UTF-8; a byte order mark always wins
    pub fn new(scratch: &'s mut ScratchBuffers, encoding: Option<&'static Encoding>, budget: usize) -> Self {
        Self {
            scratch,
            decoder: encoding.unwrap_or(UTF_8).new_decoder(),
            budget: budget.max(16),
            line_number: 0,
            overlap: 0,
            dropped: 0,
            lead: 0,
            pending_cr: false,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Reads `source` to the end (or until `on_line` breaks) and returns the
    /// number of bytes consumed. `path` only labels errors.
    pub fn for_each_line<R, F>(
        &mut self,
        mut source: R,
        path: &Path,
        cancel: &CancellationToken,
        mut on_line: F,
    ) -> FindResult<u64>
    where
        R: Read,
        F: FnMut(Line<'_>) -> ControlFlow<()>,
    {
        let chunk = CHUNK_SIZE.min(self.budget);
        self.scratch.bytes.resize(chunk, 0);

        loop {
            cancel.check()?;
            let read = match source.read(&mut self.scratch.bytes[..chunk]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FindError::io(path, e)),
            };
            self.bytes_read += read as u64;
            let last = read == 0;

            self.decode(read, last);
            if self.split_lines(&mut on_line).is_break() {
                return Ok(self.bytes_read);
            }

            if last {
                let piece = Piece {
                    number: self.line_number + 1,
                    overlap: self.overlap,
                    dropped: self.dropped,
                    partial: false,
                };
                let ScratchBuffers { head, .. } = &mut *self.scratch;
                if !head.is_empty() {
                    self.line_number += 1;
                    let _ = deliver(head, piece, &mut self.lead, &mut on_line);
                    head.clear();
                }
                return Ok(self.bytes_read);
            }
        }
    }

    fn decode(&mut self, read: usize, last: bool) {
        let ScratchBuffers { bytes, decoded, .. } = &mut *self.scratch;
        decoded.clear();
        let mut src = &bytes[..read];
        decoded.reserve(
            self.decoder
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len() * 3 + 16),
        );
        loop {
            let (result, consumed, _had_errors) = self.decoder.decode_to_string(src, decoded, last);
            src = &src[consumed..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => decoded.reserve(src.len() * 3 + 16),
            }
        }
        decoded.retain(|c| !is_invisible(c));
    }

    fn split_lines<F>(&mut self, on_line: &mut F) -> ControlFlow<()>
    where
        F: FnMut(Line<'_>) -> ControlFlow<()>,
    {
        let ScratchBuffers { decoded, head, .. } = &mut *self.scratch;
        let mut rest = decoded.as_str();
        if self.pending_cr && !rest.is_empty() {
            rest = rest.strip_prefix('\n').unwrap_or(rest);
            self.pending_cr = false;
        }

        while let Some(pos) = rest.find(['\r', '\n']) {
            head.push_str(&rest[..pos]);
            self.line_number += 1;
            let piece = Piece {
                number: self.line_number,
                overlap: self.overlap,
                dropped: self.dropped,
                partial: false,
            };
            let flow = deliver(head, piece, &mut self.lead, on_line);
            head.clear();
            self.overlap = 0;
            self.dropped = 0;
            if flow.is_break() {
                return flow;
            }

            let terminator = rest.as_bytes()[pos];
            rest = &rest[pos + 1..];
            if terminator == b'\r' {
                if let Some(after) = rest.strip_prefix('\n') {
                    rest = after;
                } else if rest.is_empty() {
                    self.pending_cr = true;
                }
            }
        }
        head.push_str(rest);

        if head.len() > self.budget {
            // Evaluate the oversized head as a segment and keep its tail so
            // matches straddling the cut are still found.
            let piece = Piece {
                number: self.line_number + 1,
                overlap: self.overlap,
                dropped: self.dropped,
                partial: true,
            };
            let flow = deliver(head, piece, &mut self.lead, on_line);
            if flow.is_break() {
                return flow;
            }
            let keep = head.len() * OVERLAP_PERCENT / 100;
            let cut = ceil_char_boundary(head, head.len() - keep);
            head.drain(..cut);
            self.overlap = head.len();
            self.dropped += cut;
        }
        ControlFlow::Continue(())
    }
}

fn deliver<F>(text: &str, piece: Piece, lead: &mut usize, on_line: &mut F) -> ControlFlow<()>
where
    F: FnMut(Line<'_>) -> ControlFlow<()>,
{
    // Later segments keep their leading bytes so overlap and start stay exact
    let text = if piece.dropped == 0 {
        let trimmed = text.trim_start();
        *lead = text.len() - trimmed.len();
        trimmed.trim_end()
    } else {
        text.trim_end()
    };
    // Blank lines are skipped, but the last segment of a long line always
    // arrives so the line gets closed
    if text.is_empty() && piece.dropped == 0 {
        return ControlFlow::Continue(());
    }
    on_line(Line {
        number: piece.number,
        text,
        overlap: piece.overlap.min(text.len()),
        start: piece.dropped.saturating_sub(*lead),
        partial: piece.partial,
    })
}

/// Resolves an encoding label such as `utf-16le` or `windows-1252`
pub fn encoding_for_label(label: &str) -> FindResult<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| FindError::UnknownEncoding(label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lines_of(bytes: &[u8], encoding: Option<&'static Encoding>, budget: usize) -> Vec<(u64, String, usize)> {
        let mut scratch = ScratchBuffers::default();
        let mut reader = LineReader::new(&mut scratch, encoding, budget);
        let mut out = Vec::new();
        reader
            .for_each_line(Cursor::new(bytes.to_vec()), Path::new("t"), &CancellationToken::new(), |line| {
                out.push((line.number, line.text.to_string(), line.overlap));
                ControlFlow::Continue(())
            })
            .unwrap();
        out
    }

    fn texts(bytes: &[u8]) -> Vec<(u64, String)> {
        lines_of(bytes, None, 1 << 20)
            .into_iter()
            .map(|(n, t, _)| (n, t))
            .collect()
    }

    #[test]
    fn test_line_endings() {
        assert_eq!(
            texts(b"one\r\ntwo\rthree\nfour"),
            vec![
                (1, "one".to_string()),
                (2, "two".to_string()),
                (3, "three".to_string()),
                (4, "four".to_string())
            ]
        );
    }

    #[test]
    fn test_empty_lines_advance_counter() {
        assert_eq!(
            texts(b"a\n\n   \nb\n"),
            vec![(1, "a".to_string()), (4, "b".to_string())]
        );
    }

    #[test]
    fn test_lines_are_trimmed_and_cleaned() {
        assert_eq!(
            texts("  \u{1b}[1mbold\u{7} \u{200b}text  \n".as_bytes()),
            vec![(1, "[1mbold text".to_string())]
        );
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        // Budget 16 makes the chunk size 16: the CR ends one chunk, the LF starts the next
        let data = b"0123456789abcde\r\nnext";
        assert_eq!(data[15], b'\r');
        let out = lines_of(data, None, 16);
        assert_eq!(out[0], (1, "0123456789abcde".to_string(), 0));
        assert_eq!(out[1], (2, "next".to_string(), 0));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_utf16_bom_is_honored() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "héllo\nwörld".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(
            texts(&bytes),
            vec![(1, "héllo".to_string()), (2, "wörld".to_string())]
        );
    }

    #[test]
    fn test_explicit_encoding() {
        let latin1 = [b'c', b'a', b'f', 0xE9];
        let out = lines_of(&latin1, Some(encoding_for_label("windows-1252").unwrap()), 1024);
        assert_eq!(out[0].1, "café");
        assert!(matches!(
            encoding_for_label("klingon"),
            Err(FindError::UnknownEncoding(_))
        ));
    }

    #[test]
    fn test_oversized_line_is_segmented_with_overlap() {
        let line = "x".repeat(100) + "needle" + &"y".repeat(100);
        let out = lines_of(line.as_bytes(), None, 64);
        assert!(out.len() > 1);
        assert!(out.iter().all(|(n, _, _)| *n == 1));
        assert!(out.iter().any(|(_, t, _)| t.contains("needle")));
        assert!(out.iter().skip(1).all(|(_, _, overlap)| *overlap > 0));
    }

    #[test]
    fn test_segments_report_their_start() {
        let line = "  ".to_string() + "needle" + &"x".repeat(100) + "needle" + &"y".repeat(100) + "\n";
        let mut scratch = ScratchBuffers::default();
        let mut reader = LineReader::new(&mut scratch, None, 64);
        let mut segments = Vec::new();
        reader
            .for_each_line(Cursor::new(line.into_bytes()), Path::new("t"), &CancellationToken::new(), |line| {
                segments.push((line.start, line.partial, line.text.to_string()));
                ControlFlow::Continue(())
            })
            .unwrap();

        let full = "needle".to_string() + &"x".repeat(100) + "needle" + &"y".repeat(100);
        assert!(segments.len() > 1);
        assert_eq!(segments[0].0, 0);
        assert!(segments[..segments.len() - 1].iter().all(|(_, partial, _)| *partial));
        assert!(!segments[segments.len() - 1].1);
        for (start, _, text) in &segments {
            assert_eq!(&full[*start..*start + text.len()], text);
        }
    }

    #[test]
    fn test_break_stops_reading() {
        let mut scratch = ScratchBuffers::default();
        let mut reader = LineReader::new(&mut scratch, None, 1024);
        let mut seen = 0;
        reader
            .for_each_line(Cursor::new(b"a\nb\nc\n".to_vec()), Path::new("t"), &CancellationToken::new(), |_| {
                seen += 1;
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_cancelled_read_fails() {
        let token = CancellationToken::new();
        token.cancel();
        let mut scratch = ScratchBuffers::default();
        let mut reader = LineReader::new(&mut scratch, None, 1024);
        let err = reader
            .for_each_line(Cursor::new(b"a".to_vec()), Path::new("t"), &token, |_| ControlFlow::Continue(()))
            .unwrap_err();
        assert!(matches!(err, FindError::Cancelled));
    }
}
