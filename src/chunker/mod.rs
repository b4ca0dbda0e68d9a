//! Source unit chunking
//!
//! Splits file and issue text into bounded-size chunks on line boundaries,
//! preserving full coverage of the input with a small overlap stride between
//! neighboring chunks. Chunking is deterministic: identical input always
//! yields an identical chunk sequence.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkerError {
    /// The source unit is not decodable text (binary or invalid UTF-8).
    /// Callers skip the unit and continue with the rest of the ingestion.
    #[error("Unsupported content in {origin}: {reason}")]
    UnsupportedContent { origin: String, reason: String },
}

/// Where a chunk came from: a repository file or an issue thread
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum ChunkOrigin {
    File { path: String },
    Issue { id: u64 },
}

impl ChunkOrigin {
    /// Display label used when tagging chunks inside prompts
    pub fn label(&self) -> String {
        match self {
            ChunkOrigin::File { path } => path.clone(),
            ChunkOrigin::Issue { id } => format!("issue #{}", id),
        }
    }
}

impl std::fmt::Display for ChunkOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A contiguous slice of text extracted from one source unit.
///
/// Immutable after creation. `id` is unique within the owning session and
/// doubles as the vector index key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Session-scoped identifier, assigned in insertion order
    pub id: u64,

    /// Originating file path or issue id
    pub origin: ChunkOrigin,

    /// First line of the slice (1-based, inclusive)
    pub start_line: usize,

    /// Last line of the slice (1-based, inclusive)
    pub end_line: usize,

    /// Raw chunk text
    pub text: String,

    /// BLAKE3 hex digest of the text
    pub hash: String,
}

impl Chunk {
    fn new(id: u64, origin: ChunkOrigin, start_line: usize, end_line: usize, text: String) -> Self {
        let hash = blake3::hash(text.as_bytes()).to_hex().to_string();
        Self {
            id,
            origin,
            start_line,
            end_line,
            text,
            hash,
        }
    }

    /// Chunk length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether two chunks cover adjacent or overlapping regions of the
    /// same source unit
    pub fn overlaps(&self, other: &Chunk) -> bool {
        self.origin == other.origin
            && self.start_line <= other.end_line + 1
            && other.start_line <= self.end_line + 1
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in bytes
    pub max_chunk_size: usize,
    /// Pieces smaller than this are merged with the previous piece
    pub min_chunk_size: usize,
    /// Number of trailing lines repeated at the start of the next chunk
    pub overlap_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1600,
            min_chunk_size: 160,
            overlap_lines: 2,
        }
    }
}

/// Line-boundary chunker
///
/// Accumulates whole lines into a buffer until the next line would exceed
/// `max_chunk_size`, then flushes the buffer as a chunk and seeds the next
/// buffer with the last `overlap_lines` lines for search continuity. A single
/// line longer than `max_chunk_size` is hard-split at char boundaries. A
/// trailing piece smaller than `min_chunk_size` is merged into the previous
/// chunk unless it is the only piece.
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Split one source unit into chunks.
    ///
    /// `next_id` is the session-wide id counter; it is advanced by the number
    /// of chunks produced. Empty input yields an empty sequence. Non-UTF-8 or
    /// NUL-bearing input fails with `UnsupportedContent`.
    pub fn chunk(
        &self,
        origin: ChunkOrigin,
        bytes: &[u8],
        next_id: &mut u64,
    ) -> Result<Vec<Chunk>, ChunkerError> {
        let text = std::str::from_utf8(bytes).map_err(|e| ChunkerError::UnsupportedContent {
            origin: origin.label(),
            reason: format!("invalid UTF-8: {}", e),
        })?;

        if text.contains('\0') {
            return Err(ChunkerError::UnsupportedContent {
                origin: origin.label(),
                reason: "binary content (NUL byte)".to_string(),
            });
        }

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let lines: Vec<&str> = text.lines().collect();
        let mut pieces: Vec<(usize, usize, String)> = Vec::new();

        // Line numbers are 1-based
        let mut buf = String::new();
        let mut buf_start = 1usize;
        let mut buf_end = 0usize;

        let mut line_no = 0usize;
        while line_no < lines.len() {
            let line = lines[line_no];
            let display_no = line_no + 1;

            if line.len() > self.config.max_chunk_size {
                // Flush whatever is buffered, then hard-split the long line
                if !buf.is_empty() {
                    pieces.push((buf_start, buf_end, std::mem::take(&mut buf)));
                }
                for part in split_at_char_boundaries(line, self.config.max_chunk_size) {
                    pieces.push((display_no, display_no, part.to_string()));
                }
                buf_start = display_no + 1;
                line_no += 1;
                continue;
            }

            let would_be = if buf.is_empty() {
                line.len()
            } else {
                buf.len() + 1 + line.len()
            };

            if would_be > self.config.max_chunk_size && !buf.is_empty() {
                let flushed_end = buf_end;
                pieces.push((buf_start, flushed_end, std::mem::take(&mut buf)));

                // Seed the next buffer with the overlap stride
                let overlap_from = flushed_end.saturating_sub(self.config.overlap_lines) + 1;
                buf_start = overlap_from.max(buf_start + 1);
                for (i, prev) in lines[buf_start - 1..flushed_end].iter().enumerate() {
                    if i > 0 || !buf.is_empty() {
                        buf.push('\n');
                    }
                    buf.push_str(prev);
                }
                // Fall through without consuming the current line
                continue;
            }

            if !buf.is_empty() {
                buf.push('\n');
            } else {
                buf_start = display_no;
            }
            buf.push_str(line);
            buf_end = display_no;
            line_no += 1;
        }

        if !buf.is_empty() {
            pieces.push((buf_start, buf_end, buf));
        }

        // Merge an undersized trailing piece into its predecessor
        if pieces.len() > 1 {
            let last_len = pieces.last().map(|(_, _, t)| t.len()).unwrap_or(0);
            if last_len < self.config.min_chunk_size {
                let (_, last_end, last_text) = pieces.pop().expect("len checked above");
                let (_, prev_end, prev_text) = pieces.last_mut().expect("len checked above");
                prev_text.push('\n');
                prev_text.push_str(&last_text);
                *prev_end = last_end;
            }
        }

        let mut chunks = Vec::with_capacity(pieces.len());
        for (start, end, piece) in pieces {
            let chunk = Chunk::new(*next_id, origin.clone(), start, end, piece);
            *next_id += 1;
            chunks.push(chunk);
        }

        Ok(chunks)
    }
}

/// Split a string into pieces of at most `max_len` bytes, snapping each cut
/// back to a valid char boundary
fn split_at_char_boundaries(s: &str, max_len: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut remaining = s;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            parts.push(remaining);
            break;
        }
        let mut cut = max_len;
        while cut > 0 && !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single char wider than max_len; take it whole
            cut = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }
        parts.push(&remaining[..cut]);
        remaining = &remaining[cut..];
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, min: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkingConfig {
            max_chunk_size: max,
            min_chunk_size: min,
            overlap_lines: overlap,
        })
    }

    fn file_origin() -> ChunkOrigin {
        ChunkOrigin::File {
            path: "src/main.rs".to_string(),
        }
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let mut next_id = 0;
        let chunks = chunker(100, 10, 0)
            .chunk(file_origin(), b"", &mut next_id)
            .unwrap();
        assert!(chunks.is_empty());
        assert_eq!(next_id, 0);
    }

    #[test]
    fn test_small_input_single_chunk() {
        let mut next_id = 0;
        let chunks = chunker(100, 10, 0)
            .chunk(file_origin(), b"fn main() {}\n", &mut next_id)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 0);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 1);
        assert_eq!(chunks[0].text, "fn main() {}");
        assert_eq!(next_id, 1);
    }

    #[test]
    fn test_splits_on_line_boundaries() {
        let text = "line one is here\nline two is here\nline three is here\n";
        let mut next_id = 0;
        let chunks = chunker(40, 5, 0)
            .chunk(file_origin(), text.as_bytes(), &mut next_id)
            .unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 40);
            // No mid-line splits: every chunk text is made of whole input lines
            for line in c.text.lines() {
                assert!(text.contains(line));
            }
        }
    }

    #[test]
    fn test_full_coverage_without_omission() {
        let text: String = (0..30).map(|i| format!("line number {}\n", i)).collect();
        let mut next_id = 0;
        let chunks = chunker(80, 10, 0)
            .chunk(file_origin(), text.as_bytes(), &mut next_id)
            .unwrap();

        // Every input line appears in some chunk
        for line in text.lines() {
            assert!(
                chunks.iter().any(|c| c.text.lines().any(|l| l == line)),
                "line missing from all chunks: {}",
                line
            );
        }

        // Line ranges tile the file
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks.last().unwrap().end_line, 30);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_line <= pair[0].end_line + 1);
        }
    }

    #[test]
    fn test_overlap_stride_repeats_trailing_lines() {
        let text: String = (0..20).map(|i| format!("alpha beta {}\n", i)).collect();
        let mut next_id = 0;
        let chunks = chunker(60, 10, 2)
            .chunk(file_origin(), text.as_bytes(), &mut next_id)
            .unwrap();
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            // Successor starts inside or immediately after its predecessor
            assert!(pair[1].start_line <= pair[0].end_line + 1);
        }
    }

    #[test]
    fn test_oversized_line_hard_split() {
        let long = "x".repeat(250);
        let mut next_id = 0;
        let chunks = chunker(100, 10, 0)
            .chunk(file_origin(), long.as_bytes(), &mut next_id)
            .unwrap();
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.len() <= 100);
            assert_eq!(c.start_line, 1);
        }
        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined, long);
    }

    #[test]
    fn test_small_trailing_piece_merged() {
        let text = format!("{}\n{}\ntiny\n", "a".repeat(90), "b".repeat(90));
        let mut next_id = 0;
        let chunks = chunker(94, 20, 0)
            .chunk(file_origin(), text.as_bytes(), &mut next_id)
            .unwrap();
        // "tiny" is under min_chunk_size and must not stand alone
        assert_eq!(chunks.len(), 2);
        let last = chunks.last().unwrap();
        assert!(last.text.ends_with("tiny"));
        assert_eq!(last.start_line, 2);
        assert_eq!(last.end_line, 3);
    }

    #[test]
    fn test_binary_content_rejected() {
        let mut next_id = 0;
        let err = chunker(100, 10, 0)
            .chunk(file_origin(), &[0x00, 0x01, 0xff, 0xfe], &mut next_id)
            .unwrap_err();
        assert!(matches!(err, ChunkerError::UnsupportedContent { .. }));
        assert_eq!(next_id, 0);
    }

    #[test]
    fn test_deterministic_and_idempotent() {
        let text: String = (0..40)
            .map(|i| format!("some repeated content line {}\n", i))
            .collect();
        let c = chunker(120, 20, 2);

        let mut id_a = 0;
        let a = c.chunk(file_origin(), text.as_bytes(), &mut id_a).unwrap();
        let mut id_b = 0;
        let b = c.chunk(file_origin(), text.as_bytes(), &mut id_b).unwrap();

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!((x.start_line, x.end_line), (y.start_line, y.end_line));
        }
    }

    #[test]
    fn test_multibyte_utf8_hard_split() {
        let long = "é".repeat(120); // 2 bytes per char
        let mut next_id = 0;
        let chunks = chunker(100, 10, 0)
            .chunk(file_origin(), long.as_bytes(), &mut next_id)
            .unwrap();
        let rejoined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined, long);
        for c in &chunks {
            assert!(c.len() <= 100);
        }
    }

    #[test]
    fn test_overlap_chunks_report_overlapping_ranges() {
        let a = Chunk::new(0, file_origin(), 1, 10, "a".to_string());
        let b = Chunk::new(1, file_origin(), 9, 20, "b".to_string());
        let c = Chunk::new(
            2,
            ChunkOrigin::Issue { id: 7 },
            9,
            20,
            "c".to_string(),
        );
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // different origin
    }
}
