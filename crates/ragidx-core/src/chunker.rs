//! Fixed-size character chunking with overlap.
//!
//! Offsets are character (code point) offsets, never byte offsets, so spans
//! never split a UTF-8 sequence.

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

/// One span of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".into()));
        }
        if overlap >= size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily walk `text` in spans. Calling again restarts from the beginning.
    pub fn spans<'a>(&self, text: &'a str) -> Spans<'a> {
        Spans { text, size: self.size, step: self.size - self.overlap, start_char: 0, start_byte: 0, done: text.is_empty() }
    }

    /// Materialize the spans of one document into chunks with stable ids.
    pub fn chunks(&self, path: &str, text: &str) -> Vec<Chunk> {
        self.spans(text)
            .map(|span| Chunk {
                id: chunk_id(path, span.start, span.text),
                path: path.to_string(),
                text: span.text.to_string(),
                start: span.start,
                end: span.end,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Spans<'a> {
    text: &'a str,
    size: usize,
    step: usize,
    start_char: usize,
    start_byte: usize,
    done: bool,
}

impl<'a> Iterator for Spans<'a> {
    type Item = Span<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let rest = &self.text[self.start_byte..];
        let (end_byte, end_char) = match rest.char_indices().nth(self.size) {
            Some((offset, _)) => (self.start_byte + offset, self.start_char + self.size),
            None => {
                self.done = true;
                (self.text.len(), self.start_char + rest.chars().count())
            }
        };
        let span = Span { start: self.start_char, end: end_char, text: &self.text[self.start_byte..end_byte] };

        if !self.done {
            // `step < size`, so the next start always lies inside this span.
            let advance = rest.char_indices().nth(self.step).map_or(rest.len(), |(offset, _)| offset);
            self.start_byte += advance;
            self.start_char += self.step;
            if self.start_byte >= self.text.len() {
                self.done = true;
            }
        }
        Some(span)
    }
}

impl std::iter::FusedIterator for Spans<'_> {}

/// Blake3 hex digest of `text`.
pub fn hash_content(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Stable chunk id from the owning path, the start offset and the chunk text.
pub fn chunk_id(path: &str, start: usize, text: &str) -> ChunkId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(start as u64).to_le_bytes());
    hasher.update(blake3::hash(text.as_bytes()).as_bytes());
    hasher.finalize().to_hex().as_str()[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_cover(text: &str, size: usize, overlap: usize) {
        let chunker = Chunker::new(size, overlap).expect("valid");
        let spans: Vec<Span<'_>> = chunker.spans(text).collect();
        let len = text.chars().count();
        if len == 0 {
            assert!(spans.is_empty());
            return;
        }
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().map(|s| s.end), Some(len));
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, overlap, "overlap between {:?} and {:?}", pair[0], pair[1]);
            assert_eq!(pair[0].end - pair[0].start, size, "only the last span may be short");
        }
        for span in &spans {
            let expected: String = text.chars().skip(span.start).take(span.end - span.start).collect();
            assert_eq!(span.text, expected);
            assert!(span.end - span.start <= size);
        }
    }

    #[test]
    fn spans_cover_with_exact_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        for (size, overlap) in [(1, 0), (5, 0), (5, 2), (7, 6), (10, 3), (36, 5), (100, 10)] {
            check_cover(text, size, overlap);
        }
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        check_cover("héllo wörld ✓ ünïcode — ok", 4, 1);
        check_cover("日本語のテキストを分割する", 3, 2);
    }

    #[test]
    fn empty_document_has_no_chunks() {
        let chunker = Chunker::new(10, 2).expect("valid");
        assert_eq!(chunker.spans("").count(), 0);
        assert!(chunker.chunks("a.txt", "").is_empty());
    }

    #[test]
    fn short_document_is_one_chunk() {
        let chunker = Chunker::new(100, 0).expect("valid");
        let spans: Vec<_> = chunker.spans("the quick brown fox").collect();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (0, 19));
    }

    #[test]
    fn exact_multiple_does_not_emit_trailing_overlap_span() {
        let chunker = Chunker::new(4, 2).expect("valid");
        let spans: Vec<(usize, usize)> = chunker.spans("abcdefgh").map(|s| (s.start, s.end)).collect();
        assert_eq!(spans, vec![(0, 4), (2, 6), (4, 8)]);
    }

    #[test]
    fn spans_are_restartable() {
        let chunker = Chunker::new(3, 1).expect("valid");
        let it = chunker.spans("abcdefg");
        let first: Vec<_> = it.clone().collect();
        let second: Vec<_> = it.collect();
        assert_eq!(first, second);
        assert_eq!(first, chunker.spans("abcdefg").collect::<Vec<_>>());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(Chunker::new(10, 10), Err(Error::InvalidConfig(_))));
        assert!(matches!(Chunker::new(10, 11), Err(Error::InvalidConfig(_))));
        assert!(matches!(Chunker::new(0, 0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn chunk_ids_are_stable_and_position_sensitive() {
        let chunker = Chunker::new(5, 0).expect("valid");
        let a = chunker.chunks("a.txt", "aaaaabbbbb");
        let b = chunker.chunks("a.txt", "aaaaabbbbb");
        assert_eq!(a, b);
        assert_ne!(a[0].id, a[1].id);
        assert_ne!(chunk_id("a.txt", 0, "x"), chunk_id("b.txt", 0, "x"));
        assert_ne!(chunk_id("a.txt", 0, "x"), chunk_id("a.txt", 1, "x"));
    }
}
