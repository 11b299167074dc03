//! ragidx-text
//!
//! Lexical (BM25) side of the hybrid index, built on tantivy. `LexicalStore`
//! is the writer; `LexicalView` is the frozen reader a snapshot holds.
pub mod index;
pub mod search;
pub mod tantivy_utils;

pub use index::LexicalStore;
pub use search::LexicalView;
