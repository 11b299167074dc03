//! ragidx-vector
//!
//! In-memory exact cosine search over chunk embeddings, persisted as JSON.
pub mod similarity;
pub mod store;

pub use similarity::{cosine_similarity, unit_similarity};
pub use store::VectorStore;
