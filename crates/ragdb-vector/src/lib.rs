//! Lance-backed persistent vector index.
//!
//! One dataset directory holds three tables: the chunk table (one row per
//! indexed chunk, with its embedding), the embedding cache, and a key/value
//! meta table carrying the insertion-ordinal counter and the recorded
//! embedding dimension.

pub mod cache;
pub mod schema;
pub mod store;
pub mod table;

pub use store::LanceVectorStore;
