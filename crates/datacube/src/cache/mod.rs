//! Cache implementations for decoded chunks.

mod chunk_cache;

pub use chunk_cache::{CacheStats, ChunkCache};
