//! Bundle/chunk tracker
//!
//! Records which named chunks have been loaded over the life of the process.
//! The tracker is constructed once at startup and passed to whoever loads
//! chunks; there is no reset.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Rough size attributed to each chunk, in kilobytes
pub const DEFAULT_CHUNK_SIZE_KB: u64 = 50;

/// Snapshot of loaded chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleMetrics {
    /// Chunk names in first-load order
    pub loaded_chunks: Vec<String>,
    pub total_chunks: usize,
    pub estimated_size_kb: u64,
}

#[derive(Default)]
struct ChunkSet {
    order: Vec<String>,
    names: HashSet<String>,
}

/// Append-only set of loaded chunk names
pub struct ChunkTracker {
    chunks: Mutex<ChunkSet>,
    chunk_size_kb: u64,
    verbose: bool,
}

impl ChunkTracker {
    pub fn new(verbose: bool) -> Self {
        Self::with_chunk_size(verbose, DEFAULT_CHUNK_SIZE_KB)
    }

    pub fn with_chunk_size(verbose: bool, chunk_size_kb: u64) -> Self {
        Self {
            chunks: Mutex::new(ChunkSet::default()),
            chunk_size_kb,
            verbose,
        }
    }

    fn chunks(&self) -> MutexGuard<'_, ChunkSet> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a loaded chunk. Returns `false` if it was already recorded.
    pub fn record_load(&self, chunk_name: impl Into<String>) -> bool {
        let chunk_name = chunk_name.into();
        let mut chunks = self.chunks();
        let inserted = chunks.names.insert(chunk_name.clone());
        if inserted {
            chunks.order.push(chunk_name.clone());
        }
        let total = chunks.order.len();
        drop(chunks);

        if self.verbose {
            debug!(chunk = %chunk_name, total_chunks = total, "Chunk loaded");
        }
        inserted
    }

    pub fn contains(&self, chunk_name: &str) -> bool {
        self.chunks().names.contains(chunk_name)
    }

    pub fn metrics(&self) -> BundleMetrics {
        let chunks = self.chunks();
        let total_chunks = chunks.order.len();
        BundleMetrics {
            loaded_chunks: chunks.order.clone(),
            total_chunks,
            estimated_size_kb: total_chunks as u64 * self.chunk_size_kb,
        }
    }
}

impl Default for ChunkTracker {
    fn default() -> Self {
        Self::new(false)
    }
}
