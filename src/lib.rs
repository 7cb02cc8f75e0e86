//! Basalt - a static, read-optimized inverted index
//!
//! Basalt answers top-k ranked queries over immutable document collections:
//! - Block-compressed posting lists with per-block skip metadata
//! - Elias-Fano endpoint table for O(1) random access into the postings blob
//! - Zero-copy index reader over memory-mapped or heap-backed sources
//! - Disjunctive (OR) and conjunctive (AND) ranked query drivers
//! - Threshold-driven top-k queue with early-termination support
//! - Per-term and per-block score upper bounds for pruning
//! - JSON / colon-format query containers with a streaming reader
//!
//! The index is immutable after build; readers may be shared by reference
//! across threads, while cursors stay confined to one thread.

pub mod error;
pub mod index;
pub mod query;
pub mod structures;
pub mod wand;

// Re-exports from index
pub use index::{
    GlobalParameters, IndexBuilder, InvertedIndex, MemorySource, PostingCursor, StreamBuilder,
};

// Re-exports from structures
pub use structures::{BitVector, BitVectorBuilder, BlockCodec, EndpointTable, encode_endpoints};

// Re-exports from query
pub use query::{
    CollectionStats, PostingScorer, QueryContainer, QueryReader, QueryRequest, RankedAndQuery,
    RankedOrQuery, Ranker, RequestFlags, ResolvedTerm, ScoredCursor, ScoredDoc, Selection,
    TopKQueue, compute_live_blocks, scored_cursors,
};

// Re-exports from wand
pub use wand::WandData;

pub use error::{Error, Result};

pub type DocId = u32;
pub type TermId = u32;
pub type TermFreq = u32;
pub type Score = f32;
