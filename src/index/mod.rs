//! On-disk index format, builders and the zero-copy reader

mod builder;
mod format;
mod posting;
mod reader;

pub use builder::{IndexBuilder, StreamBuilder};
pub use format::{FREEZE_FLAGS, GlobalParameters, HEADER_FIXED_BYTES};
pub use posting::{PostingCursor, write_posting_list};
pub use reader::{InvertedIndex, MemorySource};
