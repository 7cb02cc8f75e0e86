//! Query model, ranking and top-k drivers

mod live_block;
mod ranked_and;
mod ranked_or;
mod reader;
mod request;
mod scorer;
mod topk;

#[cfg(test)]
mod search_tests;
#[cfg(test)]
mod test_support;

pub use live_block::compute_live_blocks;
pub use ranked_and::RankedAndQuery;
pub use ranked_or::RankedOrQuery;
pub use reader::QueryReader;
pub use request::{QueryContainer, QueryRequest, RequestFlags, ResolvedTerm, Selection};
pub use scorer::{
    CollectionStats, PostingScorer, Ranker, RankingModel, ScoredCursor, TermScorer, scored_cursors,
};
pub use topk::{ScoredDoc, TopKQueue};
