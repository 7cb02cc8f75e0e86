//! Ranking plug-ins and scored cursors
//!
//! A [`Ranker`] turns collection statistics into per-term scoring functions;
//! a [`ScoredCursor`] lifts a posting cursor into (docid, score) space and
//! carries the term and block upper bounds the drivers prune with.
//!
//! The index stores no per-document lengths, so length-dependent models
//! normalize against the collection average. Scores are deterministic for
//! fixed statistics and non-negative.

use log::debug;

use crate::error::Result;
use crate::index::{InvertedIndex, PostingCursor};
use crate::query::request::QueryRequest;
use crate::wand::WandData;
use crate::{DocId, Score, TermFreq};

pub const BM25_K1: f32 = 1.2;
pub const BM25_B: f32 = 0.75;
pub const PL2_C: f32 = 1.0;
pub const QLD_MU: f32 = 1000.0;

/// Collection-level statistics the ranking models are parametrized by
#[derive(Debug, Clone, Copy)]
pub struct CollectionStats {
    pub num_docs: u32,
    pub avg_doc_len: f32,
}

impl CollectionStats {
    pub fn new(num_docs: u32, avg_doc_len: f32) -> Self {
        Self {
            num_docs,
            avg_doc_len,
        }
    }
}

/// The closed set of ranking models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingModel {
    Bm25,
    Dph,
    Pl2,
    Qld,
    /// Identity model for quantized indexes: the frequency is the score
    Quantized,
}

/// A ranking model bound to collection statistics
#[derive(Debug, Clone, Copy)]
pub struct Ranker {
    model: RankingModel,
    stats: CollectionStats,
}

impl Ranker {
    pub fn new(model: RankingModel, stats: CollectionStats) -> Self {
        Self { model, stats }
    }

    pub fn bm25(stats: CollectionStats) -> Self {
        Self::new(RankingModel::Bm25, stats)
    }

    pub fn dph(stats: CollectionStats) -> Self {
        Self::new(RankingModel::Dph, stats)
    }

    pub fn pl2(stats: CollectionStats) -> Self {
        Self::new(RankingModel::Pl2, stats)
    }

    pub fn qld(stats: CollectionStats) -> Self {
        Self::new(RankingModel::Qld, stats)
    }

    pub fn quantized() -> Self {
        Self::new(RankingModel::Quantized, CollectionStats::new(0, 0.0))
    }

    /// Scoring function for one term, given its document count
    pub fn term_scorer(&self, doc_count: u32) -> TermScorer {
        let num_docs = self.stats.num_docs.max(1) as f32;
        let doc_count = doc_count.max(1) as f32;
        let idf = ((num_docs - doc_count + 0.5) / (doc_count + 0.5) + 1.0).ln();
        TermScorer {
            model: self.model,
            idf,
            doc_ratio: doc_count / num_docs,
            avg_len: self.stats.avg_doc_len.max(1.0),
        }
    }
}

/// Pure per-term scoring function: `score(docid, freq)`
#[derive(Debug, Clone, Copy)]
pub struct TermScorer {
    model: RankingModel,
    idf: f32,
    /// doc_count / num_docs, a collection-frequency stand-in
    doc_ratio: f32,
    avg_len: f32,
}

impl TermScorer {
    #[inline]
    pub fn score(&self, _docid: DocId, freq: TermFreq) -> Score {
        let tf = freq as f32;
        match self.model {
            RankingModel::Quantized => tf,
            RankingModel::Bm25 => {
                let length_norm = 1.0 - BM25_B + BM25_B * (tf / self.avg_len);
                self.idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * length_norm)
            }
            RankingModel::Dph => {
                let f = tf / (tf + self.avg_len);
                let norm = (1.0 - f) * (1.0 - f) / (tf + 1.0);
                let info = (tf / (self.doc_ratio * self.avg_len)).max(1.0).log2();
                let stirling = (2.0 * std::f32::consts::PI * tf * (1.0 - f)).max(1.0).log2();
                (norm * (tf * info + 0.5 * stirling)).max(0.0)
            }
            RankingModel::Pl2 => {
                let tfn = tf * (1.0 + PL2_C).log2();
                let sum = tfn * tfn.log2()
                    + (self.doc_ratio + 1.0 / (12.0 * tfn) - tfn) * std::f32::consts::LOG2_E
                    + 0.5 * (2.0 * std::f32::consts::PI * tfn).log2();
                (sum / (tfn + 1.0)).max(0.0)
            }
            RankingModel::Qld => {
                let term_prob = (self.doc_ratio / self.avg_len).max(f32::MIN_POSITIVE);
                let likelihood = (1.0 + tf / (QLD_MU * term_prob)).ln();
                let prior = (QLD_MU / (self.avg_len + QLD_MU)).ln();
                (likelihood + prior).max(0.0)
            }
        }
    }
}

/// Capabilities the drivers require from a scored posting stream
pub trait PostingScorer {
    fn docid(&self) -> DocId;
    fn freq(&self) -> TermFreq;
    fn score(&self) -> Score;
    fn next(&mut self);
    fn next_geq(&mut self, target: DocId);
    /// Term-level score upper bound
    fn max_score(&self) -> Score;
    /// Upper bound for the block holding the current posting
    fn block_max_score(&self) -> Score;
    /// Posting list cardinality
    fn size(&self) -> usize;
}

/// A posting cursor paired with a scoring function and upper bounds
pub struct ScoredCursor<'a> {
    cursor: PostingCursor<'a>,
    scorer: TermScorer,
    weight: f32,
    max_score: Score,
    block_maxes: Option<&'a [f32]>,
}

impl<'a> ScoredCursor<'a> {
    pub fn new(
        cursor: PostingCursor<'a>,
        scorer: TermScorer,
        weight: f32,
        max_score: Score,
        block_maxes: Option<&'a [f32]>,
    ) -> Self {
        Self {
            cursor,
            scorer,
            weight,
            max_score: weight * max_score,
            block_maxes,
        }
    }
}

impl PostingScorer for ScoredCursor<'_> {
    #[inline]
    fn docid(&self) -> DocId {
        self.cursor.docid()
    }

    #[inline]
    fn freq(&self) -> TermFreq {
        self.cursor.freq()
    }

    #[inline]
    fn score(&self) -> Score {
        self.weight * self.scorer.score(self.cursor.docid(), self.cursor.freq())
    }

    #[inline]
    fn next(&mut self) {
        self.cursor.next();
    }

    #[inline]
    fn next_geq(&mut self, target: DocId) {
        self.cursor.next_geq(target);
    }

    #[inline]
    fn max_score(&self) -> Score {
        self.max_score
    }

    #[inline]
    fn block_max_score(&self) -> Score {
        match self.block_maxes {
            Some(maxes) => self.weight * maxes[self.cursor.block_index()],
            None => self.max_score,
        }
    }

    #[inline]
    fn size(&self) -> usize {
        self.cursor.size()
    }
}

/// Open one scored cursor per request term
///
/// Terms outside the index are dropped. Upper bounds come from `wand` when
/// provided and are conservative (infinite) otherwise.
pub fn scored_cursors<'a>(
    index: &'a InvertedIndex,
    wand: Option<&'a WandData>,
    ranker: &Ranker,
    request: &QueryRequest,
) -> Result<Vec<ScoredCursor<'a>>> {
    let mut cursors = Vec::with_capacity(request.term_ids().len());
    for (&term, &weight) in request.term_ids().iter().zip(request.term_weights()) {
        if term as usize >= index.size() {
            debug!("dropping term {term} absent from the index");
            continue;
        }
        let cursor = index.get(term as usize)?;
        let scorer = ranker.term_scorer(cursor.size() as u32);
        let (max_score, block_maxes) = match wand {
            Some(wand) => (wand.max_score(term), wand.block_max_scores(term)),
            None => (f32::INFINITY, None),
        };
        cursors.push(ScoredCursor::new(
            cursor, scorer, weight, max_score, block_maxes,
        ));
    }
    Ok(cursors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> CollectionStats {
        CollectionStats::new(10_000, 150.0)
    }

    #[test]
    fn test_quantized_score_is_frequency() {
        let scorer = Ranker::quantized().term_scorer(42);
        assert_eq!(scorer.score(7, 1), 1.0);
        assert_eq!(scorer.score(9, 13), 13.0);
    }

    #[test]
    fn test_scores_non_negative_and_deterministic() {
        for ranker in [
            Ranker::bm25(stats()),
            Ranker::dph(stats()),
            Ranker::pl2(stats()),
            Ranker::qld(stats()),
        ] {
            let scorer = ranker.term_scorer(120);
            for freq in [1u32, 2, 5, 50, 500] {
                let score = scorer.score(3, freq);
                assert!(score >= 0.0, "{ranker:?} produced {score}");
                assert!(score.is_finite());
                assert_eq!(score, scorer.score(3, freq));
            }
        }
    }

    #[test]
    fn test_bm25_monotone_in_freq() {
        let scorer = Ranker::bm25(stats()).term_scorer(120);
        let mut last = 0.0;
        for freq in 1..50 {
            let score = scorer.score(0, freq);
            assert!(score > last);
            last = score;
        }
    }

    #[test]
    fn test_rarer_terms_score_higher() {
        let ranker = Ranker::bm25(stats());
        let rare = ranker.term_scorer(3).score(0, 2);
        let common = ranker.term_scorer(5_000).score(0, 2);
        assert!(rare > common);
    }
}
