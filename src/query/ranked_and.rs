//! Conjunctive (AND) ranked retrieval
//!
//! Pivots on the shortest posting list: every cursor is advanced to the
//! candidate with `next_geq`, and any disagreement promotes the larger docid
//! to the new candidate. A document is scored only when all cursors agree,
//! so only documents present in every queried list are considered.

use crate::{DocId, Score};

use super::scorer::PostingScorer;
use super::topk::{ScoredDoc, TopKQueue};

pub struct RankedAndQuery {
    topk: TopKQueue,
}

impl RankedAndQuery {
    pub fn new(k: usize) -> Self {
        Self {
            topk: TopKQueue::new(k),
        }
    }

    pub fn with_threshold(k: usize, threshold: Score) -> Self {
        Self {
            topk: TopKQueue::with_threshold(k, threshold),
        }
    }

    /// Evaluate the conjunction of `cursors` up to the sentinel `max_docid`
    pub fn run<S: PostingScorer>(&mut self, cursors: &mut [S], max_docid: DocId) {
        if cursors.is_empty() {
            self.topk.finalize();
            return;
        }
        cursors.sort_by_key(|c| c.size());

        let mut candidate = cursors[0].docid();
        let mut i = 1;
        while candidate < max_docid {
            while i < cursors.len() {
                cursors[i].next_geq(candidate);
                if cursors[i].docid() != candidate {
                    candidate = cursors[i].docid();
                    i = 0;
                    break;
                }
                i += 1;
            }
            if i == cursors.len() {
                let score: Score = cursors.iter().map(|c| c.score()).sum();
                self.topk.insert(score, candidate);
                cursors[0].next();
                candidate = cursors[0].docid();
                i = 1;
            }
        }
        self.topk.finalize();
    }

    /// Results after a run: descending score, ties by ascending docid
    pub fn topk(&self) -> &[ScoredDoc] {
        self.topk.topk()
    }

    pub fn threshold(&self) -> Score {
        self.topk.threshold()
    }

    /// Reset between queries
    pub fn clear(&mut self) {
        self.topk.clear();
    }
}
