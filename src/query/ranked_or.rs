//! Disjunctive (OR) ranked retrieval
//!
//! Document-at-a-time evaluation: at each step the driver scores the smallest
//! docid any cursor sits on, summing the contributions of every cursor at
//! that document, then offers the pair to the top-k queue. The output equals
//! the exhaustive disjunction over all queried lists.

use crate::structures::BitVector;
use crate::{DocId, Score};

use super::scorer::PostingScorer;
use super::topk::{ScoredDoc, TopKQueue};

pub struct RankedOrQuery {
    topk: TopKQueue,
}

impl RankedOrQuery {
    pub fn new(k: usize) -> Self {
        Self {
            topk: TopKQueue::new(k),
        }
    }

    /// Driver seeded with a threshold hint; no document scoring at or below
    /// the hint is ever emitted
    pub fn with_threshold(k: usize, threshold: Score) -> Self {
        Self {
            topk: TopKQueue::with_threshold(k, threshold),
        }
    }

    /// Evaluate the disjunction of `cursors` up to the sentinel `max_docid`
    pub fn run<S: PostingScorer>(&mut self, cursors: &mut [S], max_docid: DocId) {
        if cursors.is_empty() {
            self.topk.finalize();
            return;
        }
        let mut cur_doc = cursors.iter().map(|c| c.docid()).min().unwrap();
        while cur_doc < max_docid {
            let mut score = 0.0;
            let mut next_doc = max_docid;
            for cursor in cursors.iter_mut() {
                if cursor.docid() == cur_doc {
                    score += cursor.score();
                    cursor.next();
                }
                if cursor.docid() < next_doc {
                    next_doc = cursor.docid();
                }
            }
            self.topk.insert(score, cur_doc);
            cur_doc = next_doc;
        }
        self.topk.finalize();
    }

    /// Evaluate while skipping docid ranges the live-block bitmap rules out
    ///
    /// `live` must be conservative for the queue's seeded threshold (a dead
    /// range cannot contain a document scoring above it); the output then
    /// equals [`run`](Self::run) on the same input.
    pub fn run_live_blocks<S: PostingScorer>(
        &mut self,
        cursors: &mut [S],
        max_docid: DocId,
        live: &BitVector,
        range_size: u32,
    ) {
        if cursors.is_empty() || range_size == 0 {
            self.topk.finalize();
            return;
        }
        let mut cur_doc = cursors.iter().map(|c| c.docid()).min().unwrap();
        while cur_doc < max_docid {
            let range = (cur_doc / range_size) as usize;
            if !live.get(range) {
                let Some(next_range) = live.next_set(range + 1) else {
                    break;
                };
                let target =
                    ((next_range as u64 * range_size as u64).min(max_docid as u64)) as DocId;
                for cursor in cursors.iter_mut() {
                    if cursor.docid() < target {
                        cursor.next_geq(target);
                    }
                }
                cur_doc = cursors.iter().map(|c| c.docid()).min().unwrap();
                continue;
            }

            let mut score = 0.0;
            let mut next_doc = max_docid;
            for cursor in cursors.iter_mut() {
                if cursor.docid() == cur_doc {
                    score += cursor.score();
                    cursor.next();
                }
                if cursor.docid() < next_doc {
                    next_doc = cursor.docid();
                }
            }
            self.topk.insert(score, cur_doc);
            cur_doc = next_doc;
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
