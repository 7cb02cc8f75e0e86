//! Top-k priority queue
//!
//! A bounded min-heap that tracks the entry threshold driving early
//! termination: `would_enter` answers in O(1) whether a score could still
//! make the top k, and the threshold only ever grows while a query runs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{DocId, Score};

/// Relaxation subtracted from hinted thresholds so scores that round to the
/// hint still enter (precomputed per-term bounds lose a few ulps).
const THRESHOLD_EPSILON: f32 = 1e-4;

/// A (docid, score) result pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub docid: DocId,
    pub score: Score,
}

/// Heap entry under min-heap order: the root is the lowest score, with the
/// largest docid first among equal scores so evictions keep smaller docids.
#[derive(Clone, Copy)]
struct HeapEntry {
    score: Score,
    docid: DocId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.docid == other.docid
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.docid.cmp(&other.docid))
    }
}

/// Bounded priority queue keeping the k highest-scored documents
pub struct TopKQueue {
    k: usize,
    threshold: Score,
    heap: BinaryHeap<HeapEntry>,
    results: Vec<ScoredDoc>,
}

impl TopKQueue {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            threshold: 0.0,
            heap: BinaryHeap::with_capacity(k + 1),
            results: Vec::new(),
        }
    }

    /// Queue seeded with an initial threshold hint
    pub fn with_threshold(k: usize, threshold: Score) -> Self {
        let mut queue = Self::new(k);
        queue.set_threshold(threshold);
        queue
    }

    /// Whether `score` would currently enter the top k
    #[inline]
    pub fn would_enter(&self, score: Score) -> bool {
        score > self.threshold
    }

    /// Offer a document; returns whether it was admitted
    pub fn insert(&mut self, score: Score, docid: DocId) -> bool {
        if self.k == 0 || !self.would_enter(score) {
            return false;
        }
        self.heap.push(HeapEntry { score, docid });
        if self.heap.len() <= self.k {
            if self.heap.len() == self.k {
                self.threshold = self.heap.peek().map(|e| e.score).unwrap_or(0.0);
            }
        } else {
            self.heap.pop();
            self.threshold = self.heap.peek().map(|e| e.score).unwrap_or(0.0);
        }
        true
    }

    /// Seed the entry threshold, relaxed by a small epsilon
    pub fn set_threshold(&mut self, threshold: Score) {
        self.threshold = (threshold - THRESHOLD_EPSILON).max(0.0);
    }

    #[inline]
    pub fn threshold(&self) -> Score {
        self.threshold
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Sort the kept entries into the result list
    ///
    /// Results come out in descending score order, ties broken by ascending
    /// docid; entries with non-positive scores are dropped. The threshold
    /// becomes the smallest kept score when the queue filled up, 0 otherwise.
    pub fn finalize(&mut self) {
        self.threshold = if self.heap.len() == self.k {
            self.heap.peek().map(|e| e.score).unwrap_or(0.0)
        } else {
            0.0
        };
        self.results = self
            .heap
            .drain()
            .filter(|e| e.score > 0.0)
            .map(|e| ScoredDoc {
                docid: e.docid,
                score: e.score,
            })
            .collect();
        self.results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.docid.cmp(&b.docid))
        });
    }

    /// Finalized results
    pub fn topk(&self) -> &[ScoredDoc] {
        &self.results
    }

    /// Empty the queue and reset the threshold to 0
    pub fn clear(&mut self) {
        self.heap.clear();
        self.results.clear();
        self.threshold = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_top_k() {
        let mut queue = TopKQueue::new(2);
        assert!(queue.insert(5.0, 0));
        assert!(queue.insert(3.0, 1));
        assert!(queue.insert(4.0, 2));
        assert!(!queue.insert(1.0, 3));
        assert!(queue.insert(9.0, 4));
        assert!(queue.len() <= 2);

        queue.finalize();
        let topk = queue.topk();
        assert_eq!(topk.len(), 2);
        assert_eq!((topk[0].score, topk[0].docid), (9.0, 4));
        assert_eq!((topk[1].score, topk[1].docid), (5.0, 0));
        assert_eq!(queue.threshold(), 5.0);
    }

    #[test]
    fn test_threshold_grows_at_capacity() {
        let mut queue = TopKQueue::new(3);
        assert_eq!(queue.threshold(), 0.0);
        queue.insert(1.0, 0);
        queue.insert(2.0, 1);
        assert_eq!(queue.threshold(), 0.0);
        queue.insert(3.0, 2);
        assert_eq!(queue.threshold(), 1.0);
        queue.insert(5.0, 3);
        assert_eq!(queue.threshold(), 2.0);
        // At capacity the threshold equals the smallest kept score
        assert!(!queue.would_enter(2.0));
        assert!(queue.would_enter(2.5));
    }

    #[test]
    fn test_set_threshold_is_relaxed() {
        let mut queue = TopKQueue::new(10);
        queue.set_threshold(4.0);
        assert!(queue.threshold() < 4.0);
        assert!(queue.threshold() > 3.99);
        // A score equal to the hint still enters
        assert!(queue.insert(4.0, 7));
        // Hints never push the threshold below zero
        queue.set_threshold(0.0);
        assert_eq!(queue.threshold(), 0.0);
    }

    #[test]
    fn test_ties_keep_ascending_docids() {
        let mut queue = TopKQueue::new(2);
        queue.insert(1.0, 5);
        queue.insert(1.0, 2);
        queue.insert(1.0, 9);
        queue.finalize();
        let docids: Vec<DocId> = queue.topk().iter().map(|e| e.docid).collect();
        assert_eq!(docids, vec![2, 5]);
    }

    #[test]
    fn test_finalize_under_capacity() {
        let mut queue = TopKQueue::new(5);
        queue.insert(2.0, 1);
        queue.insert(1.0, 0);
        queue.finalize();
        assert_eq!(queue.threshold(), 0.0);
        assert_eq!(queue.topk().len(), 2);
        assert_eq!(queue.topk()[0].docid, 1);
    }

    #[test]
    fn test_clear() {
        let mut queue = TopKQueue::new(2);
        queue.insert(5.0, 1);
        queue.insert(6.0, 2);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.threshold(), 0.0);
        assert!(queue.would_enter(0.1));
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut queue = TopKQueue::new(0);
        assert!(!queue.insert(10.0, 0));
        queue.finalize();
        assert!(queue.topk().is_empty());
    }
}
