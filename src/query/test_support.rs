//! In-memory scored cursor used by driver tests

use crate::{DocId, Score, TermFreq};

use super::scorer::PostingScorer;

pub(crate) struct VecScorer {
    postings: Vec<(DocId, Score)>,
    pos: usize,
    num_docs: DocId,
}

impl VecScorer {
    pub(crate) fn new(postings: Vec<(DocId, Score)>, num_docs: DocId) -> Self {
        Self {
            postings,
            pos: 0,
            num_docs,
        }
    }
}

impl PostingScorer for VecScorer {
    fn docid(&self) -> DocId {
        self.postings
            .get(self.pos)
            .map(|p| p.0)
            .unwrap_or(self.num_docs)
    }

    fn freq(&self) -> TermFreq {
        if self.pos < self.postings.len() { 1 } else { 0 }
    }

    fn score(&self) -> Score {
        self.postings[self.pos].1
    }

    fn next(&mut self) {
        if self.pos < self.postings.len() {
            self.pos += 1;
        }
    }

    fn next_geq(&mut self, target: DocId) {
        while self.pos < self.postings.len() && self.postings[self.pos].0 < target {
            self.pos += 1;
        }
    }

    fn max_score(&self) -> Score {
        self.postings.iter().map(|p| p.1).fold(0.0, f32::max)
    }

    fn block_max_score(&self) -> Score {
        self.max_score()
    }

    fn size(&self) -> usize {
        self.postings.len()
    }
}
