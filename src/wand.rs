//! Term and block score upper bounds
//!
//! WAND metadata drives early termination: per-term maxima bound what a term
//! can ever contribute, per-block maxima bound single posting blocks, and the
//! quantized docid-range grid feeds the live-block bitmap so drivers can skip
//! whole ranges without decoding.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use crate::query::{Ranker, compute_live_blocks};
use crate::structures::BitVector;
use crate::{Score, TermId};

/// Default docid-range width of the quantized grid
pub const DEFAULT_RANGE_SIZE: u32 = 128;

/// Per-term quantized upper bounds over a uniform docid-range grid
#[derive(Debug, Clone, PartialEq)]
struct QuantizedGrid {
    range_size: u32,
    num_ranges: usize,
    /// Multiplier mapping scores into 0..=255; quantization rounds up so
    /// quantized sums stay upper bounds.
    scale: f64,
    /// `num_terms * num_ranges` bytes, term-major
    scores: Vec<u8>,
}

/// Score upper-bound metadata for every term in an index
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WandData {
    max_scores: Vec<f32>,
    /// Flattened per-term block maxima; `block_offsets[t]..block_offsets[t+1]`
    block_offsets: Vec<u64>,
    block_scores: Vec<f32>,
    has_block_max: bool,
    quantized: Option<QuantizedGrid>,
}

impl WandData {
    /// Compute term (and optionally per-block) maxima by scoring every posting
    pub fn build(index: &InvertedIndex, ranker: &Ranker, block_max: bool) -> Result<Self> {
        let mut max_scores = Vec::with_capacity(index.size());
        let mut block_offsets = vec![0u64];
        let mut block_scores = Vec::new();

        for i in 0..index.size() {
            let mut cursor = index.get(i)?;
            let scorer = ranker.term_scorer(cursor.size() as u32);
            let num_blocks = cursor.num_blocks();
            let blocks_start = block_scores.len();
            if block_max {
                block_scores.resize(blocks_start + num_blocks, 0.0f32);
            }

            let mut term_max = 0.0f32;
            while cursor.docid() != index.num_docs() {
                let score = scorer.score(cursor.docid(), cursor.freq());
                term_max = term_max.max(score);
                if block_max {
                    let slot = blocks_start + cursor.block_index();
                    block_scores[slot] = block_scores[slot].max(score);
                }
                cursor.next();
            }
            max_scores.push(term_max);
            if block_max {
                block_offsets.push(block_scores.len() as u64);
            }
        }

        Ok(Self {
            max_scores,
            block_offsets,
            block_scores,
            has_block_max: block_max,
            quantized: None,
        })
    }

    /// Add the quantized docid-range grid used by live-block computation
    pub fn quantize(&mut self, index: &InvertedIndex, ranker: &Ranker, range_size: u32) -> Result<()> {
        if range_size == 0 {
            return Err(Error::Precondition("range size must be nonzero".into()));
        }
        let global_max = self.max_scores.iter().copied().fold(0.0f32, f32::max);
        let scale = if global_max > 0.0 {
            255.0 / global_max as f64
        } else {
            0.0
        };
        let num_ranges = (index.num_docs() as usize).div_ceil(range_size as usize);
        let mut scores = vec![0u8; index.size() * num_ranges];

        for i in 0..index.size() {
            let mut cursor = index.get(i)?;
            let scorer = ranker.term_scorer(cursor.size() as u32);
            let row = &mut scores[i * num_ranges..(i + 1) * num_ranges];
            while cursor.docid() != index.num_docs() {
                let score = scorer.score(cursor.docid(), cursor.freq());
                let quant = ((score as f64 * scale).min(255.0).ceil()) as u8;
                let slot = (cursor.docid() / range_size) as usize;
                row[slot] = row[slot].max(quant);
                cursor.next();
            }
        }

        self.quantized = Some(QuantizedGrid {
            range_size,
            num_ranges,
            scale,
            scores,
        });
        Ok(())
    }

    /// Number of terms covered
    pub fn size(&self) -> usize {
        self.max_scores.len()
    }

    /// Term-level upper bound
    #[inline]
    pub fn max_score(&self, term: TermId) -> Score {
        self.max_scores[term as usize]
    }

    /// Per-block upper bounds for `term`, if built with block maxima
    pub fn block_max_scores(&self, term: TermId) -> Option<&[f32]> {
        if !self.has_block_max {
            return None;
        }
        let start = self.block_offsets[term as usize] as usize;
        let end = self.block_offsets[term as usize + 1] as usize;
        Some(&self.block_scores[start..end])
    }

    /// Quantized docid-range bounds for `term`, if quantized
    pub fn quantized_scores(&self, term: TermId) -> Option<&[u8]> {
        self.quantized.as_ref().map(|grid| {
            &grid.scores[term as usize * grid.num_ranges..(term as usize + 1) * grid.num_ranges]
        })
    }

    /// Docid-range width of the quantized grid
    pub fn range_size(&self) -> Option<u32> {
        self.quantized.as_ref().map(|grid| grid.range_size)
    }

    /// Map a score threshold onto the quantized scale, rounding down
    pub fn quantize_threshold(&self, threshold: Score) -> u16 {
        match &self.quantized {
            Some(grid) => (threshold as f64 * grid.scale).floor().clamp(0.0, u16::MAX as f64) as u16,
            None => 0,
        }
    }

    /// Bitmap of docid ranges whose summed upper bounds reach `threshold`
    ///
    /// Returns `None` unless the grid was built. Only terms present in the
    /// grid contribute; the result marks every range some driver may still
    /// need to score.
    pub fn live_blocks(&self, terms: &[TermId], threshold: Score) -> Option<BitVector> {
        let grid = self.quantized.as_ref()?;
        let rows: Vec<&[u8]> = terms
            .iter()
            .filter(|&&t| (t as usize) < self.size())
            .map(|&t| {
                &grid.scores[t as usize * grid.num_ranges..(t as usize + 1) * grid.num_ranges]
            })
            .collect();
        if rows.is_empty() {
            return None;
        }
        Some(compute_live_blocks(&rows, self.quantize_threshold(threshold)))
    }

    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.max_scores.len() as u64)?;
        for &score in &self.max_scores {
            writer.write_f32::<LittleEndian>(score)?;
        }

        writer.write_u8(self.has_block_max as u8)?;
        if self.has_block_max {
            for &offset in &self.block_offsets {
                writer.write_u64::<LittleEndian>(offset)?;
            }
            for &score in &self.block_scores {
                writer.write_f32::<LittleEndian>(score)?;
            }
        }

        writer.write_u8(self.quantized.is_some() as u8)?;
        if let Some(grid) = &self.quantized {
            writer.write_u32::<LittleEndian>(grid.range_size)?;
            writer.write_u64::<LittleEndian>(grid.num_ranges as u64)?;
            writer.write_f64::<LittleEndian>(grid.scale)?;
            writer.write_all(&grid.scores)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self> {
        let num_terms = reader.read_u64::<LittleEndian>()? as usize;
        let mut max_scores = Vec::with_capacity(num_terms);
        for _ in 0..num_terms {
            max_scores.push(reader.read_f32::<LittleEndian>()?);
        }

        let has_block_max = reader.read_u8()? != 0;
        let (block_offsets, block_scores) = if has_block_max {
            let mut offsets = Vec::with_capacity(num_terms + 1);
            for _ in 0..=num_terms {
                offsets.push(reader.read_u64::<LittleEndian>()?);
            }
            let total = *offsets.last().unwrap() as usize;
            let mut scores = Vec::with_capacity(total);
            for _ in 0..total {
                scores.push(reader.read_f32::<LittleEndian>()?);
            }
            (offsets, scores)
        } else {
            (vec![0], Vec::new())
        };

        let quantized = if reader.read_u8()? != 0 {
            let range_size = reader.read_u32::<LittleEndian>()?;
            let num_ranges = reader.read_u64::<LittleEndian>()? as usize;
            let scale = reader.read_f64::<LittleEndian>()?;
            let mut scores = vec![0u8; num_terms * num_ranges];
            reader.read_exact(&mut scores)?;
            Some(QuantizedGrid {
                range_size,
                num_ranges,
                scale,
                scores,
            })
        } else {
            None
        };

        Ok(Self {
            max_scores,
            block_offsets,
            block_scores,
            has_block_max,
            quantized,
        })
    }
}
