//! Live-block bitmap computation
//!
//! Sums per-term quantized block upper bounds (u8) into saturating u16 lanes
//! and emits one bit per block: set iff the summed bound reaches the
//! threshold, meaning the block may still contribute to the top k. Dead
//! blocks can be skipped without decoding.
//!
//! The scalar reference and the 128-bit / 256-bit vector variants produce
//! identical bit vectors.

use crate::structures::{BitVector, BitVectorBuilder};

/// Compute the live-block bitmap over `scores` (one u8 row per term, equal
/// lengths) against a quantized threshold
#[allow(unreachable_code)]
pub fn compute_live_blocks(scores: &[&[u8]], threshold: u16) -> BitVector {
    if scores.is_empty() {
        return BitVectorBuilder::new().build();
    }
    debug_assert!(scores.iter().all(|row| row.len() == scores[0].len()));

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return unsafe { avx2::compute(scores, threshold) };
        }
        if is_x86_feature_detected!("sse4.1") {
            return unsafe { sse::compute(scores, threshold) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { neon::compute(scores, threshold) };
    }

    scalar(scores, threshold)
}

/// Scalar reference implementation
fn scalar(scores: &[&[u8]], threshold: u16) -> BitVector {
    let num_blocks = scores[0].len();
    let mut builder = BitVectorBuilder::with_capacity(num_blocks);
    for i in 0..num_blocks {
        builder.push(saturating_sum(scores, i) >= threshold);
    }
    builder.build()
}

#[inline]
fn saturating_sum(scores: &[&[u8]], i: usize) -> u16 {
    let mut sum = scores[0][i] as u16;
    for row in &scores[1..] {
        sum = sum.saturating_add(row[i] as u16);
    }
    sum
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod sse {
    use super::*;
    use std::arch::x86_64::*;

    /// Widen 8 bytes at `row[i..]` into u16 lanes
    #[inline]
    #[target_feature(enable = "sse2", enable = "sse4.1")]
    unsafe fn load8(row: &[u8], i: usize) -> __m128i {
        _mm_cvtepu8_epi16(_mm_loadl_epi64(row.as_ptr().add(i) as *const __m128i))
    }

    #[target_feature(enable = "sse2", enable = "sse4.1")]
    pub unsafe fn compute(scores: &[&[u8]], threshold: u16) -> BitVector {
        let num_blocks = scores[0].len();
        let mut builder = BitVectorBuilder::with_capacity(num_blocks);
        let thresholds = _mm_set1_epi16(threshold as i16);

        let mut i = 0;
        while i + 8 <= num_blocks {
            let mut sum = load8(scores[0], i);
            for row in &scores[1..] {
                sum = _mm_adds_epu16(sum, load8(row, i));
            }
            let masks = _mm_cmpeq_epi16(_mm_max_epu16(sum, thresholds), sum);
            let lanes = _mm_shuffle_epi8(
                masks,
                _mm_setr_epi8(0, 2, 4, 6, 8, 10, 12, 14, -1, -1, -1, -1, -1, -1, -1, -1),
            );
            let bits = _mm_movemask_epi8(lanes) as u64;
            builder.append_bits(bits, 8);
            i += 8;
        }

        for i in i..num_blocks {
            builder.push(saturating_sum(scores, i) >= threshold);
        }
        builder.build()
    }
}

#[cfg(target_arch = "x86_64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod avx2 {
    use super::*;
    use std::arch::x86_64::*;

    /// Widen 16 bytes at `row[i..]` into u16 lanes
    #[inline]
    #[target_feature(enable = "avx2")]
    unsafe fn load16(row: &[u8], i: usize) -> __m256i {
        _mm256_cvtepu8_epi16(_mm_loadu_si128(row.as_ptr().add(i) as *const __m128i))
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn compute(scores: &[&[u8]], threshold: u16) -> BitVector {
        let num_blocks = scores[0].len();
        let mut builder = BitVectorBuilder::with_capacity(num_blocks);
        let thresholds = _mm256_set1_epi16(threshold as i16);

        let mut i = 0;
        while i + 16 <= num_blocks {
            let mut sum = load16(scores[0], i);
            for row in &scores[1..] {
                sum = _mm256_adds_epu16(sum, load16(row, i));
            }
            let masks = _mm256_cmpeq_epi16(_mm256_max_epu16(sum, thresholds), sum);
            let packed = _mm_packs_epi16(
                _mm256_extracti128_si256(masks, 0),
                _mm256_extracti128_si256(masks, 1),
            );
            let bits = _mm_movemask_epi8(packed) as u64;
            builder.append_bits(bits, 16);
            i += 16;
        }

        for i in i..num_blocks {
            builder.push(saturating_sum(scores, i) >= threshold);
        }
        builder.build()
    }
}

#[cfg(target_arch = "aarch64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod neon {
    use super::*;
    use std::arch::aarch64::*;

    #[target_feature(enable = "neon")]
    pub unsafe fn compute(scores: &[&[u8]], threshold: u16) -> BitVector {
        let num_blocks = scores[0].len();
        let mut builder = BitVectorBuilder::with_capacity(num_blocks);
        let thresholds = vdupq_n_u16(threshold);

        let mut i = 0;
        while i + 8 <= num_blocks {
            let mut sum = vmovl_u8(vld1_u8(scores[0].as_ptr().add(i)));
            for row in &scores[1..] {
                sum = vqaddq_u16(sum, vmovl_u8(vld1_u8(row.as_ptr().add(i))));
            }
            let mask = vcgeq_u16(sum, thresholds);
            let mut lanes = [0u8; 8];
            vst1_u8(lanes.as_mut_ptr(), vmovn_u16(mask));
            let mut bits = 0u64;
            for (lane, byte) in lanes.iter().enumerate() {
                bits |= ((*byte != 0) as u64) << lane;
            }
            builder.append_bits(bits, 8);
            i += 8;
        }

        for i in i..num_blocks {
            builder.push(saturating_sum(scores, i) >= threshold);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[Vec<u8>]) -> Vec<&[u8]> {
        data.iter().map(|row| row.as_slice()).collect()
    }

    #[test]
    fn test_threshold_splits_blocks() {
        let data = vec![vec![200u8, 200, 200, 200], vec![100u8, 100, 100, 100]];
        let live = compute_live_blocks(&rows(&data), 255);
        assert_eq!(live.len(), 4);
        assert_eq!(live.count_ones(), 4);

        let dead = compute_live_blocks(&rows(&data), 301);
        assert_eq!(dead.count_ones(), 0);
    }

    #[test]
    fn test_single_term() {
        let data = vec![vec![0u8, 10, 255, 9]];
        let live = compute_live_blocks(&rows(&data), 10);
        assert!(!live.get(0));
        assert!(live.get(1));
        assert!(live.get(2));
        assert!(!live.get(3));
    }

    #[test]
    fn test_sums_saturate() {
        // 260 terms of 255 would overflow u16; the saturated sum stays live
        let data: Vec<Vec<u8>> = (0..260).map(|_| vec![255u8; 3]).collect();
        let live = compute_live_blocks(&rows(&data), u16::MAX);
        assert_eq!(live.count_ones(), 3);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(compute_live_blocks(&[], 10).is_empty());
        let data = vec![Vec::<u8>::new()];
        assert!(compute_live_blocks(&rows(&data), 10).is_empty());
    }

    #[test]
    fn test_variants_agree_with_scalar() {
        // Deterministic pseudo-random inputs over lengths straddling the
        // 8- and 16-lane boundaries
        let mut state = 0x243F_6A88u32;
        let mut next = move || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        for num_blocks in [1usize, 7, 8, 9, 15, 16, 17, 33, 64, 100] {
            for num_terms in [1usize, 2, 3, 5] {
                let data: Vec<Vec<u8>> = (0..num_terms)
                    .map(|_| (0..num_blocks).map(|_| next()).collect())
                    .collect();
                for threshold in [0u16, 1, 128, 255, 400, 1000] {
                    let reference = scalar(&rows(&data), threshold);
                    let dispatched = compute_live_blocks(&rows(&data), threshold);
                    assert_eq!(
                        dispatched, reference,
                        "dispatch mismatch: {num_blocks} blocks, {num_terms} terms, t={threshold}"
                    );

                    #[cfg(target_arch = "x86_64")]
                    {
                        if is_x86_feature_detected!("sse4.1") {
                            let vector128 = unsafe { sse::compute(&rows(&data), threshold) };
                            assert_eq!(vector128, reference, "128-bit variant diverged");
                        }
                        if is_x86_feature_detected!("avx2") {
                            let vector256 = unsafe { avx2::compute(&rows(&data), threshold) };
                            assert_eq!(vector256, reference, "256-bit variant diverged");
                        }
                    }
                }
            }
        }
    }
}
