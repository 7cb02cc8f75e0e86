//! Elias-Fano endpoint table
//!
//! Compresses the monotone sequence of posting-list endpoints into a packed
//! low-bits array plus a unary high-bits stream. The encoded region is
//! `16 + 8 * words` bytes (a len/universe prefix followed by whole 64-bit
//! words) and supports random access without decoding, so it can serve as the
//! directory into the postings blob directly from a memory-mapped file.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Number of low bits stored explicitly per element
fn lower_bit_width(len: u64, universe: u64) -> u32 {
    if len == 0 {
        return 0;
    }
    let ratio = universe.max(1) / len;
    if ratio <= 1 {
        0
    } else {
        64 - ratio.leading_zeros() - 1
    }
}

fn low_words(len: u64, width: u32) -> usize {
    ((len * width as u64) as usize).div_ceil(64)
}

fn high_words(len: u64, universe: u64, width: u32) -> usize {
    ((len + (universe >> width) + 1) as usize).div_ceil(64)
}

/// Encode a monotone non-decreasing sequence into an endpoint region
///
/// `universe` must be at least the last value. The resulting byte vector is
/// the exact region parsed back by [`EndpointTable::parse`].
pub fn encode_endpoints(values: &[u64], universe: u64) -> Result<Vec<u8>> {
    if let Some(&last) = values.last()
        && last > universe
    {
        return Err(Error::Precondition(format!(
            "endpoint {last} exceeds universe {universe}"
        )));
    }
    for window in values.windows(2) {
        if window[1] < window[0] {
            return Err(Error::Precondition(
                "endpoints must be monotone non-decreasing".into(),
            ));
        }
    }

    let len = values.len() as u64;
    let width = lower_bit_width(len, universe);
    let mut lower = vec![0u64; low_words(len, width)];
    let mut upper = vec![0u64; high_words(len, universe, width)];

    let mask = if width == 0 { 0 } else { (1u64 << width) - 1 };
    for (i, &value) in values.iter().enumerate() {
        if width > 0 {
            let bit_pos = i as u64 * width as u64;
            let word_idx = (bit_pos / 64) as usize;
            let offset = (bit_pos % 64) as u32;
            let low = value & mask;
            lower[word_idx] |= low << offset;
            if offset + width > 64 {
                lower[word_idx + 1] |= low >> (64 - offset);
            }
        }
        let high_pos = i as u64 + (value >> width);
        upper[(high_pos / 64) as usize] |= 1u64 << (high_pos % 64);
    }

    let mut out = Vec::with_capacity(16 + 8 * (lower.len() + upper.len()));
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&universe.to_le_bytes());
    for word in lower.iter().chain(upper.iter()) {
        out.extend_from_slice(&word.to_le_bytes());
    }
    Ok(out)
}

/// Zero-copy reader over an encoded endpoint region
#[derive(Debug, Clone, Copy)]
pub struct EndpointTable<'a> {
    len: u64,
    universe: u64,
    width: u32,
    lower: &'a [u8],
    upper: &'a [u8],
}

impl<'a> EndpointTable<'a> {
    /// Parse the region produced by [`encode_endpoints`]
    pub fn parse(region: &'a [u8]) -> Result<Self> {
        if region.len() < 16 {
            return Err(Error::Corruption("endpoint region too small".into()));
        }
        let len = LittleEndian::read_u64(&region[0..8]);
        let universe = LittleEndian::read_u64(&region[8..16]);
        let width = lower_bit_width(len, universe);
        let low_bytes = low_words(len, width) * 8;
        let high_bytes = high_words(len, universe, width) * 8;
        if region.len() != 16 + low_bytes + high_bytes {
            return Err(Error::Corruption(format!(
                "endpoint region size mismatch: got {} bytes, expected {}",
                region.len(),
                16 + low_bytes + high_bytes
            )));
        }
        Ok(Self {
            len,
            universe,
            width,
            lower: &region[16..16 + low_bytes],
            upper: &region[16 + low_bytes..],
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn universe(&self) -> u64 {
        self.universe
    }

    /// Value at position `i`
    ///
    /// Panics if `i` is out of range; the caller (the index reader) always
    /// indexes within `0..=size`.
    pub fn get(&self, i: usize) -> u64 {
        assert!(i < self.len(), "endpoint index {i} out of range");
        let low = if self.width == 0 {
            0
        } else {
            let bit_pos = i as u64 * self.width as u64;
            let word_idx = (bit_pos / 64) as usize;
            let offset = (bit_pos % 64) as u32;
            let mask = (1u64 << self.width) - 1;
            let mut value = word(self.lower, word_idx) >> offset;
            if offset + self.width > 64 {
                value |= word(self.lower, word_idx + 1) << (64 - offset);
            }
            value & mask
        };
        let high = self.select1(i) - i as u64;
        (high << self.width) | low
    }

    /// Position of the i-th set bit in the high-bits stream
    fn select1(&self, i: usize) -> u64 {
        let mut remaining = i as u32 + 1;
        let mut base = 0u64;
        for word_idx in 0..self.upper.len() / 8 {
            let w = word(self.upper, word_idx);
            let ones = w.count_ones();
            if ones >= remaining {
                return base + select_in_word(w, remaining);
            }
            remaining -= ones;
            base += 64;
        }
        unreachable!("select past the end of the high-bits stream");
    }
}

#[inline]
fn word(bytes: &[u8], idx: usize) -> u64 {
    LittleEndian::read_u64(&bytes[idx * 8..idx * 8 + 8])
}

/// Position of the k-th set bit within a word (1-indexed k)
#[inline]
fn select_in_word(mut w: u64, k: u32) -> u64 {
    for _ in 0..k - 1 {
        w &= w - 1;
    }
    w.trailing_zeros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(values: &[u64], universe: u64) {
        let region = encode_endpoints(values, universe).unwrap();
        assert_eq!((region.len() - 16) % 8, 0);
        let table = EndpointTable::parse(&region).unwrap();
        assert_eq!(table.len(), values.len());
        assert_eq!(table.universe(), universe);
        for (i, &expected) in values.iter().enumerate() {
            assert_eq!(table.get(i), expected, "mismatch at index {}", i);
        }
    }

    #[test]
    fn test_small_sequence() {
        roundtrip(&[0, 3, 10, 11, 50, 1000], 1001);
    }

    #[test]
    fn test_duplicates_allowed() {
        roundtrip(&[0, 0, 5, 5, 5, 9], 10);
    }

    #[test]
    fn test_dense_sequence() {
        let values: Vec<u64> = (0..500).collect();
        roundtrip(&values, 500);
    }

    #[test]
    fn test_sparse_sequence() {
        let values: Vec<u64> = (0..100).map(|i| i * 1_000_003).collect();
        roundtrip(&values, 100 * 1_000_003);
    }

    #[test]
    fn test_endpoint_shape() {
        // Endpoints as the index writes them: 0, then cumulative byte offsets
        let values = [0u64, 117, 117, 4096, 70000];
        roundtrip(&values, 70000);
    }

    #[test]
    fn test_non_monotone_rejected() {
        assert!(encode_endpoints(&[3, 2], 10).is_err());
    }

    #[test]
    fn test_value_beyond_universe_rejected() {
        assert!(encode_endpoints(&[1, 20], 10).is_err());
    }

    #[test]
    fn test_truncated_region_rejected() {
        let region = encode_endpoints(&[1, 2, 3], 10).unwrap();
        assert!(EndpointTable::parse(&region[..region.len() - 8]).is_err());
        assert!(EndpointTable::parse(&region[..8]).is_err());
    }
}
