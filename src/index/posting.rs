//! Block posting lists
//!
//! Each list is laid out as a variable-length header carrying the list
//! cardinality, a skip directory with one fixed 8-byte entry per block
//! (last docid, payload byte length), and the block payloads themselves:
//! codec-compressed docid gaps followed by codec-compressed frequencies.
//!
//! The skip directory lives at the list head so `next_geq` can step over
//! whole blocks without touching their payload bytes.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::structures::{read_vint, write_vint};
use crate::{DocId, TermFreq};

use super::format::GlobalParameters;

/// Append the encoded form of one posting list to `out`
///
/// `docids` must be strictly increasing and `freqs[i] >= 1`; an empty list is
/// a precondition error.
pub fn write_posting_list(
    out: &mut Vec<u8>,
    params: &GlobalParameters,
    docids: &[DocId],
    freqs: &[TermFreq],
) -> Result<()> {
    if docids.is_empty() {
        return Err(Error::Precondition("posting list must be nonempty".into()));
    }
    debug_assert_eq!(docids.len(), freqs.len());
    debug_assert!(docids.windows(2).all(|w| w[0] < w[1]));
    debug_assert!(freqs.iter().all(|&f| f >= 1));

    let block_size = params.block_size as usize;
    let num_blocks = docids.len().div_ceil(block_size);

    let mut payload = Vec::new();
    let mut directory = Vec::with_capacity(num_blocks * 8);
    let mut gaps = Vec::with_capacity(block_size);
    let mut adjusted = Vec::with_capacity(block_size);

    let mut prev: i64 = -1;
    for block in 0..num_blocks {
        let start = block * block_size;
        let end = (start + block_size).min(docids.len());

        gaps.clear();
        for &doc in &docids[start..end] {
            gaps.push((doc as i64 - prev - 1) as u32);
            prev = doc as i64;
        }
        adjusted.clear();
        adjusted.extend(freqs[start..end].iter().map(|&f| f - 1));

        let block_start = payload.len();
        params.codec.encode(&gaps, &mut payload);
        params.codec.encode(&adjusted, &mut payload);

        let mut entry = [0u8; 8];
        LittleEndian::write_u32(&mut entry[0..4], docids[end - 1]);
        LittleEndian::write_u32(&mut entry[4..8], (payload.len() - block_start) as u32);
        directory.extend_from_slice(&entry);
    }

    write_vint(out, docids.len() as u64);
    out.extend_from_slice(&directory);
    out.extend_from_slice(&payload);
    Ok(())
}

/// Cursor over one encoded posting list
///
/// `docid()` is strictly increasing until the list is exhausted, at which
/// point it equals the sentinel `num_docs` and stays there.
pub struct PostingCursor<'a> {
    params: GlobalParameters,
    n: usize,
    num_docs: DocId,
    directory: &'a [u8],
    payload: &'a [u8],
    num_blocks: usize,
    cur_block: usize,
    /// Payload offset where the current block starts
    block_start: usize,
    docs: Vec<u32>,
    freqs: Vec<u32>,
    pos: usize,
    current: DocId,
}

impl<'a> PostingCursor<'a> {
    pub fn new(data: &'a [u8], num_docs: DocId, params: GlobalParameters) -> Result<Self> {
        let mut offset = 0;
        let n = read_vint(data, &mut offset)? as usize;
        if n == 0 {
            return Err(Error::Corruption("posting list is empty".into()));
        }
        let num_blocks = n.div_ceil(params.block_size as usize);
        let directory_end = offset + num_blocks * 8;
        if directory_end > data.len() {
            return Err(Error::Corruption("posting list directory truncated".into()));
        }
        let directory = &data[offset..directory_end];
        let payload_len: usize = (0..num_blocks)
            .map(|b| LittleEndian::read_u32(&directory[b * 8 + 4..b * 8 + 8]) as usize)
            .sum();
        if payload_len > data.len() - directory_end {
            return Err(Error::Corruption("posting list payload truncated".into()));
        }
        let mut cursor = Self {
            params,
            n,
            num_docs,
            directory,
            payload: &data[directory_end..],
            num_blocks,
            cur_block: 0,
            block_start: 0,
            docs: Vec::with_capacity(params.block_size as usize),
            freqs: Vec::with_capacity(params.block_size as usize),
            pos: 0,
            current: 0,
        };
        cursor.decode_block(0, 0)?;
        cursor.current = cursor.docs[0];
        Ok(cursor)
    }

    /// (last docid, payload byte length) of block `b`
    #[inline]
    fn entry(&self, b: usize) -> (DocId, usize) {
        let raw = &self.directory[b * 8..b * 8 + 8];
        (
            LittleEndian::read_u32(&raw[0..4]),
            LittleEndian::read_u32(&raw[4..8]) as usize,
        )
    }

    fn decode_block(&mut self, b: usize, start: usize) -> Result<()> {
        let block_size = self.params.block_size as usize;
        let block_len = if b + 1 == self.num_blocks {
            self.n - b * block_size
        } else {
            block_size
        };
        let (last_doc, byte_len) = self.entry(b);
        let end = start
            .checked_add(byte_len)
            .filter(|&e| e <= self.payload.len())
            .ok_or_else(|| Error::Corruption("posting block out of bounds".into()))?;
        let block = &self.payload[start..end];

        self.docs.resize(block_len, 0);
        let consumed = self.params.codec.decode(block, &mut self.docs)?;

        let mut prev: i64 = if b == 0 {
            -1
        } else {
            self.entry(b - 1).0 as i64
        };
        for slot in self.docs.iter_mut() {
            prev += *slot as i64 + 1;
            *slot = prev as u32;
        }
        if self.docs[block_len - 1] != last_doc {
            return Err(Error::Corruption(
                "posting block does not end at its directory docid".into(),
            ));
        }

        self.freqs.resize(block_len, 0);
        self.params.codec.decode(&block[consumed..], &mut self.freqs)?;
        for freq in self.freqs.iter_mut() {
            *freq += 1;
        }

        self.cur_block = b;
        self.block_start = start;
        self.pos = 0;
        Ok(())
    }

    /// Current docid, or `num_docs` once exhausted
    #[inline]
    pub fn docid(&self) -> DocId {
        self.current
    }

    /// Frequency of the current posting (0 once exhausted)
    #[inline]
    pub fn freq(&self) -> TermFreq {
        if self.current == self.num_docs {
            0
        } else {
            self.freqs[self.pos]
        }
    }

    /// List cardinality
    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    /// Position of the current posting within the list (`size()` once exhausted)
    #[inline]
    pub fn position(&self) -> usize {
        if self.current == self.num_docs {
            self.n
        } else {
            self.cur_block * self.params.block_size as usize + self.pos
        }
    }

    /// Index of the block holding the current posting
    #[inline]
    pub fn block_index(&self) -> usize {
        self.cur_block
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Advance by one posting; a no-op once exhausted
    pub fn next(&mut self) {
        if self.current == self.num_docs {
            return;
        }
        self.pos += 1;
        if self.pos < self.docs.len() {
            self.current = self.docs[self.pos];
            return;
        }
        if self.cur_block + 1 == self.num_blocks {
            self.current = self.num_docs;
            return;
        }
        let next_start = self.block_start + self.entry(self.cur_block).1;
        self.decode_block(self.cur_block + 1, next_start)
            .expect("skip directory verified at construction");
        self.current = self.docs[0];
    }

    /// Move to the first posting with `docid() >= target`
    ///
    /// Parks at the sentinel when `target` exceeds every docid in the list.
    pub fn next_geq(&mut self, target: DocId) {
        if target <= self.current || self.current == self.num_docs {
            return;
        }
        let mut b = self.cur_block;
        let mut start = self.block_start;
        while self.entry(b).0 < target {
            start += self.entry(b).1;
            b += 1;
            if b == self.num_blocks {
                self.current = self.num_docs;
                return;
            }
        }
        if b != self.cur_block {
            self.decode_block(b, start)
                .expect("skip directory verified at construction");
        }
        while self.docs[self.pos] < target {
            self.pos += 1;
        }
        self.current = self.docs[self.pos];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::BlockCodec;

    fn params(codec: BlockCodec, block_size: u32) -> GlobalParameters {
        GlobalParameters { block_size, codec }
    }

    fn encode(params: &GlobalParameters, docids: &[DocId], freqs: &[TermFreq]) -> Vec<u8> {
        let mut out = Vec::new();
        write_posting_list(&mut out, params, docids, freqs).unwrap();
        out
    }

    #[test]
    fn test_empty_list_rejected() {
        let mut out = Vec::new();
        let err = write_posting_list(&mut out, &GlobalParameters::default(), &[], &[]);
        assert!(matches!(err, Err(Error::Precondition(_))));
    }

    #[test]
    fn test_iterate_single_block() {
        let p = params(BlockCodec::Bitpacked, 128);
        let docids = [1u32, 3, 5];
        let freqs = [1u32, 2, 7];
        let data = encode(&p, &docids, &freqs);
        let mut cursor = PostingCursor::new(&data, 10, p).unwrap();
        for (&doc, &freq) in docids.iter().zip(&freqs) {
            assert_eq!(cursor.docid(), doc);
            assert_eq!(cursor.freq(), freq);
            cursor.next();
        }
        assert_eq!(cursor.docid(), 10);
        assert_eq!(cursor.freq(), 0);
        assert_eq!(cursor.position(), 3);
        // Exhaustion is sticky
        cursor.next();
        assert_eq!(cursor.docid(), 10);
    }

    #[test]
    fn test_iterate_across_blocks_all_codecs() {
        for codec in [BlockCodec::Raw, BlockCodec::VarByte, BlockCodec::Bitpacked] {
            let p = params(codec, 16);
            let docids: Vec<u32> = (0..100).map(|i| i * 3 + 1).collect();
            let freqs: Vec<u32> = (0..100).map(|i| (i % 9) + 1).collect();
            let data = encode(&p, &docids, &freqs);
            let mut cursor = PostingCursor::new(&data, 1000, p).unwrap();
            assert_eq!(cursor.size(), 100);
            for (i, (&doc, &freq)) in docids.iter().zip(&freqs).enumerate() {
                assert_eq!(cursor.docid(), doc, "codec {:?} posting {}", codec, i);
                assert_eq!(cursor.freq(), freq);
                assert_eq!(cursor.position(), i);
                cursor.next();
            }
            assert_eq!(cursor.docid(), 1000);
        }
    }

    #[test]
    fn test_next_geq_within_block() {
        let p = params(BlockCodec::Bitpacked, 128);
        let docids = [2u32, 4, 8, 16, 32];
        let freqs = [1u32; 5];
        let data = encode(&p, &docids, &freqs);
        let mut cursor = PostingCursor::new(&data, 100, p).unwrap();
        cursor.next_geq(5);
        assert_eq!(cursor.docid(), 8);
        cursor.next_geq(8);
        assert_eq!(cursor.docid(), 8);
        // Targets at or below the current docid do not move the cursor
        cursor.next_geq(1);
        assert_eq!(cursor.docid(), 8);
        cursor.next_geq(33);
        assert_eq!(cursor.docid(), 100);
        cursor.next_geq(2);
        assert_eq!(cursor.docid(), 100);
    }

    #[test]
    fn test_next_geq_skips_blocks() {
        let p = params(BlockCodec::VarByte, 8);
        let docids: Vec<u32> = (0..64).map(|i| i * 10).collect();
        let freqs: Vec<u32> = vec![1; 64];
        let data = encode(&p, &docids, &freqs);
        let mut cursor = PostingCursor::new(&data, 10_000, p).unwrap();
        cursor.next_geq(305);
        assert_eq!(cursor.docid(), 310);
        assert_eq!(cursor.block_index(), 3);
        cursor.next_geq(629);
        assert_eq!(cursor.docid(), 630);
        cursor.next_geq(631);
        assert_eq!(cursor.docid(), 10_000);
    }

    #[test]
    fn test_full_decode_is_strictly_increasing() {
        let p = params(BlockCodec::Bitpacked, 32);
        let docids: Vec<u32> = (0..500).map(|i| i * 2 + (i % 3)).collect();
        let mut docids = docids;
        docids.dedup();
        let freqs: Vec<u32> = docids.iter().map(|d| d % 5 + 1).collect();
        let data = encode(&p, &docids, &freqs);
        let mut cursor = PostingCursor::new(&data, u32::MAX - 1, p).unwrap();
        let mut decoded = Vec::new();
        while cursor.docid() != u32::MAX - 1 {
            decoded.push(cursor.docid());
            cursor.next();
        }
        assert_eq!(decoded, docids);
        assert!(decoded.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_truncated_list_rejected() {
        let p = params(BlockCodec::Bitpacked, 16);
        let docids: Vec<u32> = (0..40).collect();
        let freqs = vec![1u32; 40];
        let data = encode(&p, &docids, &freqs);
        assert!(PostingCursor::new(&data[..4], 100, p).is_err());
    }
}
