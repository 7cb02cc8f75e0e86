//! Zero-copy index reader
//!
//! An `InvertedIndex` owns its byte source (a memory-mapped file or a heap
//! buffer) and hands out posting cursors that borrow from it. The index is
//! immutable after construction and may be shared by reference across
//! threads; cursors are single-threaded.

use std::fs::File;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::structures::EndpointTable;
use crate::DocId;

use super::format::{GlobalParameters, HEADER_FIXED_BYTES};
use super::posting::PostingCursor;

/// Byte region backing an index
pub enum MemorySource {
    Mapped(Mmap),
    Heap(Vec<u8>),
}

impl MemorySource {
    /// Memory-map a file read-only
    pub fn map_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(MemorySource::Mapped(mmap))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        MemorySource::Heap(bytes)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            MemorySource::Mapped(mmap) => mmap,
            MemorySource::Heap(bytes) => bytes,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable block-compressed inverted index
pub struct InvertedIndex {
    source: MemorySource,
    params: GlobalParameters,
    size: usize,
    num_docs: DocId,
    /// Offset and length of the Elias-Fano endpoint region
    endpoint_span: (usize, usize),
    list_offset: usize,
    list_size: usize,
}

impl InvertedIndex {
    /// Memory-map an index file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let index = Self::from_source(MemorySource::map_file(path.as_ref())?)?;
        debug!(
            "opened index {}: {} lists, {} documents",
            path.as_ref().display(),
            index.size,
            index.num_docs
        );
        Ok(index)
    }

    /// Parse the header and validate that every declared region fits the source
    pub fn from_source(source: MemorySource) -> Result<Self> {
        let bytes = source.as_slice();
        if bytes.len() < HEADER_FIXED_BYTES {
            return Err(Error::Corruption("index header truncated".into()));
        }

        // Freeze flags are a version word; only sizes are validated here.
        let _freeze_flags = LittleEndian::read_u64(&bytes[0..8]);
        let params = GlobalParameters::read(&bytes[8..16])?;
        let size = LittleEndian::read_u64(&bytes[16..24]);
        let num_docs = LittleEndian::read_u64(&bytes[24..32]);
        let _reserved = LittleEndian::read_u64(&bytes[32..40]);
        let endpoint_words = LittleEndian::read_u64(&bytes[40..48]);

        let num_docs = DocId::try_from(num_docs)
            .map_err(|_| Error::Corruption(format!("document count {num_docs} out of range")))?;

        let endpoint_len = (endpoint_words as usize)
            .checked_mul(8)
            .and_then(|l| l.checked_add(16))
            .ok_or_else(|| Error::Corruption("endpoint region size overflow".into()))?;
        let blob_size_offset = HEADER_FIXED_BYTES
            .checked_add(endpoint_len)
            .filter(|&o| o + 8 <= bytes.len())
            .ok_or_else(|| Error::Corruption("endpoint region exceeds memory source".into()))?;

        let list_size = LittleEndian::read_u64(&bytes[blob_size_offset..blob_size_offset + 8]);
        let list_offset = blob_size_offset + 8;
        if (list_size as usize).checked_add(list_offset).is_none()
            || list_offset + list_size as usize > bytes.len()
        {
            return Err(Error::Corruption(
                "posting blob exceeds memory source".into(),
            ));
        }

        let index = Self {
            params,
            size: size as usize,
            num_docs,
            endpoint_span: (HEADER_FIXED_BYTES, endpoint_len),
            list_offset,
            list_size: list_size as usize,
            source,
        };

        let endpoints = index.endpoints()?;
        if endpoints.len() != index.size + 1 {
            return Err(Error::Corruption(format!(
                "endpoint table holds {} entries for {} lists",
                endpoints.len(),
                index.size
            )));
        }
        Ok(index)
    }

    /// Number of posting lists
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Collection size; doubles as the exhausted-cursor sentinel
    #[inline]
    pub fn num_docs(&self) -> DocId {
        self.num_docs
    }

    #[inline]
    pub fn params(&self) -> &GlobalParameters {
        &self.params
    }

    fn endpoints(&self) -> Result<EndpointTable<'_>> {
        let (offset, len) = self.endpoint_span;
        EndpointTable::parse(&self.source.as_slice()[offset..offset + len])
    }

    fn list_bounds(&self, i: usize) -> Result<(usize, usize)> {
        let endpoints = self.endpoints()?;
        let start = endpoints.get(i) as usize;
        let end = endpoints.get(i + 1) as usize;
        if start > end || end > self.list_size {
            return Err(Error::Corruption(format!(
                "endpoints of list {i} ({start}..{end}) exceed blob of {} bytes",
                self.list_size
            )));
        }
        Ok((self.list_offset + start, self.list_offset + end))
    }

    /// Cursor over posting list `i`
    ///
    /// Panics if `i >= size()`.
    pub fn get(&self, i: usize) -> Result<PostingCursor<'_>> {
        assert!(i < self.size, "list ordinal {i} out of range");
        let (start, end) = self.list_bounds(i)?;
        PostingCursor::new(
            &self.source.as_slice()[start..end],
            self.num_docs,
            self.params,
        )
    }

    /// Touch every byte of list `i` to pull it into cache
    pub fn warmup(&self, i: usize) -> Result<()> {
        assert!(i < self.size, "list ordinal {i} out of range");
        let (start, end) = self.list_bounds(i)?;
        let mut sum = 0u64;
        for &byte in &self.source.as_slice()[start..end] {
            sum = sum.wrapping_add(byte as u64);
        }
        std::hint::black_box(sum);
        Ok(())
    }
}
