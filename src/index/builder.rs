//! Index builders
//!
//! `IndexBuilder` accumulates posting lists in memory and produces either a
//! ready reader or the serialized file bytes. `StreamBuilder` targets
//! collections larger than memory: posting bytes stream through a bounded
//! buffer into a scratch file inside a scoped temporary directory, flushed by
//! a background worker once the buffer reaches 1 GiB. Appends and flushes are
//! serialized through the worker channel.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::debug;
use tempfile::TempDir;

use crate::DocId;
use crate::error::{Error, Result};
use crate::structures::encode_endpoints;

use super::format::{FREEZE_FLAGS, GlobalParameters};
use super::posting::write_posting_list;
use super::reader::{InvertedIndex, MemorySource};

/// Buffered posting bytes are handed to the flush worker at this size
const FLUSH_THRESHOLD: usize = 1 << 30;

fn write_header<W: Write>(
    out: &mut W,
    params: &GlobalParameters,
    num_docs: DocId,
    endpoints: &[u64],
    blob_size: u64,
) -> Result<()> {
    let size = (endpoints.len() - 1) as u64;
    let region = encode_endpoints(endpoints, blob_size)?;
    let endpoint_words = ((region.len() - 16) / 8) as u64;

    let mut params_bytes = [0u8; GlobalParameters::SIZE];
    params.write(&mut params_bytes);

    out.write_all(&FREEZE_FLAGS.to_le_bytes())?;
    out.write_all(&params_bytes)?;
    out.write_all(&size.to_le_bytes())?;
    out.write_all(&(num_docs as u64).to_le_bytes())?;
    out.write_all(&0u64.to_le_bytes())?;
    out.write_all(&endpoint_words.to_le_bytes())?;
    out.write_all(&region)?;
    out.write_all(&blob_size.to_le_bytes())?;
    Ok(())
}

/// In-memory index builder
pub struct IndexBuilder {
    params: GlobalParameters,
    num_docs: DocId,
    endpoints: Vec<u64>,
    lists: Vec<u8>,
}

impl IndexBuilder {
    pub fn new(num_docs: DocId, params: GlobalParameters) -> Self {
        Self {
            params,
            num_docs,
            endpoints: vec![0],
            lists: Vec::new(),
        }
    }

    /// Append one posting list; lists are assigned consecutive ordinals
    pub fn add_posting_list(&mut self, docids: &[DocId], freqs: &[u32]) -> Result<()> {
        write_posting_list(&mut self.lists, &self.params, docids, freqs)?;
        self.endpoints.push(self.lists.len() as u64);
        Ok(())
    }

    /// Number of lists added so far
    pub fn size(&self) -> usize {
        self.endpoints.len() - 1
    }

    /// Full index file image
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.lists.len() + 4096);
        write_header(
            &mut out,
            &self.params,
            self.num_docs,
            &self.endpoints,
            self.lists.len() as u64,
        )?;
        out.extend_from_slice(&self.lists);
        Ok(out)
    }

    /// Build a heap-backed reader
    pub fn build(self) -> Result<InvertedIndex> {
        let bytes = self.serialize()?;
        InvertedIndex::from_source(MemorySource::from_vec(bytes))
    }

    /// Write the index file to `path`
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.serialize()?)?;
        debug!(
            "wrote index {}: {} lists",
            path.as_ref().display(),
            self.size()
        );
        Ok(())
    }
}

/// Streaming index builder for collections larger than memory
pub struct StreamBuilder {
    params: GlobalParameters,
    num_docs: DocId,
    endpoints: Vec<u64>,
    buffer: Vec<u8>,
    bytes_written: u64,
    tmp: TempDir,
    sender: Option<Sender<Vec<u8>>>,
    worker: Option<JoinHandle<io::Result<()>>>,
}

impl StreamBuilder {
    pub fn new(num_docs: DocId, params: GlobalParameters) -> Result<Self> {
        let tmp = TempDir::new()?;
        let mut scratch = File::create(tmp.path().join("postings"))?;
        let (sender, receiver) = crossbeam_channel::bounded::<Vec<u8>>(2);
        let worker = thread::Builder::new()
            .name("basalt-flush".into())
            .spawn(move || -> io::Result<()> {
                for chunk in receiver {
                    scratch.write_all(&chunk)?;
                }
                scratch.flush()
            })?;
        Ok(Self {
            params,
            num_docs,
            endpoints: vec![0],
            buffer: Vec::new(),
            bytes_written: 0,
            tmp,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Append one posting list, flushing the buffer once it reaches 1 GiB
    pub fn add_posting_list(&mut self, docids: &[DocId], freqs: &[u32]) -> Result<()> {
        let old_size = self.buffer.len();
        write_posting_list(&mut self.buffer, &self.params, docids, freqs)?;
        self.bytes_written += (self.buffer.len() - old_size) as u64;
        self.endpoints.push(self.bytes_written);
        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.flush()?;
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.endpoints.len() - 1
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.buffer);
        let sender = self
            .sender
            .as_ref()
            .expect("flush worker runs until build");
        sender
            .send(chunk)
            .map_err(|_| Error::Io(io::Error::other("background flush worker exited")))?;
        Ok(())
    }

    /// Flush remaining bytes and wait for the worker
    fn finish(&mut self) -> Result<()> {
        self.flush()?;
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::Io(io::Error::other("background flush worker panicked")))??;
        }
        Ok(())
    }

    /// Assemble the final index file at `path`
    ///
    /// The temporary directory is removed when the builder drops, on every
    /// exit path.
    pub fn build(mut self, path: impl AsRef<Path>) -> Result<()> {
        self.finish()?;
        let mut out = BufWriter::new(File::create(path.as_ref())?);
        write_header(
            &mut out,
            &self.params,
            self.num_docs,
            &self.endpoints,
            self.bytes_written,
        )?;
        let mut postings = File::open(self.tmp.path().join("postings"))?;
        io::copy(&mut postings, &mut out)?;
        out.flush()?;
        debug!(
            "wrote index {}: {} lists, {} posting bytes",
            path.as_ref().display(),
            self.size(),
            self.bytes_written
        );
        Ok(())
    }

    /// Merge several stream builders into one index file
    ///
    /// Lists keep their per-builder order; endpoints are rebased onto the
    /// concatenated blob. All builders must share parameters and document
    /// count.
    pub fn merge_into(mut builders: Vec<StreamBuilder>, path: impl AsRef<Path>) -> Result<()> {
        let Some(first) = builders.first() else {
            return Err(Error::Precondition("no builders to merge".into()));
        };
        let params = first.params;
        let num_docs = first.num_docs;
        if builders
            .iter()
            .any(|b| b.params != params || b.num_docs != num_docs)
        {
            return Err(Error::Precondition(
                "merged builders must share parameters and document count".into(),
            ));
        }

        let mut endpoints = vec![0u64];
        let mut offset = 0u64;
        for builder in builders.iter_mut() {
            builder.finish()?;
            endpoints.extend(builder.endpoints[1..].iter().map(|&e| e + offset));
            offset += builder.bytes_written;
        }

        let mut out = BufWriter::new(File::create(path.as_ref())?);
        write_header(&mut out, &params, num_docs, &endpoints, offset)?;
        for builder in &builders {
            let mut postings = File::open(builder.tmp.path().join("postings"))?;
            io::copy(&mut postings, &mut out)?;
        }
        out.flush()?;
        Ok(())
    }
}
