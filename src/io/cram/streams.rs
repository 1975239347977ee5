//! Per-slice stream arenas: one core bit stream plus one byte stream per
//! external content ID. Codecs borrow the arena for each value they move.

use super::bit_io::{BitReader, BitWriter};
use crate::{BiometalError, Result};
use std::collections::{BTreeMap, HashMap};

/// Output streams of one slice under construction.
#[derive(Debug, Default)]
pub struct SliceBlocksWriter {
    /// Core bit stream
    pub core: BitWriter,
    external: BTreeMap<i32, Vec<u8>>,
}

impl SliceBlocksWriter {
    /// Create an arena with the given external streams pre-registered, so
    /// that they are emitted (possibly empty) even when no value lands in them.
    pub fn new(content_ids: impl IntoIterator<Item = i32>) -> Self {
        Self {
            core: BitWriter::new(),
            external: content_ids.into_iter().map(|id| (id, Vec::new())).collect(),
        }
    }

    /// Byte stream for `content_id`, created on first use.
    pub fn external(&mut self, content_id: i32) -> &mut Vec<u8> {
        self.external.entry(content_id).or_default()
    }

    /// Finish the core stream and hand back every external stream in
    /// content-ID order.
    pub fn finish(self) -> (Vec<u8>, BTreeMap<i32, Vec<u8>>) {
        (self.core.finish(), self.external)
    }
}

/// Cursor over one uncompressed external block.
#[derive(Debug, Clone)]
pub struct ExternalCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ExternalCursor<'a> {
    /// Cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Consume `n` bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let rest = self.remaining();
        if n > rest.len() {
            return Err(BiometalError::cram(format!(
                "Attempted to read {} bytes with {} left in external block",
                n,
                rest.len()
            )));
        }
        self.pos += n;
        Ok(&rest[..n])
    }

    /// Consume one byte.
    pub fn byte(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    /// Consume bytes up to `stop`, returning them without the stop byte.
    pub fn until(&mut self, stop: u8) -> Result<&'a [u8]> {
        let rest = self.remaining();
        let end = rest.iter().position(|&b| b == stop).ok_or_else(|| {
            BiometalError::cram(format!("Stop byte {:#04x} not found in external block", stop))
        })?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    /// Whether every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }
}

impl std::io::Read for ExternalCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let rest = self.remaining();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Input streams of one slice being decoded, borrowing the decompressed blocks.
#[derive(Debug)]
pub struct SliceBlocksReader<'a> {
    /// Core bit stream
    pub core: BitReader<'a>,
    external: HashMap<i32, ExternalCursor<'a>>,
}

impl<'a> SliceBlocksReader<'a> {
    /// Arena over a core block and the external blocks keyed by content ID.
    pub fn new(core: &'a [u8], external: &'a HashMap<i32, Vec<u8>>) -> Self {
        Self {
            core: BitReader::new(core),
            external: external
                .iter()
                .map(|(&id, data)| (id, ExternalCursor::new(data)))
                .collect(),
        }
    }

    /// Cursor for `content_id`.
    pub fn external(&mut self, content_id: i32) -> Result<&mut ExternalCursor<'a>> {
        self.external.get_mut(&content_id).ok_or_else(|| {
            BiometalError::cram(format!("External block {} not found in slice", content_id))
        })
    }
}
