//! Slices: a run of records encoded into one core block and a set of
//! external blocks, introduced by a slice header block.

use super::block::{Block, BlockContentType};
use super::compression_header::CompressionHeader;
use super::context::{AlignmentContext, AlignmentSpan, ReferenceContext};
use super::encoding::Encoding;
use super::itf8::{read_itf8, read_ltf8, write_itf8, write_ltf8};
use super::record::CramRecord;
use super::record_reader::CramRecordReader;
use super::record_writer::CramRecordWriter;
use super::streams::{SliceBlocksReader, SliceBlocksWriter};
use crate::{BiometalError, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Read, Write};

/// Content id of the core block.
pub const CORE_BLOCK_CONTENT_ID: i32 = 0;

/// Embedded reference content id meaning "no embedded reference".
pub const NO_EMBEDDED_REFERENCE: i32 = -1;

/// Length of the reference MD5 field.
pub const MD5_LEN: usize = 16;

/// CRAM slice header, stored in a MAPPED_SLICE block.
///
/// # Format
///
/// ```text
/// - Reference id, alignment start, alignment span: ITF-8
/// - Number of records: ITF-8
/// - Record counter: LTF-8
/// - Number of blocks (core + external): ITF-8
/// - External block content ids: ITF-8 count + ITF-8 array
/// - Embedded reference content id: ITF-8 (-1 for none)
/// - Reference MD5: [u8; 16]
/// - Optional tags: remaining bytes
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    /// Reference context and covered range
    pub alignment_context: AlignmentContext,
    /// Number of records in this slice
    pub record_count: i32,
    /// Global index of the slice's first record
    pub record_counter: i64,
    /// Data blocks following the header block (core + external)
    pub block_count: i32,
    /// Content ids of the external blocks
    pub content_ids: Vec<i32>,
    /// Content id of an embedded reference block, or -1
    pub embedded_reference_id: i32,
    /// MD5 of the covered reference bases; zero when not computed
    pub reference_md5: [u8; MD5_LEN],
    /// Optional tags in BAM binary form, kept opaque
    pub tags: Vec<u8>,
}

impl SliceHeader {
    /// Parse the content of a slice header block.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = data;

        let reference_context = ReferenceContext::from_id(read_itf8(&mut reader)?)?;
        let alignment_start = read_itf8(&mut reader)?;
        let alignment_span = read_itf8(&mut reader)?;
        let record_count = read_itf8(&mut reader)?;
        let record_counter = read_ltf8(&mut reader)?;
        let block_count = read_itf8(&mut reader)?;

        let id_count = read_itf8(&mut reader)?;
        if id_count < 0 || id_count as usize > reader.len() {
            return Err(BiometalError::cram(format!(
                "Invalid slice content id count: {} ({} bytes left)",
                id_count,
                reader.len()
            )));
        }
        let mut content_ids = Vec::with_capacity(id_count as usize);
        for _ in 0..id_count {
            content_ids.push(read_itf8(&mut reader)?);
        }

        let embedded_reference_id = read_itf8(&mut reader)?;

        let mut reference_md5 = [0u8; MD5_LEN];
        reader
            .read_exact(&mut reference_md5)
            .map_err(|e| BiometalError::InvalidCramFormat {
                msg: format!("Failed to read slice reference MD5: {}", e),
            })?;

        if record_count < 0 || block_count < 1 {
            return Err(BiometalError::cram(format!(
                "Invalid slice header: {} records in {} blocks",
                record_count, block_count
            )));
        }

        Ok(Self {
            alignment_context: AlignmentContext::new(
                reference_context,
                alignment_start,
                alignment_span,
            ),
            record_count,
            record_counter,
            block_count,
            content_ids,
            embedded_reference_id,
            reference_md5,
            tags: reader.to_vec(),
        })
    }

    /// Serialize to the content of a slice header block.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let context = &self.alignment_context;
        let mut buf = Vec::new();
        write_itf8(&mut buf, context.reference_context.id())?;
        write_itf8(&mut buf, context.alignment_start)?;
        write_itf8(&mut buf, context.alignment_span)?;
        write_itf8(&mut buf, self.record_count)?;
        write_ltf8(&mut buf, self.record_counter)?;
        write_itf8(&mut buf, self.block_count)?;
        write_itf8(&mut buf, self.content_ids.len() as i32)?;
        for &id in &self.content_ids {
            write_itf8(&mut buf, id)?;
        }
        write_itf8(&mut buf, self.embedded_reference_id)?;
        buf.extend_from_slice(&self.reference_md5);
        buf.extend_from_slice(&self.tags);
        Ok(buf)
    }

    /// Parse from a MAPPED_SLICE block.
    pub fn from_block(block: &Block) -> Result<Self> {
        if block.content_type != BlockContentType::MappedSlice {
            return Err(BiometalError::cram(format!(
                "Expected slice header block, found {:?}",
                block.content_type
            )));
        }
        Self::parse(&block.uncompressed_data()?)
    }

    /// Raw MAPPED_SLICE block holding this header.
    pub fn to_block(&self) -> Result<Block> {
        Ok(Block::raw(
            BlockContentType::MappedSlice,
            0,
            self.serialize()?,
        ))
    }
}

/// A slice: header plus its core and external blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    /// Slice header
    pub header: SliceHeader,
    /// Core bit-stream block
    pub core_block: Block,
    /// External blocks by content id
    pub external_blocks: BTreeMap<i32, Block>,
    /// Byte offset of the enclosing container in the file
    pub container_offset: u64,
    /// Byte offset of the slice header block from the start of the
    /// container's blocks (the slice's landmark)
    pub offset: i32,
    /// Bytes taken by the header block and every data block
    pub size: i32,
    /// Position of this slice in its container
    pub landmark_index: usize,
    /// Per-reference spans and counts, known when the slice was encoded here
    reference_spans: HashMap<ReferenceContext, AlignmentSpan>,
}

impl Slice {
    /// Encode `records` with `header`'s encodings.
    ///
    /// External blocks are compressed in parallel; offsets are filled in
    /// once the container lays its slices out.
    pub fn encode(
        records: &[CramRecord],
        header: &CompressionHeader,
        record_counter: i64,
    ) -> Result<Self> {
        let alignment_context = alignment_context_of(records);
        let multi_reference = alignment_context.reference_context.is_multiple();

        let writer = CramRecordWriter::new(header, records, multi_reference)?;
        let content_ids = header
            .data_series_encodings
            .values()
            .chain(header.tag_encodings.values())
            .flat_map(Encoding::external_content_ids);
        let mut streams = SliceBlocksWriter::new(content_ids);
        writer.write_records(&mut streams, records, alignment_context.alignment_start)?;
        let (core, external) = streams.finish();

        let external_blocks = external
            .into_par_iter()
            .map(|(id, data)| -> Result<(i32, Block)> {
                let block =
                    Block::compressed(BlockContentType::External, id, &data, header.compressor(id))?;
                Ok((id, block))
            })
            .collect::<Result<BTreeMap<i32, Block>>>()?;

        let slice_header = SliceHeader {
            alignment_context,
            record_count: records.len() as i32,
            record_counter,
            block_count: 1 + external_blocks.len() as i32,
            content_ids: external_blocks.keys().copied().collect(),
            embedded_reference_id: NO_EMBEDDED_REFERENCE,
            reference_md5: [0; MD5_LEN],
            tags: Vec::new(),
        };

        cram_debug!(
            "Slice::encode: {} records, {}, {} external blocks",
            records.len(),
            alignment_context,
            external_blocks.len()
        );

        let mut slice = Self {
            header: slice_header,
            core_block: Block::raw(BlockContentType::Core, CORE_BLOCK_CONTENT_ID, core),
            external_blocks,
            container_offset: 0,
            offset: 0,
            size: 0,
            landmark_index: 0,
            reference_spans: reference_spans(records),
        };
        slice.size = slice.serialized_size()? as i32;
        Ok(slice)
    }

    /// Read a slice header block and the data blocks it announces.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let header_block = Block::read(reader)?;
        let header = SliceHeader::from_block(&header_block)?;
        let mut size = header_block.serialized_size();

        let mut core_block = None;
        let mut external_blocks = BTreeMap::new();
        for _ in 0..header.block_count {
            let block = Block::read(reader)?;
            size += block.serialized_size();
            match block.content_type {
                BlockContentType::Core => {
                    if core_block.replace(block).is_some() {
                        return Err(BiometalError::cram("Slice has more than one core block"));
                    }
                }
                BlockContentType::External => {
                    external_blocks.insert(block.content_id, block);
                }
                other => {
                    return Err(BiometalError::cram(format!(
                        "Unexpected {:?} block inside a slice",
                        other
                    )))
                }
            }
        }
        let core_block =
            core_block.ok_or_else(|| BiometalError::cram("Slice has no core block"))?;

        Ok(Self {
            header,
            core_block,
            external_blocks,
            container_offset: 0,
            offset: 0,
            size: size as i32,
            landmark_index: 0,
            reference_spans: HashMap::new(),
        })
    }

    /// Write the header block, the core block and the external blocks in
    /// content id order; returns bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut written = self.header.to_block()?.write(writer)?;
        written += self.core_block.write(writer)?;
        for block in self.external_blocks.values() {
            written += block.write(writer)?;
        }
        Ok(written)
    }

    /// Bytes [`Slice::write`] produces.
    pub fn serialized_size(&self) -> Result<usize> {
        Ok(self.header.to_block()?.serialized_size()
            + self.core_block.serialized_size()
            + self
                .external_blocks
                .values()
                .map(Block::serialized_size)
                .sum::<usize>())
    }

    /// Reference context and covered range.
    pub fn alignment_context(&self) -> AlignmentContext {
        self.header.alignment_context
    }

    /// Decode every record of the slice.
    pub fn decode_records(&self, header: &CompressionHeader) -> Result<Vec<CramRecord>> {
        let core = self.core_block.uncompressed_data()?;
        let external = self
            .external_blocks
            .par_iter()
            .map(|(&id, block)| -> Result<(i32, Vec<u8>)> { Ok((id, block.uncompressed_data()?)) })
            .collect::<Result<HashMap<i32, Vec<u8>>>>()?;

        let context = self.alignment_context();
        let reader = CramRecordReader::new(header, context.reference_context.is_multiple())?;
        let mut streams = SliceBlocksReader::new(&core, &external);
        reader.read_records(
            &mut streams,
            self.header.record_count as usize,
            context.alignment_start,
            context.reference_context.id(),
        )
    }

    /// Span and counts per reference context, decoding the records when the
    /// slice was read rather than encoded.
    pub fn spans(
        &self,
        header: &CompressionHeader,
    ) -> Result<HashMap<ReferenceContext, AlignmentSpan>> {
        if !self.reference_spans.is_empty() || self.header.record_count == 0 {
            return Ok(self.reference_spans.clone());
        }
        Ok(reference_spans(&self.decode_records(header)?))
    }
}

/// Reference context and range covered by `records`.
///
/// One reference id among the records gives a single-reference context
/// spanning the placed records (or an unmapped one when that id is
/// [`NO_REFERENCE_INDEX`](super::record::NO_REFERENCE_INDEX)); more
/// than one gives a multi-reference context.
pub fn alignment_context_of(records: &[CramRecord]) -> AlignmentContext {
    let references: BTreeSet<i32> = records.iter().map(|r| r.reference_index).collect();
    let mut ids = references.iter();
    match (ids.next(), ids.next()) {
        (None, _) => AlignmentContext::unmapped(),
        (Some(&id), None) if id < 0 => AlignmentContext::unmapped(),
        (Some(&id), None) => {
            let bounds = records
                .iter()
                .filter(|r| r.is_placed())
                .map(|r| (r.alignment_start, r.alignment_end()))
                .reduce(|(s1, e1), (s2, e2)| (s1.min(s2), e1.max(e2)));
            match bounds {
                Some((start, end)) => AlignmentContext::single(id, start, end - start + 1),
                None => AlignmentContext::single(id, 0, 0),
            }
        }
        _ => AlignmentContext::multiple(),
    }
}

/// Per-reference spans and counts of `records`.
///
/// Unmapped records without a position land in the unmapped bucket with
/// sentinel start and span; unmapped records with a position count against
/// their reference with their read length as span; mapped records cover
/// `start..end`.
pub fn reference_spans(records: &[CramRecord]) -> HashMap<ReferenceContext, AlignmentSpan> {
    let mut spans: HashMap<ReferenceContext, AlignmentSpan> = HashMap::new();
    for record in records {
        let (context, span) = if record.is_segment_unmapped() {
            if record.alignment_start == 0 || record.reference_index < 0 {
                (ReferenceContext::UnmappedUnplaced, AlignmentSpan::unplaced())
            } else {
                (
                    ReferenceContext::Single(record.reference_index),
                    AlignmentSpan::new(record.alignment_start, record.read_length, 0, 1, 0),
                )
            }
        } else {
            (
                ReferenceContext::Single(record.reference_index),
                AlignmentSpan::new(
                    record.alignment_start,
                    record.alignment_end() - record.alignment_start,
                    1,
                    0,
                    0,
                ),
            )
        };
        spans
            .entry(context)
            .and_modify(|existing| *existing = AlignmentSpan::combine(existing, &span))
            .or_insert(span);
    }
    spans
}
