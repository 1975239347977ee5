//! Containers: a compression header plus the slices encoded with it.

use super::block::{Block, CrcReader};
use super::compression_header::CompressionHeader;
use super::context::{AlignmentContext, ReferenceContext};
use super::itf8::{read_itf8, read_ltf8, write_itf8, write_ltf8};
use super::record::CramRecord;
use super::slice::Slice;
use super::strategy::EncodingStrategy;
use crate::{BiometalError, Result};
use rayon::prelude::*;
use std::io::{ErrorKind, Read, Write};

/// The CRAM 3.0 EOF container, byte for byte.
pub const EOF_CONTAINER: [u8; 38] = [
    0x0f, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x0f, 0xe0, 0x45, 0x4f, 0x46, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x05, 0xbd, 0xd9, 0x4f, 0x00, 0x01, 0x00, 0x06, 0x06, 0x01, 0x00,
    0x01, 0x00, 0x01, 0x00, 0xee, 0x63, 0x01, 0x4b,
];

/// Body length declared by the EOF container.
const EOF_LENGTH: i32 = 15;

/// CRAM container header.
///
/// # Format
///
/// ```text
/// - Length: i32 (little-endian, bytes of every block in the container)
/// - Reference id, alignment start, alignment span: ITF-8
/// - Number of records: ITF-8
/// - Record counter: LTF-8
/// - Bases: LTF-8
/// - Number of blocks: ITF-8
/// - Landmarks: ITF-8 count + ITF-8 array
/// - CRC32: u32 (little-endian, over every preceding header byte)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Bytes of all blocks following the header
    pub length: i32,
    /// Reference context and covered range
    pub alignment_context: AlignmentContext,
    /// Number of records in this container
    pub num_records: i32,
    /// Global index of the container's first record
    pub record_counter: i64,
    /// Total number of bases (sum of read lengths)
    pub bases: i64,
    /// Number of blocks in this container
    pub num_blocks: i32,
    /// Landmarks: offsets of the slice header blocks from the first block
    pub landmarks: Vec<i32>,
}

impl ContainerHeader {
    /// Header of the EOF container.
    pub fn eof() -> Self {
        Self {
            length: EOF_LENGTH,
            alignment_context: AlignmentContext::eof(),
            num_records: 0,
            record_counter: 0,
            bases: 0,
            num_blocks: 1,
            landmarks: Vec::new(),
        }
    }

    /// Parse a container header and validate its CRC32.
    ///
    /// Returns `None` when the stream ends cleanly before the header.
    pub fn read<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let mut crc = CrcReader::new(reader);

        let mut length_buf = [0u8; 4];
        let mut filled = 0;
        while filled < length_buf.len() {
            match crc.read(&mut length_buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < length_buf.len() {
            return Err(BiometalError::cram(format!(
                "Truncated container length: {} of 4 bytes",
                filled
            )));
        }
        let length = i32::from_le_bytes(length_buf);
        if length < 0 {
            return Err(BiometalError::cram(format!(
                "Negative container length: {}",
                length
            )));
        }

        let reference_context = ReferenceContext::from_id(read_itf8(&mut crc)?)?;
        let alignment_start = read_itf8(&mut crc)?;
        let alignment_span = read_itf8(&mut crc)?;
        let num_records = read_itf8(&mut crc)?;
        let record_counter = read_ltf8(&mut crc)?;
        let bases = read_ltf8(&mut crc)?;
        let num_blocks = read_itf8(&mut crc)?;

        let num_landmarks = read_itf8(&mut crc)?;
        if !(0..=length).contains(&num_landmarks) {
            return Err(BiometalError::cram(format!(
                "Invalid landmark count {} for a {} byte container",
                num_landmarks, length
            )));
        }
        let mut landmarks = Vec::with_capacity(num_landmarks as usize);
        for _ in 0..num_landmarks {
            landmarks.push(read_itf8(&mut crc)?);
        }

        crc.verify("container header")?;

        let header = Self {
            length,
            alignment_context: AlignmentContext::new(
                reference_context,
                alignment_start,
                alignment_span,
            ),
            num_records,
            record_counter,
            bases,
            num_blocks,
            landmarks,
        };
        cram_debug!(
            "ContainerHeader: length={} {} records={} blocks={} landmarks={:?}",
            header.length,
            header.alignment_context,
            header.num_records,
            header.num_blocks,
            header.landmarks
        );
        Ok(Some(header))
    }

    /// Header bytes without the CRC32.
    fn serialize(&self) -> Result<Vec<u8>> {
        let context = &self.alignment_context;
        let mut buf = Vec::with_capacity(32 + 5 * self.landmarks.len());
        buf.extend_from_slice(&self.length.to_le_bytes());
        write_itf8(&mut buf, context.reference_context.id())?;
        write_itf8(&mut buf, context.alignment_start)?;
        write_itf8(&mut buf, context.alignment_span)?;
        write_itf8(&mut buf, self.num_records)?;
        write_ltf8(&mut buf, self.record_counter)?;
        write_ltf8(&mut buf, self.bases)?;
        write_itf8(&mut buf, self.num_blocks)?;
        write_itf8(&mut buf, self.landmarks.len() as i32)?;
        for &landmark in &self.landmarks {
            write_itf8(&mut buf, landmark)?;
        }
        Ok(buf)
    }

    /// Serialize the header followed by its CRC32; returns bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut buf = self.serialize()?;
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        writer.write_all(&buf)?;
        Ok(buf.len())
    }

    /// Bytes [`ContainerHeader::write`] produces.
    pub fn serialized_size(&self) -> Result<usize> {
        Ok(self.serialize()?.len() + 4)
    }

    /// Check if this is the EOF container.
    pub fn is_eof(&self) -> bool {
        self.length == EOF_LENGTH
            && self.alignment_context.reference_context.is_unmapped()
            && self.alignment_context.alignment_start == AlignmentContext::eof().alignment_start
            && self.num_blocks == 1
            && self.num_records == 0
    }
}

/// A container: compression header and slices.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    /// Container header
    pub header: ContainerHeader,
    /// Encodings shared by the slices
    pub compression_header: CompressionHeader,
    /// Slices in landmark order
    pub slices: Vec<Slice>,
    /// Byte offset of the container in its file
    pub offset: u64,
}

impl Container {
    /// Lay out encoded slices behind `compression_header`: landmarks, block
    /// count and the container context are derived from the slices.
    pub fn from_slices(
        compression_header: CompressionHeader,
        mut slices: Vec<Slice>,
        record_counter: i64,
        bases: i64,
    ) -> Result<Self> {
        let mut position = compression_header.to_block()?.serialized_size();
        let mut landmarks = Vec::with_capacity(slices.len());
        for (index, slice) in slices.iter_mut().enumerate() {
            slice.offset = position as i32;
            slice.landmark_index = index;
            landmarks.push(position as i32);
            position += slice.size as usize;
        }

        let header = ContainerHeader {
            length: position as i32,
            alignment_context: AlignmentContext::for_slices(
                slices.iter().map(|s| &s.header.alignment_context),
            ),
            num_records: slices.iter().map(|s| s.header.record_count).sum(),
            record_counter,
            bases,
            num_blocks: 1 + slices.iter().map(|s| 1 + s.header.block_count).sum::<i32>(),
            landmarks,
        };

        Ok(Self {
            header,
            compression_header,
            slices,
            offset: 0,
        })
    }

    /// Encode `records` into slices of at most `strategy.reads_per_slice`
    /// records sharing `compression_header`.
    pub fn encode(
        records: &[CramRecord],
        compression_header: CompressionHeader,
        strategy: &EncodingStrategy,
        record_counter: i64,
    ) -> Result<Self> {
        strategy.validate()?;
        let mut slices = Vec::new();
        let mut counter = record_counter;
        for chunk in records.chunks(strategy.reads_per_slice) {
            slices.push(Slice::encode(chunk, &compression_header, counter)?);
            counter += chunk.len() as i64;
        }
        let bases = records.iter().map(|r| r.read_length as i64).sum();
        Self::from_slices(compression_header, slices, record_counter, bases)
    }

    /// Read one container.
    ///
    /// Returns `None` at a clean end of stream. The EOF container is returned
    /// like any other, with no slices; check [`Container::is_eof`].
    pub fn read<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let Some(header) = ContainerHeader::read(reader)? else {
            return Ok(None);
        };

        let mut body = Vec::new();
        reader
            .by_ref()
            .take(header.length as u64)
            .read_to_end(&mut body)?;
        if body.len() != header.length as usize {
            return Err(BiometalError::cram(format!(
                "Truncated container: expected {} bytes, got {}",
                header.length,
                body.len()
            )));
        }

        if header.is_eof() {
            return Ok(Some(Self {
                header,
                compression_header: CompressionHeader::default(),
                slices: Vec::new(),
                offset: 0,
            }));
        }

        let mut cursor = body.as_slice();
        let compression_header = CompressionHeader::from_block(&Block::read(&mut cursor)?)?;

        let mut slices = Vec::with_capacity(header.landmarks.len());
        for (index, &landmark) in header.landmarks.iter().enumerate() {
            let start = usize::try_from(landmark)
                .ok()
                .filter(|&start| start < body.len())
                .ok_or_else(|| {
                    BiometalError::cram(format!(
                        "Landmark {} outside a {} byte container",
                        landmark,
                        body.len()
                    ))
                })?;
            let mut slice = Slice::read(&mut &body[start..])?;
            slice.offset = landmark;
            slice.landmark_index = index;
            slices.push(slice);
        }

        Ok(Some(Self {
            header,
            compression_header,
            slices,
            offset: 0,
        }))
    }

    /// Write the header, the compression header block and every slice;
    /// returns bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut written = self.header.write(writer)?;
        written += self.compression_header.to_block()?.write(writer)?;
        for slice in &self.slices {
            written += slice.write(writer)?;
        }
        Ok(written)
    }

    /// Write the EOF container.
    pub fn write_eof<W: Write>(writer: &mut W) -> Result<usize> {
        writer.write_all(&EOF_CONTAINER)?;
        Ok(EOF_CONTAINER.len())
    }

    /// Check if this is the EOF container.
    pub fn is_eof(&self) -> bool {
        self.header.is_eof()
    }

    /// Reference context and covered range.
    pub fn alignment_context(&self) -> AlignmentContext {
        self.header.alignment_context
    }

    /// Record the container's file offset on it and its slices.
    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
        for slice in &mut self.slices {
            slice.container_offset = offset;
        }
    }

    /// Decode the records of every slice, slices in parallel.
    pub fn records(&self) -> Result<Vec<CramRecord>> {
        let per_slice = self
            .slices
            .par_iter()
            .map(|slice| slice.decode_records(&self.compression_header))
            .collect::<Result<Vec<Vec<CramRecord>>>>()?;
        Ok(per_slice.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cram::compression_header::CompressionHeaderFactory;
    use crate::io::cram::block::BlockContentType;
    use std::io::Cursor;

    /// Compression header block of the EOF container: three empty maps.
    fn eof_body_block() -> Block {
        Block::raw(BlockContentType::CompressionHeader, 0, vec![1, 0, 1, 0, 1, 0])
    }

    fn mapped(reference: i32, start: i32) -> CramRecord {
        CramRecord::mapped(format!("r{}", start).as_bytes(), reference, start, 10, Vec::new())
    }

    fn container_for(records: &[CramRecord], strategy: &EncodingStrategy) -> Container {
        let header = CompressionHeaderFactory::new(strategy.clone())
            .build(records)
            .unwrap();
        Container::encode(records, header, strategy, 0).unwrap()
    }

    // ========================================================================
    // EOF
    // ========================================================================

    #[test]
    fn test_eof_constant_matches_structures() {
        let mut bytes = Vec::new();
        ContainerHeader::eof().write(&mut bytes).unwrap();
        eof_body_block().write(&mut bytes).unwrap();
        assert_eq!(bytes, EOF_CONTAINER);
    }

    #[test]
    fn test_eof_container_read() {
        let container = Container::read(&mut Cursor::new(EOF_CONTAINER.to_vec()))
            .unwrap()
            .unwrap();
        assert!(container.is_eof());
        assert!(container.slices.is_empty());
        assert_eq!(container.alignment_context(), AlignmentContext::eof());
    }

    #[test]
    fn test_clean_end_of_stream() {
        assert!(Container::read(&mut Cursor::new(Vec::new())).unwrap().is_none());
        assert!(Container::read(&mut Cursor::new(vec![0x0f, 0x00])).is_err());
    }

    // ========================================================================
    // Header
    // ========================================================================

    #[test]
    fn test_container_header_roundtrip() {
        let header = ContainerHeader {
            length: 12345,
            alignment_context: AlignmentContext::single(1, 100, 900),
            num_records: 10,
            record_counter: 5_000_000_000,
            bases: 1500,
            num_blocks: 7,
            landmarks: vec![120, 6000],
        };
        let mut bytes = Vec::new();
        let n = header.write(&mut bytes).unwrap();
        assert_eq!(n, header.serialized_size().unwrap());
        let parsed = ContainerHeader::read(&mut Cursor::new(bytes)).unwrap().unwrap();
        assert_eq!(parsed, header);
        assert!(!parsed.is_eof());
    }

    #[test]
    fn test_container_header_crc_mismatch() {
        let mut bytes = Vec::new();
        ContainerHeader::eof().write(&mut bytes).unwrap();
        bytes[5] ^= 0x01;
        assert!(ContainerHeader::read(&mut Cursor::new(bytes)).is_err());

        let mut bytes = EOF_CONTAINER.to_vec();
        let crc_at = bytes.len() - 15 - 1;
        bytes[crc_at] ^= 0xff;
        assert!(matches!(
            ContainerHeader::read(&mut Cursor::new(bytes)),
            Err(BiometalError::ChecksumMismatch { .. })
        ));
    }

    // ========================================================================
    // Encode / read
    // ========================================================================

    #[test]
    fn test_container_roundtrip_with_landmarks() {
        let strategy = EncodingStrategy::default()
            .with_reads_per_slice(2)
            .with_minimum_single_reference_slice_size(1);
        let records: Vec<_> = (0..5).map(|i| mapped(0, 100 + i * 10)).collect();
        let container = container_for(&records, &strategy);

        assert_eq!(container.slices.len(), 3);
        assert_eq!(container.header.num_records, 5);
        assert_eq!(container.header.bases, 50);
        assert_eq!(container.header.landmarks.len(), 3);
        assert_eq!(
            container.alignment_context(),
            AlignmentContext::single(0, 100, 50)
        );
        assert_eq!(container.slices[1].header.record_counter, 2);

        let mut bytes = Vec::new();
        let written = container.write(&mut bytes).unwrap();
        assert_eq!(
            written,
            container.header.serialized_size().unwrap() + container.header.length as usize
        );

        let parsed = Container::read(&mut Cursor::new(bytes)).unwrap().unwrap();
        assert_eq!(parsed.header, container.header);
        for (a, b) in parsed.slices.iter().zip(&container.slices) {
            assert_eq!(a.offset, b.offset);
            assert_eq!(a.size, b.size);
            assert_eq!(a.landmark_index, b.landmark_index);
        }
        assert_eq!(parsed.records().unwrap(), records);
    }

    #[test]
    fn test_container_multi_reference_context() {
        let records = vec![mapped(0, 10), mapped(1, 5)];
        let container = container_for(&records, &EncodingStrategy::default());
        assert_eq!(container.alignment_context(), AlignmentContext::multiple());
        assert_eq!(container.header.num_blocks, 1 + 1 + container.slices[0].header.block_count);
    }

    #[test]
    fn test_container_landmark_out_of_range() {
        let records = vec![mapped(0, 10)];
        let mut container = container_for(&records, &EncodingStrategy::default());
        container.header.landmarks[0] = container.header.length + 10;
        let mut bytes = Vec::new();
        container.write(&mut bytes).unwrap();
        assert!(Container::read(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_set_offset_reaches_slices() {
        let records = vec![mapped(0, 10)];
        let mut container = container_for(&records, &EncodingStrategy::default());
        container.set_offset(4096);
        assert_eq!(container.slices[0].container_offset, 4096);
    }
}
