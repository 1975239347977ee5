//! CRAM blocks: the unit of compression inside containers.
//!
//! # Format
//!
//! ```text
//! - Method: u8 (0=raw, 1=gzip, 2=bzip2, 3=lzma, 4=rANS 4x8)
//! - Content type: u8
//! - Content ID: ITF-8
//! - Compressed size: ITF-8
//! - Uncompressed size: ITF-8
//! - Data: [u8; compressed_size]
//! - CRC32: u32 (little-endian, over every preceding byte of the block)
//! ```

use super::itf8::{itf8_size, read_itf8, write_itf8};
use super::rans::{self, RansOrder};
use crate::{BiometalError, Result};
use std::io::{Read, Write};

/// Block compression method as stored on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionMethod {
    /// Stored uncompressed
    Raw = 0,
    /// gzip (RFC 1952)
    Gzip = 1,
    /// bzip2
    Bzip2 = 2,
    /// xz / LZMA2
    Lzma = 3,
    /// rANS 4x8
    Rans = 4,
}

impl TryFrom<u8> for CompressionMethod {
    type Error = BiometalError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Bzip2),
            3 => Ok(Self::Lzma),
            4 => Ok(Self::Rans),
            5..=8 => Err(BiometalError::cram(format!(
                "Compression method {} is a CRAM 3.1 codec and is not supported",
                value
            ))),
            _ => Err(BiometalError::cram(format!(
                "Unknown compression method: {}",
                value
            ))),
        }
    }
}

/// What a block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockContentType {
    /// SAM header text
    FileHeader = 0,
    /// Container compression header
    CompressionHeader = 1,
    /// Slice header
    MappedSlice = 2,
    /// External data series stream
    External = 4,
    /// Core bit stream
    Core = 5,
}

impl TryFrom<u8> for BlockContentType {
    type Error = BiometalError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::FileHeader),
            1 => Ok(Self::CompressionHeader),
            2 => Ok(Self::MappedSlice),
            4 => Ok(Self::External),
            5 => Ok(Self::Core),
            _ => Err(BiometalError::cram(format!(
                "Unknown block content type: {}",
                value
            ))),
        }
    }
}

/// Compressor applied to a block's raw bytes, with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCompressor {
    /// No compression
    Raw,
    /// gzip at the given level (0-9)
    Gzip {
        /// Compression level
        level: u32,
    },
    /// bzip2 at the given level (1-9)
    Bzip2 {
        /// Compression level
        level: u32,
    },
    /// xz at the given preset (0-9)
    Lzma {
        /// Compression preset
        level: u32,
    },
    /// rANS 4x8 with the given context order
    Rans(RansOrder),
}

impl BlockCompressor {
    /// Wire method written into the block.
    pub fn method(&self) -> CompressionMethod {
        match self {
            Self::Raw => CompressionMethod::Raw,
            Self::Gzip { .. } => CompressionMethod::Gzip,
            Self::Bzip2 { .. } => CompressionMethod::Bzip2,
            Self::Lzma { .. } => CompressionMethod::Lzma,
            Self::Rans(_) => CompressionMethod::Rans,
        }
    }

    /// Compress `data`.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match *self {
            Self::Raw => Ok(data.to_vec()),
            Self::Gzip { level } => {
                use flate2::write::GzEncoder;
                use flate2::Compression;
                let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
                encoder.write_all(data)?;
                encoder
                    .finish()
                    .map_err(|e| BiometalError::Compression(format!("gzip block: {}", e)))
            }
            Self::Bzip2 { level } => {
                use bzip2::write::BzEncoder;
                use bzip2::Compression;
                let mut encoder = BzEncoder::new(Vec::new(), Compression::new(level));
                encoder.write_all(data)?;
                encoder
                    .finish()
                    .map_err(|e| BiometalError::Compression(format!("bzip2 block: {}", e)))
            }
            Self::Lzma { level } => {
                use xz2::write::XzEncoder;
                let mut encoder = XzEncoder::new(Vec::new(), level);
                encoder.write_all(data)?;
                encoder
                    .finish()
                    .map_err(|e| BiometalError::Compression(format!("LZMA block: {}", e)))
            }
            Self::Rans(order) => Ok(rans::compress(data, order)),
        }
    }
}

/// Decompress `data` that was produced by `method`.
///
/// At most `raw_size + 1` bytes are produced, so an oversized payload is
/// reported by the caller's length check without inflating all of it.
pub fn decompress(method: CompressionMethod, data: &[u8], raw_size: usize) -> Result<Vec<u8>> {
    let limit = raw_size as u64 + 1;
    let mut decompressed = Vec::new();
    match method {
        CompressionMethod::Raw => decompressed.extend_from_slice(data),
        CompressionMethod::Gzip => {
            use flate2::read::MultiGzDecoder;
            MultiGzDecoder::new(data)
                .take(limit)
                .read_to_end(&mut decompressed)
                .map_err(|e| {
                    BiometalError::Compression(format!("Failed to decompress gzip block: {}", e))
                })?;
        }
        CompressionMethod::Bzip2 => {
            use bzip2::read::BzDecoder;
            BzDecoder::new(data)
                .take(limit)
                .read_to_end(&mut decompressed)
                .map_err(|e| {
                    BiometalError::Compression(format!("Failed to decompress bzip2 block: {}", e))
                })?;
        }
        CompressionMethod::Lzma => {
            use xz2::read::XzDecoder;
            XzDecoder::new(data)
                .take(limit)
                .read_to_end(&mut decompressed)
                .map_err(|e| {
                    BiometalError::Compression(format!("Failed to decompress LZMA block: {}", e))
                })?;
        }
        CompressionMethod::Rans => decompressed = rans::decompress_exact(data, raw_size)?,
    }
    Ok(decompressed)
}

/// Reader adapter that feeds every byte it yields into a CRC32.
pub(crate) struct CrcReader<'r, R: Read> {
    inner: &'r mut R,
    hasher: crc32fast::Hasher,
}

impl<'r, R: Read> CrcReader<'r, R> {
    pub(crate) fn new(inner: &'r mut R) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Read the stored little-endian CRC32 and compare it with the bytes seen so far.
    pub(crate) fn verify(self, what: &str) -> Result<()> {
        let actual = self.hasher.finalize();
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf).map_err(|e| BiometalError::InvalidCramFormat {
            msg: format!("Failed to read {} CRC32: {}", what, e),
        })?;
        let expected = u32::from_le_bytes(buf);
        if expected != actual {
            return Err(BiometalError::ChecksumMismatch {
                what: what.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl<R: Read> Read for CrcReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// A CRAM block with its payload still compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Compression method of `data`
    pub method: CompressionMethod,
    /// Block content type
    pub content_type: BlockContentType,
    /// Content ID (external data series id, 0 for core and header blocks)
    pub content_id: i32,
    /// Uncompressed size in bytes
    pub raw_size: i32,
    /// Compressed payload
    pub data: Vec<u8>,
}

impl Block {
    /// Uncompressed block.
    pub fn raw(content_type: BlockContentType, content_id: i32, data: Vec<u8>) -> Self {
        Self {
            method: CompressionMethod::Raw,
            content_type,
            content_id,
            raw_size: data.len() as i32,
            data,
        }
    }

    /// Block holding `raw` compressed with `compressor`.
    pub fn compressed(
        content_type: BlockContentType,
        content_id: i32,
        raw: &[u8],
        compressor: BlockCompressor,
    ) -> Result<Self> {
        Ok(Self {
            method: compressor.method(),
            content_type,
            content_id,
            raw_size: raw.len() as i32,
            data: compressor.compress(raw)?,
        })
    }

    /// Parse a block and validate its CRC32.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut crc = CrcReader::new(reader);

        let mut head = [0u8; 2];
        crc.read_exact(&mut head).map_err(|e| BiometalError::InvalidCramFormat {
            msg: format!("Failed to read block method/content type: {}", e),
        })?;
        let method = CompressionMethod::try_from(head[0])?;
        let content_type = BlockContentType::try_from(head[1])?;

        let content_id = read_itf8(&mut crc)?;
        let compressed_size = read_itf8(&mut crc)?;
        let raw_size = read_itf8(&mut crc)?;
        if compressed_size < 0 || raw_size < 0 {
            return Err(BiometalError::cram(format!(
                "Negative block size: compressed={} raw={}",
                compressed_size, raw_size
            )));
        }

        let mut data = Vec::new();
        (&mut crc)
            .take(compressed_size as u64)
            .read_to_end(&mut data)?;
        if data.len() != compressed_size as usize {
            return Err(BiometalError::cram(format!(
                "Truncated block data: expected {} bytes, got {}",
                compressed_size,
                data.len()
            )));
        }

        crc.verify("block")?;

        cram_debug!(
            "Block {:?} id={} method={:?} {} -> {} bytes",
            content_type,
            content_id,
            method,
            compressed_size,
            raw_size
        );

        Ok(Self {
            method,
            content_type,
            content_id,
            raw_size,
            data,
        })
    }

    /// Serialize the block followed by its CRC32; returns bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut buf = Vec::with_capacity(self.data.len() + 19);
        buf.push(self.method as u8);
        buf.push(self.content_type as u8);
        write_itf8(&mut buf, self.content_id)?;
        write_itf8(&mut buf, self.data.len() as i32)?;
        write_itf8(&mut buf, self.raw_size)?;
        buf.extend_from_slice(&self.data);
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        writer.write_all(&buf)?;
        Ok(buf.len())
    }

    /// Bytes [`Block::write`] produces, CRC32 included.
    pub fn serialized_size(&self) -> usize {
        2 + itf8_size(self.content_id)
            + itf8_size(self.data.len() as i32)
            + itf8_size(self.raw_size)
            + self.data.len()
            + 4
    }

    /// Decompress the payload, checking it against the declared raw size.
    pub fn uncompressed_data(&self) -> Result<Vec<u8>> {
        let data = decompress(self.method, &self.data, self.raw_size as usize)?;
        if data.len() != self.raw_size as usize {
            return Err(BiometalError::cram(format!(
                "Block {} decompressed to {} bytes, header declares {}",
                self.content_id,
                data.len(),
                self.raw_size
            )));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Vec<u8> {
        b"ACGTNACGTNAAAACCCCGGGGTTTT".repeat(20)
    }

    #[test]
    fn test_block_raw_roundtrip() {
        let block = Block::raw(BlockContentType::Core, 0, vec![1, 2, 3]);
        let mut bytes = Vec::new();
        let n = block.write(&mut bytes).unwrap();
        assert_eq!(n, bytes.len());
        assert_eq!(block.serialized_size(), n);
        // method, type, id, csize, rsize, data, crc
        assert_eq!(&bytes[..8], &[0, 5, 0, 3, 3, 1, 2, 3]);

        let parsed = Block::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed, block);
        assert_eq!(parsed.uncompressed_data().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_block_every_method_roundtrip() {
        let compressors = [
            BlockCompressor::Raw,
            BlockCompressor::Gzip { level: 5 },
            BlockCompressor::Bzip2 { level: 9 },
            BlockCompressor::Lzma { level: 6 },
            BlockCompressor::Rans(RansOrder::Zero),
            BlockCompressor::Rans(RansOrder::One),
        ];
        for compressor in compressors {
            let block = Block::compressed(BlockContentType::External, 19, &sample(), compressor).unwrap();
            assert_eq!(block.method, compressor.method());
            let mut bytes = Vec::new();
            block.write(&mut bytes).unwrap();
            let parsed = Block::read(&mut Cursor::new(bytes)).unwrap();
            assert_eq!(parsed.uncompressed_data().unwrap(), sample(), "{:?}", compressor);
        }
    }

    #[test]
    fn test_block_crc_mismatch() {
        let block = Block::raw(BlockContentType::External, 7, b"quality".to_vec());
        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();
        bytes[6] ^= 0x01;
        let result = Block::read(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(BiometalError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_block_raw_size_mismatch() {
        let mut block = Block::raw(BlockContentType::External, 7, b"abc".to_vec());
        block.raw_size = 4;
        assert!(block.uncompressed_data().is_err());
    }

    #[test]
    fn test_block_rans_oversized_raw_length() {
        let mut block =
            Block::compressed(BlockContentType::External, 12, &[b'N'; 64], BlockCompressor::Rans(RansOrder::Zero))
                .unwrap();
        // rANS prefix: order, compressed length, raw length
        block.data[5..9].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = block.uncompressed_data().unwrap_err();
        assert!(err.to_string().contains("64"), "{}", err);
    }

    #[test]
    fn test_block_gzip_longer_than_declared() {
        let mut block =
            Block::compressed(BlockContentType::External, 3, &sample(), BlockCompressor::Gzip { level: 5 })
                .unwrap();
        block.raw_size = 10;
        assert!(block.uncompressed_data().is_err());
    }

    #[test]
    fn test_block_cram31_method_rejected() {
        let bytes = [5u8, 4, 1, 0, 0, 0, 0, 0, 0];
        let result = Block::read(&mut Cursor::new(bytes));
        assert!(result.unwrap_err().to_string().contains("3.1"));
    }

    #[test]
    fn test_block_truncated() {
        let block = Block::raw(BlockContentType::External, 1, vec![9; 32]);
        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();
        bytes.truncate(20);
        assert!(Block::read(&mut Cursor::new(bytes)).is_err());
    }
}
