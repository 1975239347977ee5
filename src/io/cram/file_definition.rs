//! File definition and SAM header container.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ "CRAM" magic       4 bytes   │
//! │ major, minor       2 bytes   │
//! │ file id           20 bytes   │
//! ├──────────────────────────────┤
//! │ SAM header container         │  one FILE_HEADER block:
//! │                              │  i32 LE text length + text
//! ├──────────────────────────────┤
//! │ data containers ...          │
//! ├──────────────────────────────┤
//! │ EOF container                │
//! └──────────────────────────────┘
//! ```

use super::block::{Block, BlockContentType};
use super::container::ContainerHeader;
use super::context::AlignmentContext;
use crate::{BiometalError, Result};
use std::io::{Read, Write};

/// File magic.
pub const CRAM_MAGIC: [u8; 4] = *b"CRAM";

/// Length of the file id.
pub const FILE_ID_LEN: usize = 20;

/// Bytes of the file definition.
pub const FILE_DEFINITION_LEN: usize = CRAM_MAGIC.len() + 2 + FILE_ID_LEN;

/// Magic, format version and file id at the start of every CRAM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDefinition {
    /// Major version (3)
    pub major_version: u8,
    /// Minor version (0 when written, 0 or 1 when read)
    pub minor_version: u8,
    /// Free-form file id
    pub file_id: [u8; FILE_ID_LEN],
}

impl FileDefinition {
    /// CRAM 3.0 definition with the given id.
    pub fn new(file_id: [u8; FILE_ID_LEN]) -> Self {
        Self {
            major_version: 3,
            minor_version: 0,
            file_id,
        }
    }

    /// CRAM 3.0 definition whose id is `name`, truncated or zero padded to
    /// 20 bytes.
    pub fn from_name(name: &str) -> Self {
        let mut file_id = [0u8; FILE_ID_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(FILE_ID_LEN);
        file_id[..n].copy_from_slice(&bytes[..n]);
        Self::new(file_id)
    }

    /// Parse and validate a file definition. CRAM 3.0 and 3.1 are accepted.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| BiometalError::InvalidCramFormat {
                msg: format!("Failed to read CRAM magic number: {}", e),
            })?;
        if magic != CRAM_MAGIC {
            return Err(BiometalError::InvalidCramFormat {
                msg: format!(
                    "Invalid CRAM magic number: expected 'CRAM', found '{}'",
                    String::from_utf8_lossy(&magic)
                ),
            });
        }

        let mut version = [0u8; 2];
        reader
            .read_exact(&mut version)
            .map_err(|e| BiometalError::InvalidCramFormat {
                msg: format!("Failed to read CRAM version: {}", e),
            })?;
        let [major_version, minor_version] = version;
        match (major_version, minor_version) {
            (3, 0) | (3, 1) => {}
            (2, _) => {
                return Err(BiometalError::InvalidCramFormat {
                    msg: format!(
                        "CRAM 2.x is not supported (found {}.{}). Please use CRAM 3.0 or 3.1",
                        major_version, minor_version
                    ),
                })
            }
            _ => {
                return Err(BiometalError::InvalidCramFormat {
                    msg: format!(
                        "Unsupported CRAM version: {}.{} (only 3.0 and 3.1 are supported)",
                        major_version, minor_version
                    ),
                })
            }
        }

        let mut file_id = [0u8; FILE_ID_LEN];
        reader
            .read_exact(&mut file_id)
            .map_err(|e| BiometalError::InvalidCramFormat {
                msg: format!("Failed to read CRAM file ID: {}", e),
            })?;

        Ok(Self {
            major_version,
            minor_version,
            file_id,
        })
    }

    /// Write the definition.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        writer.write_all(&CRAM_MAGIC)?;
        writer.write_all(&[self.major_version, self.minor_version])?;
        writer.write_all(&self.file_id)?;
        Ok(FILE_DEFINITION_LEN)
    }
}

/// Write the SAM header container holding `text` verbatim.
pub fn write_sam_header<W: Write>(writer: &mut W, text: &[u8]) -> Result<usize> {
    let length = i32::try_from(text.len()).map_err(|_| {
        BiometalError::InvalidConfiguration(format!("SAM header too large: {} bytes", text.len()))
    })?;
    let mut data = Vec::with_capacity(4 + text.len());
    data.extend_from_slice(&length.to_le_bytes());
    data.extend_from_slice(text);
    let block = Block::raw(BlockContentType::FileHeader, 0, data);

    let header = ContainerHeader {
        length: block.serialized_size() as i32,
        alignment_context: AlignmentContext::unmapped(),
        num_records: 0,
        record_counter: 0,
        bases: 0,
        num_blocks: 1,
        landmarks: Vec::new(),
    };
    let written = header.write(writer)?;
    Ok(written + block.write(writer)?)
}

/// Read the SAM header container; returns the header text and the bytes
/// consumed.
///
/// Blocks after the FILE_HEADER block (padding written by some tools) are
/// skipped.
pub fn read_sam_header<R: Read>(reader: &mut R) -> Result<(Vec<u8>, usize)> {
    let header = ContainerHeader::read(reader)?
        .ok_or_else(|| BiometalError::cram("Missing SAM header container"))?;
    if header.is_eof() {
        return Err(BiometalError::cram("Expected SAM header container, found EOF"));
    }

    let mut body = Vec::with_capacity(header.length as usize);
    reader
        .by_ref()
        .take(header.length as u64)
        .read_to_end(&mut body)?;
    if body.len() < header.length as usize {
        return Err(BiometalError::cram(format!(
            "Truncated SAM header container: {} of {} bytes",
            body.len(),
            header.length
        )));
    }

    let block = Block::read(&mut body.as_slice())?;
    if block.content_type != BlockContentType::FileHeader {
        return Err(BiometalError::cram(format!(
            "Expected SAM header block, found {:?}",
            block.content_type
        )));
    }
    let data = block.uncompressed_data()?;
    if data.len() < 4 {
        return Err(BiometalError::cram("SAM header block shorter than its length field"));
    }
    let (length, text) = data.split_at(4);
    let length = i32::from_le_bytes([length[0], length[1], length[2], length[3]]);
    if length < 0 || length as usize > text.len() {
        return Err(BiometalError::cram(format!(
            "SAM header length {} exceeds block of {} bytes",
            length,
            text.len()
        )));
    }

    cram_debug!("read_sam_header: {} bytes of header text", length);
    let consumed = header.serialized_size()? + header.length as usize;
    Ok((text[..length as usize].to_vec(), consumed))
}
