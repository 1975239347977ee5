//! Encoding descriptors stored in the compression header.
//!
//! # Format
//!
//! ```text
//! - Encoding ID: ITF-8
//! - Parameter length: ITF-8 (bytes)
//! - Parameters: [u8; length], layout depends on the encoding ID
//! ```
//!
//! | ID | Encoding        | Parameters                                        |
//! |----|-----------------|---------------------------------------------------|
//! | 0  | NULL            | none                                              |
//! | 1  | EXTERNAL        | content ID                                        |
//! | 2  | GOLOMB          | offset, M                                         |
//! | 3  | HUFFMAN         | alphabet (count + values), bit lengths (count + values) |
//! | 4  | BYTE_ARRAY_LEN  | length encoding, value encoding                   |
//! | 5  | BYTE_ARRAY_STOP | stop byte (u8), content ID                        |
//! | 6  | BETA            | offset, bit count                                 |
//! | 7  | SUBEXP          | offset, K                                         |
//! | 8  | GOLOMB_RICE     | offset, log2(M)                                   |
//! | 9  | GAMMA           | offset                                            |

use super::itf8::{read_itf8, write_itf8};
use crate::{BiometalError, Result};
use std::io::{Cursor, Read, Write};

/// Numeric encoding identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EncodingId {
    /// No data
    Null = 0,
    /// Values in an external block
    External = 1,
    /// Golomb code in the core block
    Golomb = 2,
    /// Canonical Huffman code in the core block
    Huffman = 3,
    /// Length-prefixed byte array
    ByteArrayLen = 4,
    /// Stop-byte terminated byte array
    ByteArrayStop = 5,
    /// Fixed-width binary in the core block
    Beta = 6,
    /// Sub-exponential code in the core block
    SubExp = 7,
    /// Golomb-Rice code in the core block
    GolombRice = 8,
    /// Elias gamma code in the core block
    Gamma = 9,
}

impl TryFrom<i32> for EncodingId {
    type Error = BiometalError;

    fn try_from(value: i32) -> Result<Self> {
        Ok(match value {
            0 => Self::Null,
            1 => Self::External,
            2 => Self::Golomb,
            3 => Self::Huffman,
            4 => Self::ByteArrayLen,
            5 => Self::ByteArrayStop,
            6 => Self::Beta,
            7 => Self::SubExp,
            8 => Self::GolombRice,
            9 => Self::Gamma,
            _ => {
                return Err(BiometalError::cram(format!(
                    "Unknown encoding ID: {}",
                    value
                )))
            }
        })
    }
}

/// How one data series (or tag) is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// NULL encoding (no data)
    Null,
    /// External encoding (data in external block)
    External {
        /// External block content ID
        content_id: i32,
    },
    /// Golomb encoding
    Golomb {
        /// Added to values before encoding
        offset: i32,
        /// Golomb parameter M
        m: i32,
    },
    /// Canonical Huffman encoding in the core block
    Huffman {
        /// Symbol alphabet
        alphabet: Vec<i32>,
        /// Code length of each symbol
        bit_lengths: Vec<i32>,
    },
    /// Byte array with length prefix
    ByteArrayLen {
        /// Encoding of the array length
        len_encoding: Box<Encoding>,
        /// Encoding of the array bytes
        value_encoding: Box<Encoding>,
    },
    /// Byte array with stop byte
    ByteArrayStop {
        /// Byte value that terminates the array
        stop_byte: u8,
        /// External block holding the arrays
        content_id: i32,
    },
    /// Beta encoding (fixed number of bits)
    Beta {
        /// Added to values before encoding
        offset: i32,
        /// Number of bits per value
        length: i32,
    },
    /// Subexponential encoding
    SubExp {
        /// Added to values before encoding
        offset: i32,
        /// Subexponential parameter
        k: i32,
    },
    /// Golomb-Rice encoding (Golomb with M = 2^log2_m)
    GolombRice {
        /// Added to values before encoding
        offset: i32,
        /// Log2 of M
        log2_m: i32,
    },
    /// Elias gamma encoding
    Gamma {
        /// Added to values before encoding
        offset: i32,
    },
}

impl Encoding {
    /// Single-symbol Huffman: the value is implied and consumes no bits.
    pub fn constant(value: i32) -> Self {
        Self::Huffman {
            alphabet: vec![value],
            bit_lengths: vec![0],
        }
    }

    /// The descriptor's numeric ID.
    pub fn id(&self) -> EncodingId {
        match self {
            Self::Null => EncodingId::Null,
            Self::External { .. } => EncodingId::External,
            Self::Golomb { .. } => EncodingId::Golomb,
            Self::Huffman { .. } => EncodingId::Huffman,
            Self::ByteArrayLen { .. } => EncodingId::ByteArrayLen,
            Self::ByteArrayStop { .. } => EncodingId::ByteArrayStop,
            Self::Beta { .. } => EncodingId::Beta,
            Self::SubExp { .. } => EncodingId::SubExp,
            Self::GolombRice { .. } => EncodingId::GolombRice,
            Self::Gamma { .. } => EncodingId::Gamma,
        }
    }

    /// External content IDs this encoding reads from or writes to.
    pub fn external_content_ids(&self) -> Vec<i32> {
        match self {
            Self::External { content_id } | Self::ByteArrayStop { content_id, .. } => {
                vec![*content_id]
            }
            Self::ByteArrayLen {
                len_encoding,
                value_encoding,
            } => {
                let mut ids = len_encoding.external_content_ids();
                for id in value_encoding.external_content_ids() {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ids
            }
            _ => Vec::new(),
        }
    }

    /// Parse an encoding: ITF-8 ID, ITF-8 parameter length, parameters.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let id = EncodingId::try_from(read_itf8(reader)?)?;
        let param_len = read_itf8(reader)?;
        if param_len < 0 {
            return Err(BiometalError::cram(format!(
                "Negative parameter length {} for encoding {:?}",
                param_len, id
            )));
        }

        let mut params = Vec::new();
        reader.by_ref().take(param_len as u64).read_to_end(&mut params)?;
        if params.len() != param_len as usize {
            return Err(BiometalError::cram(format!(
                "Truncated parameters for encoding {:?}",
                id
            )));
        }

        let mut cursor = Cursor::new(params.as_slice());
        let encoding = Self::read_params(id, &mut cursor)?;
        if cursor.position() as usize != params.len() {
            log::warn!(
                "{} trailing parameter bytes ignored for encoding {:?}",
                params.len() - cursor.position() as usize,
                id
            );
        }
        Ok(encoding)
    }

    fn read_params(id: EncodingId, reader: &mut Cursor<&[u8]>) -> Result<Self> {
        Ok(match id {
            EncodingId::Null => Self::Null,
            EncodingId::External => Self::External {
                content_id: read_itf8(reader)?,
            },
            EncodingId::Golomb => Self::Golomb {
                offset: read_itf8(reader)?,
                m: read_itf8(reader)?,
            },
            EncodingId::Huffman => {
                let alphabet = read_itf8_array(reader)?;
                let bit_lengths = read_itf8_array(reader)?;
                if alphabet.len() != bit_lengths.len() {
                    return Err(BiometalError::cram(format!(
                        "Huffman alphabet size {} does not match {} bit lengths",
                        alphabet.len(),
                        bit_lengths.len()
                    )));
                }
                Self::Huffman {
                    alphabet,
                    bit_lengths,
                }
            }
            EncodingId::ByteArrayLen => Self::ByteArrayLen {
                len_encoding: Box::new(Self::read(reader)?),
                value_encoding: Box::new(Self::read(reader)?),
            },
            EncodingId::ByteArrayStop => {
                let mut stop = [0u8; 1];
                reader.read_exact(&mut stop).map_err(|e| BiometalError::InvalidCramFormat {
                    msg: format!("Failed to read stop byte: {}", e),
                })?;
                Self::ByteArrayStop {
                    stop_byte: stop[0],
                    content_id: read_itf8(reader)?,
                }
            }
            EncodingId::Beta => Self::Beta {
                offset: read_itf8(reader)?,
                length: read_itf8(reader)?,
            },
            EncodingId::SubExp => Self::SubExp {
                offset: read_itf8(reader)?,
                k: read_itf8(reader)?,
            },
            EncodingId::GolombRice => Self::GolombRice {
                offset: read_itf8(reader)?,
                log2_m: read_itf8(reader)?,
            },
            EncodingId::Gamma => Self::Gamma {
                offset: read_itf8(reader)?,
            },
        })
    }

    /// Serialize ID, parameter length and parameters.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut params = Vec::new();
        match self {
            Self::Null => {}
            Self::External { content_id } => {
                write_itf8(&mut params, *content_id)?;
            }
            Self::Golomb { offset, m } => {
                write_itf8(&mut params, *offset)?;
                write_itf8(&mut params, *m)?;
            }
            Self::Huffman {
                alphabet,
                bit_lengths,
            } => {
                write_itf8_array(&mut params, alphabet)?;
                write_itf8_array(&mut params, bit_lengths)?;
            }
            Self::ByteArrayLen {
                len_encoding,
                value_encoding,
            } => {
                len_encoding.write(&mut params)?;
                value_encoding.write(&mut params)?;
            }
            Self::ByteArrayStop {
                stop_byte,
                content_id,
            } => {
                params.push(*stop_byte);
                write_itf8(&mut params, *content_id)?;
            }
            Self::Beta { offset, length } => {
                write_itf8(&mut params, *offset)?;
                write_itf8(&mut params, *length)?;
            }
            Self::SubExp { offset, k } => {
                write_itf8(&mut params, *offset)?;
                write_itf8(&mut params, *k)?;
            }
            Self::GolombRice { offset, log2_m } => {
                write_itf8(&mut params, *offset)?;
                write_itf8(&mut params, *log2_m)?;
            }
            Self::Gamma { offset } => {
                write_itf8(&mut params, *offset)?;
            }
        }

        let mut n = write_itf8(writer, self.id() as i32)?;
        n += write_itf8(writer, params.len() as i32)?;
        writer.write_all(&params)?;
        Ok(n + params.len())
    }
}

fn read_itf8_array<R: Read>(reader: &mut R) -> Result<Vec<i32>> {
    let count = read_itf8(reader)?;
    if count < 0 {
        return Err(BiometalError::cram(format!("Negative array length: {}", count)));
    }
    // Each element takes at least one byte, so the parameter block bounds the count
    let mut values = Vec::new();
    for _ in 0..count {
        values.push(read_itf8(reader)?);
    }
    Ok(values)
}

fn write_itf8_array<W: Write>(writer: &mut W, values: &[i32]) -> Result<()> {
    write_itf8(writer, values.len() as i32)?;
    for &v in values {
        write_itf8(writer, v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reparse(encoding: &Encoding) -> Encoding {
        let mut bytes = Vec::new();
        let n = encoding.write(&mut bytes).unwrap();
        assert_eq!(n, bytes.len());
        Encoding::read(&mut Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_external_layout() {
        let mut bytes = Vec::new();
        Encoding::External { content_id: 5 }.write(&mut bytes).unwrap();
        assert_eq!(bytes, vec![1, 1, 5]);
    }

    #[test]
    fn test_huffman_layout() {
        let mut bytes = Vec::new();
        Encoding::constant(65).write(&mut bytes).unwrap();
        // id 3, 4 param bytes: alphabet [65], lengths [0]
        assert_eq!(bytes, vec![3, 4, 1, 65, 1, 0]);
    }

    #[test]
    fn test_nested_byte_array_len() {
        let encoding = Encoding::ByteArrayLen {
            len_encoding: Box::new(Encoding::constant(4)),
            value_encoding: Box::new(Encoding::External { content_id: 0x4E4D43 }),
        };
        assert_eq!(reparse(&encoding), encoding);
        assert_eq!(encoding.external_content_ids(), vec![0x4E4D43]);
    }

    #[test]
    fn test_core_encodings_reparse() {
        let encodings = [
            Encoding::Null,
            Encoding::Golomb { offset: 1, m: 10 },
            Encoding::Beta { offset: 0, length: 8 },
            Encoding::SubExp { offset: 0, k: 2 },
            Encoding::GolombRice { offset: -1, log2_m: 3 },
            Encoding::Gamma { offset: 1 },
            Encoding::ByteArrayStop { stop_byte: b'\t', content_id: 21 },
        ];
        for encoding in encodings {
            assert_eq!(reparse(&encoding), encoding);
        }
    }

    #[test]
    fn test_unknown_encoding_id() {
        let result = Encoding::read(&mut Cursor::new(vec![10, 0]));
        assert!(matches!(result, Err(BiometalError::InvalidCramFormat { .. })));
    }

    #[test]
    fn test_truncated_params() {
        let result = Encoding::read(&mut Cursor::new(vec![1, 3, 5]));
        assert!(result.is_err());
    }

    #[test]
    fn test_huffman_size_mismatch() {
        let result = Encoding::read(&mut Cursor::new(vec![3, 5, 2, 1, 2, 1, 0]));
        assert!(result.is_err());
    }
}
