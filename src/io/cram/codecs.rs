//! Codecs that move typed values between records and slice streams.
//!
//! [`CoreCodec`] implements the bit-level encodings of the core block.
//! [`IntegerCodec`], [`ByteCodec`] and [`ByteArrayCodec`] are
//! built from an [`Encoding`] descriptor for one value type and route each
//! value to the core stream or to an external stream.
//!
//! Core encodings with an offset write `value + offset` and read
//! `bits - offset`.

use super::bit_io::{BitReader, BitWriter};
use super::encoding::Encoding;
use super::itf8::{read_itf8, write_itf8};
use super::streams::{SliceBlocksReader, SliceBlocksWriter};
use crate::{BiometalError, Result};
use std::collections::HashMap;

// ============================================================================
// Canonical Huffman
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HuffmanCode {
    symbol: i32,
    code: u32,
    len: u32,
}

/// Canonical Huffman code built from an alphabet and per-symbol code lengths.
///
/// Symbols sorted by (code length, symbol value) receive consecutive code
/// words; moving to a longer length shifts the next code left. A one-symbol
/// alphabet with length 0 reads and writes no bits.
#[derive(Debug, Clone)]
pub struct CanonicalHuffman {
    /// Sorted by (length, code)
    codes: Vec<HuffmanCode>,
    by_symbol: HashMap<i32, HuffmanCode>,
}

impl CanonicalHuffman {
    /// Assign canonical codes.
    pub fn new(alphabet: &[i32], bit_lengths: &[i32]) -> Result<Self> {
        if alphabet.len() != bit_lengths.len() || alphabet.is_empty() {
            return Err(BiometalError::cram(format!(
                "Invalid Huffman table: {} symbols, {} lengths",
                alphabet.len(),
                bit_lengths.len()
            )));
        }

        let mut pairs: Vec<(u32, i32)> = Vec::with_capacity(alphabet.len());
        for (&symbol, &len) in alphabet.iter().zip(bit_lengths) {
            if !(0..=31).contains(&len) {
                return Err(BiometalError::cram(format!(
                    "Huffman code length {} out of range for symbol {}",
                    len, symbol
                )));
            }
            pairs.push((len as u32, symbol));
        }
        pairs.sort_unstable();

        let mut codes = Vec::with_capacity(pairs.len());
        let mut code: i64 = -1;
        let mut code_len = 0u32;
        for (len, symbol) in pairs {
            code += 1;
            if len > code_len {
                code <<= len - code_len;
                code_len = len;
            }
            if code >> len != 0 {
                return Err(BiometalError::cram(format!(
                    "Huffman code lengths are over-subscribed at symbol {}",
                    symbol
                )));
            }
            codes.push(HuffmanCode {
                symbol,
                code: code as u32,
                len,
            });
        }

        let mut by_symbol = HashMap::with_capacity(codes.len());
        for c in &codes {
            if by_symbol.insert(c.symbol, *c).is_some() {
                return Err(BiometalError::cram(format!(
                    "Duplicate Huffman symbol {}",
                    c.symbol
                )));
            }
        }

        Ok(Self { codes, by_symbol })
    }

    /// Read one symbol, growing the code word one length group at a time.
    pub fn read(&self, reader: &mut BitReader<'_>) -> Result<i32> {
        let mut code = 0u32;
        let mut len = 0u32;
        let mut i = 0;

        while i < self.codes.len() {
            let group_len = self.codes[i].len;
            if group_len > len {
                code = (code << (group_len - len)) | reader.read_bits(group_len - len)?;
                len = group_len;
            }

            let group_end = i + self.codes[i..]
                .iter()
                .take_while(|c| c.len == group_len)
                .count();
            if let Some(c) = self.codes[i..group_end].iter().find(|c| c.code == code) {
                return Ok(c.symbol);
            }
            i = group_end;
        }

        Err(BiometalError::cram(format!(
            "Huffman code {:#b} ({} bits) matches no symbol",
            code, len
        )))
    }

    /// Write the code word for `symbol`.
    pub fn write(&self, writer: &mut BitWriter, symbol: i32) -> Result<()> {
        let c = self.by_symbol.get(&symbol).ok_or_else(|| {
            BiometalError::cram(format!(
                "Symbol {} is not in the Huffman alphabet",
                symbol
            ))
        })?;
        writer.write_bits(c.code as u64, c.len)
    }

    /// Code length for `symbol`, if present.
    pub fn code_len(&self, symbol: i32) -> Option<u32> {
        self.by_symbol.get(&symbol).map(|c| c.len)
    }
}

// ============================================================================
// Core bit codecs
// ============================================================================

fn bit_width(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// Integer codec operating on the core bit stream.
#[derive(Debug, Clone)]
pub enum CoreCodec {
    /// Fixed number of bits
    Beta {
        /// Added on write, subtracted on read
        offset: i32,
        /// Bits per value
        bits: u32,
    },
    /// Elias gamma
    Gamma {
        /// Added on write, subtracted on read
        offset: i32,
    },
    /// Sub-exponential with parameter `k`
    SubExp {
        /// Added on write, subtracted on read
        offset: i32,
        /// Values below `2^k` use `k` bits and no unary prefix
        k: u32,
    },
    /// Golomb with divisor `m`
    Golomb {
        /// Added on write, subtracted on read
        offset: i32,
        /// Divisor
        m: u32,
    },
    /// Golomb-Rice with divisor `2^log2_m`
    GolombRice {
        /// Added on write, subtracted on read
        offset: i32,
        /// Log2 of the divisor
        log2_m: u32,
    },
    /// Canonical Huffman
    Huffman(CanonicalHuffman),
}

impl CoreCodec {
    /// Build from a core encoding descriptor; `None` for non-core encodings.
    pub fn from_encoding(encoding: &Encoding) -> Result<Option<Self>> {
        let non_negative = |name: &str, v: i32| -> Result<u32> {
            u32::try_from(v).map_err(|_| {
                BiometalError::cram(format!("Negative {} parameter: {}", name, v))
            })
        };

        Ok(Some(match encoding {
            Encoding::Beta { offset, length } => {
                let bits = non_negative("BETA length", *length)?;
                if bits > 32 {
                    return Err(BiometalError::cram(format!(
                        "BETA length {} exceeds 32 bits",
                        bits
                    )));
                }
                Self::Beta {
                    offset: *offset,
                    bits,
                }
            }
            Encoding::Gamma { offset } => Self::Gamma { offset: *offset },
            Encoding::SubExp { offset, k } => Self::SubExp {
                offset: *offset,
                k: non_negative("SUBEXP k", *k)?,
            },
            Encoding::Golomb { offset, m } => {
                let m = non_negative("GOLOMB m", *m)?;
                if m == 0 {
                    return Err(BiometalError::cram("GOLOMB m must be positive"));
                }
                Self::Golomb { offset: *offset, m }
            }
            Encoding::GolombRice { offset, log2_m } => Self::GolombRice {
                offset: *offset,
                log2_m: non_negative("GOLOMB_RICE log2(m)", *log2_m)?,
            },
            Encoding::Huffman {
                alphabet,
                bit_lengths,
            } => Self::Huffman(CanonicalHuffman::new(alphabet, bit_lengths)?),
            _ => return Ok(None),
        }))
    }

    /// Decode one value.
    pub fn read(&self, reader: &mut BitReader<'_>) -> Result<i32> {
        match self {
            Self::Beta { offset, bits } => Ok((reader.read_bits(*bits)? as i32).wrapping_sub(*offset)),
            Self::Gamma { offset } => {
                let mut n = 0;
                while !reader.read_bit()? {
                    n += 1;
                    if n > 31 {
                        return Err(BiometalError::cram("GAMMA prefix longer than 31 bits"));
                    }
                }
                let value = (1u32 << n) | reader.read_bits(n)?;
                Ok((value as i32).wrapping_sub(*offset))
            }
            Self::SubExp { offset, k } => {
                let u = read_unary(reader)?;
                let b = if u == 0 { *k } else { u + k - 1 };
                if b > 31 {
                    return Err(BiometalError::cram("SUBEXP value exceeds 32 bits"));
                }
                let mut value = reader.read_bits(b)?;
                if u != 0 {
                    value |= 1 << b;
                }
                Ok((value as i32).wrapping_sub(*offset))
            }
            Self::Golomb { offset, m } => {
                let q = read_unary(reader)?;
                let b = bit_width(*m - 1);
                let threshold = (1u32 << b) - m;
                let mut r = if b == 0 { 0 } else { reader.read_bits(b - 1)? };
                if b > 0 && r >= threshold {
                    r = ((r << 1) | reader.read_bit()? as u32) - threshold;
                }
                Ok(((q * m + r) as i32).wrapping_sub(*offset))
            }
            Self::GolombRice { offset, log2_m } => {
                let q = read_unary(reader)?;
                let r = reader.read_bits(*log2_m)?;
                Ok((((q << log2_m) | r) as i32).wrapping_sub(*offset))
            }
            Self::Huffman(huffman) => huffman.read(reader),
        }
    }

    /// Encode one value.
    pub fn write(&self, writer: &mut BitWriter, value: i32) -> Result<()> {
        match self {
            Self::Beta { offset, bits } => {
                let v = value.wrapping_add(*offset) as u32;
                if *bits < 32 && v >> bits != 0 {
                    return Err(BiometalError::cram(format!(
                        "Value {} does not fit in {} BETA bits",
                        value, bits
                    )));
                }
                writer.write_bits(v as u64, *bits)
            }
            Self::Gamma { offset } => {
                let v = value.wrapping_add(*offset);
                if v < 1 {
                    return Err(BiometalError::cram(format!(
                        "GAMMA cannot encode {} (offset {})",
                        value, offset
                    )));
                }
                let len = bit_width(v as u32);
                writer.write_repeated(false, len - 1);
                writer.write_bits(v as u64, len)
            }
            Self::SubExp { offset, k } => {
                let v = non_negative_value(value.wrapping_add(*offset), "SUBEXP")?;
                let (b, u) = if (v as u64) < (1u64 << k) {
                    (*k, 0)
                } else {
                    let b = bit_width(v) - 1;
                    (b, b - k + 1)
                };
                writer.write_repeated(true, u);
                writer.write_bit(false);
                writer.write_bits(v as u64, b)
            }
            Self::Golomb { offset, m } => {
                let v = non_negative_value(value.wrapping_add(*offset), "GOLOMB")?;
                let (q, r) = (v / m, v % m);
                writer.write_repeated(true, q);
                writer.write_bit(false);
                let b = bit_width(*m - 1);
                let threshold = (1u32 << b) - m;
                if b == 0 {
                    Ok(())
                } else if r < threshold {
                    writer.write_bits(r as u64, b - 1)
                } else {
                    writer.write_bits((r + threshold) as u64, b)
                }
            }
            Self::GolombRice { offset, log2_m } => {
                let v = non_negative_value(value.wrapping_add(*offset), "GOLOMB_RICE")?;
                writer.write_repeated(true, v >> log2_m);
                writer.write_bit(false);
                writer.write_bits(v as u64, *log2_m)
            }
            Self::Huffman(huffman) => huffman.write(writer, value),
        }
    }
}

fn non_negative_value(v: i32, what: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| BiometalError::cram(format!("{} cannot encode negative value {}", what, v)))
}

/// Count 1 bits up to the terminating 0.
fn read_unary(reader: &mut BitReader<'_>) -> Result<u32> {
    let mut n = 0u32;
    while reader.read_bit()? {
        n += 1;
    }
    Ok(n)
}

fn incompatible(encoding: &Encoding, value_type: &str) -> BiometalError {
    BiometalError::cram(format!(
        "Encoding {:?} cannot carry {} values",
        encoding.id(),
        value_type
    ))
}

// ============================================================================
// Typed codecs
// ============================================================================

/// Codec for 32-bit integer series.
#[derive(Debug, Clone)]
pub enum IntegerCodec {
    /// No data; reads 0
    Null,
    /// ITF-8 in an external block
    External {
        /// External block content ID
        content_id: i32,
    },
    /// Core bit stream
    Core(CoreCodec),
}

impl IntegerCodec {
    /// Build from an encoding descriptor.
    pub fn from_encoding(encoding: &Encoding) -> Result<Self> {
        match encoding {
            Encoding::Null => Ok(Self::Null),
            Encoding::External { content_id } => Ok(Self::External {
                content_id: *content_id,
            }),
            _ => CoreCodec::from_encoding(encoding)?
                .map(Self::Core)
                .ok_or_else(|| incompatible(encoding, "integer")),
        }
    }

    /// Decode one value.
    pub fn read(&self, streams: &mut SliceBlocksReader<'_>) -> Result<i32> {
        match self {
            Self::Null => Ok(0),
            Self::External { content_id } => read_itf8(streams.external(*content_id)?),
            Self::Core(core) => core.read(&mut streams.core),
        }
    }

    /// Encode one value.
    pub fn write(&self, streams: &mut SliceBlocksWriter, value: i32) -> Result<()> {
        match self {
            Self::Null => Ok(()),
            Self::External { content_id } => {
                write_itf8(streams.external(*content_id), value)?;
                Ok(())
            }
            Self::Core(core) => core.write(&mut streams.core, value),
        }
    }
}

/// Codec for single-byte series.
#[derive(Debug, Clone)]
pub enum ByteCodec {
    /// No data; reads 0
    Null,
    /// Raw byte in an external block
    External {
        /// External block content ID
        content_id: i32,
    },
    /// Core bit stream
    Core(CoreCodec),
}

impl ByteCodec {
    /// Build from an encoding descriptor.
    pub fn from_encoding(encoding: &Encoding) -> Result<Self> {
        match encoding {
            Encoding::Null => Ok(Self::Null),
            Encoding::External { content_id } => Ok(Self::External {
                content_id: *content_id,
            }),
            _ => CoreCodec::from_encoding(encoding)?
                .map(Self::Core)
                .ok_or_else(|| incompatible(encoding, "byte")),
        }
    }

    /// Decode one byte.
    pub fn read(&self, streams: &mut SliceBlocksReader<'_>) -> Result<u8> {
        match self {
            Self::Null => Ok(0),
            Self::External { content_id } => streams.external(*content_id)?.byte(),
            Self::Core(core) => Ok(core.read(&mut streams.core)? as u8),
        }
    }

    /// Decode `n` bytes.
    pub fn read_many(&self, streams: &mut SliceBlocksReader<'_>, n: usize) -> Result<Vec<u8>> {
        match self {
            Self::External { content_id } => Ok(streams.external(*content_id)?.bytes(n)?.to_vec()),
            _ => (0..n).map(|_| self.read(streams)).collect(),
        }
    }

    /// Encode one byte.
    pub fn write(&self, streams: &mut SliceBlocksWriter, value: u8) -> Result<()> {
        match self {
            Self::Null => Ok(()),
            Self::External { content_id } => {
                streams.external(*content_id).push(value);
                Ok(())
            }
            Self::Core(core) => core.write(&mut streams.core, value as i32),
        }
    }

    /// Encode every byte of `values`.
    pub fn write_many(&self, streams: &mut SliceBlocksWriter, values: &[u8]) -> Result<()> {
        match self {
            Self::External { content_id } => {
                streams.external(*content_id).extend_from_slice(values);
                Ok(())
            }
            _ => values.iter().try_for_each(|&v| self.write(streams, v)),
        }
    }
}

/// Codec for byte-array series.
#[derive(Debug, Clone)]
pub enum ByteArrayCodec {
    /// Raw bytes in an external block; the caller supplies the length
    External {
        /// External block content ID
        content_id: i32,
    },
    /// Length followed by the bytes
    Len {
        /// Length codec
        len: IntegerCodec,
        /// Byte codec for the array contents
        value: ByteCodec,
    },
    /// Bytes terminated by a stop byte in an external block
    Stop {
        /// Terminator
        stop: u8,
        /// External block content ID
        content_id: i32,
    },
}

impl ByteArrayCodec {
    /// Build from an encoding descriptor.
    pub fn from_encoding(encoding: &Encoding) -> Result<Self> {
        match encoding {
            Encoding::External { content_id } => Ok(Self::External {
                content_id: *content_id,
            }),
            Encoding::ByteArrayLen {
                len_encoding,
                value_encoding,
            } => Ok(Self::Len {
                len: IntegerCodec::from_encoding(len_encoding)?,
                value: ByteCodec::from_encoding(value_encoding)?,
            }),
            Encoding::ByteArrayStop {
                stop_byte,
                content_id,
            } => Ok(Self::Stop {
                stop: *stop_byte,
                content_id: *content_id,
            }),
            _ => Err(incompatible(encoding, "byte array")),
        }
    }

    /// Decode one array. `len` is required for bare external arrays and
    /// ignored otherwise.
    pub fn read(&self, streams: &mut SliceBlocksReader<'_>, len: Option<usize>) -> Result<Vec<u8>> {
        match self {
            Self::External { content_id } => {
                let n = len.ok_or_else(|| {
                    BiometalError::InvalidConfiguration(format!(
                        "EXTERNAL byte array in block {} needs an explicit length",
                        content_id
                    ))
                })?;
                Ok(streams.external(*content_id)?.bytes(n)?.to_vec())
            }
            Self::Len { len, value } => {
                let n = len.read(streams)?;
                let n = usize::try_from(n)
                    .map_err(|_| BiometalError::cram(format!("Negative byte array length: {}", n)))?;
                value.read_many(streams, n)
            }
            Self::Stop { stop, content_id } => {
                Ok(streams.external(*content_id)?.until(*stop)?.to_vec())
            }
        }
    }

    /// Encode one array.
    pub fn write(&self, streams: &mut SliceBlocksWriter, data: &[u8]) -> Result<()> {
        match self {
            Self::External { content_id } => {
                streams.external(*content_id).extend_from_slice(data);
                Ok(())
            }
            Self::Len { len, value } => {
                len.write(streams, data.len() as i32)?;
                value.write_many(streams, data)
            }
            Self::Stop { stop, content_id } => {
                if data.contains(stop) {
                    return Err(BiometalError::cram(format!(
                        "Byte array contains its stop byte {:#04x}",
                        stop
                    )));
                }
                let out = streams.external(*content_id);
                out.extend_from_slice(data);
                out.push(*stop);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn core_roundtrip(codec: &CoreCodec, values: &[i32]) -> Vec<u8> {
        let mut writer = BitWriter::new();
        for &v in values {
            codec.write(&mut writer, v).unwrap();
        }
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        for &v in values {
            assert_eq!(codec.read(&mut reader).unwrap(), v, "{:?}", codec);
        }
        bytes
    }

    // ========================================================================
    // Huffman
    // ========================================================================

    #[test]
    fn test_huffman_canonical_codes() {
        // lengths: A=1, B=2, C=3, D=3 -> 0, 10, 110, 111
        let huffman = CanonicalHuffman::new(&[68, 67, 66, 65], &[3, 3, 2, 1]).unwrap();
        let mut writer = BitWriter::new();
        for s in [65, 66, 67, 68] {
            huffman.write(&mut writer, s).unwrap();
        }
        assert_eq!(writer.finish(), vec![0b0101_1011, 0b1000_0000]);
    }

    #[test]
    fn test_huffman_single_symbol_zero_bits() {
        let codec = CoreCodec::from_encoding(&Encoding::constant(42)).unwrap().unwrap();
        let bytes = core_roundtrip(&codec, &[42, 42, 42]);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_huffman_symbol_not_in_alphabet() {
        let huffman = CanonicalHuffman::new(&[1, 2], &[1, 1]).unwrap();
        assert!(huffman.write(&mut BitWriter::new(), 3).is_err());
    }

    #[test]
    fn test_huffman_over_subscribed() {
        assert!(CanonicalHuffman::new(&[1, 2, 3], &[1, 1, 1]).is_err());
    }

    // ========================================================================
    // Core codecs
    // ========================================================================

    #[test]
    fn test_beta_layout() {
        let codec = CoreCodec::Beta { offset: 0, bits: 4 };
        let bytes = core_roundtrip(&codec, &[0xA, 0x5]);
        assert_eq!(bytes, vec![0xA5]);
    }

    #[test]
    fn test_beta_value_too_large() {
        let codec = CoreCodec::Beta { offset: 0, bits: 3 };
        assert!(codec.write(&mut BitWriter::new(), 8).is_err());
    }

    #[test]
    fn test_gamma_layout() {
        // 5 = 101 -> 00 101
        let codec = CoreCodec::Gamma { offset: 0 };
        let bytes = core_roundtrip(&codec, &[5]);
        assert_eq!(bytes, vec![0b0010_1000]);
    }

    #[test]
    fn test_gamma_offset() {
        let codec = CoreCodec::Gamma { offset: 1 };
        core_roundtrip(&codec, &[0, 1, 2, 1000]);
    }

    #[test]
    fn test_subexp_layout() {
        // k=2: 3 -> 0 11; 9 -> b=3 u=2 -> 110 001
        let codec = CoreCodec::SubExp { offset: 0, k: 2 };
        let bytes = core_roundtrip(&codec, &[3, 9]);
        assert_eq!(bytes, vec![0b0111_1000, 0b1000_0000]);
    }

    #[test]
    fn test_golomb_truncated_binary() {
        // m=5: b=3, threshold=3; r<3 uses 2 bits, r>=3 uses 3 bits
        let codec = CoreCodec::Golomb { offset: 0, m: 5 };
        core_roundtrip(&codec, &[0, 1, 2, 3, 4, 5, 9, 23]);
    }

    #[test]
    fn test_golomb_m_one_is_unary() {
        let codec = CoreCodec::Golomb { offset: 0, m: 1 };
        let bytes = core_roundtrip(&codec, &[3]);
        assert_eq!(bytes, vec![0b1110_0000]);
    }

    #[test]
    fn test_golomb_rice() {
        let codec = CoreCodec::GolombRice { offset: 0, log2_m: 2 };
        let bytes = core_roundtrip(&codec, &[6]);
        // q=1 -> 10, r=2 -> 10
        assert_eq!(bytes, vec![0b1010_0000]);
    }

    #[test]
    fn test_negative_rejected() {
        let codec = CoreCodec::GolombRice { offset: 0, log2_m: 2 };
        assert!(codec.write(&mut BitWriter::new(), -1).is_err());
    }

    // ========================================================================
    // Typed codecs
    // ========================================================================

    #[test]
    fn test_typed_codecs_through_streams() {
        let int = IntegerCodec::from_encoding(&Encoding::External { content_id: 1 }).unwrap();
        let core_int = IntegerCodec::from_encoding(&Encoding::Beta { offset: 0, length: 8 }).unwrap();
        let stop = ByteArrayCodec::from_encoding(&Encoding::ByteArrayStop {
            stop_byte: b'\t',
            content_id: 3,
        })
        .unwrap();
        let len = ByteArrayCodec::from_encoding(&Encoding::ByteArrayLen {
            len_encoding: Box::new(Encoding::External { content_id: 4 }),
            value_encoding: Box::new(Encoding::External { content_id: 5 }),
        })
        .unwrap();
        let bytes = ByteCodec::from_encoding(&Encoding::External { content_id: 6 }).unwrap();

        let mut writer = SliceBlocksWriter::default();
        int.write(&mut writer, 300).unwrap();
        core_int.write(&mut writer, 200).unwrap();
        stop.write(&mut writer, b"read1").unwrap();
        len.write(&mut writer, b"ACGT").unwrap();
        bytes.write_many(&mut writer, b"IIII").unwrap();

        let (core, external) = writer.finish();
        let external: HashMap<i32, Vec<u8>> = external.into_iter().collect();
        let mut reader = SliceBlocksReader::new(&core, &external);
        assert_eq!(int.read(&mut reader).unwrap(), 300);
        assert_eq!(core_int.read(&mut reader).unwrap(), 200);
        assert_eq!(stop.read(&mut reader, None).unwrap(), b"read1");
        assert_eq!(len.read(&mut reader, None).unwrap(), b"ACGT");
        assert_eq!(bytes.read_many(&mut reader, 4).unwrap(), b"IIII");
    }

    #[test]
    fn test_external_byte_array_needs_length() {
        let codec = ByteArrayCodec::from_encoding(&Encoding::External { content_id: 1 }).unwrap();
        let external = HashMap::from([(1, vec![1, 2, 3])]);
        let mut reader = SliceBlocksReader::new(&[], &external);
        assert!(matches!(
            codec.read(&mut reader, None),
            Err(BiometalError::InvalidConfiguration(_))
        ));
        assert_eq!(codec.read(&mut reader, Some(2)).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_incompatible_encoding() {
        let encoding = Encoding::ByteArrayStop {
            stop_byte: 0,
            content_id: 1,
        };
        assert!(IntegerCodec::from_encoding(&encoding).is_err());
        assert!(ByteArrayCodec::from_encoding(&Encoding::Gamma { offset: 0 }).is_err());
    }

    proptest! {
        #[test]
        fn prop_core_codecs_roundtrip(values in proptest::collection::vec(0i32..100_000, 1..50)) {
            let codecs = [
                CoreCodec::Gamma { offset: 1 },
                CoreCodec::SubExp { offset: 0, k: 3 },
                CoreCodec::Golomb { offset: 0, m: 7 },
                CoreCodec::GolombRice { offset: 0, log2_m: 6 },
                CoreCodec::Beta { offset: 0, bits: 17 },
            ];
            for codec in codecs.iter() {
                let mut writer = BitWriter::new();
                for &v in &values {
                    codec.write(&mut writer, v).unwrap();
                }
                let bytes = writer.finish();
                let mut reader = BitReader::new(&bytes);
                for &v in &values {
                    prop_assert_eq!(codec.read(&mut reader).unwrap(), v);
                }
            }
        }
    }
}
