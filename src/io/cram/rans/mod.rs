//! rANS 4x8 entropy coder (CRAM 3.0 block method 4).
//!
//! # Format
//!
//! ```text
//! ┌───────┬──────────────────┬────────────────┬────────────┬─────────┐
//! │ order │ compressed (u32) │ raw size (u32) │ freq table │ payload │
//! │  u8   │  LE, table+data  │       LE       │  RLE coded │         │
//! └───────┴──────────────────┴────────────────┴────────────┴─────────┘
//! ```
//!
//! The payload starts with four little-endian 32-bit states, one per
//! interleaved lane. Order-0 lanes take every fourth byte; order-1 lanes take
//! contiguous quarters of the output and model each byte conditioned on the
//! byte before it.
//!
//! # Example
//!
//! ```
//! use biometal_cram::io::cram::rans::{compress, decompress, RansOrder};
//!
//! let data = b"ACGTACGTACGTNNNN".repeat(16);
//! let packed = compress(&data, RansOrder::One);
//! assert_eq!(decompress(&packed).unwrap(), data);
//! ```

mod decode;
mod encode;
mod frequencies;

use crate::{BiometalError, Result};
use frequencies::ByteCursor;

/// Normalized frequencies of each context sum to this value.
pub const TOTAL_FREQ: u32 = 1 << TOTAL_FREQ_SHIFT;
pub(crate) const TOTAL_FREQ_SHIFT: u32 = 12;
/// Renormalization lower bound for the coder state.
pub(crate) const LOWER_BOUND: u32 = 1 << 23;
pub(crate) const NUMBER_OF_SYMBOLS: usize = 256;
/// order (1) + compressed size (4) + raw size (4)
pub(crate) const PREFIX_LEN: usize = 9;

// Order-1 needs at least one byte per lane
const MINIMUM_ORDER_1_SIZE: usize = 4;

/// Context model order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RansOrder {
    /// Independent byte frequencies
    Zero = 0,
    /// Byte frequencies conditioned on the previous byte
    One = 1,
}

impl TryFrom<u8> for RansOrder {
    type Error = BiometalError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RansOrder::Zero),
            1 => Ok(RansOrder::One),
            n => Err(BiometalError::cram(format!("Unknown rANS order: {}", n))),
        }
    }
}

/// Compress `input`. Empty input yields empty output; inputs shorter than
/// four bytes always use order-0.
pub fn compress(input: &[u8], order: RansOrder) -> Vec<u8> {
    if input.is_empty() {
        return Vec::new();
    }
    if input.len() < MINIMUM_ORDER_1_SIZE {
        return encode::compress_order0(input);
    }
    match order {
        RansOrder::Zero => encode::compress_order0(input),
        RansOrder::One => encode::compress_order1(input),
    }
}

/// Decompress a rANS 4x8 stream.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    decompress_checked(input, None)
}

/// Decompress a rANS 4x8 stream whose raw size is already known, as for a
/// block. A stream declaring any other size is rejected before its output
/// buffer is allocated.
pub fn decompress_exact(input: &[u8], raw_size: usize) -> Result<Vec<u8>> {
    decompress_checked(input, Some(raw_size))
}

fn decompress_checked(input: &[u8], expected_len: Option<usize>) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = ByteCursor::new(input);
    let order = RansOrder::try_from(cursor.next()?)?;
    let compressed_len = cursor.read_u32_le()? as usize;
    if input.len() < PREFIX_LEN || compressed_len != input.len() - PREFIX_LEN {
        return Err(BiometalError::cram(format!(
            "Invalid rANS compressed length {} for {} byte stream",
            compressed_len,
            input.len()
        )));
    }
    let raw_len = cursor.read_u32_le()? as usize;
    if let Some(expected) = expected_len.filter(|&n| n != raw_len) {
        return Err(BiometalError::cram(format!(
            "rANS stream declares {} raw bytes, expected {}",
            raw_len, expected
        )));
    }

    cram_debug!("rANS order {:?}: {} -> {} bytes", order, input.len(), raw_len);

    let mut out = vec![0u8; raw_len];
    match order {
        RansOrder::Zero => decode::uncompress_order0(cursor, &mut out)?,
        RansOrder::One => decode::uncompress_order1(cursor, &mut out)?,
    }
    Ok(out)
}
