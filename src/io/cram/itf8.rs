//! ITF-8 and LTF-8 variable-length integers.
//!
//! # Format
//!
//! ITF-8 stores a 32-bit integer in 1-5 bytes. The number of leading 1 bits
//! in the first byte gives the number of continuation bytes:
//!
//! ```text
//! 0xxxxxxx                                      7 bits
//! 10xxxxxx xxxxxxxx                            14 bits
//! 110xxxxx xxxxxxxx xxxxxxxx                   21 bits
//! 1110xxxx xxxxxxxx xxxxxxxx xxxxxxxx          28 bits
//! 1111xxxx xxxxxxxx xxxxxxxx xxxxxxxx ----xxxx 32 bits
//! ```
//!
//! In the 5-byte form only the low nibble of the last byte carries data.
//! LTF-8 is the 64-bit sibling (1-9 bytes) used for record counters and
//! base counts.
//!
//! Negative values are stored as their two's complement `u32`, so `-1`
//! encodes as `ff ff ff ff 0f`.

use crate::{BiometalError, Result};
use std::io::{Read, Write};

fn read_u8<R: Read>(reader: &mut R, what: &str) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).map_err(|e| BiometalError::InvalidCramFormat {
        msg: format!("Failed to read {}: {}", what, e),
    })?;
    Ok(buf[0])
}

/// Decode an ITF-8 integer.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use biometal_cram::io::cram::read_itf8;
///
/// let mut reader = Cursor::new(vec![0x81, 0x42]);
/// assert_eq!(read_itf8(&mut reader).unwrap(), 0x142);
/// ```
pub fn read_itf8<R: Read>(reader: &mut R) -> Result<i32> {
    let first = read_u8(reader, "ITF-8 first byte")? as u32;

    let value = if first & 0x80 == 0 {
        first
    } else if first & 0x40 == 0 {
        let b1 = read_u8(reader, "ITF-8 byte 2")? as u32;
        ((first & 0x3F) << 8) | b1
    } else if first & 0x20 == 0 {
        let mut bytes = [0u8; 2];
        reader.read_exact(&mut bytes).map_err(|e| BiometalError::InvalidCramFormat {
            msg: format!("Failed to read ITF-8 bytes 2-3: {}", e),
        })?;
        ((first & 0x1F) << 16) | ((bytes[0] as u32) << 8) | bytes[1] as u32
    } else if first & 0x10 == 0 {
        let mut bytes = [0u8; 3];
        reader.read_exact(&mut bytes).map_err(|e| BiometalError::InvalidCramFormat {
            msg: format!("Failed to read ITF-8 bytes 2-4: {}", e),
        })?;
        ((first & 0x0F) << 24)
            | ((bytes[0] as u32) << 16)
            | ((bytes[1] as u32) << 8)
            | bytes[2] as u32
    } else {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes).map_err(|e| BiometalError::InvalidCramFormat {
            msg: format!("Failed to read ITF-8 bytes 2-5: {}", e),
        })?;
        ((first & 0x0F) << 28)
            | ((bytes[0] as u32) << 20)
            | ((bytes[1] as u32) << 12)
            | ((bytes[2] as u32) << 4)
            | (bytes[3] as u32 & 0x0F)
    };

    Ok(value as i32)
}

/// Number of bytes [`write_itf8`] uses for `value`.
pub fn itf8_size(value: i32) -> usize {
    let v = value as u32;
    if v >> 7 == 0 {
        1
    } else if v >> 14 == 0 {
        2
    } else if v >> 21 == 0 {
        3
    } else if v >> 28 == 0 {
        4
    } else {
        5
    }
}

/// Encode an ITF-8 integer, returning the number of bytes written.
pub fn write_itf8<W: Write>(writer: &mut W, value: i32) -> Result<usize> {
    let v = value as u32;
    let mut buf = [0u8; 5];
    let n = itf8_size(value);

    match n {
        1 => buf[0] = v as u8,
        2 => {
            buf[0] = 0x80 | (v >> 8) as u8;
            buf[1] = v as u8;
        }
        3 => {
            buf[0] = 0xC0 | (v >> 16) as u8;
            buf[1] = (v >> 8) as u8;
            buf[2] = v as u8;
        }
        4 => {
            buf[0] = 0xE0 | (v >> 24) as u8;
            buf[1] = (v >> 16) as u8;
            buf[2] = (v >> 8) as u8;
            buf[3] = v as u8;
        }
        _ => {
            buf[0] = 0xF0 | (v >> 28) as u8;
            buf[1] = (v >> 20) as u8;
            buf[2] = (v >> 12) as u8;
            buf[3] = (v >> 4) as u8;
            buf[4] = (v & 0x0F) as u8;
        }
    }

    writer.write_all(&buf[..n])?;
    Ok(n)
}

/// Decode an LTF-8 integer (1-9 bytes).
pub fn read_ltf8<R: Read>(reader: &mut R) -> Result<i64> {
    let first = read_u8(reader, "LTF-8 first byte")?;
    let num_bytes = first.leading_ones() as usize + 1;

    if num_bytes == 1 {
        return Ok(first as i64);
    }

    let mut bytes = [0u8; 8];
    let rest = &mut bytes[..num_bytes - 1];
    reader.read_exact(rest).map_err(|e| BiometalError::InvalidCramFormat {
        msg: format!("Failed to read LTF-8 bytes 2-{}: {}", num_bytes, e),
    })?;

    // The 8- and 9-byte forms carry no payload bits in the first byte
    let mut value: u64 = if num_bytes >= 8 {
        0
    } else {
        (first & (0xFF >> num_bytes)) as u64
    };
    for &byte in rest.iter() {
        value = (value << 8) | byte as u64;
    }

    Ok(value as i64)
}

/// Number of bytes [`write_ltf8`] uses for `value`.
pub fn ltf8_size(value: i64) -> usize {
    let v = value as u64;
    (1..=8).find(|&n| v >> (7 * n) == 0).unwrap_or(9)
}

/// Encode an LTF-8 integer, returning the number of bytes written.
pub fn write_ltf8<W: Write>(writer: &mut W, value: i64) -> Result<usize> {
    let v = value as u64;
    let n = ltf8_size(value);
    let mut buf = [0u8; 9];

    match n {
        1 => buf[0] = v as u8,
        9 => {
            buf[0] = 0xFF;
            buf[1..9].copy_from_slice(&v.to_be_bytes());
        }
        8 => {
            buf[0] = 0xFE;
            buf[1..8].copy_from_slice(&v.to_be_bytes()[1..]);
        }
        _ => {
            // n-1 leading 1 bits, one 0 bit, then the high payload bits
            let prefix = !(0xFFu8 >> (n - 1));
            buf[0] = prefix | (v >> (8 * (n - 1))) as u8;
            for i in 1..n {
                buf[i] = (v >> (8 * (n - 1 - i))) as u8;
            }
        }
    }

    writer.write_all(&buf[..n])?;
    Ok(n)
}
