//! MSB-first bit streams for core-block encodings (Huffman, Beta, Gamma, ...).

use crate::{BiometalError, Result};

/// Bit-level reader over a borrowed core block.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8, // 0-7, position within current byte
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self.data.get(self.byte_pos).ok_or_else(|| {
            BiometalError::cram("Attempted to read past end of core block")
        })?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;

        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(bit == 1)
    }

    /// Read up to 32 bits as a u32, MSB first. Reading zero bits returns 0.
    pub fn read_bits(&mut self, num_bits: u32) -> Result<u32> {
        if num_bits > 32 {
            return Err(BiometalError::cram(format!(
                "Invalid bit count: {}",
                num_bits
            )));
        }
        Ok(self.read_long_bits(num_bits)? as u32)
    }

    /// Read up to 64 bits as a u64, MSB first.
    pub fn read_long_bits(&mut self, num_bits: u32) -> Result<u64> {
        if num_bits > 64 {
            return Err(BiometalError::cram(format!(
                "Invalid bit count: {}",
                num_bits
            )));
        }

        let mut result: u64 = 0;
        let mut bits_remaining = num_bits;

        while bits_remaining > 0 {
            let current_byte = *self.data.get(self.byte_pos).ok_or_else(|| {
                BiometalError::cram("Attempted to read past end of core block")
            })?;

            let bits_available = 8 - self.bit_pos as u32;
            let bits_to_read = bits_remaining.min(bits_available);

            let shift = bits_available - bits_to_read;
            let mask = ((1u16 << bits_to_read) - 1) as u8;
            let bits = (current_byte >> shift) & mask;

            result = (result << bits_to_read) | bits as u64;

            self.bit_pos += bits_to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }

            bits_remaining -= bits_to_read;
        }

        Ok(result)
    }

    /// Bytes consumed so far, counting a partially read byte.
    pub fn byte_position(&self) -> usize {
        if self.bit_pos > 0 {
            self.byte_pos + 1
        } else {
            self.byte_pos
        }
    }
}

/// Bit-level writer producing a core block.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    current: u8,
    filled: u8,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | bit as u8;
        self.filled += 1;
        if self.filled == 8 {
            self.buf.push(self.current);
            self.current = 0;
            self.filled = 0;
        }
    }

    /// Append the low `num_bits` bits of `value`, MSB first.
    pub fn write_bits(&mut self, value: u64, num_bits: u32) -> Result<()> {
        if num_bits > 64 {
            return Err(BiometalError::cram(format!(
                "Invalid bit count: {}",
                num_bits
            )));
        }
        for i in (0..num_bits).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Append `count` copies of `bit`.
    pub fn write_repeated(&mut self, bit: bool, count: u32) {
        for _ in 0..count {
            self.write_bit(bit);
        }
    }

    /// Whether any bit has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.filled == 0
    }

    /// Flush pending bits, zero-padded to a byte boundary, and return the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            self.buf.push(self.current << (8 - self.filled));
        }
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_msb_first() {
        let data = [0b1011_0010, 0b0111_1111];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(3).unwrap(), 0b011);
        assert_eq!(reader.read_bits(8).unwrap(), 0b0010_0111);
        assert_eq!(reader.byte_position(), 2);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1111);
        assert_eq!(reader.byte_position(), 2);
    }

    #[test]
    fn test_read_zero_bits() {
        let mut reader = BitReader::new(&[]);
        assert_eq!(reader.read_bits(0).unwrap(), 0);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        reader.read_bits(8).unwrap();
        assert!(reader.read_bit().is_err());
    }

    #[test]
    fn test_writer_pads_with_zeros() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3).unwrap();
        assert_eq!(writer.finish(), vec![0b1010_0000]);
    }

    #[test]
    fn test_writer_reader_roundtrip() {
        let mut writer = BitWriter::new();
        writer.write_bits(0xDEAD_BEEF, 32).unwrap();
        writer.write_bit(true);
        writer.write_bits(0x1_2345_6789, 36).unwrap();
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(32).unwrap(), 0xDEAD_BEEF);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_long_bits(36).unwrap(), 0x1_2345_6789);
    }
}
