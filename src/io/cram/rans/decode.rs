//! rANS 4x8 decoder.

use super::frequencies::{read_frequencies_order0, read_frequencies_order1, ByteCursor, DecodingTable};
use super::{LOWER_BOUND, TOTAL_FREQ_SHIFT};
use crate::Result;

const SLOT_MASK: u32 = (1 << TOTAL_FREQ_SHIFT) - 1;

struct Lanes<'a> {
    states: [u32; 4],
    cursor: ByteCursor<'a>,
}

impl<'a> Lanes<'a> {
    fn new(mut cursor: ByteCursor<'a>) -> Result<Self> {
        let mut states = [0u32; 4];
        for state in states.iter_mut() {
            *state = cursor.read_u32_le()?;
        }
        Ok(Self { states, cursor })
    }

    /// Decode one symbol on `lane` without renormalizing.
    fn step(&mut self, lane: usize, table: &DecodingTable) -> Result<u8> {
        let x = self.states[lane];
        let (symbol, start, freq) = table.symbol_at(x & SLOT_MASK)?;
        self.states[lane] = freq * (x >> TOTAL_FREQ_SHIFT) + (x & SLOT_MASK) - start;
        Ok(symbol)
    }

    fn renormalize(&mut self, lane: usize) -> Result<()> {
        while self.states[lane] < LOWER_BOUND {
            self.states[lane] = (self.states[lane] << 8) | self.cursor.next()? as u32;
        }
        Ok(())
    }
}

pub(super) fn uncompress_order0(cursor: ByteCursor<'_>, out: &mut [u8]) -> Result<()> {
    let mut cursor = cursor;
    let table = read_frequencies_order0(&mut cursor)?;
    let mut lanes = Lanes::new(cursor)?;

    let out_end = out.len() & !3;
    for chunk in out[..out_end].chunks_exact_mut(4) {
        for (lane, byte) in chunk.iter_mut().enumerate() {
            *byte = lanes.step(lane, &table)?;
        }
        for lane in 0..4 {
            lanes.renormalize(lane)?;
        }
    }

    for (lane, byte) in out[out_end..].iter_mut().enumerate() {
        *byte = lanes.step(lane, &table)?;
        lanes.renormalize(lane)?;
    }

    Ok(())
}

pub(super) fn uncompress_order1(cursor: ByteCursor<'_>, out: &mut [u8]) -> Result<()> {
    let mut cursor = cursor;
    let tables = read_frequencies_order1(&mut cursor)?;
    let mut lanes = Lanes::new(cursor)?;

    let quarter = out.len() >> 2;
    let mut last = [0u8; 4];

    for i in 0..quarter {
        for lane in 0..4 {
            let c = lanes.step(lane, &tables[last[lane] as usize])?;
            out[lane * quarter + i] = c;
            last[lane] = c;
        }
        for lane in 0..4 {
            lanes.renormalize(lane)?;
        }
    }

    for byte in out[4 * quarter..].iter_mut() {
        let c = lanes.step(3, &tables[last[3] as usize])?;
        lanes.renormalize(3)?;
        *byte = c;
        last[3] = c;
    }

    Ok(())
}
