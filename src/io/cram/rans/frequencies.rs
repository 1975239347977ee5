//! Symbol statistics for rANS 4x8: normalization to [`TOTAL_FREQ`] and the
//! run-length coded frequency tables stored ahead of the payload.

use super::{TOTAL_FREQ, NUMBER_OF_SYMBOLS};
use crate::{BiometalError, Result};

/// Normalized frequencies for one context.
pub(crate) type Frequencies = [i32; NUMBER_OF_SYMBOLS];

/// Order-0 statistics scaled so that present symbols sum to 4096.
///
/// Scaling uses the fixed-point multiplier `((4096 << 31) / T) + ((1 << 30) / T)`;
/// the first symbol with the highest raw count absorbs the rounding error.
pub(crate) fn normalize_order0(input: &[u8]) -> Frequencies {
    let mut freqs = [0i32; NUMBER_OF_SYMBOLS];
    for &b in input {
        freqs[b as usize] += 1;
    }

    let total = input.len() as i64;
    let (mut max_count, mut max_symbol) = (0, 0);
    for (symbol, &count) in freqs.iter().enumerate() {
        if max_count < count {
            max_count = count;
            max_symbol = symbol;
        }
    }

    let tr = ((TOTAL_FREQ as i64) << 31) / total + (1i64 << 30) / total;
    let mut fsum = 0;
    for f in freqs.iter_mut().filter(|f| **f != 0) {
        *f = ((*f as i64 * tr) >> 31) as i32;
        if *f == 0 {
            *f = 1;
        }
        fsum += *f;
    }

    freqs[max_symbol] += TOTAL_FREQ as i32 - fsum;
    freqs
}

/// Order-1 statistics: one table per preceding byte (initial context 0).
///
/// The first byte of each of lanes 1-3 is additionally counted in context 0,
/// since those lanes start decoding with a zero context.
pub(crate) fn normalize_order1(input: &[u8]) -> Vec<Frequencies> {
    let mut freqs = vec![[0i32; NUMBER_OF_SYMBOLS]; NUMBER_OF_SYMBOLS];
    let mut totals = [0i32; NUMBER_OF_SYMBOLS];

    let mut last = 0usize;
    for &b in input {
        freqs[last][b as usize] += 1;
        totals[last] += 1;
        last = b as usize;
    }

    let quarter = input.len() >> 2;
    for lane in 1..4 {
        freqs[0][input[lane * quarter] as usize] += 1;
    }
    totals[0] += 3;

    for (context, table) in freqs.iter_mut().enumerate() {
        if totals[context] == 0 {
            continue;
        }

        let p = TOTAL_FREQ as f64 / totals[context] as f64;
        let (mut max_count, mut max_symbol, mut t2) = (0, 0, 0);
        for (symbol, f) in table.iter_mut().enumerate() {
            if *f == 0 {
                continue;
            }
            if max_count < *f {
                max_count = *f;
                max_symbol = symbol;
            }
            *f = (*f as f64 * p) as i32;
            if *f == 0 {
                *f = 1;
            }
            t2 += *f;
        }

        table[max_symbol] += TOTAL_FREQ as i32 - t2;
    }

    freqs
}

/// Write the symbol list with its run-length shortcut.
///
/// After two consecutive present symbols the writer stores how many further
/// consecutive symbols follow, and omits their bytes.
fn write_symbol_table(out: &mut Vec<u8>, present: impl Fn(usize) -> bool, mut emit: impl FnMut(&mut Vec<u8>, usize)) {
    let mut rle = 0;
    for j in 0..NUMBER_OF_SYMBOLS {
        if !present(j) {
            continue;
        }
        if rle != 0 {
            rle -= 1;
        } else {
            out.push(j as u8);
            if j != 0 && present(j - 1) {
                rle = (j + 1..NUMBER_OF_SYMBOLS).take_while(|&k| present(k)).count();
                out.push(rle as u8);
            }
        }
        emit(out, j);
    }
    out.push(0);
}

fn write_frequency(out: &mut Vec<u8>, f: i32) {
    if f < 128 {
        out.push(f as u8);
    } else {
        out.push(0x80 | (f >> 8) as u8);
        out.push((f & 0xFF) as u8);
    }
}

/// Serialize an order-0 frequency table.
pub(crate) fn write_frequencies_order0(out: &mut Vec<u8>, freqs: &Frequencies) {
    write_symbol_table(out, |j| freqs[j] != 0, |out, j| write_frequency(out, freqs[j]));
}

/// Serialize the order-1 tables: contexts with the same RLE scheme, each
/// followed by its own order-0 style table.
pub(crate) fn write_frequencies_order1(out: &mut Vec<u8>, freqs: &[Frequencies]) {
    let totals: Vec<i32> = freqs.iter().map(|t| t.iter().sum()).collect();
    write_symbol_table(
        out,
        |i| totals[i] != 0,
        |out, i| write_frequencies_order0(out, &freqs[i]),
    );
}

/// Cumulative frequency table with reverse lookup, used while decoding.
#[derive(Debug, Clone, Default)]
pub(crate) struct DecodingTable {
    pub(crate) freq: Vec<u32>,
    pub(crate) start: Vec<u32>,
    /// Slot (0..4096) to symbol; only `total` slots are populated
    pub(crate) lookup: Vec<u8>,
    pub(crate) total: u32,
}

impl DecodingTable {
    fn new() -> Self {
        Self {
            freq: vec![0; NUMBER_OF_SYMBOLS],
            start: vec![0; NUMBER_OF_SYMBOLS],
            lookup: vec![0; TOTAL_FREQ as usize],
            total: 0,
        }
    }

    fn push(&mut self, symbol: usize, f: u32) -> Result<()> {
        let end = self.total + f;
        if end > TOTAL_FREQ {
            return Err(BiometalError::cram(format!(
                "rANS frequency table exceeds {} (symbol {} pushes total to {})",
                TOTAL_FREQ, symbol, end
            )));
        }
        self.freq[symbol] = f;
        self.start[symbol] = self.total;
        self.lookup[self.total as usize..end as usize].fill(symbol as u8);
        self.total = end;
        Ok(())
    }

    /// Symbol owning `slot`, with its start and frequency.
    pub(crate) fn symbol_at(&self, slot: u32) -> Result<(u8, u32, u32)> {
        if slot >= self.total {
            return Err(BiometalError::cram(format!(
                "rANS state slot {} outside frequency table (total {})",
                slot, self.total
            )));
        }
        let symbol = self.lookup[slot as usize];
        Ok((symbol, self.start[symbol as usize], self.freq[symbol as usize]))
    }
}

/// Bounds-checked cursor over the compressed stream.
pub(crate) struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn next(&mut self) -> Result<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    pub(crate) fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| BiometalError::cram("Truncated rANS stream"))
    }

    pub(crate) fn read_u32_le(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        for b in bytes.iter_mut() {
            *b = self.next()?;
        }
        Ok(u32::from_le_bytes(bytes))
    }
}

/// Walk a run-length coded symbol list, calling `entry` for each symbol.
fn read_symbol_table(
    cursor: &mut ByteCursor<'_>,
    mut entry: impl FnMut(&mut ByteCursor<'_>, usize) -> Result<()>,
) -> Result<()> {
    let mut rle = 0u32;
    let mut symbol = cursor.next()? as usize;

    loop {
        entry(cursor, symbol)?;

        if rle == 0 && symbol + 1 == cursor.peek()? as usize {
            symbol = cursor.next()? as usize;
            rle = cursor.next()? as u32;
        } else if rle != 0 {
            rle -= 1;
            symbol += 1;
            if symbol >= NUMBER_OF_SYMBOLS {
                return Err(BiometalError::cram("rANS symbol run exceeds 255"));
            }
        } else {
            symbol = cursor.next()? as usize;
        }

        if symbol == 0 {
            return Ok(());
        }
    }
}

fn read_frequency(cursor: &mut ByteCursor<'_>) -> Result<u32> {
    let f = cursor.next()? as u32;
    if f >= 0x80 {
        Ok(((f & 0x7F) << 8) | cursor.next()? as u32)
    } else {
        Ok(f)
    }
}

/// Parse an order-0 frequency table.
pub(crate) fn read_frequencies_order0(cursor: &mut ByteCursor<'_>) -> Result<DecodingTable> {
    let mut table = DecodingTable::new();
    read_symbol_table(cursor, |cursor, symbol| {
        let f = read_frequency(cursor)?;
        table.push(symbol, f)
    })?;
    Ok(table)
}

/// Parse the order-1 tables; contexts absent from the stream stay empty.
pub(crate) fn read_frequencies_order1(cursor: &mut ByteCursor<'_>) -> Result<Vec<DecodingTable>> {
    let mut tables = vec![DecodingTable::default(); NUMBER_OF_SYMBOLS];
    read_symbol_table(cursor, |cursor, context| {
        let mut table = DecodingTable::new();
        read_symbol_table(cursor, |cursor, symbol| {
            // A zero frequency in an order-1 table stands for the full range
            let f = match read_frequency(cursor)? {
                0 => TOTAL_FREQ,
                f => f,
            };
            table.push(symbol, f)
        })?;
        tables[context] = table;
        Ok(())
    })?;
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order0_sums_to_total() {
        let input = b"the quick brown fox jumps over the lazy dog";
        let freqs = normalize_order0(input);
        assert_eq!(freqs.iter().sum::<i32>(), TOTAL_FREQ as i32);
        for &b in input.iter() {
            assert!(freqs[b as usize] > 0);
        }
    }

    #[test]
    fn test_order0_rare_symbol_kept() {
        let mut input = vec![b'A'; 100_000];
        input.push(b'Z');
        let freqs = normalize_order0(&input);
        assert_eq!(freqs[b'Z' as usize], 1);
        assert_eq!(freqs[b'A' as usize], 4095);
    }

    #[test]
    fn test_order1_contexts_sum_to_total() {
        let input = b"ACGTACGTTTGACCA";
        let freqs = normalize_order1(input);
        for table in freqs.iter() {
            let sum: i32 = table.iter().sum();
            assert!(sum == 0 || sum == TOTAL_FREQ as i32);
        }
    }

    #[test]
    fn test_table_rle_layout() {
        let mut freqs = [0i32; NUMBER_OF_SYMBOLS];
        freqs[b'A' as usize] = 1024;
        freqs[b'B' as usize] = 1024;
        freqs[b'C' as usize] = 1024;
        freqs[b'D' as usize] = 1024;
        let mut out = Vec::new();
        write_frequencies_order0(&mut out, &freqs);
        // 'A' f, 'B' run=2 f, f, f, terminator
        assert_eq!(
            out,
            vec![0x41, 0x84, 0x00, 0x42, 0x02, 0x84, 0x00, 0x84, 0x00, 0x84, 0x00, 0x00]
        );

        let table = read_frequencies_order0(&mut ByteCursor::new(&out)).unwrap();
        assert_eq!(table.total, TOTAL_FREQ);
        assert_eq!(table.start[b'C' as usize], 2048);
        assert_eq!(table.symbol_at(3000).unwrap().0, b'C');
    }

    #[test]
    fn test_table_over_total_rejected() {
        // 'A' = 4000, 'C' = 4000
        let bytes = [0x41, 0x8F, 0xA0, 0x43, 0x8F, 0xA0, 0x00];
        assert!(read_frequencies_order0(&mut ByteCursor::new(&bytes)).is_err());
    }

    #[test]
    fn test_table_truncated() {
        let bytes = [0x41, 0x8F];
        assert!(read_frequencies_order0(&mut ByteCursor::new(&bytes)).is_err());
    }
}
