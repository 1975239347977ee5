//! rANS 4x8 encoder.
//!
//! Symbols are encoded last-to-first. Renormalization bytes are collected in
//! emission order, the four final states are appended big-endian, and the
//! whole payload is reversed so that the decoder reads it front-to-back.

use super::frequencies::{
    normalize_order0, normalize_order1, write_frequencies_order0, write_frequencies_order1,
    Frequencies,
};
use super::{RansOrder, LOWER_BOUND, NUMBER_OF_SYMBOLS, PREFIX_LEN, TOTAL_FREQ_SHIFT};

#[derive(Debug, Clone, Copy, Default)]
struct EncodingSymbol {
    start: u32,
    freq: u32,
}

impl EncodingSymbol {
    fn put(self, x: u32, out: &mut Vec<u8>) -> u32 {
        let x_max = ((LOWER_BOUND >> TOTAL_FREQ_SHIFT) << 8) * self.freq;
        let mut x = x;
        while x >= x_max {
            out.push((x & 0xFF) as u8);
            x >>= 8;
        }
        ((x / self.freq) << TOTAL_FREQ_SHIFT) + (x % self.freq) + self.start
    }
}

fn build_symbols(freqs: &Frequencies) -> [EncodingSymbol; NUMBER_OF_SYMBOLS] {
    let mut syms = [EncodingSymbol::default(); NUMBER_OF_SYMBOLS];
    let mut cum = 0u32;
    for (sym, &f) in syms.iter_mut().zip(freqs.iter()) {
        if f > 0 {
            *sym = EncodingSymbol {
                start: cum,
                freq: f as u32,
            };
            cum += f as u32;
        }
    }
    syms
}

fn finish(order: RansOrder, input_len: usize, table: Vec<u8>, mut payload: Vec<u8>, states: [u32; 4]) -> Vec<u8> {
    for state in states.iter().rev() {
        payload.extend_from_slice(&state.to_be_bytes());
    }
    payload.reverse();

    let mut out = Vec::with_capacity(PREFIX_LEN + table.len() + payload.len());
    out.push(order as u8);
    out.extend_from_slice(&((table.len() + payload.len()) as u32).to_le_bytes());
    out.extend_from_slice(&(input_len as u32).to_le_bytes());
    out.extend_from_slice(&table);
    out.extend_from_slice(&payload);
    out
}

/// Order-0: lane `k` owns positions `i` with `i % 4 == k`.
pub(super) fn compress_order0(input: &[u8]) -> Vec<u8> {
    let freqs = normalize_order0(input);
    let mut table = Vec::new();
    write_frequencies_order0(&mut table, &freqs);
    let syms = build_symbols(&freqs);

    let n = input.len();
    let body = n & !3;
    let mut payload = Vec::with_capacity(n);
    let mut states = [LOWER_BOUND; 4];

    for lane in (0..n & 3).rev() {
        states[lane] = syms[input[body + lane] as usize].put(states[lane], &mut payload);
    }

    for chunk in input[..body].chunks_exact(4).rev() {
        for lane in (0..4).rev() {
            states[lane] = syms[chunk[lane] as usize].put(states[lane], &mut payload);
        }
    }

    finish(RansOrder::Zero, n, table, payload, states)
}

/// Order-1: lane `k` owns the `k`-th quarter of the input; lane 3 also
/// carries the `n % 4` trailing bytes. Requires `input.len() >= 4`.
pub(super) fn compress_order1(input: &[u8]) -> Vec<u8> {
    let freqs = normalize_order1(input);
    let mut table = Vec::new();
    write_frequencies_order1(&mut table, &freqs);
    let syms: Vec<[EncodingSymbol; NUMBER_OF_SYMBOLS]> = freqs.iter().map(build_symbols).collect();

    let n = input.len();
    let quarter = n >> 2;
    let mut payload = Vec::with_capacity(n);
    let mut states = [LOWER_BOUND; 4];

    // Each lane's last symbol is encoded first, with the byte before it as context
    let mut last = [
        input[quarter - 1],
        input[2 * quarter - 1],
        input[3 * quarter - 1],
        input[n - 1],
    ];

    for i3 in (4 * quarter - 1..n - 1).rev() {
        let c3 = input[i3];
        states[3] = syms[c3 as usize][last[3] as usize].put(states[3], &mut payload);
        last[3] = c3;
    }

    for i in (0..quarter - 1).rev() {
        for lane in (0..4).rev() {
            let c = input[lane * quarter + i];
            states[lane] = syms[c as usize][last[lane] as usize].put(states[lane], &mut payload);
            last[lane] = c;
        }
    }

    for lane in (0..4).rev() {
        states[lane] = syms[0][last[lane] as usize].put(states[lane], &mut payload);
    }

    finish(RansOrder::One, n, table, payload, states)
}
