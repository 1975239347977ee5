//! Substitution matrix: maps (reference base, read base) pairs to 2-bit codes.
//!
//! # Format
//!
//! Five bytes, one per reference base in `A C G T N` order. Each byte packs
//! the codes of the four other bases (in the same order) as 2-bit fields,
//! most significant first:
//!
//! ```text
//! A: [code C][code G][code T][code N]
//! C: [code A][code G][code T][code N]
//! ...
//! ```
//!
//! Codes are ranks by substitution frequency, so the most frequent
//! substitution of each base gets code 0.

use crate::{BiometalError, Result};

const BASES: [u8; 5] = *b"ACGTN";

/// Index of `base` in `ACGTN`, case-insensitive.
pub fn base_index(base: u8) -> Option<usize> {
    BASES.iter().position(|&b| b == base.to_ascii_uppercase())
}

/// Observed substitution counts, indexed `[reference][read]` over `ACGTN`.
pub type SubstitutionFrequencies = [[u64; 5]; 5];

/// Substitution code table shared by a container's slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionMatrix {
    encoded: [u8; 5],
    /// `[reference][read]` -> code
    codes: [[u8; 5]; 5],
    /// `[reference][code]` -> read base
    bases: [[u8; 4]; 5],
}

impl Default for SubstitutionMatrix {
    fn default() -> Self {
        Self::from_frequencies(&[[0; 5]; 5])
    }
}

impl SubstitutionMatrix {
    /// Rank the substitutions of each reference base by frequency; ties keep
    /// `ACGTN` order.
    pub fn from_frequencies(frequencies: &SubstitutionFrequencies) -> Self {
        let mut codes = [[0u8; 5]; 5];
        let mut encoded = [0u8; 5];

        for reference in 0..5 {
            let mut others: Vec<usize> = (0..5).filter(|&b| b != reference).collect();
            // Stable sort keeps ACGTN order among equal counts
            others.sort_by(|&a, &b| frequencies[reference][b].cmp(&frequencies[reference][a]));
            for (rank, &read) in others.iter().enumerate() {
                codes[reference][read] = rank as u8;
            }

            encoded[reference] = (0..5)
                .filter(|&b| b != reference)
                .fold(0u8, |acc, read| (acc << 2) | codes[reference][read]);
        }

        Self {
            encoded,
            codes,
            bases: Self::invert(&codes),
        }
    }

    /// Parse the 5-byte serialized form.
    pub fn from_bytes(bytes: [u8; 5]) -> Result<Self> {
        let mut codes = [[0u8; 5]; 5];
        for (reference, &packed) in bytes.iter().enumerate() {
            let mut seen = 0u8;
            for (slot, read) in (0..5).filter(|&b| b != reference).enumerate() {
                let code = (packed >> (6 - 2 * slot)) & 3;
                codes[reference][read] = code;
                seen |= 1 << code;
            }
            if seen != 0b1111 {
                return Err(BiometalError::cram(format!(
                    "Substitution matrix entry {:#04x} for base {} repeats a code",
                    packed, BASES[reference] as char
                )));
            }
        }
        Ok(Self {
            encoded: bytes,
            codes,
            bases: Self::invert(&codes),
        })
    }

    fn invert(codes: &[[u8; 5]; 5]) -> [[u8; 4]; 5] {
        let mut bases = [[b'N'; 4]; 5];
        for reference in 0..5 {
            for read in (0..5).filter(|&b| b != reference) {
                bases[reference][codes[reference][read] as usize] = BASES[read];
            }
        }
        bases
    }

    /// Serialized form.
    pub fn to_bytes(&self) -> [u8; 5] {
        self.encoded
    }

    /// Code for substituting `reference` with `read`.
    pub fn code(&self, reference: u8, read: u8) -> Result<u8> {
        match (base_index(reference), base_index(read)) {
            (Some(r), Some(b)) if r != b => Ok(self.codes[r][b]),
            _ => Err(BiometalError::cram(format!(
                "No substitution code for {} -> {}",
                reference as char, read as char
            ))),
        }
    }

    /// Read base produced by applying `code` to `reference`. Reference
    /// bases outside `ACGTN` yield `N`.
    pub fn base(&self, reference: u8, code: u8) -> u8 {
        match base_index(reference) {
            Some(r) => self.bases[r][(code & 3) as usize],
            None => b'N',
        }
    }
}
