//! Encoding strategy: knobs for slice sizing, preservation and compression.

use super::block::BlockCompressor;
use super::rans::RansOrder;
use crate::{BiometalError, Result};

/// Default minimum record count for a single-reference slice.
pub const DEFAULT_MINIMUM_SINGLE_REFERENCE_SLICE_SIZE: usize = 1000;

/// Default records per slice.
pub const DEFAULT_READS_PER_SLICE: usize = 10_000;

/// Default gzip level for gzip-compressed external blocks.
pub const DEFAULT_GZIP_LEVEL: u32 = 5;

/// How records are grouped and compressed when writing CRAM.
///
/// # Example
///
/// ```
/// use biometal_cram::io::cram::EncodingStrategy;
///
/// # fn main() -> biometal_cram::Result<()> {
/// let strategy = EncodingStrategy::default()
///     .with_reads_per_slice(5000)
///     .with_minimum_single_reference_slice_size(500)
///     .with_slices_per_container(2);
/// strategy.validate()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingStrategy {
    /// gzip level, 0-9
    pub gzip_level: u32,
    /// Records per slice
    pub reads_per_slice: usize,
    /// Fewer records than this on one reference turn the slice multi-reference
    /// when another reference shows up
    pub minimum_single_reference_slice_size: usize,
    /// Slices per container
    pub slices_per_container: usize,
    /// Store read names (RN)
    pub preserve_read_names: bool,
    /// Store alignment starts as deltas (AP)
    pub ap_delta: bool,
    /// Input is coordinate sorted
    pub coordinate_sorted: bool,
    /// rANS order for low-entropy integer series (AP, RI)
    pub rans_order_positions: RansOrder,
    /// rANS order for bases, qualities and flags
    pub rans_order_sequence: RansOrder,
}

impl Default for EncodingStrategy {
    fn default() -> Self {
        Self {
            gzip_level: DEFAULT_GZIP_LEVEL,
            reads_per_slice: DEFAULT_READS_PER_SLICE,
            minimum_single_reference_slice_size: DEFAULT_MINIMUM_SINGLE_REFERENCE_SLICE_SIZE,
            slices_per_container: 1,
            preserve_read_names: true,
            ap_delta: true,
            coordinate_sorted: true,
            rans_order_positions: RansOrder::Zero,
            rans_order_sequence: RansOrder::One,
        }
    }
}

impl EncodingStrategy {
    /// Set the gzip level.
    pub fn with_gzip_level(mut self, level: u32) -> Self {
        self.gzip_level = level;
        self
    }

    /// Set records per slice.
    pub fn with_reads_per_slice(mut self, reads: usize) -> Self {
        self.reads_per_slice = reads;
        self
    }

    /// Set the minimum single-reference slice size.
    pub fn with_minimum_single_reference_slice_size(mut self, reads: usize) -> Self {
        self.minimum_single_reference_slice_size = reads;
        self
    }

    /// Set slices per container.
    pub fn with_slices_per_container(mut self, slices: usize) -> Self {
        self.slices_per_container = slices;
        self
    }

    /// Keep or drop read names.
    pub fn with_preserve_read_names(mut self, preserve: bool) -> Self {
        self.preserve_read_names = preserve;
        self
    }

    /// Store alignment starts as deltas or absolute values.
    pub fn with_ap_delta(mut self, delta: bool) -> Self {
        self.ap_delta = delta;
        self
    }

    /// Declare whether input is coordinate sorted.
    pub fn with_coordinate_sorted(mut self, sorted: bool) -> Self {
        self.coordinate_sorted = sorted;
        self
    }

    /// Set the rANS orders for position and sequence series.
    pub fn with_rans_orders(mut self, positions: RansOrder, sequence: RansOrder) -> Self {
        self.rans_order_positions = positions;
        self.rans_order_sequence = sequence;
        self
    }

    /// Check the settings are mutually consistent.
    pub fn validate(&self) -> Result<()> {
        if self.gzip_level > 9 {
            return Err(BiometalError::InvalidConfiguration(format!(
                "gzip level must be 0-9, got {}",
                self.gzip_level
            )));
        }
        if self.reads_per_slice == 0 {
            return Err(BiometalError::InvalidConfiguration(
                "reads per slice must be positive".to_string(),
            ));
        }
        if self.minimum_single_reference_slice_size > self.reads_per_slice {
            return Err(BiometalError::InvalidConfiguration(format!(
                "minimum single reference slice size ({}) exceeds reads per slice ({})",
                self.minimum_single_reference_slice_size, self.reads_per_slice
            )));
        }
        if self.slices_per_container == 0 {
            return Err(BiometalError::InvalidConfiguration(
                "slices per container must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// gzip compressor at the configured level.
    pub fn gzip(&self) -> BlockCompressor {
        BlockCompressor::Gzip {
            level: self.gzip_level,
        }
    }
}
