//! Grouping of a record stream into slices and containers.
//!
//! Records are staged per slice until a slice boundary is reached, and staged
//! slices become a container once enough of them share a reference context.
//! The compression header is built from all records of the container.

use super::compression_header::CompressionHeaderFactory;
use super::container::Container;
use super::context::ReferenceContext;
use super::record::{CramRecord, NO_REFERENCE_INDEX};
use super::slice::Slice;
use super::strategy::EncodingStrategy;
use crate::{BiometalError, Result};
use rayon::prelude::*;

/// Accumulates records and emits containers.
///
/// # Example
///
/// ```
/// use biometal_cram::io::cram::{ContainerFactory, CramRecord, EncodingStrategy};
///
/// # fn main() -> biometal_cram::Result<()> {
/// let mut factory = ContainerFactory::new(EncodingStrategy::default())?;
/// for start in [100, 200, 300] {
///     let record = CramRecord::mapped(b"read", 0, start, 50, Vec::new());
///     assert!(factory.add_record(record)?.is_none());
/// }
/// let container = factory.finish()?.expect("three staged records");
/// assert_eq!(container.header.num_records, 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ContainerFactory {
    strategy: EncodingStrategy,
    header_factory: CompressionHeaderFactory,
    record_counter: i64,
    slice_records: Vec<CramRecord>,
    staged_slices: Vec<Vec<CramRecord>>,
    current: Option<ReferenceContext>,
}

impl ContainerFactory {
    /// Factory for `strategy`; the strategy is validated up front.
    pub fn new(strategy: EncodingStrategy) -> Result<Self> {
        strategy.validate()?;
        Ok(Self {
            header_factory: CompressionHeaderFactory::new(strategy.clone()),
            slice_records: Vec::with_capacity(strategy.reads_per_slice),
            staged_slices: Vec::with_capacity(strategy.slices_per_container),
            strategy,
            record_counter: 0,
            current: None,
        })
    }

    /// Records already emitted in containers.
    pub fn record_counter(&self) -> i64 {
        self.record_counter
    }

    /// Add one record; returns a container when the record closes one.
    ///
    /// The record itself always goes into the next slice.
    pub fn add_record(&mut self, record: CramRecord) -> Result<Option<Container>> {
        if record.is_placed() && record.reference_index == NO_REFERENCE_INDEX {
            log::warn!(
                "Record {:?} has alignment start {} but no reference index",
                record
                    .read_name
                    .as_deref()
                    .map(String::from_utf8_lossy)
                    .unwrap_or_default(),
                record.alignment_start
            );
        }
        let next = ReferenceContext::from_id(record.reference_index)?;
        let mut container = None;

        match self.next_context(next)? {
            Some(context) => self.current = Some(context),
            None => {
                let current = self.current;
                self.staged_slices.push(std::mem::take(&mut self.slice_records));
                if self.staged_slices.len() == self.strategy.slices_per_container
                    || current == Some(ReferenceContext::MultipleReference)
                    || current != Some(next)
                {
                    container = Some(self.build_container()?);
                }
                self.current = Some(next);
            }
        }

        self.slice_records.push(record);
        Ok(container)
    }

    /// Emit whatever is staged.
    pub fn finish(&mut self) -> Result<Option<Container>> {
        if !self.slice_records.is_empty() {
            self.staged_slices.push(std::mem::take(&mut self.slice_records));
        }
        self.current = None;
        if self.staged_slices.is_empty() {
            return Ok(None);
        }
        self.build_container().map(Some)
    }

    /// Context of the open slice once `next` joins it, or `None` when the
    /// open slice has to be closed first.
    fn next_context(&self, next: ReferenceContext) -> Result<Option<ReferenceContext>> {
        let count = self.slice_records.len();
        let full = count >= self.strategy.reads_per_slice;
        let below_minimum = count < self.strategy.minimum_single_reference_slice_size;
        let sorted = self.strategy.coordinate_sorted;

        let Some(current) = self.current else {
            return Ok(Some(next));
        };

        let context = match current {
            ReferenceContext::UnmappedUnplaced => {
                if next == current {
                    (!full).then_some(current)
                } else if sorted {
                    return Err(BiometalError::InvalidConfiguration(
                        "Invalid coordinate sorted input: unmapped records must be last"
                            .to_string(),
                    ));
                } else {
                    (!full).then_some(ReferenceContext::MultipleReference)
                }
            }
            ReferenceContext::MultipleReference => {
                let keep = if sorted { below_minimum } else { !full };
                keep.then_some(current)
            }
            ReferenceContext::Single(_) => {
                if next == current {
                    (!full).then_some(current)
                } else if below_minimum && self.staged_slices.is_empty() {
                    // a multi-reference slice never shares a container with
                    // a single-reference one
                    Some(ReferenceContext::MultipleReference)
                } else {
                    None
                }
            }
        };
        Ok(context)
    }

    fn build_container(&mut self) -> Result<Container> {
        let staged = std::mem::take(&mut self.staged_slices);
        let all_records: Vec<CramRecord> = staged.iter().flatten().cloned().collect();
        let compression_header = self.header_factory.build(&all_records)?;

        let mut counter = self.record_counter;
        let counters: Vec<i64> = staged
            .iter()
            .map(|records| {
                let start = counter;
                counter += records.len() as i64;
                start
            })
            .collect();

        let slices = staged
            .par_iter()
            .zip(counters.par_iter())
            .map(|(records, &counter)| Slice::encode(records, &compression_header, counter))
            .collect::<Result<Vec<Slice>>>()?;

        let bases = all_records.iter().map(|r| r.read_length as i64).sum();
        let container =
            Container::from_slices(compression_header, slices, self.record_counter, bases)?;

        log::debug!(
            "Container: {} slices, {} records, {}",
            container.slices.len(),
            container.header.num_records,
            container.header.alignment_context
        );

        self.record_counter += all_records.len() as i64;
        Ok(container)
    }
}
