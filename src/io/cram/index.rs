//! Index entries derived from slices.
//!
//! Every slice yields at least one entry. A multi-reference slice is split
//! into one entry per reference it touches, plus one for its unplaced
//! records, so indexers never see the multi-reference sentinel.

use super::compression_header::CompressionHeader;
use super::context::{AlignmentSpan, ReferenceContext, MULTIPLE_REFERENCE_ID, UNMAPPED_UNPLACED_ID};
use super::slice::Slice;
use crate::{BiometalError, Result};
use std::cmp::Ordering;

fn unmapped_sentinels_ok(start: i32, span: i32) -> bool {
    // 0/0 is canonical; -1 and 1 occur in files from older writers
    matches!(start, 0 | -1) && matches!(span, 0 | 1)
}

/// CRAI-style entry: one reference range of one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CraiEntry {
    /// Reference id, -1 for unmapped
    pub reference_id: i32,
    /// Alignment start
    pub alignment_start: i32,
    /// Alignment span
    pub alignment_span: i32,
    /// File offset of the container
    pub container_offset: u64,
    /// Offset of the slice header block from the container's first block
    pub slice_offset: i32,
    /// Bytes of the slice's blocks
    pub slice_size: i32,
}

impl CraiEntry {
    /// Entry for one reference range; rejects the multi-reference id.
    pub fn new(
        reference_id: i32,
        alignment_start: i32,
        alignment_span: i32,
        container_offset: u64,
        slice_offset: i32,
        slice_size: i32,
    ) -> Result<Self> {
        if reference_id == MULTIPLE_REFERENCE_ID {
            return Err(BiometalError::InvalidConfiguration(
                "CRAI entry cannot use the multi-reference context".to_string(),
            ));
        }
        if reference_id == UNMAPPED_UNPLACED_ID
            && !unmapped_sentinels_ok(alignment_start, alignment_span)
        {
            return Err(BiometalError::InvalidConfiguration(format!(
                "Unmapped CRAI entry with start {} and span {}",
                alignment_start, alignment_span
            )));
        }
        Ok(Self {
            reference_id,
            alignment_start,
            alignment_span,
            container_offset,
            slice_offset,
            slice_size,
        })
    }
}

impl Ord for CraiEntry {
    /// Reference id with unmapped last, then start, container offset and
    /// slice offset. Start is ignored for unmapped entries.
    fn cmp(&self, other: &Self) -> Ordering {
        if self.reference_id != other.reference_id {
            return match (self.reference_id, other.reference_id) {
                (UNMAPPED_UNPLACED_ID, _) => Ordering::Greater,
                (_, UNMAPPED_UNPLACED_ID) => Ordering::Less,
                (a, b) => a.cmp(&b),
            };
        }
        let by_start = if self.reference_id == UNMAPPED_UNPLACED_ID {
            Ordering::Equal
        } else {
            self.alignment_start.cmp(&other.alignment_start)
        };
        by_start
            .then(self.container_offset.cmp(&other.container_offset))
            .then(self.slice_offset.cmp(&other.slice_offset))
    }
}

impl PartialOrd for CraiEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// BAI-style entry: one reference range of one slice, with record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaiEntry {
    /// Reference context; never multi-reference
    pub reference_context: ReferenceContext,
    /// Range and counts
    pub span: AlignmentSpan,
    /// File offset of the container
    pub container_offset: u64,
    /// Offset of the slice header block from the container's first block
    pub slice_offset: i32,
    /// Position of the slice in its container
    pub landmark_index: usize,
}

impl BaiEntry {
    /// Entry for one reference context of a slice.
    pub fn new(
        reference_context: ReferenceContext,
        span: AlignmentSpan,
        container_offset: u64,
        slice_offset: i32,
        landmark_index: usize,
    ) -> Result<Self> {
        match reference_context {
            ReferenceContext::MultipleReference => {
                return Err(BiometalError::InvalidConfiguration(
                    "BAI entry cannot use the multi-reference context".to_string(),
                ))
            }
            ReferenceContext::UnmappedUnplaced if !unmapped_sentinels_ok(span.start, span.span) => {
                return Err(BiometalError::InvalidConfiguration(format!(
                    "Unmapped BAI entry with start {} and span {}",
                    span.start, span.span
                )))
            }
            _ => {}
        }
        Ok(Self {
            reference_context,
            span,
            container_offset,
            slice_offset,
            landmark_index,
        })
    }
}

/// CRAI entries of `slice`, sorted.
pub fn crai_entries(slice: &Slice, header: &CompressionHeader) -> Result<Vec<CraiEntry>> {
    let context = slice.alignment_context();
    if !context.reference_context.is_multiple() {
        return Ok(vec![CraiEntry::new(
            context.reference_context.id(),
            context.alignment_start,
            context.alignment_span,
            slice.container_offset,
            slice.offset,
            slice.size,
        )?]);
    }

    let mut entries = slice
        .spans(header)?
        .into_iter()
        .map(|(reference, span)| {
            CraiEntry::new(
                reference.id(),
                span.start,
                span.span,
                slice.container_offset,
                slice.offset,
                slice.size,
            )
        })
        .collect::<Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// BAI entries of `slice`: mapped references in order, unplaced records last.
pub fn bai_entries(slice: &Slice, header: &CompressionHeader) -> Result<Vec<BaiEntry>> {
    let context = slice.alignment_context();
    let spans = slice.spans(header)?;
    let entry = |reference, span| {
        BaiEntry::new(
            reference,
            span,
            slice.container_offset,
            slice.offset,
            slice.landmark_index,
        )
    };

    match context.reference_context {
        ReferenceContext::MultipleReference => {
            let mut placed: Vec<(ReferenceContext, AlignmentSpan)> = spans
                .iter()
                .filter(|(reference, _)| !reference.is_unmapped())
                .map(|(&reference, &span)| (reference, span))
                .collect();
            placed.sort_by_key(|(reference, span)| (reference.id(), span.start));

            let mut entries = placed
                .into_iter()
                .map(|(reference, span)| entry(reference, span))
                .collect::<Result<Vec<_>>>()?;
            if let Some(&unplaced) = spans.get(&ReferenceContext::UnmappedUnplaced) {
                entries.push(entry(ReferenceContext::UnmappedUnplaced, unplaced)?);
            }
            Ok(entries)
        }
        reference => {
            let counts = spans
                .values()
                .fold(AlignmentSpan::new(0, 0, 0, 0, 0), |total, span| {
                    AlignmentSpan::new(
                        0,
                        0,
                        total.mapped_count + span.mapped_count,
                        total.unmapped_count + span.unmapped_count,
                        total.unplaced_count + span.unplaced_count,
                    )
                });
            let (start, span) = match reference {
                ReferenceContext::Single(_) => (context.alignment_start, context.alignment_span),
                _ => (0, 0),
            };
            Ok(vec![entry(
                reference,
                AlignmentSpan::new(
                    start,
                    span,
                    counts.mapped_count,
                    counts.unmapped_count,
                    counts.unplaced_count,
                ),
            )?])
        }
    }
}

/// Index entries for a whole container's slices, CRAI flavour.
pub fn container_crai_entries(
    slices: &[Slice],
    header: &CompressionHeader,
) -> Result<Vec<CraiEntry>> {
    let mut entries = Vec::new();
    for slice in slices {
        entries.extend(crai_entries(slice, header)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cram::compression_header::CompressionHeaderFactory;
    use crate::io::cram::context::AlignmentContext;
    use crate::io::cram::container::Container;
    use crate::io::cram::record::CramRecord;
    use crate::io::cram::strategy::EncodingStrategy;
    use std::io::Cursor;

    fn mapped(reference: i32, start: i32) -> CramRecord {
        CramRecord::mapped(format!("r{}", start).as_bytes(), reference, start, 10, Vec::new())
    }

    fn container_for(records: &[CramRecord]) -> Container {
        let strategy = EncodingStrategy::default();
        let header = CompressionHeaderFactory::new(strategy.clone())
            .build(records)
            .unwrap();
        let mut container = Container::encode(records, header, &strategy, 0).unwrap();
        container.set_offset(1000);
        container
    }

    fn multi_ref_records() -> Vec<CramRecord> {
        vec![
            mapped(0, 100),
            mapped(0, 150),
            mapped(1, 20),
            CramRecord::unmapped(b"u", b"ACGT", b""),
        ]
    }

    // ========================================================================
    // Multi-reference decomposition
    // ========================================================================

    #[test]
    fn test_multi_reference_slice_decomposes_into_three() {
        let container = container_for(&multi_ref_records());
        let slice = &container.slices[0];
        assert!(slice.alignment_context().reference_context.is_multiple());

        let entries = crai_entries(slice, &container.compression_header).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            (entries[0].reference_id, entries[0].alignment_start, entries[0].alignment_span),
            (0, 100, 59)
        );
        assert_eq!(
            (entries[1].reference_id, entries[1].alignment_start, entries[1].alignment_span),
            (1, 20, 9)
        );
        assert_eq!(
            (entries[2].reference_id, entries[2].alignment_start, entries[2].alignment_span),
            (-1, 0, 0)
        );
        for entry in &entries {
            assert_eq!(entry.container_offset, 1000);
            assert_eq!(entry.slice_offset, slice.offset);
            assert_eq!(entry.slice_size, slice.size);
        }
    }

    #[test]
    fn test_multi_reference_bai_entries() {
        let container = container_for(&multi_ref_records());
        let entries = bai_entries(&container.slices[0], &container.compression_header).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].reference_context, ReferenceContext::Single(0));
        assert_eq!(entries[0].span.mapped_count, 2);
        assert_eq!(entries[1].reference_context, ReferenceContext::Single(1));
        assert_eq!(entries[2].reference_context, ReferenceContext::UnmappedUnplaced);
        assert_eq!(entries[2].span, AlignmentSpan::new(0, 0, 0, 1, 1));
    }

    #[test]
    fn test_decomposition_after_reading() {
        let container = container_for(&multi_ref_records());
        let mut bytes = Vec::new();
        container.write(&mut bytes).unwrap();
        let mut parsed = Container::read(&mut Cursor::new(bytes)).unwrap().unwrap();
        parsed.set_offset(1000);
        assert_eq!(
            crai_entries(&parsed.slices[0], &parsed.compression_header).unwrap(),
            crai_entries(&container.slices[0], &container.compression_header).unwrap()
        );
    }

    // ========================================================================
    // Single-reference and unmapped slices
    // ========================================================================

    #[test]
    fn test_single_reference_entry_uses_slice_context() {
        let records = vec![mapped(2, 100), mapped(2, 130)];
        let container = container_for(&records);
        let slice = &container.slices[0];
        let crai = crai_entries(slice, &container.compression_header).unwrap();
        assert_eq!(crai.len(), 1);
        assert_eq!(
            (crai[0].reference_id, crai[0].alignment_start, crai[0].alignment_span),
            (2, 100, 40)
        );
        let bai = bai_entries(slice, &container.compression_header).unwrap();
        assert_eq!(bai[0].span, AlignmentSpan::new(100, 40, 2, 0, 0));
        assert_eq!(slice.alignment_context(), AlignmentContext::single(2, 100, 40));
    }

    #[test]
    fn test_unmapped_slice_entry() {
        let records = vec![
            CramRecord::unmapped(b"a", b"AC", b""),
            CramRecord::unmapped(b"b", b"GT", b""),
        ];
        let container = container_for(&records);
        let bai = bai_entries(&container.slices[0], &container.compression_header).unwrap();
        assert_eq!(bai.len(), 1);
        assert_eq!(bai[0].span, AlignmentSpan::new(0, 0, 0, 2, 2));
    }

    // ========================================================================
    // Construction rules
    // ========================================================================

    #[test]
    fn test_multi_reference_entries_rejected() {
        assert!(matches!(
            CraiEntry::new(MULTIPLE_REFERENCE_ID, 0, 0, 0, 0, 0),
            Err(BiometalError::InvalidConfiguration(_))
        ));
        assert!(BaiEntry::new(
            ReferenceContext::MultipleReference,
            AlignmentSpan::new(0, 0, 0, 0, 0),
            0,
            0,
            0
        )
        .is_err());
    }

    #[test]
    fn test_unmapped_entry_sentinels() {
        assert!(CraiEntry::new(-1, 0, 0, 0, 0, 0).is_ok());
        assert!(CraiEntry::new(-1, -1, 1, 0, 0, 0).is_ok());
        assert!(CraiEntry::new(-1, 50, 0, 0, 0, 0).is_err());
        assert!(BaiEntry::new(
            ReferenceContext::UnmappedUnplaced,
            AlignmentSpan::new(10, 5, 0, 1, 1),
            0,
            0,
            0
        )
        .is_err());
    }

    #[test]
    fn test_crai_ordering_unmapped_last() {
        let mut entries = vec![
            CraiEntry::new(-1, 0, 0, 10, 0, 0).unwrap(),
            CraiEntry::new(1, 5, 1, 10, 0, 0).unwrap(),
            CraiEntry::new(0, 50, 1, 10, 0, 0).unwrap(),
            CraiEntry::new(0, 50, 1, 5, 0, 0).unwrap(),
        ];
        entries.sort();
        let keys: Vec<_> = entries
            .iter()
            .map(|e| (e.reference_id, e.container_offset))
            .collect();
        assert_eq!(keys, vec![(0, 5), (0, 10), (1, 10), (-1, 10)]);
    }

    #[test]
    fn test_container_entries_cover_every_slice() {
        let strategy = EncodingStrategy::default()
            .with_reads_per_slice(1)
            .with_minimum_single_reference_slice_size(1);
        let records = vec![mapped(0, 10), mapped(0, 20)];
        let header = CompressionHeaderFactory::new(strategy.clone())
            .build(&records)
            .unwrap();
        let container = Container::encode(&records, header, &strategy, 0).unwrap();
        let entries =
            container_crai_entries(&container.slices, &container.compression_header).unwrap();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].slice_offset, entries[1].slice_offset);
    }
}
