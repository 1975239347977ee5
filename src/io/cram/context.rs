//! Reference and alignment contexts of slices and containers.
//!
//! A context says which reference a group of records lies on (one, none or
//! several) and, for a single reference, which coordinate range they cover.

use crate::{BiometalError, Result};
use std::cmp::Ordering;
use std::fmt;

/// Reference id stored for unmapped/unplaced slices and containers.
pub const UNMAPPED_UNPLACED_ID: i32 = -1;

/// Reference id stored for multi-reference slices and containers.
pub const MULTIPLE_REFERENCE_ID: i32 = -2;

/// Alignment start stored when the context is not single-reference.
pub const NO_ALIGNMENT_START: i32 = 0;

/// Alignment span stored when the context is not single-reference.
pub const NO_ALIGNMENT_SPAN: i32 = 0;

/// Alignment start of the EOF container.
pub const EOF_ALIGNMENT_START: i32 = 4_542_278;

/// Alignment span of the EOF container.
pub const EOF_ALIGNMENT_SPAN: i32 = 0;

/// Which reference a slice or container covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceContext {
    /// One reference sequence
    Single(i32),
    /// No alignment
    UnmappedUnplaced,
    /// Records on more than one reference (possibly with unmapped ones)
    MultipleReference,
}

impl ReferenceContext {
    /// Decode the reference id field of a slice or container header.
    pub fn from_id(id: i32) -> Result<Self> {
        match id {
            UNMAPPED_UNPLACED_ID => Ok(Self::UnmappedUnplaced),
            MULTIPLE_REFERENCE_ID => Ok(Self::MultipleReference),
            id if id >= 0 => Ok(Self::Single(id)),
            other => Err(BiometalError::cram(format!(
                "Invalid reference context id: {}",
                other
            ))),
        }
    }

    /// Reference id field as stored.
    pub fn id(&self) -> i32 {
        match self {
            Self::Single(id) => *id,
            Self::UnmappedUnplaced => UNMAPPED_UNPLACED_ID,
            Self::MultipleReference => MULTIPLE_REFERENCE_ID,
        }
    }

    /// Single-reference context.
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    /// Unmapped/unplaced context.
    pub fn is_unmapped(&self) -> bool {
        matches!(self, Self::UnmappedUnplaced)
    }

    /// Multi-reference context.
    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::MultipleReference)
    }
}

impl fmt::Display for ReferenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(id) => write!(f, "{}", id),
            Self::UnmappedUnplaced => f.write_str("UNMAPPED_UNPLACED"),
            Self::MultipleReference => f.write_str("MULTIPLE_REFERENCE"),
        }
    }
}

/// Reference context plus the covered range.
///
/// Start and span are only meaningful for single-reference contexts and hold
/// zeros otherwise (the EOF container is the one exception).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentContext {
    /// Reference covered
    pub reference_context: ReferenceContext,
    /// 1-based minimum alignment start
    pub alignment_start: i32,
    /// Reference bases covered from `alignment_start`
    pub alignment_span: i32,
}

impl AlignmentContext {
    /// Context with explicit fields.
    pub fn new(reference_context: ReferenceContext, alignment_start: i32, alignment_span: i32) -> Self {
        Self {
            reference_context,
            alignment_start,
            alignment_span,
        }
    }

    /// Single-reference context.
    pub fn single(reference_id: i32, alignment_start: i32, alignment_span: i32) -> Self {
        Self::new(
            ReferenceContext::Single(reference_id),
            alignment_start,
            alignment_span,
        )
    }

    /// Unmapped/unplaced context.
    pub fn unmapped() -> Self {
        Self::new(
            ReferenceContext::UnmappedUnplaced,
            NO_ALIGNMENT_START,
            NO_ALIGNMENT_SPAN,
        )
    }

    /// Multi-reference context.
    pub fn multiple() -> Self {
        Self::new(
            ReferenceContext::MultipleReference,
            NO_ALIGNMENT_START,
            NO_ALIGNMENT_SPAN,
        )
    }

    /// Context of the EOF container.
    pub fn eof() -> Self {
        Self::new(
            ReferenceContext::UnmappedUnplaced,
            EOF_ALIGNMENT_START,
            EOF_ALIGNMENT_SPAN,
        )
    }

    /// Last covered reference position.
    pub fn alignment_end(&self) -> i32 {
        self.alignment_start + self.alignment_span - 1
    }

    /// Context covering a container's slices: one shared reference gives the
    /// union of their ranges, all unmapped stays unmapped, anything else is
    /// multi-reference.
    pub fn for_slices<'a>(contexts: impl IntoIterator<Item = &'a AlignmentContext>) -> Self {
        let mut contexts = contexts.into_iter().peekable();
        let Some(first) = contexts.peek().copied() else {
            return Self::unmapped();
        };

        match first.reference_context {
            ReferenceContext::Single(id) => {
                let mut start = first.alignment_start;
                let mut end = first.alignment_end();
                for context in contexts {
                    if context.reference_context != ReferenceContext::Single(id) {
                        return Self::multiple();
                    }
                    start = start.min(context.alignment_start);
                    end = end.max(context.alignment_end());
                }
                Self::single(id, start, end - start + 1)
            }
            ReferenceContext::UnmappedUnplaced => {
                if contexts.all(|c| c.reference_context.is_unmapped()) {
                    Self::unmapped()
                } else {
                    Self::multiple()
                }
            }
            ReferenceContext::MultipleReference => Self::multiple(),
        }
    }

    /// Sort order used for index entries: reference id, then start, with
    /// unmapped last. Two multi-reference contexts cannot be ordered.
    pub fn compare(&self, other: &Self) -> Result<Ordering> {
        use ReferenceContext::*;
        match (self.reference_context, other.reference_context) {
            (MultipleReference, MultipleReference) => Err(BiometalError::InvalidConfiguration(
                "Multi-reference alignment contexts cannot be ordered".to_string(),
            )),
            (UnmappedUnplaced, UnmappedUnplaced) => Ok(Ordering::Equal),
            (UnmappedUnplaced, _) => Ok(Ordering::Greater),
            (_, UnmappedUnplaced) => Ok(Ordering::Less),
            (a, b) => Ok(a
                .id()
                .cmp(&b.id())
                .then(self.alignment_start.cmp(&other.alignment_start))),
        }
    }
}

impl fmt::Display for AlignmentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reference={}, start={}, span={}",
            self.reference_context, self.alignment_start, self.alignment_span
        )
    }
}

/// Span and record counts of one reference within a multi-reference slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentSpan {
    /// Minimum alignment start
    pub start: i32,
    /// Covered span
    pub span: i32,
    /// Mapped records
    pub mapped_count: usize,
    /// Unmapped records
    pub unmapped_count: usize,
    /// Unmapped records without a position
    pub unplaced_count: usize,
}

impl AlignmentSpan {
    /// Span with the given counts.
    pub fn new(
        start: i32,
        span: i32,
        mapped_count: usize,
        unmapped_count: usize,
        unplaced_count: usize,
    ) -> Self {
        Self {
            start,
            span,
            mapped_count,
            unmapped_count,
            unplaced_count,
        }
    }

    /// Bucket entry for one unmapped, unplaced record.
    pub fn unplaced() -> Self {
        Self::new(NO_ALIGNMENT_START, NO_ALIGNMENT_SPAN, 0, 1, 1)
    }

    /// Merge two spans on the same reference: earliest start, the span
    /// reaching the furthest end, summed counts.
    pub fn combine(a: &Self, b: &Self) -> Self {
        let start = a.start.min(b.start);
        let end = (a.start + a.span).max(b.start + b.span);
        Self::new(
            start,
            end - start,
            a.mapped_count + b.mapped_count,
            a.unmapped_count + b.unmapped_count,
            a.unplaced_count + b.unplaced_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ========================================================================
    // Reference context
    // ========================================================================

    #[test]
    fn test_reference_context_ids() {
        assert_eq!(ReferenceContext::from_id(3).unwrap(), ReferenceContext::Single(3));
        assert_eq!(
            ReferenceContext::from_id(-1).unwrap(),
            ReferenceContext::UnmappedUnplaced
        );
        assert_eq!(
            ReferenceContext::from_id(-2).unwrap(),
            ReferenceContext::MultipleReference
        );
        assert!(ReferenceContext::from_id(-3).is_err());
        assert_eq!(ReferenceContext::MultipleReference.id(), -2);
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    #[test]
    fn test_sort_by_reference_then_start() {
        let mut contexts = vec![
            AlignmentContext::unmapped(),
            AlignmentContext::single(1, 5, 10),
            AlignmentContext::single(0, 50, 10),
            AlignmentContext::single(0, 7, 10),
        ];
        contexts.sort_by(|a, b| a.compare(b).unwrap());
        assert_eq!(
            contexts,
            vec![
                AlignmentContext::single(0, 7, 10),
                AlignmentContext::single(0, 50, 10),
                AlignmentContext::single(1, 5, 10),
                AlignmentContext::unmapped(),
            ]
        );
    }

    #[test]
    fn test_multi_vs_multi_is_error() {
        let multi = AlignmentContext::multiple();
        assert!(matches!(
            multi.compare(&multi),
            Err(BiometalError::InvalidConfiguration(_))
        ));
        assert_eq!(
            multi.compare(&AlignmentContext::unmapped()).unwrap(),
            Ordering::Less
        );
    }

    // ========================================================================
    // Container context from slice contexts
    // ========================================================================

    #[test]
    fn test_for_slices_same_reference() {
        let slices = [
            AlignmentContext::single(2, 100, 50),
            AlignmentContext::single(2, 10, 20),
        ];
        assert_eq!(
            AlignmentContext::for_slices(&slices),
            AlignmentContext::single(2, 10, 140)
        );
    }

    #[test]
    fn test_for_slices_mixed() {
        let slices = [AlignmentContext::single(0, 1, 5), AlignmentContext::unmapped()];
        assert_eq!(AlignmentContext::for_slices(&slices), AlignmentContext::multiple());
        let slices = [AlignmentContext::unmapped(), AlignmentContext::unmapped()];
        assert_eq!(AlignmentContext::for_slices(&slices), AlignmentContext::unmapped());
        let slices = [AlignmentContext::single(0, 1, 5), AlignmentContext::single(1, 1, 5)];
        assert_eq!(AlignmentContext::for_slices(&slices), AlignmentContext::multiple());
    }

    // ========================================================================
    // Alignment spans
    // ========================================================================

    #[test]
    fn test_combine_spans() {
        let a = AlignmentSpan::new(100, 50, 1, 0, 0);
        let b = AlignmentSpan::new(120, 100, 1, 1, 0);
        assert_eq!(AlignmentSpan::combine(&a, &b), AlignmentSpan::new(100, 120, 2, 1, 0));
    }

    proptest! {
        #[test]
        fn prop_combine_is_symmetric(
            s1 in 1i32..10_000, l1 in 0i32..1000,
            s2 in 1i32..10_000, l2 in 0i32..1000,
        ) {
            let a = AlignmentSpan::new(s1, l1, 1, 0, 0);
            let b = AlignmentSpan::new(s2, l2, 0, 1, 0);
            let ab = AlignmentSpan::combine(&a, &b);
            prop_assert_eq!(ab, AlignmentSpan::combine(&b, &a));
            prop_assert!(ab.start <= s1.min(s2));
            prop_assert!(ab.start + ab.span >= s1 + l1);
            prop_assert!(ab.start + ab.span >= s2 + l2);
        }
    }
}
