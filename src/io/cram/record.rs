//! CRAM compression records: one read as the data series see it.
//!
//! Mapped reads are stored as differences from the reference (read
//! features); unmapped reads carry their bases verbatim.

use crate::{BiometalError, Result};

/// CRAM flag (CF): quality scores stored as a full array
pub const CF_QS_PRESERVED_AS_ARRAY: i32 = 0x1;
/// CRAM flag (CF): mate information stored literally
pub const CF_DETACHED: i32 = 0x2;
/// CRAM flag (CF): mate follows later in the same slice
pub const CF_HAS_MATE_DOWNSTREAM: i32 = 0x4;
/// CRAM flag (CF): sequence unknown, features only rebuild the CIGAR
pub const CF_UNKNOWN_BASES: i32 = 0x8;

/// Mate flag (MF): mate on the negative strand
pub const MF_MATE_NEG_STRAND: i32 = 0x1;
/// Mate flag (MF): mate unmapped
pub const MF_MATE_UNMAPPED: i32 = 0x2;

/// BAM flag: segment unmapped
pub const BAM_FLAG_UNMAPPED: i32 = 0x4;
/// BAM flag: mate unmapped
pub const BAM_FLAG_MATE_UNMAPPED: i32 = 0x8;
/// BAM flag: mate on the reverse strand
pub const BAM_FLAG_MATE_REVERSE: i32 = 0x20;

/// Reference index of unplaced records.
pub const NO_REFERENCE_INDEX: i32 = -1;

/// Read group index of records without a read group.
pub const NO_READ_GROUP: i32 = -1;

/// Substitution payload: either the stored code or the base pair it was
/// derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionValue {
    /// Code as stored in the BS data series
    Code(u8),
    /// Reference and read base; the writer looks up the code in the
    /// container's substitution matrix
    Bases {
        /// Reference base
        reference: u8,
        /// Read base
        read: u8,
    },
}

/// How a read differs from the reference at one read position.
///
/// Positions are 1-based offsets into the read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFeature {
    /// `X`: base substitution
    Substitution {
        /// Position in read
        position: i32,
        /// Substitution code or base pair
        value: SubstitutionValue,
    },
    /// `B`: read base with its quality score
    ReadBase {
        /// Position in read
        position: i32,
        /// Base
        base: u8,
        /// Quality score
        quality: u8,
    },
    /// `I`: inserted bases
    Insertion {
        /// Position in read
        position: i32,
        /// Inserted bases
        bases: Vec<u8>,
    },
    /// `i`: single inserted base
    InsertBase {
        /// Position in read
        position: i32,
        /// Inserted base
        base: u8,
    },
    /// `S`: soft-clipped bases
    SoftClip {
        /// Position in read
        position: i32,
        /// Clipped bases
        bases: Vec<u8>,
    },
    /// `H`: hard clip
    HardClip {
        /// Position in read
        position: i32,
        /// Number of clipped bases
        length: i32,
    },
    /// `P`: padding
    Padding {
        /// Position in read
        position: i32,
        /// Padding length
        length: i32,
    },
    /// `D`: deletion from the reference
    Deletion {
        /// Position in read
        position: i32,
        /// Number of deleted reference bases
        length: i32,
    },
    /// `N`: reference skip
    RefSkip {
        /// Position in read
        position: i32,
        /// Number of skipped reference bases
        length: i32,
    },
    /// `Q`: single quality score
    BaseQuality {
        /// Position in read
        position: i32,
        /// Quality score
        quality: u8,
    },
    /// `b`: stretch of bases
    Bases {
        /// Position in read
        position: i32,
        /// Bases
        bases: Vec<u8>,
    },
    /// `q`: stretch of quality scores
    Scores {
        /// Position in read
        position: i32,
        /// Quality scores
        scores: Vec<u8>,
    },
}

impl ReadFeature {
    /// Operator byte written to the FC data series.
    pub fn operator(&self) -> u8 {
        match self {
            Self::Substitution { .. } => b'X',
            Self::ReadBase { .. } => b'B',
            Self::Insertion { .. } => b'I',
            Self::InsertBase { .. } => b'i',
            Self::SoftClip { .. } => b'S',
            Self::HardClip { .. } => b'H',
            Self::Padding { .. } => b'P',
            Self::Deletion { .. } => b'D',
            Self::RefSkip { .. } => b'N',
            Self::BaseQuality { .. } => b'Q',
            Self::Bases { .. } => b'b',
            Self::Scores { .. } => b'q',
        }
    }

    /// 1-based position in the read.
    pub fn position(&self) -> i32 {
        match *self {
            Self::Substitution { position, .. }
            | Self::ReadBase { position, .. }
            | Self::Insertion { position, .. }
            | Self::InsertBase { position, .. }
            | Self::SoftClip { position, .. }
            | Self::HardClip { position, .. }
            | Self::Padding { position, .. }
            | Self::Deletion { position, .. }
            | Self::RefSkip { position, .. }
            | Self::BaseQuality { position, .. }
            | Self::Bases { position, .. }
            | Self::Scores { position, .. } => position,
        }
    }

    /// Change in reference span contributed by this feature.
    fn span_delta(&self) -> i32 {
        match self {
            Self::InsertBase { .. } => -1,
            Self::Insertion { bases, .. } | Self::SoftClip { bases, .. } => -(bases.len() as i32),
            Self::Deletion { length, .. } | Self::RefSkip { length, .. } => *length,
            _ => 0,
        }
    }
}

/// Operators defined for read features.
pub(crate) fn check_operator(operator: u8) -> Result<u8> {
    match operator {
        b'X' | b'B' | b'I' | b'i' | b'S' | b'H' | b'P' | b'D' | b'N' | b'Q' | b'b' | b'q' => {
            Ok(operator)
        }
        _ => Err(BiometalError::UnknownReadFeature { operator }),
    }
}

/// One optional field of a read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReadTag {
    /// Two-character tag name
    pub name: [u8; 2],
    /// BAM value type (`A c C s S i I f Z H B`)
    pub value_type: u8,
    /// Value in BAM binary form; `Z` strings include their NUL terminator
    pub value: Vec<u8>,
}

impl ReadTag {
    /// Create a tag.
    pub fn new(name: [u8; 2], value_type: u8, value: Vec<u8>) -> Self {
        Self {
            name,
            value_type,
            value,
        }
    }

    /// `Z` tag from a string; appends the NUL terminator.
    pub fn string(name: [u8; 2], text: &str) -> Self {
        let mut value = text.as_bytes().to_vec();
        value.push(0);
        Self::new(name, b'Z', value)
    }

    /// 3-byte tag id packed into an integer: `name[0] << 16 | name[1] << 8 | type`.
    pub fn tag_id(&self) -> i32 {
        tag_id(self.name, self.value_type)
    }
}

/// Pack a tag name and type into a tag id.
pub fn tag_id(name: [u8; 2], value_type: u8) -> i32 {
    ((name[0] as i32) << 16) | ((name[1] as i32) << 8) | value_type as i32
}

/// Split a tag id into name and type.
pub fn split_tag_id(id: i32) -> ([u8; 2], u8) {
    ([(id >> 16) as u8, (id >> 8) as u8], id as u8)
}

/// A CRAM compression record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CramRecord {
    /// BAM flags (BF)
    pub bam_flags: i32,
    /// CRAM flags (CF)
    pub cram_flags: i32,
    /// Reference sequence index, -1 when unplaced
    pub reference_index: i32,
    /// Read length (RL)
    pub read_length: i32,
    /// 1-based alignment start, 0 when unplaced
    pub alignment_start: i32,
    /// Read group index, -1 for none
    pub read_group: i32,
    /// Read name, if stored
    pub read_name: Option<Vec<u8>>,
    /// Mate flags (MF)
    pub mate_flags: i32,
    /// Mate reference index (NS)
    pub mate_reference_index: i32,
    /// Mate alignment start (NP)
    pub mate_alignment_start: i32,
    /// Template size (TS)
    pub template_size: i32,
    /// Records to the next fragment (NF), -1 when detached
    pub records_to_next_fragment: i32,
    /// Tags, in the order they were given
    pub tags: Vec<ReadTag>,
    /// Differences from the reference, ordered by position
    pub read_features: Vec<ReadFeature>,
    /// Mapping quality (MQ)
    pub mapping_quality: i32,
    /// Bases, stored only for unmapped reads
    pub bases: Vec<u8>,
    /// Quality scores, stored when `CF_QS_PRESERVED_AS_ARRAY` is set
    pub quality_scores: Vec<u8>,
}

impl Default for CramRecord {
    fn default() -> Self {
        Self {
            bam_flags: 0,
            cram_flags: CF_DETACHED,
            reference_index: NO_REFERENCE_INDEX,
            read_length: 0,
            alignment_start: 0,
            read_group: NO_READ_GROUP,
            read_name: None,
            mate_flags: 0,
            mate_reference_index: NO_REFERENCE_INDEX,
            mate_alignment_start: 0,
            template_size: 0,
            records_to_next_fragment: -1,
            tags: Vec::new(),
            read_features: Vec::new(),
            mapping_quality: 0,
            bases: Vec::new(),
            quality_scores: Vec::new(),
        }
    }
}

impl CramRecord {
    /// Unmapped read with the given bases; quality scores are stored when
    /// `quality_scores` is non-empty.
    pub fn unmapped(name: &[u8], bases: &[u8], quality_scores: &[u8]) -> Self {
        let mut record = Self {
            bam_flags: BAM_FLAG_UNMAPPED,
            read_length: bases.len() as i32,
            read_name: Some(name.to_vec()),
            bases: bases.to_vec(),
            quality_scores: quality_scores.to_vec(),
            ..Self::default()
        };
        if !quality_scores.is_empty() {
            record.cram_flags |= CF_QS_PRESERVED_AS_ARRAY;
        }
        record
    }

    /// Mapped read described by its features.
    pub fn mapped(
        name: &[u8],
        reference_index: i32,
        alignment_start: i32,
        read_length: i32,
        read_features: Vec<ReadFeature>,
    ) -> Self {
        Self {
            reference_index,
            alignment_start,
            read_length,
            read_name: Some(name.to_vec()),
            read_features,
            ..Self::default()
        }
    }

    /// BAM flag 0x4.
    pub fn is_segment_unmapped(&self) -> bool {
        self.bam_flags & BAM_FLAG_UNMAPPED != 0
    }

    /// Whether the record has an alignment start.
    pub fn is_placed(&self) -> bool {
        self.alignment_start != 0
    }

    /// Mate information stored literally (CF 0x2).
    pub fn is_detached(&self) -> bool {
        self.cram_flags & CF_DETACHED != 0
    }

    /// Mate later in the slice (CF 0x4).
    pub fn has_mate_downstream(&self) -> bool {
        self.cram_flags & CF_HAS_MATE_DOWNSTREAM != 0
    }

    /// Quality scores stored as an array (CF 0x1).
    pub fn is_quality_preserved_as_array(&self) -> bool {
        self.cram_flags & CF_QS_PRESERVED_AS_ARRAY != 0
    }

    /// No bases stored (CF 0x8).
    pub fn is_unknown_bases(&self) -> bool {
        self.cram_flags & CF_UNKNOWN_BASES != 0
    }

    /// Last reference position covered by the read.
    ///
    /// `start + read_length - 1`, shrunk by insertions and soft clips and
    /// grown by deletions and reference skips. Unplaced records report their
    /// start.
    pub fn alignment_end(&self) -> i32 {
        if self.alignment_start == 0 || self.is_segment_unmapped() {
            return self.alignment_start;
        }
        let span = self
            .read_features
            .iter()
            .fold(self.read_length, |span, feature| span + feature.span_delta());
        self.alignment_start + span - 1
    }

    /// Tag ids sorted ascending: the record's tag dictionary line.
    pub fn sorted_tag_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.tags.iter().map(ReadTag::tag_id).collect();
        ids.sort_unstable();
        ids
    }
}
