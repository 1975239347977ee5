//! CRAM data series: the named per-record fields, each with its own encoding.

use crate::{BiometalError, Result};
use std::fmt;

/// Value type a data series carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSeriesType {
    /// 32-bit integer (ITF-8 in external blocks)
    Int,
    /// Single byte
    Byte,
    /// Byte array
    ByteArray,
}

/// CRAM data series identifier.
///
/// Two-character codes identifying different types of data in CRAM records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataSeries {
    /// BAM bit flags
    BF,
    /// CRAM bit flags
    CF,
    /// Reference ID
    RI,
    /// Read lengths
    RL,
    /// Alignment start positions
    AP,
    /// Read groups
    RG,
    /// Read names
    RN,
    /// Records to next fragment
    NF,
    /// Next mate bit flags
    MF,
    /// Next fragment reference ID
    NS,
    /// Next fragment alignment start
    NP,
    /// Template size
    TS,
    /// Tag names list ID
    TL,
    /// Number of read features
    FN,
    /// Feature codes
    FC,
    /// In-read positions
    FP,
    /// Deletion lengths
    DL,
    /// Bases
    BA,
    /// Quality scores
    QS,
    /// Base substitution codes
    BS,
    /// Insertion sequences
    IN,
    /// Reference skip length
    RS,
    /// Soft clip sequences
    SC,
    /// Hard clip lengths
    HC,
    /// Padding lengths
    PD,
    /// Mapping qualities
    MQ,
    /// Stretches of bases
    BB,
    /// Stretches of quality scores
    QQ,
    /// Tag count (obsolete, ignored)
    TC,
    /// Tag name and type (obsolete, ignored)
    TN,
}

impl DataSeries {
    /// Every data series, in content-ID order.
    pub const ALL: [DataSeries; 30] = [
        Self::BF,
        Self::CF,
        Self::RI,
        Self::RL,
        Self::AP,
        Self::RG,
        Self::RN,
        Self::NF,
        Self::MF,
        Self::NS,
        Self::NP,
        Self::TS,
        Self::TL,
        Self::FN,
        Self::FC,
        Self::FP,
        Self::DL,
        Self::BA,
        Self::QS,
        Self::BS,
        Self::IN,
        Self::RS,
        Self::SC,
        Self::HC,
        Self::PD,
        Self::MQ,
        Self::BB,
        Self::QQ,
        Self::TC,
        Self::TN,
    ];

    /// Two-character key stored in the compression header.
    pub fn key(self) -> [u8; 2] {
        match self {
            Self::BF => *b"BF",
            Self::CF => *b"CF",
            Self::RI => *b"RI",
            Self::RL => *b"RL",
            Self::AP => *b"AP",
            Self::RG => *b"RG",
            Self::RN => *b"RN",
            Self::NF => *b"NF",
            Self::MF => *b"MF",
            Self::NS => *b"NS",
            Self::NP => *b"NP",
            Self::TS => *b"TS",
            Self::TL => *b"TL",
            Self::FN => *b"FN",
            Self::FC => *b"FC",
            Self::FP => *b"FP",
            Self::DL => *b"DL",
            Self::BA => *b"BA",
            Self::QS => *b"QS",
            Self::BS => *b"BS",
            Self::IN => *b"IN",
            Self::RS => *b"RS",
            Self::SC => *b"SC",
            Self::HC => *b"HC",
            Self::PD => *b"PD",
            Self::MQ => *b"MQ",
            Self::BB => *b"BB",
            Self::QQ => *b"QQ",
            Self::TC => *b"TC",
            Self::TN => *b"TN",
        }
    }

    /// Value type carried by this series.
    pub fn value_type(self) -> DataSeriesType {
        match self {
            Self::RN | Self::IN | Self::SC | Self::BB | Self::QQ => DataSeriesType::ByteArray,
            Self::FC | Self::BA | Self::QS | Self::BS | Self::TC => DataSeriesType::Byte,
            _ => DataSeriesType::Int,
        }
    }

    /// Default external block content ID.
    pub fn content_id(self) -> i32 {
        match self {
            Self::BF => 1,
            Self::CF => 2,
            Self::RI => 3,
            Self::RL => 4,
            Self::AP => 5,
            Self::RG => 6,
            Self::RN => 7,
            Self::NF => 8,
            Self::MF => 9,
            Self::NS => 10,
            Self::NP => 11,
            Self::TS => 12,
            Self::TL => 13,
            Self::FN => 14,
            Self::FC => 15,
            Self::FP => 16,
            Self::DL => 17,
            Self::BA => 18,
            Self::QS => 19,
            Self::BS => 20,
            Self::IN => 21,
            Self::RS => 22,
            Self::SC => 23,
            Self::HC => 24,
            Self::PD => 25,
            Self::MQ => 26,
            Self::BB => 27,
            Self::QQ => 28,
            Self::TC => 29,
            Self::TN => 30,
        }
    }

    /// Series no longer written by CRAM 3.0 encoders.
    pub fn is_obsolete(self) -> bool {
        matches!(self, Self::TC | Self::TN)
    }
}

impl TryFrom<[u8; 2]> for DataSeries {
    type Error = BiometalError;

    fn try_from(key: [u8; 2]) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|series| series.key() == key)
            .ok_or_else(|| {
                BiometalError::cram(format!(
                    "Unknown data series: {}",
                    String::from_utf8_lossy(&key)
                ))
            })
    }
}

impl fmt::Display for DataSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.key();
        write!(f, "{}{}", key[0] as char, key[1] as char)
    }
}
