//! Reads CRAM records back out of a slice's streams.

use super::compression_header::CompressionHeader;
use super::data_series::DataSeries;
use super::record::{
    check_operator, split_tag_id, CramRecord, ReadFeature, ReadTag, SubstitutionValue,
    BAM_FLAG_MATE_REVERSE, BAM_FLAG_MATE_UNMAPPED, MF_MATE_NEG_STRAND, MF_MATE_UNMAPPED,
};
use super::series_codecs::DataSeriesCodecs;
use super::streams::SliceBlocksReader;
use crate::{BiometalError, Result};

/// Series every record of every slice decodes.
const UPFRONT_SERIES: [DataSeries; 6] = [
    DataSeries::BF,
    DataSeries::CF,
    DataSeries::RL,
    DataSeries::AP,
    DataSeries::RG,
    DataSeries::TL,
];

/// Record reader for one slice.
///
/// Construction checks everything the header alone makes mandatory: BF, CF,
/// RL, AP, RG and TL, RI for a multi-reference slice, RN when read names are
/// preserved, and an encoding for every tag in the tag dictionary. Series
/// that only some records reach (read features, mate fields, bases of
/// unmapped reads) are looked up when the first record needs them, so a
/// header that omits, say, the deletion length series still decodes slices
/// without deletions.
#[derive(Debug)]
pub struct CramRecordReader<'h> {
    header: &'h CompressionHeader,
    codecs: DataSeriesCodecs,
    multi_reference: bool,
}

impl<'h> CramRecordReader<'h> {
    /// Build a reader over `header`.
    pub fn new(header: &'h CompressionHeader, multi_reference: bool) -> Result<Self> {
        let preservation = &header.preservation_map;
        let mut required = UPFRONT_SERIES.to_vec();
        if multi_reference {
            required.push(DataSeries::RI);
        }
        if preservation.read_names_included {
            required.push(DataSeries::RN);
        }

        let codecs = DataSeriesCodecs::new(header, &required)?;
        for &tag_id in preservation.tag_ids_dictionary.iter().flatten() {
            codecs.tag(tag_id)?;
        }

        Ok(Self {
            header,
            codecs,
            multi_reference,
        })
    }

    /// Decode `count` records.
    ///
    /// `slice_start` seeds alignment deltas; `slice_reference` is assigned to
    /// every record unless the slice is multi-reference, in which case each
    /// record carries its own RI.
    pub fn read_records(
        &self,
        streams: &mut SliceBlocksReader<'_>,
        count: usize,
        slice_start: i32,
        slice_reference: i32,
    ) -> Result<Vec<CramRecord>> {
        let mut records = Vec::with_capacity(count);
        let mut previous_start = slice_start;
        for _ in 0..count {
            let record = self.read_record(streams, previous_start, slice_reference)?;
            previous_start = record.alignment_start;
            records.push(record);
        }
        Ok(records)
    }

    fn read_record(
        &self,
        streams: &mut SliceBlocksReader<'_>,
        previous_start: i32,
        slice_reference: i32,
    ) -> Result<CramRecord> {
        use DataSeries::*;
        let codecs = &self.codecs;
        let preservation = &self.header.preservation_map;

        let mut record = CramRecord {
            bam_flags: codecs.int(BF)?.read(streams)?,
            cram_flags: codecs.int(CF)?.read(streams)?,
            ..CramRecord::default()
        };
        record.reference_index = if self.multi_reference {
            codecs.int(RI)?.read(streams)?
        } else {
            slice_reference
        };
        record.read_length = codecs.int(RL)?.read(streams)?;
        if record.read_length < 0 {
            return Err(BiometalError::cram(format!(
                "Negative read length: {}",
                record.read_length
            )));
        }
        let position = codecs.int(AP)?.read(streams)?;
        record.alignment_start = if preservation.ap_delta {
            previous_start + position
        } else {
            position
        };
        record.read_group = codecs.int(RG)?.read(streams)?;
        if preservation.read_names_included {
            record.read_name = Some(codecs.byte_array(RN)?.read(streams, None)?);
        }

        if record.is_detached() {
            record.mate_flags = codecs.int(MF)?.read(streams)?;
            if record.mate_flags & MF_MATE_NEG_STRAND != 0 {
                record.bam_flags |= BAM_FLAG_MATE_REVERSE;
            }
            if record.mate_flags & MF_MATE_UNMAPPED != 0 {
                record.bam_flags |= BAM_FLAG_MATE_UNMAPPED;
            }
            if !preservation.read_names_included {
                record.read_name = Some(codecs.byte_array(RN)?.read(streams, None)?);
            }
            record.mate_reference_index = codecs.int(NS)?.read(streams)?;
            record.mate_alignment_start = codecs.int(NP)?.read(streams)?;
            record.template_size = codecs.int(TS)?.read(streams)?;
        } else if record.has_mate_downstream() {
            record.records_to_next_fragment = codecs.int(NF)?.read(streams)?;
        }

        let tag_line = codecs.int(TL)?.read(streams)?;
        let line = usize::try_from(tag_line)
            .ok()
            .and_then(|i| preservation.tag_ids_dictionary.get(i))
            .ok_or_else(|| {
                BiometalError::cram(format!(
                    "Tag line {} outside a dictionary of {} entries",
                    tag_line,
                    preservation.tag_ids_dictionary.len()
                ))
            })?;
        for &tag_id in line {
            let value = codecs.tag(tag_id)?.read(streams, None)?;
            let (name, value_type) = split_tag_id(tag_id);
            record.tags.push(ReadTag::new(name, value_type, value));
        }

        let read_length = record.read_length as usize;
        if record.is_segment_unmapped() {
            if !record.is_unknown_bases() && read_length > 0 {
                record.bases = codecs.byte(BA)?.read_many(streams, read_length)?;
            }
            if record.is_quality_preserved_as_array() {
                record.quality_scores = codecs.byte(QS)?.read_many(streams, read_length)?;
            }
            return Ok(record);
        }

        let feature_count = codecs.int(FN)?.read(streams)?;
        let feature_count = usize::try_from(feature_count).map_err(|_| {
            BiometalError::cram(format!("Negative read feature count: {}", feature_count))
        })?;
        let mut previous_position = 0;
        for _ in 0..feature_count {
            let feature = self.read_feature(streams, previous_position)?;
            previous_position = feature.position();
            record.read_features.push(feature);
        }

        record.mapping_quality = codecs.int(MQ)?.read(streams)?;
        if record.is_quality_preserved_as_array() {
            record.quality_scores = codecs.byte(QS)?.read_many(streams, read_length)?;
        }
        Ok(record)
    }

    fn read_feature(
        &self,
        streams: &mut SliceBlocksReader<'_>,
        previous_position: i32,
    ) -> Result<ReadFeature> {
        use DataSeries::*;
        let codecs = &self.codecs;

        let operator = check_operator(codecs.byte(FC)?.read(streams)?)?;
        let position = previous_position + codecs.int(FP)?.read(streams)?;

        let feature = match operator {
            b'X' => ReadFeature::Substitution {
                position,
                value: SubstitutionValue::Code(codecs.byte(BS)?.read(streams)?),
            },
            b'B' => {
                let base = codecs.byte(BA)?.read(streams)?;
                let quality = codecs.byte(QS)?.read(streams)?;
                ReadFeature::ReadBase {
                    position,
                    base,
                    quality,
                }
            }
            b'I' => ReadFeature::Insertion {
                position,
                bases: codecs.byte_array(IN)?.read(streams, None)?,
            },
            b'i' => ReadFeature::InsertBase {
                position,
                base: codecs.byte(BA)?.read(streams)?,
            },
            b'S' => ReadFeature::SoftClip {
                position,
                bases: codecs.byte_array(SC)?.read(streams, None)?,
            },
            b'H' => ReadFeature::HardClip {
                position,
                length: codecs.int(HC)?.read(streams)?,
            },
            b'P' => ReadFeature::Padding {
                position,
                length: codecs.int(PD)?.read(streams)?,
            },
            b'D' => ReadFeature::Deletion {
                position,
                length: codecs.int(DL)?.read(streams)?,
            },
            b'N' => ReadFeature::RefSkip {
                position,
                length: codecs.int(RS)?.read(streams)?,
            },
            b'Q' => ReadFeature::BaseQuality {
                position,
                quality: codecs.byte(QS)?.read(streams)?,
            },
            b'b' => ReadFeature::Bases {
                position,
                bases: codecs.byte_array(BB)?.read(streams, None)?,
            },
            b'q' => ReadFeature::Scores {
                position,
                scores: codecs.byte_array(QQ)?.read(streams, None)?,
            },
            other => return Err(BiometalError::UnknownReadFeature { operator: other }),
        };
        Ok(feature)
    }
}
