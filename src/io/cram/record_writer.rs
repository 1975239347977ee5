//! Writes CRAM records into a slice's streams in data series order.

use super::compression_header::CompressionHeader;
use super::data_series::DataSeries;
use super::record::{CramRecord, ReadFeature, SubstitutionValue};
use super::series_codecs::DataSeriesCodecs;
use super::streams::SliceBlocksWriter;
use crate::{BiometalError, Result};
use std::collections::{BTreeSet, HashMap};

/// Data series the records will touch, given the header's policy.
pub fn required_series(
    records: &[CramRecord],
    header: &CompressionHeader,
    multi_reference: bool,
) -> Vec<DataSeries> {
    use DataSeries::*;

    let mut required: BTreeSet<DataSeries> = [BF, CF, RL, AP, RG, TL].into_iter().collect();
    if multi_reference {
        required.insert(RI);
    }
    if header.preservation_map.read_names_included {
        required.insert(RN);
    }

    for record in records {
        if record.is_detached() {
            required.extend([MF, NS, NP, TS, RN]);
        } else if record.has_mate_downstream() {
            required.insert(NF);
        }
        if record.is_quality_preserved_as_array() {
            required.insert(QS);
        }
        if record.is_segment_unmapped() {
            if !record.is_unknown_bases() && record.read_length > 0 {
                required.insert(BA);
            }
            continue;
        }
        required.extend([FN, MQ]);
        if !record.read_features.is_empty() {
            required.extend([FC, FP]);
        }
        for feature in &record.read_features {
            match feature {
                ReadFeature::Substitution { .. } => required.insert(BS),
                ReadFeature::ReadBase { .. } => {
                    required.insert(BA);
                    required.insert(QS)
                }
                ReadFeature::Insertion { .. } => required.insert(IN),
                ReadFeature::InsertBase { .. } => required.insert(BA),
                ReadFeature::SoftClip { .. } => required.insert(SC),
                ReadFeature::HardClip { .. } => required.insert(HC),
                ReadFeature::Padding { .. } => required.insert(PD),
                ReadFeature::Deletion { .. } => required.insert(DL),
                ReadFeature::RefSkip { .. } => required.insert(RS),
                ReadFeature::BaseQuality { .. } => required.insert(QS),
                ReadFeature::Bases { .. } => required.insert(BB),
                ReadFeature::Scores { .. } => required.insert(QQ),
            };
        }
    }

    required.into_iter().collect()
}

/// Record writer for one slice.
#[derive(Debug)]
pub struct CramRecordWriter<'h> {
    header: &'h CompressionHeader,
    codecs: DataSeriesCodecs,
    tag_lines: HashMap<&'h [i32], i32>,
    multi_reference: bool,
}

impl<'h> CramRecordWriter<'h> {
    /// Build a writer for `records`, failing before anything is written if
    /// the header lacks an encoding they need.
    pub fn new(
        header: &'h CompressionHeader,
        records: &[CramRecord],
        multi_reference: bool,
    ) -> Result<Self> {
        let required = required_series(records, header, multi_reference);
        let codecs = DataSeriesCodecs::new(header, &required)?;
        for tag in records.iter().flat_map(|r| r.tags.iter()) {
            codecs.tag(tag.tag_id())?;
        }
        Ok(Self {
            header,
            codecs,
            tag_lines: header.tag_line_index(),
            multi_reference,
        })
    }

    /// Write every record; alignment deltas start from `slice_start`.
    pub fn write_records(
        &self,
        streams: &mut SliceBlocksWriter,
        records: &[CramRecord],
        slice_start: i32,
    ) -> Result<()> {
        let mut previous_start = slice_start;
        for record in records {
            self.write_record(streams, record, previous_start)?;
            previous_start = record.alignment_start;
        }
        Ok(())
    }

    fn write_record(
        &self,
        streams: &mut SliceBlocksWriter,
        record: &CramRecord,
        previous_start: i32,
    ) -> Result<()> {
        use DataSeries::*;
        let codecs = &self.codecs;
        let preservation = &self.header.preservation_map;
        let name = record.read_name.as_deref().unwrap_or_default();

        codecs.int(BF)?.write(streams, record.bam_flags)?;
        codecs.int(CF)?.write(streams, record.cram_flags)?;
        if self.multi_reference {
            codecs.int(RI)?.write(streams, record.reference_index)?;
        }
        codecs.int(RL)?.write(streams, record.read_length)?;
        let position = if preservation.ap_delta {
            record.alignment_start - previous_start
        } else {
            record.alignment_start
        };
        codecs.int(AP)?.write(streams, position)?;
        codecs.int(RG)?.write(streams, record.read_group)?;
        if preservation.read_names_included {
            codecs.byte_array(RN)?.write(streams, name)?;
        }

        if record.is_detached() {
            codecs.int(MF)?.write(streams, record.mate_flags)?;
            if !preservation.read_names_included {
                codecs.byte_array(RN)?.write(streams, name)?;
            }
            codecs.int(NS)?.write(streams, record.mate_reference_index)?;
            codecs.int(NP)?.write(streams, record.mate_alignment_start)?;
            codecs.int(TS)?.write(streams, record.template_size)?;
        } else if record.has_mate_downstream() {
            codecs.int(NF)?.write(streams, record.records_to_next_fragment)?;
        }

        let mut tags: Vec<_> = record.tags.iter().collect();
        tags.sort_by_key(|t| t.tag_id());
        let line: Vec<i32> = tags.iter().map(|t| t.tag_id()).collect();
        let tag_line = *self.tag_lines.get(line.as_slice()).ok_or_else(|| {
            BiometalError::InvalidConfiguration(format!(
                "Tag list {:?} is not in the tag dictionary",
                line
            ))
        })?;
        codecs.int(TL)?.write(streams, tag_line)?;
        for tag in tags {
            codecs.tag(tag.tag_id())?.write(streams, &tag.value)?;
        }

        if record.is_segment_unmapped() {
            if !record.is_unknown_bases() && record.read_length > 0 {
                if record.bases.len() != record.read_length as usize {
                    return Err(BiometalError::InvalidConfiguration(format!(
                        "{} bases for an unmapped read of length {}",
                        record.bases.len(),
                        record.read_length
                    )));
                }
                codecs.byte(BA)?.write_many(streams, &record.bases)?;
            }
            if record.is_quality_preserved_as_array() {
                self.write_quality_scores(streams, record)?;
            }
            return Ok(());
        }

        codecs.int(FN)?.write(streams, record.read_features.len() as i32)?;
        let mut previous_position = 0;
        for feature in &record.read_features {
            debug_assert!(
                feature.position() >= previous_position,
                "read feature positions must not decrease"
            );
            self.write_feature(streams, feature, previous_position)?;
            previous_position = feature.position();
        }

        codecs.int(MQ)?.write(streams, record.mapping_quality)?;
        if record.is_quality_preserved_as_array() {
            self.write_quality_scores(streams, record)?;
        }
        Ok(())
    }

    fn write_quality_scores(&self, streams: &mut SliceBlocksWriter, record: &CramRecord) -> Result<()> {
        if record.quality_scores.len() != record.read_length as usize {
            return Err(BiometalError::InvalidConfiguration(format!(
                "{} quality scores for a read of length {}",
                record.quality_scores.len(),
                record.read_length
            )));
        }
        self.codecs
            .byte(DataSeries::QS)?
            .write_many(streams, &record.quality_scores)
    }

    fn write_feature(
        &self,
        streams: &mut SliceBlocksWriter,
        feature: &ReadFeature,
        previous_position: i32,
    ) -> Result<()> {
        use DataSeries::*;
        let codecs = &self.codecs;

        codecs.byte(FC)?.write(streams, feature.operator())?;
        codecs.int(FP)?.write(streams, feature.position() - previous_position)?;

        match feature {
            ReadFeature::Substitution { value, .. } => {
                let code = match *value {
                    SubstitutionValue::Code(code) => code,
                    SubstitutionValue::Bases { reference, read } => self
                        .header
                        .preservation_map
                        .substitution_matrix
                        .code(reference, read)?,
                };
                codecs.byte(BS)?.write(streams, code)
            }
            ReadFeature::ReadBase { base, quality, .. } => {
                codecs.byte(BA)?.write(streams, *base)?;
                codecs.byte(QS)?.write(streams, *quality)
            }
            ReadFeature::Insertion { bases, .. } => codecs.byte_array(IN)?.write(streams, bases),
            ReadFeature::InsertBase { base, .. } => codecs.byte(BA)?.write(streams, *base),
            ReadFeature::SoftClip { bases, .. } => codecs.byte_array(SC)?.write(streams, bases),
            ReadFeature::HardClip { length, .. } => codecs.int(HC)?.write(streams, *length),
            ReadFeature::Padding { length, .. } => codecs.int(PD)?.write(streams, *length),
            ReadFeature::Deletion { length, .. } => codecs.int(DL)?.write(streams, *length),
            ReadFeature::RefSkip { length, .. } => codecs.int(RS)?.write(streams, *length),
            ReadFeature::BaseQuality { quality, .. } => codecs.byte(QS)?.write(streams, *quality),
            ReadFeature::Bases { bases, .. } => codecs.byte_array(BB)?.write(streams, bases),
            ReadFeature::Scores { scores, .. } => codecs.byte_array(QQ)?.write(streams, scores),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cram::compression_header::CompressionHeaderFactory;
    use crate::io::cram::record::{ReadTag, CF_DETACHED, CF_HAS_MATE_DOWNSTREAM};
    use crate::io::cram::strategy::EncodingStrategy;

    #[test]
    fn test_required_series_unmapped_only() {
        let header = CompressionHeader::default();
        let records = vec![CramRecord::unmapped(b"u", b"ACGT", b"")];
        let required = required_series(&records, &header, false);
        assert!(required.contains(&DataSeries::BA));
        assert!(required.contains(&DataSeries::RN));
        assert!(!required.contains(&DataSeries::FN));
        assert!(!required.contains(&DataSeries::QS));
        assert!(!required.contains(&DataSeries::RI));
    }

    #[test]
    fn test_required_series_mapped_attached() {
        let header = CompressionHeader::default();
        let mut record = CramRecord::mapped(
            b"m",
            0,
            10,
            5,
            vec![ReadFeature::Deletion {
                position: 2,
                length: 1,
            }],
        );
        record.cram_flags = CF_HAS_MATE_DOWNSTREAM;
        let required = required_series(&[record], &header, true);
        for series in [DataSeries::RI, DataSeries::NF, DataSeries::FN, DataSeries::FC, DataSeries::DL, DataSeries::MQ] {
            assert!(required.contains(&series), "{}", series);
        }
        assert!(!required.contains(&DataSeries::MF));
    }

    #[test]
    fn test_missing_series_fails_before_writing() {
        let records = vec![CramRecord::unmapped(b"u", b"ACGT", b"IIII")];
        let mut header = CompressionHeaderFactory::new(EncodingStrategy::default())
            .build(&records)
            .unwrap();
        header.data_series_encodings.remove(&DataSeries::QS);
        assert!(matches!(
            CramRecordWriter::new(&header, &records, false),
            Err(BiometalError::MissingEncoding { ref key }) if key == "QS"
        ));
    }

    #[test]
    fn test_missing_tag_encoding() {
        let mut record = CramRecord::unmapped(b"u", b"A", b"");
        record.tags.push(ReadTag::new(*b"NM", b'c', vec![0]));
        let records = vec![record];
        let mut header = CompressionHeaderFactory::new(EncodingStrategy::default())
            .build(&records)
            .unwrap();
        header.tag_encodings.clear();
        assert!(CramRecordWriter::new(&header, &records, false).is_err());
    }

    #[test]
    fn test_quality_length_mismatch() {
        let mut record = CramRecord::unmapped(b"u", b"ACGT", b"II");
        record.cram_flags = CF_DETACHED | crate::io::cram::record::CF_QS_PRESERVED_AS_ARRAY;
        let records = vec![record];
        let header = CompressionHeaderFactory::new(EncodingStrategy::default())
            .build(&records)
            .unwrap();
        let writer = CramRecordWriter::new(&header, &records, false).unwrap();
        let mut streams = SliceBlocksWriter::default();
        assert!(writer.write_records(&mut streams, &records, 0).is_err());
    }
}
