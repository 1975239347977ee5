//! Typed codecs for every data series and tag a compression header describes.

use super::codecs::{ByteArrayCodec, ByteCodec, IntegerCodec};
use super::compression_header::CompressionHeader;
use super::data_series::{DataSeries, DataSeriesType};
use crate::{BiometalError, Result};
use std::collections::HashMap;

/// Codecs built from one compression header.
///
/// Every encoding in the header is turned into a codec up front, so an
/// encoding that cannot carry its series' value type fails here. Series
/// listed as required must be present; any other series is looked up when
/// first used and a missing one is reported then.
#[derive(Debug, Clone, Default)]
pub struct DataSeriesCodecs {
    ints: HashMap<DataSeries, IntegerCodec>,
    bytes: HashMap<DataSeries, ByteCodec>,
    arrays: HashMap<DataSeries, ByteArrayCodec>,
    tags: HashMap<i32, ByteArrayCodec>,
}

fn missing(series: DataSeries) -> BiometalError {
    BiometalError::MissingEncoding {
        key: series.to_string(),
    }
}

impl DataSeriesCodecs {
    /// Build codecs for `header`, failing if any of `required` has no encoding.
    pub fn new(header: &CompressionHeader, required: &[DataSeries]) -> Result<Self> {
        if let Some(&series) = required
            .iter()
            .find(|s| !header.data_series_encodings.contains_key(*s))
        {
            return Err(missing(series));
        }

        let mut codecs = Self::default();
        for (&series, encoding) in &header.data_series_encodings {
            match series.value_type() {
                DataSeriesType::Int => {
                    codecs.ints.insert(series, IntegerCodec::from_encoding(encoding)?);
                }
                DataSeriesType::Byte => {
                    codecs.bytes.insert(series, ByteCodec::from_encoding(encoding)?);
                }
                DataSeriesType::ByteArray => {
                    codecs.arrays.insert(series, ByteArrayCodec::from_encoding(encoding)?);
                }
            }
        }
        for (&tag_id, encoding) in &header.tag_encodings {
            codecs.tags.insert(tag_id, ByteArrayCodec::from_encoding(encoding)?);
        }

        cram_debug!(
            "DataSeriesCodecs: {} int, {} byte, {} array, {} tag codecs",
            codecs.ints.len(),
            codecs.bytes.len(),
            codecs.arrays.len(),
            codecs.tags.len()
        );
        Ok(codecs)
    }

    /// Integer codec for `series`.
    pub fn int(&self, series: DataSeries) -> Result<&IntegerCodec> {
        self.ints.get(&series).ok_or_else(|| missing(series))
    }

    /// Byte codec for `series`.
    pub fn byte(&self, series: DataSeries) -> Result<&ByteCodec> {
        self.bytes.get(&series).ok_or_else(|| missing(series))
    }

    /// Byte-array codec for `series`.
    pub fn byte_array(&self, series: DataSeries) -> Result<&ByteArrayCodec> {
        self.arrays.get(&series).ok_or_else(|| missing(series))
    }

    /// Value codec for the tag with `tag_id`.
    pub fn tag(&self, tag_id: i32) -> Result<&ByteArrayCodec> {
        self.tags.get(&tag_id).ok_or_else(|| {
            let name = [(tag_id >> 16) as u8, (tag_id >> 8) as u8, tag_id as u8];
            BiometalError::MissingEncoding {
                key: format!("tag {}", String::from_utf8_lossy(&name)),
            }
        })
    }
}
