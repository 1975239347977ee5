//! Compression header: preservation map, data series encodings and tag
//! encodings shared by every slice of a container.
//!
//! # Format
//!
//! ```text
//! Preservation map:  ITF-8 byte size, ITF-8 entry count, entries
//!   RN/AP/RR: bool byte; SM: 5 bytes; TD: ITF-8 length + tag id lists
//! Data series map:   ITF-8 byte size, ITF-8 entry count, (2-byte key, encoding)*
//! Tag encoding map:  ITF-8 byte size, ITF-8 entry count, (ITF-8 tag id, encoding)*
//! ```
//!
//! The tag dictionary (TD) stores lists of 3-byte tag ids (name + type),
//! each list terminated by a NUL byte. A record's TL value indexes it.

use super::block::{Block, BlockCompressor, BlockContentType};
use super::data_series::{DataSeries, DataSeriesType};
use super::encoding::Encoding;
use super::itf8::{read_itf8, write_itf8};
use super::rans::RansOrder;
use super::record::{split_tag_id, CramRecord, ReadFeature, SubstitutionValue};
use super::strategy::{EncodingStrategy, DEFAULT_GZIP_LEVEL};
use super::substitution::{base_index, SubstitutionFrequencies, SubstitutionMatrix};
use crate::{BiometalError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Cursor, Read};

// ============================================================================
// Preservation map
// ============================================================================

/// Preservation policy of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservationMap {
    /// Read names stored (RN)
    pub read_names_included: bool,
    /// Alignment starts stored as deltas (AP)
    pub ap_delta: bool,
    /// Reference required to decode (RR)
    pub reference_required: bool,
    /// Substitution matrix (SM)
    pub substitution_matrix: SubstitutionMatrix,
    /// Tag id dictionary (TD); entry 0 is the empty list
    pub tag_ids_dictionary: Vec<Vec<i32>>,
}

impl Default for PreservationMap {
    fn default() -> Self {
        Self {
            read_names_included: true,
            ap_delta: true,
            reference_required: true,
            substitution_matrix: SubstitutionMatrix::default(),
            tag_ids_dictionary: vec![Vec::new()],
        }
    }
}

fn read_exact_or<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|e| BiometalError::cram(format!("Failed to read {}: {}", what, e)))
}

/// ITF-8 byte size followed by that many bytes.
fn read_sized_section<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let size = read_itf8(reader)?;
    let size = usize::try_from(size)
        .map_err(|_| BiometalError::cram(format!("Negative {} size: {}", what, size)))?;
    let mut data = Vec::new();
    reader.by_ref().take(size as u64).read_to_end(&mut data)?;
    if data.len() != size {
        return Err(BiometalError::cram(format!(
            "Truncated {}: expected {} bytes, got {}",
            what,
            size,
            data.len()
        )));
    }
    Ok(data)
}

fn write_sized_section(out: &mut Vec<u8>, section: &[u8]) -> Result<()> {
    write_itf8(out, section.len() as i32)?;
    out.extend_from_slice(section);
    Ok(())
}

fn read_count(reader: &mut Cursor<&[u8]>, what: &str) -> Result<usize> {
    let count = read_itf8(reader)?;
    usize::try_from(count).map_err(|_| BiometalError::cram(format!("Negative {} count: {}", what, count)))
}

impl PreservationMap {
    /// Parse the preservation map body (after its byte size).
    fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);
        let mut map = Self::default();
        let mut matrix_seen = false;
        let mut dictionary_seen = false;

        let entries = read_count(&mut reader, "preservation map")?;
        cram_debug!("PreservationMap::parse: {} entries, {} bytes", entries, data.len());

        for _ in 0..entries {
            let mut key = [0u8; 2];
            read_exact_or(&mut reader, &mut key, "preservation map key")?;

            match &key {
                b"RN" | b"AP" | b"RR" => {
                    let mut value = [0u8; 1];
                    read_exact_or(&mut reader, &mut value, "preservation map flag")?;
                    let flag = value[0] == 1;
                    match &key {
                        b"RN" => map.read_names_included = flag,
                        b"AP" => map.ap_delta = flag,
                        _ => map.reference_required = flag,
                    }
                }
                b"SM" => {
                    let mut matrix = [0u8; 5];
                    read_exact_or(&mut reader, &mut matrix, "substitution matrix")?;
                    map.substitution_matrix = SubstitutionMatrix::from_bytes(matrix)?;
                    matrix_seen = true;
                }
                b"TD" => {
                    let bytes = read_sized_section(&mut reader, "tag dictionary")?;
                    map.tag_ids_dictionary = parse_dictionary(&bytes)?;
                    dictionary_seen = true;
                }
                _ => {
                    return Err(BiometalError::cram(format!(
                        "Unknown preservation map key: {}{}",
                        key[0] as char, key[1] as char
                    )));
                }
            }
        }

        if !matrix_seen || !dictionary_seen {
            return Err(BiometalError::cram(
                "Preservation map lacks the substitution matrix or tag dictionary",
            ));
        }
        Ok(map)
    }

    /// Serialize the body: entry count and the five entries.
    fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_itf8(&mut out, 5)?;
        for (key, flag) in [
            (b"RN", self.read_names_included),
            (b"AP", self.ap_delta),
            (b"RR", self.reference_required),
        ] {
            out.extend_from_slice(key);
            out.push(flag as u8);
        }
        out.extend_from_slice(b"SM");
        out.extend_from_slice(&self.substitution_matrix.to_bytes());
        out.extend_from_slice(b"TD");
        write_sized_section(&mut out, &dictionary_bytes(&self.tag_ids_dictionary))?;
        Ok(out)
    }
}

fn parse_dictionary(bytes: &[u8]) -> Result<Vec<Vec<i32>>> {
    let mut dictionary = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let mut ids = Vec::new();
        while bytes[i] != 0 {
            let id = bytes.get(i..i + 3).ok_or_else(|| {
                BiometalError::cram("Tag dictionary entry truncated")
            })?;
            ids.push(((id[0] as i32) << 16) | ((id[1] as i32) << 8) | id[2] as i32);
            i += 3;
            if i >= bytes.len() {
                return Err(BiometalError::cram("Tag dictionary list not terminated"));
            }
        }
        i += 1;
        dictionary.push(ids);
    }
    Ok(dictionary)
}

fn dictionary_bytes(dictionary: &[Vec<i32>]) -> Vec<u8> {
    let mut out = Vec::new();
    for ids in dictionary {
        for &id in ids {
            let (name, value_type) = split_tag_id(id);
            out.extend_from_slice(&[name[0], name[1], value_type]);
        }
        out.push(0);
    }
    out
}

// ============================================================================
// Compression header
// ============================================================================

/// Encodings and preservation policy of one container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompressionHeader {
    /// Preservation map
    pub preservation_map: PreservationMap,
    /// Data series encodings
    pub data_series_encodings: BTreeMap<DataSeries, Encoding>,
    /// Tag encodings keyed by tag id
    pub tag_encodings: BTreeMap<i32, Encoding>,
    /// Compressor per external content id; only populated when writing
    pub external_compressors: BTreeMap<i32, BlockCompressor>,
}

impl CompressionHeader {
    /// Encoding of `series`, or [`BiometalError::MissingEncoding`].
    pub fn encoding(&self, series: DataSeries) -> Result<&Encoding> {
        self.data_series_encodings
            .get(&series)
            .ok_or_else(|| BiometalError::MissingEncoding {
                key: series.to_string(),
            })
    }

    /// Encoding of the tag with `tag_id`, or [`BiometalError::MissingEncoding`].
    pub fn tag_encoding(&self, tag_id: i32) -> Result<&Encoding> {
        self.tag_encodings.get(&tag_id).ok_or_else(|| {
            let (name, value_type) = split_tag_id(tag_id);
            BiometalError::MissingEncoding {
                key: format!(
                    "tag {}{}:{}",
                    name[0] as char, name[1] as char, value_type as char
                ),
            }
        })
    }

    /// Compressor for the external block `content_id`; gzip when none was chosen.
    pub fn compressor(&self, content_id: i32) -> BlockCompressor {
        self.external_compressors
            .get(&content_id)
            .copied()
            .unwrap_or(BlockCompressor::Gzip {
                level: DEFAULT_GZIP_LEVEL,
            })
    }

    /// Parse a compression header from its uncompressed block content.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);

        let preservation = read_sized_section(&mut reader, "preservation map")?;
        let preservation_map = PreservationMap::parse(&preservation)?;

        let section = read_sized_section(&mut reader, "data series encoding map")?;
        let mut map_reader = Cursor::new(section.as_slice());
        let entries = read_count(&mut map_reader, "data series encoding")?;
        let mut data_series_encodings = BTreeMap::new();
        for _ in 0..entries {
            let mut key = [0u8; 2];
            read_exact_or(&mut map_reader, &mut key, "data series key")?;
            let series = DataSeries::try_from(key)?;
            let encoding = Encoding::read(&mut map_reader)?;
            if series.is_obsolete() {
                log::warn!("Ignoring obsolete CRAM data series {}", series);
                continue;
            }
            cram_debug!("Data series {} -> {:?}", series, encoding);
            data_series_encodings.insert(series, encoding);
        }

        let section = read_sized_section(&mut reader, "tag encoding map")?;
        let mut map_reader = Cursor::new(section.as_slice());
        let entries = read_count(&mut map_reader, "tag encoding")?;
        let mut tag_encodings = BTreeMap::new();
        for _ in 0..entries {
            let tag_id = read_itf8(&mut map_reader)?;
            tag_encodings.insert(tag_id, Encoding::read(&mut map_reader)?);
        }

        Ok(Self {
            preservation_map,
            data_series_encodings,
            tag_encodings,
            external_compressors: BTreeMap::new(),
        })
    }

    /// Serialize to block content.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_sized_section(&mut out, &self.preservation_map.serialize()?)?;

        let mut section = Vec::new();
        let encodings: Vec<_> = self
            .data_series_encodings
            .iter()
            .filter(|(_, encoding)| **encoding != Encoding::Null)
            .collect();
        write_itf8(&mut section, encodings.len() as i32)?;
        for (series, encoding) in encodings {
            section.extend_from_slice(&series.key());
            encoding.write(&mut section)?;
        }
        write_sized_section(&mut out, &section)?;

        let mut section = Vec::new();
        write_itf8(&mut section, self.tag_encodings.len() as i32)?;
        for (&tag_id, encoding) in &self.tag_encodings {
            write_itf8(&mut section, tag_id)?;
            encoding.write(&mut section)?;
        }
        write_sized_section(&mut out, &section)?;

        Ok(out)
    }

    /// Read from a COMPRESSION_HEADER block.
    pub fn from_block(block: &Block) -> Result<Self> {
        if block.content_type != BlockContentType::CompressionHeader {
            return Err(BiometalError::cram(format!(
                "Expected compression header block, found {:?}",
                block.content_type
            )));
        }
        Self::parse(&block.uncompressed_data()?)
    }

    /// Raw COMPRESSION_HEADER block.
    pub fn to_block(&self) -> Result<Block> {
        Ok(Block::raw(
            BlockContentType::CompressionHeader,
            0,
            self.serialize()?,
        ))
    }

    /// Index of each dictionary line, for the writer's TL lookups.
    pub fn tag_line_index(&self) -> HashMap<&[i32], i32> {
        self.preservation_map
            .tag_ids_dictionary
            .iter()
            .enumerate()
            .map(|(i, ids)| (ids.as_slice(), i as i32))
            .collect()
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Builds compression headers for batches of records.
///
/// Tag encodings are chosen once per tag id and reused for later containers
/// as long as they can still represent every value of the tag.
#[derive(Debug, Clone)]
pub struct CompressionHeaderFactory {
    strategy: EncodingStrategy,
    tag_choices: HashMap<i32, (Encoding, BlockCompressor)>,
}

const MIN_SIZE_FOR_UNUSED_STOP_BYTE: usize = 100;

impl CompressionHeaderFactory {
    /// Factory for `strategy`.
    pub fn new(strategy: EncodingStrategy) -> Self {
        Self {
            strategy,
            tag_choices: HashMap::new(),
        }
    }

    /// Default data series encodings: every series in its own external block.
    pub fn default_encodings(
        strategy: &EncodingStrategy,
    ) -> (BTreeMap<DataSeries, Encoding>, BTreeMap<i32, BlockCompressor>) {
        let mut encodings = BTreeMap::new();
        let mut compressors = BTreeMap::new();

        for series in DataSeries::ALL {
            if series.is_obsolete() {
                continue;
            }
            let id = series.content_id();
            let encoding = match (series, series.value_type()) {
                (DataSeries::RN | DataSeries::IN | DataSeries::SC, _) => Encoding::ByteArrayStop {
                    stop_byte: b'\t',
                    content_id: id,
                },
                (_, DataSeriesType::ByteArray) => Encoding::ByteArrayLen {
                    len_encoding: Box::new(Encoding::External { content_id: id }),
                    value_encoding: Box::new(Encoding::External { content_id: id }),
                },
                _ => Encoding::External { content_id: id },
            };
            let compressor = match series {
                DataSeries::AP | DataSeries::RI => BlockCompressor::Rans(strategy.rans_order_positions),
                DataSeries::BA
                | DataSeries::BF
                | DataSeries::CF
                | DataSeries::NS
                | DataSeries::QS
                | DataSeries::RG
                | DataSeries::RL
                | DataSeries::TS => BlockCompressor::Rans(strategy.rans_order_sequence),
                _ => strategy.gzip(),
            };
            encodings.insert(series, encoding);
            compressors.insert(id, compressor);
        }

        (encodings, compressors)
    }

    /// Build the header for one container's records.
    pub fn build(&mut self, records: &[CramRecord]) -> Result<CompressionHeader> {
        let (data_series_encodings, mut external_compressors) =
            Self::default_encodings(&self.strategy);

        let tag_ids: HashSet<i32> = records
            .iter()
            .flat_map(|r| r.tags.iter().map(|t| t.tag_id()))
            .collect();
        let mut tag_encodings = BTreeMap::new();
        for tag_id in tag_ids {
            let values = tag_values(records, tag_id);
            let cached = self
                .tag_choices
                .get(&tag_id)
                .filter(|(encoding, _)| encoding_fits(encoding, &values));
            let (encoding, compressor) = match cached {
                Some(choice) => choice.clone(),
                None => {
                    let choice = self.tag_encoding_for(&values, tag_id)?;
                    self.tag_choices.insert(tag_id, choice.clone());
                    choice
                }
            };
            tag_encodings.insert(tag_id, encoding);
            external_compressors.insert(tag_id, compressor);
        }

        Ok(CompressionHeader {
            preservation_map: PreservationMap {
                read_names_included: self.strategy.preserve_read_names,
                ap_delta: self.strategy.ap_delta,
                reference_required: false,
                substitution_matrix: SubstitutionMatrix::from_frequencies(
                    &substitution_frequencies(records),
                ),
                tag_ids_dictionary: build_tag_dictionary(records),
            },
            data_series_encodings,
            tag_encodings,
            external_compressors,
        })
    }

    fn tag_encoding_for(&self, values: &[&[u8]], tag_id: i32) -> Result<(Encoding, BlockCompressor)> {
        let data = values.concat();
        let compressor = best_compressor(&data, &self.strategy)?;

        let fixed = |size: usize| Encoding::ByteArrayLen {
            len_encoding: Box::new(Encoding::constant(size as i32)),
            value_encoding: Box::new(Encoding::External { content_id: tag_id }),
        };

        let (_, value_type) = split_tag_id(tag_id);
        let encoding = match value_type {
            b'A' | b'c' | b'C' => fixed(1),
            b's' | b'S' => fixed(2),
            b'i' | b'I' | b'f' => fixed(4),
            b'Z' | b'H' | b'B' => {
                let min = values.iter().map(|v| v.len()).min().unwrap_or(0);
                let max = values.iter().map(|v| v.len()).max().unwrap_or(0);
                if min == max {
                    fixed(min)
                } else if value_type != b'B' && !data.contains(&b'\t') {
                    Encoding::ByteArrayStop {
                        stop_byte: b'\t',
                        content_id: tag_id,
                    }
                } else if let Some(stop) = unused_byte(&data)
                    .filter(|_| value_type == b'B' && min > MIN_SIZE_FOR_UNUSED_STOP_BYTE)
                {
                    Encoding::ByteArrayStop {
                        stop_byte: stop,
                        content_id: tag_id,
                    }
                } else {
                    Encoding::ByteArrayLen {
                        len_encoding: Box::new(Encoding::External { content_id: tag_id }),
                        value_encoding: Box::new(Encoding::External { content_id: tag_id }),
                    }
                }
            }
            other => {
                return Err(BiometalError::InvalidConfiguration(format!(
                    "Unknown tag value type '{}'",
                    other as char
                )))
            }
        };
        Ok((encoding, compressor))
    }
}

/// Smallest of gzip, rANS order-0 and rANS order-1 on `data`; ties prefer
/// rANS order-0, then order-1.
pub fn best_compressor(data: &[u8], strategy: &EncodingStrategy) -> Result<BlockCompressor> {
    let candidates = [
        BlockCompressor::Rans(RansOrder::Zero),
        BlockCompressor::Rans(RansOrder::One),
        strategy.gzip(),
    ];
    let mut best = candidates[0];
    let mut best_len = usize::MAX;
    for candidate in candidates {
        let len = candidate.compress(data)?.len();
        if len < best_len {
            best = candidate;
            best_len = len;
        }
    }
    Ok(best)
}

fn tag_values(records: &[CramRecord], tag_id: i32) -> Vec<&[u8]> {
    records
        .iter()
        .flat_map(|r| r.tags.iter())
        .filter(|t| t.tag_id() == tag_id)
        .map(|t| t.value.as_slice())
        .collect()
}

/// Whether `encoding` can write every one of `values`: a constant length
/// must match each value and a stop byte must not occur inside one.
fn encoding_fits(encoding: &Encoding, values: &[&[u8]]) -> bool {
    match encoding {
        Encoding::ByteArrayLen { len_encoding, .. } => match len_encoding.as_ref() {
            Encoding::Huffman { alphabet, .. } if alphabet.len() == 1 => {
                values.iter().all(|v| v.len() as i32 == alphabet[0])
            }
            _ => true,
        },
        Encoding::ByteArrayStop { stop_byte, .. } => {
            values.iter().all(|v| !v.contains(stop_byte))
        }
        _ => true,
    }
}

fn unused_byte(data: &[u8]) -> Option<u8> {
    let mut used = [false; 256];
    for &b in data {
        used[b as usize] = true;
    }
    used.iter().position(|&u| !u).map(|b| b as u8)
}

/// Distinct sorted tag id lists, shortest first; the empty list is always
/// line 0.
fn build_tag_dictionary(records: &[CramRecord]) -> Vec<Vec<i32>> {
    let mut lines: Vec<Vec<i32>> = records
        .iter()
        .map(CramRecord::sorted_tag_ids)
        .chain(std::iter::once(Vec::new()))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    lines.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    lines
}

fn substitution_frequencies(records: &[CramRecord]) -> SubstitutionFrequencies {
    let mut frequencies = [[0u64; 5]; 5];
    for feature in records.iter().flat_map(|r| r.read_features.iter()) {
        if let ReadFeature::Substitution {
            value: SubstitutionValue::Bases { reference, read },
            ..
        } = feature
        {
            if let (Some(r), Some(b)) = (base_index(*reference), base_index(*read)) {
                frequencies[r][b] += 1;
            }
        }
    }
    frequencies
}
