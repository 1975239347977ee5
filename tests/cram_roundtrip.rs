//! Integration tests for CRAM writing and reading
//!
//! Records go through a `CramWriter` into a file and come back through a
//! `CramReader`, covering the container, slice and block layers together.

use biometal_cram::io::cram::record::tag_id;
use biometal_cram::io::cram::{
    Block, BlockCompressor, BlockContentType, CompressionHeaderFactory, Container, CramReader,
    CramRecord, CramWriter, DataSeries, Encoding, EncodingStrategy, RansOrder, ReadFeature,
    ReadTag, SubstitutionValue, EOF_CONTAINER,
};
use biometal_cram::BiometalError;
use std::io::Cursor;
use tempfile::TempDir;

const SAM_HEADER: &[u8] = b"@HD\tVN:1.6\tSO:coordinate\n\
@SQ\tSN:chr1\tLN:100000\n\
@SQ\tSN:chr2\tLN:50000\n\
@RG\tID:grp1\tSM:sample\n";

fn aligned(name: &str, reference: i32, start: i32) -> CramRecord {
    let features = vec![
        ReadFeature::SoftClip {
            position: 1,
            bases: b"AC".to_vec(),
        },
        ReadFeature::Substitution {
            position: 12,
            value: SubstitutionValue::Code(1),
        },
        ReadFeature::Deletion {
            position: 20,
            length: 2,
        },
    ];
    let mut record = CramRecord::mapped(name.as_bytes(), reference, start, 36, features);
    record.read_group = 0;
    record.mapping_quality = 60;
    record.tags = vec![
        ReadTag::string(*b"RG", "grp1"),
        ReadTag::new(*b"NM", b'c', vec![2]),
    ];
    record
}

fn records() -> Vec<CramRecord> {
    let mut records = Vec::new();
    for i in 0..40 {
        records.push(aligned(&format!("chr1_{}", i), 0, 1000 + i * 25));
    }
    for i in 0..10 {
        records.push(aligned(&format!("chr2_{}", i), 1, 500 + i * 40));
    }
    records.push(CramRecord::unmapped(b"lost1", b"ACGTTGCA", b"IIIIHHHH"));
    records.push(CramRecord::unmapped(b"lost2", b"NNNN", b""));
    records
}

fn small_slices() -> EncodingStrategy {
    EncodingStrategy::default()
        .with_reads_per_slice(8)
        .with_minimum_single_reference_slice_size(4)
        .with_slices_per_container(2)
}

/// Write → read through a file on disk
#[test]
fn test_roundtrip_through_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("roundtrip.cram");
    let records = records();

    {
        let mut writer = CramWriter::create(&path, SAM_HEADER, small_slices()).unwrap();
        for record in &records {
            writer.write_record(record.clone()).unwrap();
        }
        writer.finish().unwrap();
    }

    let reader = CramReader::from_path(&path).unwrap();
    assert_eq!(reader.major_version(), 3);
    assert_eq!(reader.minor_version(), 0);
    assert_eq!(reader.sam_header(), SAM_HEADER);
    assert_eq!(&reader.file_id()[..14], b"roundtrip.cram");

    let decoded = reader.records().collect_all().unwrap();
    assert_eq!(decoded, records);
}

/// Container boundaries and counters seen by a reader
#[test]
fn test_containers_through_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("containers.cram");
    let records = records();

    let index_entries = {
        let mut writer = CramWriter::create(&path, SAM_HEADER, small_slices()).unwrap();
        for record in &records {
            writer.write_record(record.clone()).unwrap();
        }
        let entries = writer.index_entries().to_vec();
        writer.finish().unwrap();
        entries
    };

    let containers: Vec<Container> = CramReader::from_path(&path)
        .unwrap()
        .containers()
        .collect::<biometal_cram::Result<Vec<_>>>()
        .unwrap();

    let total: i32 = containers.iter().map(|c| c.header.num_records).sum();
    assert_eq!(total as usize, records.len());

    let mut expected_counter = 0;
    for container in &containers {
        assert_eq!(container.header.record_counter, expected_counter);
        assert!(container.slices.len() <= 2);
        assert!(!container.alignment_context().reference_context.is_multiple()
            || container.slices.len() == 1);
        expected_counter += container.header.num_records as i64;
    }

    let offsets: Vec<u64> = containers.iter().map(|c| c.offset).collect();
    for entry in &index_entries {
        assert!(offsets.contains(&entry.container_offset));
    }
}

/// Every file ends with the fixed EOF container
#[test]
fn test_eof_container_bytes() {
    let expected: [u8; 38] = [
        0x0f, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x0f, 0xe0, 0x45, 0x4f, 0x46, 0x00,
        0x00, 0x00, 0x00, 0x01, 0x00, 0x05, 0xbd, 0xd9, 0x4f, 0x00, 0x01, 0x00, 0x06, 0x06,
        0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0xee, 0x63, 0x01, 0x4b,
    ];
    assert_eq!(EOF_CONTAINER, expected);

    let writer = CramWriter::new(Vec::new(), SAM_HEADER, EncodingStrategy::default()).unwrap();
    let bytes = writer.finish().unwrap();
    assert!(bytes.ends_with(&expected));

    let eof = Container::read(&mut Cursor::new(expected.to_vec()))
        .unwrap()
        .unwrap();
    assert!(eof.is_eof());
}

/// A flipped byte inside a block is caught by its CRC32
#[test]
fn test_block_crc_corruption_detected() {
    let records: Vec<CramRecord> = records().into_iter().take(10).collect();
    let strategy = EncodingStrategy::default();
    let header = CompressionHeaderFactory::new(strategy.clone())
        .build(&records)
        .unwrap();
    let container = Container::encode(&records, header, &strategy, 0).unwrap();

    let mut bytes = Vec::new();
    container.write(&mut bytes).unwrap();
    let body_start = container.header.serialized_size().unwrap();
    bytes[body_start + 12] ^= 0x40;

    let err = Container::read(&mut Cursor::new(bytes)).unwrap_err();
    assert!(
        matches!(err, BiometalError::ChecksumMismatch { .. }),
        "unexpected error: {}",
        err
    );
}

/// Every block compression method survives a write/read cycle
#[test]
fn test_every_block_method_roundtrip() {
    let data: Vec<u8> = b"ACGTACGTTTGACCA".iter().cycle().take(5000).copied().collect();
    let compressors = [
        BlockCompressor::Raw,
        BlockCompressor::Gzip { level: 6 },
        BlockCompressor::Bzip2 { level: 9 },
        BlockCompressor::Lzma { level: 6 },
        BlockCompressor::Rans(RansOrder::Zero),
        BlockCompressor::Rans(RansOrder::One),
    ];
    for compressor in compressors {
        let block = Block::compressed(BlockContentType::External, 11, &data, compressor).unwrap();
        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();
        let read = Block::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(read, block, "{:?}", compressor);
        assert_eq!(read.uncompressed_data().unwrap(), data, "{:?}", compressor);
    }
}

/// A multi-reference slice yields one index entry per reference touched
#[test]
fn test_multi_reference_slice_index_entries() {
    let records = vec![
        aligned("a", 0, 100),
        aligned("b", 0, 160),
        aligned("c", 1, 40),
        CramRecord::unmapped(b"d", b"ACGT", b""),
    ];
    let mut writer = CramWriter::new(Vec::new(), SAM_HEADER, EncodingStrategy::default()).unwrap();
    for record in &records {
        writer.write_record(record.clone()).unwrap();
    }
    let entries = writer.index_entries().to_vec();
    assert!(entries.is_empty());
    let bytes = writer.finish().unwrap();

    let mut reader = CramReader::new(Cursor::new(bytes)).unwrap();
    let container = reader.read_container().unwrap().unwrap();
    assert!(container.alignment_context().reference_context.is_multiple());
    let entries = biometal_cram::io::cram::crai_entries(
        &container.slices[0],
        &container.compression_header,
    )
    .unwrap();
    let references: Vec<i32> = entries.iter().map(|e| e.reference_id).collect();
    assert_eq!(references, vec![0, 1, -1]);
}

/// Encoding fails up front when a required data series has no encoding
#[test]
fn test_missing_encoding_reported() {
    let records = vec![aligned("a", 0, 100)];
    let strategy = EncodingStrategy::default();
    let mut header = CompressionHeaderFactory::new(strategy.clone())
        .build(&records)
        .unwrap();
    header.data_series_encodings.remove(&DataSeries::RL);

    let err = Container::encode(&records, header, &strategy, 0).unwrap_err();
    assert!(
        matches!(err, BiometalError::MissingEncoding { ref key } if key.contains("RL")),
        "unexpected error: {}",
        err
    );
}

/// `B` array of unsigned bytes
fn byte_array(elements: impl Iterator<Item = u8>) -> ReadTag {
    let elements: Vec<u8> = elements.collect();
    let mut value = vec![b'C'];
    value.extend_from_slice(&(elements.len() as u32).to_le_bytes());
    value.extend_from_slice(&elements);
    ReadTag::new(*b"XB", b'B', value)
}

/// Tag sets and value sizes change from one container to the next
#[test]
fn test_tags_vary_across_containers() {
    let tag_sets = vec![
        // two records per container
        vec![ReadTag::string(*b"XZ", "aaaa"), byte_array(1..=120)],
        vec![ReadTag::string(*b"XZ", "bbbb"), byte_array(1..=130)],
        vec![ReadTag::string(*b"XZ", "cc"), byte_array(100..=240)],
        vec![ReadTag::string(*b"XZ", "dddddd"), byte_array(1..=200)],
        vec![ReadTag::new(*b"XA", b'A', vec![b'x']), byte_array(0..=255)],
        Vec::new(),
        vec![ReadTag::string(*b"XZ", "e"), ReadTag::new(*b"NM", b'c', vec![3])],
        vec![ReadTag::string(*b"XZ", "a much longer value"), byte_array(7..=9)],
    ];
    let records: Vec<CramRecord> = tag_sets
        .into_iter()
        .enumerate()
        .map(|(i, mut tags)| {
            let name = format!("t{}", i);
            let start = 100 + i as i32 * 10;
            let mut record = CramRecord::mapped(name.as_bytes(), 0, start, 20, Vec::new());
            // decoded tags come back in tag-id order
            tags.sort_by_key(|t| t.tag_id());
            record.tags = tags;
            record
        })
        .collect();

    let strategy = EncodingStrategy::default()
        .with_reads_per_slice(2)
        .with_minimum_single_reference_slice_size(1)
        .with_slices_per_container(1);
    let mut writer = CramWriter::new(Vec::new(), SAM_HEADER, strategy).unwrap();
    for record in &records {
        writer.write_record(record.clone()).unwrap();
    }
    let bytes = writer.finish().unwrap();

    let containers: Vec<Container> = CramReader::new(Cursor::new(bytes.clone()))
        .unwrap()
        .containers()
        .collect::<biometal_cram::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(containers.len(), 4);

    // long arrays in the first container leave byte 131 free as a stop byte;
    // the second container uses that byte and needs another encoding
    let xb = tag_id(*b"XB", b'B');
    assert_eq!(
        containers[0].compression_header.tag_encodings[&xb],
        Encoding::ByteArrayStop {
            stop_byte: 131,
            content_id: xb
        }
    );
    assert_ne!(
        containers[1].compression_header.tag_encodings[&xb],
        containers[0].compression_header.tag_encodings[&xb]
    );

    let decoded = CramReader::new(Cursor::new(bytes))
        .unwrap()
        .records()
        .collect_all()
        .unwrap();
    assert_eq!(decoded.len(), records.len());
    for (decoded, expected) in decoded.iter().zip(&records) {
        assert_eq!(decoded, expected);
    }
}
