//! Streaming CRAM reader.

use super::container::Container;
use super::file_definition::{read_sam_header, FileDefinition, FILE_DEFINITION_LEN};
use super::record::CramRecord;
use crate::Result;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// CRAM file reader.
///
/// Parses the file definition and SAM header container on construction,
/// then yields one container at a time. Memory is bounded by the largest
/// container.
///
/// # Example
///
/// ```no_run
/// use biometal_cram::io::cram::CramReader;
///
/// # fn main() -> biometal_cram::Result<()> {
/// let cram = CramReader::from_path("sample.cram")?;
/// println!("CRAM {}.{}", cram.major_version(), cram.minor_version());
///
/// let mut count = 0;
/// for record in cram.records() {
///     let record = record?;
///     if record.is_placed() {
///         count += 1;
///     }
/// }
/// println!("{} placed records", count);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CramReader<R: Read> {
    reader: R,
    definition: FileDefinition,
    sam_header: Vec<u8>,
    position: u64,
    reached_eof: bool,
}

impl CramReader<BufReader<File>> {
    /// Open a CRAM file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            io::Error::new(e.kind(), format!("Failed to open CRAM file: {}", e))
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> CramReader<R> {
    /// Read the file definition and SAM header container from `reader`.
    pub fn new(mut reader: R) -> Result<Self> {
        let definition = FileDefinition::read(&mut reader)?;
        let (sam_header, consumed) = read_sam_header(&mut reader)?;
        cram_debug!(
            "CramReader: CRAM {}.{}, {} byte SAM header",
            definition.major_version,
            definition.minor_version,
            sam_header.len()
        );
        Ok(Self {
            reader,
            definition,
            sam_header,
            position: (FILE_DEFINITION_LEN + consumed) as u64,
            reached_eof: false,
        })
    }

    /// CRAM major version.
    pub fn major_version(&self) -> u8 {
        self.definition.major_version
    }

    /// CRAM minor version.
    pub fn minor_version(&self) -> u8 {
        self.definition.minor_version
    }

    /// File id from the file definition.
    pub fn file_id(&self) -> &[u8] {
        &self.definition.file_id
    }

    /// SAM header text, unparsed.
    pub fn sam_header(&self) -> &[u8] {
        &self.sam_header
    }

    /// Byte offset of the next container.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Next data container, with its file offset set, or `None` after the
    /// EOF container.
    ///
    /// A stream that ends without an EOF container also returns `None`, with
    /// a warning.
    pub fn read_container(&mut self) -> Result<Option<Container>> {
        if self.reached_eof {
            return Ok(None);
        }
        let Some(mut container) = Container::read(&mut self.reader)? else {
            log::warn!(
                "CRAM stream ended at byte {} without an EOF container",
                self.position
            );
            self.reached_eof = true;
            return Ok(None);
        };

        let offset = self.position;
        let size = container.header.serialized_size()? + container.header.length as usize;
        self.position += size as u64;

        if container.is_eof() {
            cram_debug!("read_container: EOF container at {}", offset);
            self.reached_eof = true;
            return Ok(None);
        }

        container.set_offset(offset);
        cram_debug!(
            "read_container: {} records at {}, {}",
            container.header.num_records,
            offset,
            container.header.alignment_context
        );
        Ok(Some(container))
    }

    /// Iterate over the remaining containers.
    pub fn containers(self) -> CramContainers<R> {
        CramContainers { reader: self }
    }

    /// Iterate over the decoded records of the remaining containers.
    pub fn records(self) -> CramRecords<R> {
        CramRecords {
            reader: self,
            pending: Vec::new().into_iter(),
            failed: false,
        }
    }
}

/// Iterator over containers, see [`CramReader::containers`].
#[derive(Debug)]
pub struct CramContainers<R: Read> {
    reader: CramReader<R>,
}

impl<R: Read> Iterator for CramContainers<R> {
    type Item = Result<Container>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_container() {
            Ok(container) => container.map(Ok),
            Err(e) => {
                self.reader.reached_eof = true;
                Some(Err(e))
            }
        }
    }
}

/// Iterator over records, see [`CramReader::records`].
#[derive(Debug)]
pub struct CramRecords<R: Read> {
    reader: CramReader<R>,
    pending: std::vec::IntoIter<CramRecord>,
    failed: bool,
}

impl<R: Read> Iterator for CramRecords<R> {
    type Item = Result<CramRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.next() {
                return Some(Ok(record));
            }
            if self.failed {
                return None;
            }
            let next = self
                .reader
                .read_container()
                .and_then(|container| container.map(|c| c.records()).transpose());
            match next {
                Ok(Some(records)) => self.pending = records.into_iter(),
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R: Read> CramRecords<R> {
    /// Collect every remaining record, stopping at the first error.
    pub fn collect_all(self) -> Result<Vec<CramRecord>> {
        self.collect::<Result<Vec<_>>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cram::container::EOF_CONTAINER;
    use crate::io::cram::file_definition::write_sam_header;
    use crate::io::cram::strategy::EncodingStrategy;
    use crate::io::cram::writer::CramWriter;
    use std::io::Cursor;

    fn make_cram_file_definition(major: u8, minor: u8) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"CRAM");
        data.push(major);
        data.push(minor);
        data.extend_from_slice(&[0u8; 20]);
        data
    }

    fn empty_file(major: u8, minor: u8) -> Vec<u8> {
        let mut data = make_cram_file_definition(major, minor);
        write_sam_header(&mut data, b"@HD\tVN:1.6\n").unwrap();
        data.extend_from_slice(&EOF_CONTAINER);
        data
    }

    fn written_file(records: &[CramRecord], strategy: EncodingStrategy) -> Vec<u8> {
        let mut writer = CramWriter::new(Vec::new(), b"@HD\tVN:1.6\n", strategy).unwrap();
        for record in records {
            writer.write_record(record.clone()).unwrap();
        }
        writer.finish().unwrap()
    }

    // ========================================================================
    // File definition and header
    // ========================================================================

    #[test]
    fn test_cram_magic_number_valid() {
        let reader = CramReader::new(Cursor::new(empty_file(3, 0))).unwrap();
        assert_eq!(reader.major_version(), 3);
        assert_eq!(reader.minor_version(), 0);
        assert_eq!(reader.sam_header(), b"@HD\tVN:1.6\n");
        assert_eq!(reader.file_id(), &[0u8; 20]);
    }

    #[test]
    fn test_cram_version_3_1() {
        let reader = CramReader::new(Cursor::new(empty_file(3, 1))).unwrap();
        assert_eq!(reader.minor_version(), 1);
    }

    #[test]
    fn test_cram_version_2_x_rejected() {
        let err = CramReader::new(Cursor::new(empty_file(2, 1))).unwrap_err();
        assert!(err.to_string().contains("CRAM 2.x is not supported"));
    }

    // ========================================================================
    // Containers and records
    // ========================================================================

    #[test]
    fn test_empty_file_has_no_containers() {
        let mut reader = CramReader::new(Cursor::new(empty_file(3, 0))).unwrap();
        assert!(reader.read_container().unwrap().is_none());
        assert!(reader.read_container().unwrap().is_none());
    }

    #[test]
    fn test_missing_eof_is_tolerated() {
        let mut data = empty_file(3, 0);
        data.truncate(data.len() - EOF_CONTAINER.len());
        let reader = CramReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.records().count(), 0);
    }

    #[test]
    fn test_container_offsets_follow_file_layout() {
        let strategy = EncodingStrategy::default()
            .with_reads_per_slice(2)
            .with_minimum_single_reference_slice_size(1);
        let records: Vec<CramRecord> = (1..=5)
            .map(|i| CramRecord::mapped(b"r", 0, i * 10, 20, Vec::new()))
            .collect();
        let data = written_file(&records, strategy);
        let total = data.len() as u64;

        let mut reader = CramReader::new(Cursor::new(data.clone())).unwrap();
        let mut offsets = Vec::new();
        while let Some(container) = reader.read_container().unwrap() {
            assert_eq!(container.slices[0].container_offset, container.offset);
            offsets.push(container.offset);
        }
        assert_eq!(offsets.len(), 3);
        assert_eq!(reader.position(), total);

        for offset in offsets {
            let mut cursor = Cursor::new(&data[offset as usize..]);
            let container = Container::read(&mut cursor).unwrap().unwrap();
            assert!(!container.is_eof());
        }
    }

    #[test]
    fn test_records_roundtrip() {
        let records = vec![
            CramRecord::mapped(b"a", 0, 100, 30, Vec::new()),
            CramRecord::mapped(b"b", 0, 120, 30, Vec::new()),
            CramRecord::mapped(b"c", 1, 5, 30, Vec::new()),
            CramRecord::unmapped(b"d", b"ACGTN", b"IIIII"),
        ];
        let data = written_file(&records, EncodingStrategy::default());

        let decoded = CramReader::new(Cursor::new(data))
            .unwrap()
            .records()
            .collect_all()
            .unwrap();
        assert_eq!(decoded.len(), records.len());
        for (read, written) in decoded.iter().zip(&records) {
            assert_eq!(read.read_name, written.read_name);
            assert_eq!(read.reference_index, written.reference_index);
            assert_eq!(read.alignment_start, written.alignment_start);
            assert_eq!(read.bases, written.bases);
        }
    }

    #[test]
    fn test_corrupt_container_reported_once() {
        let records = vec![CramRecord::mapped(b"a", 0, 100, 30, Vec::new())];
        let mut data = written_file(&records, EncodingStrategy::default());
        let reader = CramReader::new(Cursor::new(data.clone())).unwrap();
        let first = reader.position() as usize;
        data[first + 6] ^= 0xff;

        let mut records = CramReader::new(Cursor::new(data)).unwrap().records();
        assert!(records.next().unwrap().is_err());
        assert!(records.next().is_none());
    }
}
