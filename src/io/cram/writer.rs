//! Streaming CRAM writer.

use super::container::Container;
use super::container_factory::ContainerFactory;
use super::file_definition::{write_sam_header, FileDefinition, FILE_ID_LEN};
use super::index::{container_crai_entries, CraiEntry};
use super::record::CramRecord;
use super::strategy::EncodingStrategy;
use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// CRAM file writer.
///
/// Records are grouped into slices and containers by a [`ContainerFactory`];
/// each container is written as soon as it is complete. [`CramWriter::finish`]
/// flushes the last container and appends the EOF container.
///
/// # Example
///
/// ```
/// use biometal_cram::io::cram::{CramReader, CramRecord, CramWriter, EncodingStrategy};
/// use std::io::Cursor;
///
/// # fn main() -> biometal_cram::Result<()> {
/// let header = b"@HD\tVN:1.6\tSO:coordinate\n@SQ\tSN:chr1\tLN:10000\n";
/// let mut writer = CramWriter::new(Vec::new(), header, EncodingStrategy::default())?;
/// writer.write_record(CramRecord::mapped(b"read1", 0, 100, 50, Vec::new()))?;
/// writer.write_record(CramRecord::mapped(b"read2", 0, 180, 50, Vec::new()))?;
/// let bytes = writer.finish()?;
///
/// let records = CramReader::new(Cursor::new(bytes))?.records().collect_all()?;
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[1].alignment_start, 180);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CramWriter<W: Write> {
    writer: W,
    factory: ContainerFactory,
    position: u64,
    index_entries: Vec<CraiEntry>,
}

impl CramWriter<BufWriter<File>> {
    /// Create a CRAM file; its name becomes the file id.
    pub fn create<P: AsRef<Path>>(
        path: P,
        sam_header: &[u8],
        strategy: EncodingStrategy,
    ) -> Result<Self> {
        let path = path.as_ref();
        let definition = FileDefinition::from_name(
            &path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        let file = File::create(path)?;
        Self::with_definition(BufWriter::new(file), definition, sam_header, strategy)
    }
}

impl<W: Write> CramWriter<W> {
    /// Write the file definition (zero file id) and SAM header container.
    pub fn new(writer: W, sam_header: &[u8], strategy: EncodingStrategy) -> Result<Self> {
        Self::with_definition(
            writer,
            FileDefinition::new([0; FILE_ID_LEN]),
            sam_header,
            strategy,
        )
    }

    /// Like [`CramWriter::new`] with an explicit file definition.
    pub fn with_definition(
        mut writer: W,
        definition: FileDefinition,
        sam_header: &[u8],
        strategy: EncodingStrategy,
    ) -> Result<Self> {
        let factory = ContainerFactory::new(strategy)?;
        let mut position = definition.write(&mut writer)? as u64;
        position += write_sam_header(&mut writer, sam_header)? as u64;
        Ok(Self {
            writer,
            factory,
            position,
            index_entries: Vec::new(),
        })
    }

    /// Add a record; a container is written when the record completes one.
    pub fn write_record(&mut self, record: CramRecord) -> Result<()> {
        if let Some(container) = self.factory.add_record(record)? {
            self.write_container(container)?;
        }
        Ok(())
    }

    /// Index entries of the containers written so far.
    pub fn index_entries(&self) -> &[CraiEntry] {
        &self.index_entries
    }

    /// Write the pending container and the EOF container, flush, and return
    /// the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        if let Some(container) = self.factory.finish()? {
            self.write_container(container)?;
        }
        self.position += Container::write_eof(&mut self.writer)? as u64;
        self.writer.flush()?;
        cram_debug!(
            "CramWriter::finish: {} records, {} bytes",
            self.factory.record_counter(),
            self.position
        );
        Ok(self.writer)
    }

    fn write_container(&mut self, mut container: Container) -> Result<()> {
        container.set_offset(self.position);
        self.index_entries.extend(container_crai_entries(
            &container.slices,
            &container.compression_header,
        )?);
        self.position += container.write(&mut self.writer)? as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cram::container::EOF_CONTAINER;
    use crate::io::cram::file_definition::FILE_DEFINITION_LEN;

    fn mapped(reference: i32, start: i32) -> CramRecord {
        CramRecord::mapped(b"r", reference, start, 25, Vec::new())
    }

    #[test]
    fn test_empty_file_layout() {
        let writer = CramWriter::new(Vec::new(), b"", EncodingStrategy::default()).unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[..4], b"CRAM");
        assert!(bytes.len() > FILE_DEFINITION_LEN + EOF_CONTAINER.len());
        assert!(bytes.ends_with(&EOF_CONTAINER));
    }

    #[test]
    fn test_index_entries_point_at_containers() {
        let strategy = EncodingStrategy::default()
            .with_reads_per_slice(2)
            .with_minimum_single_reference_slice_size(1);
        let mut writer = CramWriter::new(Vec::new(), b"@HD\tVN:1.6\n", strategy).unwrap();
        for start in [10, 20, 30] {
            writer.write_record(mapped(0, start)).unwrap();
        }
        assert_eq!(writer.index_entries().len(), 1);
        writer.write_record(mapped(1, 5)).unwrap();

        let entries = writer.index_entries().to_vec();
        let bytes = writer.finish().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            (entries[0].reference_id, entries[0].alignment_start, entries[0].alignment_span),
            (0, 10, 35)
        );
        assert!(entries[1].container_offset > entries[0].container_offset);

        for entry in &entries {
            let mut body = &bytes[entry.container_offset as usize..];
            let container = Container::read(&mut body).unwrap().unwrap();
            assert_eq!(container.header.landmarks[0], entry.slice_offset);
        }
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let strategy = EncodingStrategy::default().with_slices_per_container(0);
        assert!(CramWriter::new(Vec::new(), b"", strategy).is_err());
    }
}
