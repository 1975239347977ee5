//! CRAM 3.0 compression core
//!
//! Reads and writes the container/slice/block structure of CRAM files and the
//! record stream inside each slice. Bases are stored verbatim (read features
//! describe the alignment against a reference the caller owns), so no
//! reference FASTA is needed to round-trip records.
//!
//! # CRAM Format Overview
//!
//! ```text
//! CRAM File Structure:
//! ┌─────────────────────────────────────┐
//! │ File Definition (magic + version)   │ ← 26 bytes
//! ├─────────────────────────────────────┤
//! │ SAM Header Container                │ ← One FILE_HEADER block
//! ├─────────────────────────────────────┤
//! │ Data Container 1                    │
//! │  ├─ Compression Header              │ ← encodings per data series
//! │  ├─ Slice 1                         │
//! │  │   ├─ Slice header block          │
//! │  │   ├─ Core block (bit stream)     │
//! │  │   └─ External blocks (by id)     │
//! │  └─ Slice 2 ...                     │
//! ├─────────────────────────────────────┤
//! │ ...                                 │
//! ├─────────────────────────────────────┤
//! │ EOF Container                       │ ← 38 fixed bytes
//! └─────────────────────────────────────┘
//! ```
//!
//! # Layers
//!
//! - [`itf8`], [`bit_io`]: variable-length integers and the core bit stream
//! - [`rans`], [`block`]: rANS 4x8 and the block compressors
//! - [`encoding`], [`codecs`], [`series_codecs`]: encoding descriptors and
//!   the codecs they build, one per data series
//! - [`record_writer`], [`record_reader`]: the per-record field order
//! - [`slice`], [`container`], [`container_factory`]: assembly
//! - [`index`]: CRAI/BAI-style entries, including multi-reference slices
//! - [`reader`], [`writer`]: whole files
//!
//! # Example
//!
//! ```
//! use biometal_cram::io::cram::{CramReader, CramRecord, CramWriter, EncodingStrategy};
//! use std::io::Cursor;
//!
//! # fn main() -> biometal_cram::Result<()> {
//! let mut writer = CramWriter::new(Vec::new(), b"@HD\tVN:1.6\n", EncodingStrategy::default())?;
//! writer.write_record(CramRecord::unmapped(b"read1", b"ACGTACGT", b"IIIIIIII"))?;
//! let bytes = writer.finish()?;
//!
//! let reader = CramReader::new(Cursor::new(bytes))?;
//! for record in reader.records() {
//!     let record = record?;
//!     assert_eq!(record.bases, b"ACGTACGT");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Debug tracing
//!
//! Build with the `cram-debug` feature to route structural traces through
//! `log::debug!` with target `biometal_cram`.

#[cfg(feature = "cram-debug")]
macro_rules! cram_debug {
    ($($arg:tt)*) => { log::debug!(target: "biometal_cram", $($arg)*) };
}

#[cfg(not(feature = "cram-debug"))]
macro_rules! cram_debug {
    ($($arg:tt)*) => {};
}

pub mod bit_io;
pub mod block;
pub mod codecs;
pub mod compression_header;
pub mod container;
pub mod container_factory;
pub mod context;
pub mod data_series;
pub mod encoding;
pub mod file_definition;
pub mod index;
pub mod itf8;
pub mod rans;
pub mod reader;
pub mod record;
pub mod record_reader;
pub mod record_writer;
pub mod series_codecs;
pub mod slice;
pub mod strategy;
pub mod streams;
pub mod substitution;
pub mod writer;

pub use block::{Block, BlockCompressor, BlockContentType, CompressionMethod};
pub use compression_header::{CompressionHeader, CompressionHeaderFactory, PreservationMap};
pub use container::{Container, ContainerHeader, EOF_CONTAINER};
pub use container_factory::ContainerFactory;
pub use context::{AlignmentContext, AlignmentSpan, ReferenceContext};
pub use data_series::{DataSeries, DataSeriesType};
pub use encoding::{Encoding, EncodingId};
pub use file_definition::FileDefinition;
pub use index::{bai_entries, crai_entries, BaiEntry, CraiEntry};
pub use itf8::{read_itf8, read_ltf8, write_itf8, write_ltf8};
pub use rans::RansOrder;
pub use reader::{CramContainers, CramReader, CramRecords};
pub use record::{CramRecord, ReadFeature, ReadTag, SubstitutionValue};
pub use series_codecs::DataSeriesCodecs;
pub use slice::{Slice, SliceHeader};
pub use strategy::EncodingStrategy;
pub use writer::CramWriter;
