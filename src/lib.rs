//! biometal-cram: CRAM 3.0 compression core
//!
//! # Overview
//!
//! Byte-exact encoding and decoding of CRAM 3.0 files: ITF8/LTF8 integers,
//! the core bit stream, rANS 4x8, the data-series encoding framework, and
//! the block/slice/container structure with its record stream.
//!
//! ## Quick Start
//!
//! ```no_run
//! use biometal_cram::CramReader;
//!
//! # fn main() -> biometal_cram::Result<()> {
//! let reader = CramReader::from_path("sample.cram")?;
//!
//! for record in reader.records() {
//!     let record = record?;
//!     // One decoded CRAM record at a time
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`io::cram`]: containers, slices, codecs, readers and writers
//! - [`error`]: the crate-wide error type

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod io;

// Re-export commonly used types
pub use error::{BiometalError, Result};
pub use io::{CramReader, CramRecord, CramWriter, EncodingStrategy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
