//! I/O module: CRAM containers, slices and records

pub mod cram;

pub use cram::{CramReader, CramRecord, CramWriter, EncodingStrategy};
