//! Tools for grepping FASTQ reads with colored multi-pattern highlighting and for
//! looking up header barcodes of selected reads.

pub mod utils;

pub use utils::error::{Error, Result};

pub const VERSION: &str = include_str!(concat!(env!("OUT_DIR"), "/VERSION"));
