pub mod common;
pub mod error;
pub mod fastq;
pub mod highlight;
pub mod lookup;
pub mod matcher;
pub mod scan;
