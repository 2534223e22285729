use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No such file or directory: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Error reading or writing \"{file}\": {source}")]
    FileIo {
        file: String,
        source: std::io::Error,
    },

    #[error("Malformed FASTQ record on line {line} in {file}: {reason}")]
    MalformedFastq {
        file: String,
        line: usize,
        reason: &'static str,
    },

    #[error("Invalid base '{base}' at position {pos}")]
    InvalidBase { base: char, pos: usize },

    #[error("Cannot extract barcode from header \"{header}\": {reason}")]
    BarcodeFormat { header: String, reason: String },

    #[error("Invalid header format: {0}")]
    HeaderFormat(String),

    #[error("Invalid search term \"{term}\": {reason}")]
    InvalidTerm { term: String, reason: String },

    #[error("Missing input from stdin")]
    MissingStdin,

    #[error("Error writing CSV \"{file}\": {source}")]
    Csv { file: String, source: csv::Error },

    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub fn io<T: AsRef<str>>(file: T, source: std::io::Error) -> Self {
        Error::FileIo {
            file: file.as_ref().to_owned(),
            source,
        }
    }
}
