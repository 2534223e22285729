//! Strict 4-line FASTQ reading over plain, gzip or stdin input.

use super::error::{Error, Result};
use std::io::Read;
use std::path::Path;

mod io;
mod path;
use io::Buffer;
pub use path::open_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    head: String,
    id_len: usize,
    seq: String,
}

impl Record {
    /// `head` is the header line without the leading `@`.
    pub fn new(head: String, seq: String) -> Self {
        let id_len = head.find(char::is_whitespace).unwrap_or(head.len());
        Self { head, id_len, seq }
    }

    pub fn head(&self) -> &str {
        &self.head
    }

    /// The header truncated at the first whitespace.
    pub fn id(&self) -> &str {
        &self.head[..self.id_len]
    }

    pub fn seq(&self) -> &str {
        &self.seq
    }
}

/// Iterates the records of a FASTQ stream.
///
/// A group of four lines that fails validation is reported as [`Error::MalformedFastq`] and
/// the iterator moves on to the next group, so callers choose between skipping and stopping.
/// I/O errors and a truncated final record end the iteration.
pub struct FastqReader<R> {
    reader: R,
    buf: Buffer,
    source: String,
    line: usize,
    done: bool,
}

impl<R: Read> FastqReader<R> {
    pub fn new<T: Into<String>>(reader: R, source: T) -> Self {
        Self {
            reader,
            buf: Buffer::new(),
            source: source.into(),
            line: 0,
            done: false,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        match self.buf.next_line(&mut self.reader) {
            Ok(Some(line)) => {
                self.line += 1;
                Ok(Some(String::from_utf8_lossy(line).into_owned()))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(Error::io(&self.source, e)),
        }
    }

    fn malformed(&self, line: usize, reason: &'static str) -> Error {
        Error::MalformedFastq {
            file: self.source.clone(),
            line,
            reason,
        }
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        let head = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        let start = self.line;

        let seq = self.read_line()?;
        let sep = self.read_line()?;
        let qual = self.read_line()?;
        let (seq, sep) = match (seq, sep, qual) {
            (Some(seq), Some(sep), Some(_)) => (seq, sep),
            _ => {
                self.done = true;
                return Err(self.malformed(start, "truncated record, line count is not a multiple of four"));
            }
        };

        let head = match head.strip_prefix('@') {
            Some(head) => head.to_owned(),
            None => return Err(self.malformed(start, "header line does not start with '@'")),
        };
        if !sep.starts_with('+') {
            return Err(self.malformed(start + 2, "separator line does not start with '+'"));
        }
        Ok(Some(Record::new(head, seq)))
    }
}

impl<R: Read> Iterator for FastqReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                if matches!(e, Error::FileIo { .. }) {
                    self.done = true;
                }
                Some(Err(e))
            }
        }
    }
}

pub fn open<P: AsRef<Path>>(path: P) -> Result<FastqReader<Box<dyn Read>>> {
    let path = path.as_ref();
    let reader = open_path(path)?;
    Ok(FastqReader::new(reader, path.to_string_lossy()))
}
