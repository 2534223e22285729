use super::super::common::is_gzip_path;
use super::super::error::{Error, Result};
use flate2::read::MultiGzDecoder;
use std::{
    fs::File,
    io::{stdin, BufReader, Read},
    path::Path,
};

const BUF_SIZE: usize = 65536;

// convert path to Read, accept arguments: file.fq/file.fq.gz/-
pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Box<dyn Read>> {
    let path = path.as_ref();
    if path.as_os_str() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(Error::MissingStdin);
        }
        return Ok(Box::new(stdin()));
    }

    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| Error::io(path.to_string_lossy(), e))?;
    if is_gzip_path(path) {
        // for gz format
        Ok(Box::new(MultiGzDecoder::new(BufReader::with_capacity(BUF_SIZE, file))))
    } else {
        Ok(Box::new(file))
    }
}
