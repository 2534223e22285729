use super::error::{Error, Result};
use std::path::Path;

// 0 marks a symbol without a complement
const SEQ_COMP_TABLE: [u8; 256] = {
    let mut t = [0u8; 256];
    let pairs = [(b'A', b'T'), (b'C', b'G'), (b'N', b'N')];
    let mut i = 0;
    while i < pairs.len() {
        let (a, b) = pairs[i];
        t[a as usize] = b;
        t[b as usize] = a;
        t[a.to_ascii_lowercase() as usize] = b.to_ascii_lowercase();
        t[b.to_ascii_lowercase() as usize] = a.to_ascii_lowercase();
        i += 1;
    }
    t
};

pub fn complement_base(b: u8) -> Option<u8> {
    match SEQ_COMP_TABLE[b as usize] {
        0 => None,
        c => Some(c),
    }
}

/// Checks that every symbol of `seq` has a complement (ACGTN, any case).
pub fn validate_bases(seq: &str) -> Result<()> {
    // the table holds ASCII only, so the first bad byte is also the first byte of its char
    match seq.bytes().position(|b| complement_base(b).is_none()) {
        Some(pos) => Err(invalid_base(seq, pos)),
        None => Ok(()),
    }
}

pub fn reverse_complement_bases(seq: &str) -> Result<String> {
    validate_bases(seq)?;
    let t: Vec<u8> = seq.bytes().rev().filter_map(complement_base).collect();
    // only ASCII bytes come out of the table
    Ok(String::from_utf8(t).unwrap_or_default())
}

fn invalid_base(seq: &str, pos: usize) -> Error {
    let base = seq.get(pos..).and_then(|x| x.chars().next()).unwrap_or('?');
    Error::InvalidBase { base, pos }
}

pub fn is_gzip_path<P: AsRef<Path>>(path: P) -> bool {
    let p = path.as_ref().to_string_lossy().to_lowercase();
    p.ends_with(".gz") || p.ends_with(".bgz") || p.ends_with(".tgz")
}

pub fn is_fastq_path<P: AsRef<Path>>(path: P) -> bool {
    let p = path.as_ref().to_string_lossy().to_lowercase();
    let p = p
        .strip_suffix(".gz")
        .or_else(|| p.strip_suffix(".bgz"))
        .unwrap_or(&p);
    p.ends_with(".fastq") || p.ends_with(".fq")
}
