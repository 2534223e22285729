use memchr::memchr;
use std::io::{self, ErrorKind, Read};

const NEWLINE: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';
const DEFAULT_CAPACITY: usize = 1024 * 64;

/// Line splitter over a raw reader. Unread bytes are moved to the front on every refill and
/// the buffer grows when a single line does not fit.
pub struct Buffer {
    buf: Vec<u8>,
    buf_len: usize, // valid buf data length
    pos: usize,     // start of the next line
    eof: bool,
}

impl Buffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            buf_len: 0,
            pos: 0,
            eof: false,
        }
    }

    fn fill<R: Read>(&mut self, r: &mut R) -> io::Result<usize> {
        self.buf.copy_within(self.pos..self.buf_len, 0);
        self.buf_len -= self.pos;
        self.pos = 0;
        if self.buf_len == self.buf.len() {
            self.buf.resize(self.buf.len() * 2, 0);
        }
        loop {
            match r.read(&mut self.buf[self.buf_len..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.buf_len += n;
                    return Ok(n);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// The next line without its `\n` or `\r\n` terminator, `None` once the input is drained.
    pub fn next_line<R: Read>(&mut self, r: &mut R) -> io::Result<Option<&[u8]>> {
        loop {
            if let Some(p) = memchr(NEWLINE, &self.buf[self.pos..self.buf_len]) {
                let start = self.pos;
                self.pos += p + 1;
                return Ok(Some(trim_cr(&self.buf[start..start + p])));
            }
            if self.eof {
                if self.pos == self.buf_len {
                    return Ok(None);
                }
                let start = self.pos;
                self.pos = self.buf_len;
                return Ok(Some(trim_cr(&self.buf[start..self.buf_len])));
            }
            self.fill(r)?;
        }
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(&CARRIAGE_RETURN) => &line[..line.len() - 1],
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // hands out at most `step` bytes per read
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn lines(data: &[u8], capacity: usize, step: usize) -> Vec<String> {
        let mut r = Trickle { data, step };
        let mut buf = Buffer::with_capacity(capacity);
        let mut out = Vec::new();
        while let Some(line) = buf.next_line(&mut r).unwrap() {
            out.push(String::from_utf8_lossy(line).into_owned());
        }
        out
    }

    #[test]
    fn test_lines_across_refills() {
        let data = b"@read_1 barcode=ACGT\r\nACGTACGTACGTACGT\n+\n\nIIIIIIIIIIIIIIII";
        let expected = vec![
            "@read_1 barcode=ACGT",
            "ACGTACGTACGTACGT",
            "+",
            "",
            "IIIIIIIIIIIIIIII",
        ];
        // a 4 byte buffer has to grow for every line
        assert_eq!(lines(data, 4, 3), expected);
        assert_eq!(lines(data, 1024, 1024), expected);
    }

    #[test]
    fn test_empty_input() {
        assert!(lines(b"", 8, 8).is_empty());
        assert_eq!(lines(b"\n", 8, 8), vec![""]);
    }
}
