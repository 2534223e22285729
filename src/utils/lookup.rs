use super::common::is_fastq_path;
use super::error::{Error, Result};
use super::fastq;
use hashbrown::HashSet;
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use regex::Regex;
use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, File},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

pub const DEFAULT_OUTPUT: &str = "ID_to_barcode_output.csv";
pub const DEFAULT_TAG: &str = "barcode";
pub const MISSING: &str = "NA";

lazy_static! {
    static ref MATE_SUFFIX: Regex = Regex::new(r"/[12]$").unwrap();
}

/// Normalizes an ID as written in an ID list or a FASTQ header: `@` and anything after the
/// first whitespace are dropped, and so is a `/1` or `/2` mate suffix.
pub fn normalize_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    let id = id.strip_prefix('@').unwrap_or(id);
    let id = id.split_whitespace().next()?;
    let id = MATE_SUFFIX.replace(id, "");
    (!id.is_empty()).then(|| id.into_owned())
}

/// Target read IDs in file order.
#[derive(Debug, Default, Clone)]
pub struct IdSet {
    ids: Vec<String>,
    index: HashSet<String>,
}

impl IdSet {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for id in ids {
            if let Some(id) = normalize_id(id.as_ref()) {
                set.insert(id);
            }
        }
        set
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let name = path.to_string_lossy();
        let file = File::open(path).map_err(|e| Error::io(&name, e))?;
        let mut set = Self::default();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::io(&name, e))?;
            if line.trim_start().starts_with('#') {
                continue;
            }
            if let Some(id) = normalize_id(&line) {
                set.insert(id);
            }
        }
        Ok(set)
    }

    fn insert(&mut self, id: String) {
        if self.index.insert(id.clone()) {
            self.ids.push(id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|x| x.as_str())
    }
}

/// Where the barcode sits in a header line (without `@`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderFormat {
    /// `key=VALUE`, the value ending at whitespace or a comma
    Tag(String),
    /// 0-based field of the header split on `delimiter`
    Field { delimiter: char, index: usize },
}

impl Default for HeaderFormat {
    fn default() -> Self {
        HeaderFormat::Tag(DEFAULT_TAG.to_owned())
    }
}

impl fmt::Display for HeaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeaderFormat::Tag(key) => write!(f, "tag {key}="),
            HeaderFormat::Field { delimiter, index } => {
                write!(f, "field {index} split by {delimiter:?}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BarcodeExtractor {
    format: HeaderFormat,
    tag: Option<Regex>,
}

impl BarcodeExtractor {
    pub fn new(format: HeaderFormat) -> Result<Self> {
        let tag = match &format {
            HeaderFormat::Tag(key) => {
                if key.is_empty() || key.contains(|c: char| c == '=' || c.is_whitespace()) {
                    return Err(Error::HeaderFormat(format!("not a valid tag key: {key:?}")));
                }
                let re = Regex::new(&format!(r"(?:^|[\s,;]){}=([^,\s]+)", regex::escape(key)))
                    .map_err(|e| Error::HeaderFormat(e.to_string()))?;
                Some(re)
            }
            HeaderFormat::Field { .. } => None,
        };
        Ok(Self { format, tag })
    }

    pub fn format(&self) -> &HeaderFormat {
        &self.format
    }

    pub fn extract<'a>(&self, header: &'a str) -> Result<&'a str> {
        let barcode = match (&self.format, &self.tag) {
            (HeaderFormat::Field { delimiter, index }, _) => header
                .split(*delimiter)
                .nth(*index)
                .map(|x| x.trim())
                .filter(|x| !x.is_empty()),
            (HeaderFormat::Tag(_), Some(re)) => {
                re.captures(header).and_then(|x| x.get(1)).map(|x| x.as_str())
            }
            (HeaderFormat::Tag(_), None) => None,
        };
        barcode.ok_or_else(|| Error::BarcodeFormat {
            header: header.to_owned(),
            reason: format!("no barcode at {}", self.format),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub id: String,
    pub barcode: String,
}

#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    pub format: HeaderFormat,
    /// write an NA row for every ID that was not found
    pub keep_missing: bool,
}

#[derive(Debug, Default)]
pub struct LookupSummary {
    pub rows: Vec<OutputRow>,
    pub total_ids: usize,
    pub found: usize,
    /// malformed records and headers without a barcode
    pub skipped: usize,
    pub failed: Vec<String>,
}

impl LookupSummary {
    pub fn report<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for row in self.rows.iter().take(self.found) {
            *counts.entry(row.barcode.as_str()).or_insert(0) += 1;
        }
        writeln!(w, "\n--- Barcode Summary ---")?;
        for (barcode, count) in &counts {
            let percentage = *count as f64 / self.found as f64 * 100.0;
            writeln!(w, "  {barcode}: {count} ({percentage:.2}%)")?;
        }
        let missing = self.total_ids.saturating_sub(self.found);
        if missing > 0 {
            writeln!(w, "  {MISSING} (IDs Not Found): {missing}")?;
        }
        let percentage = if self.total_ids > 0 {
            self.found as f64 / self.total_ids as f64 * 100.0
        } else {
            0.0
        };
        writeln!(w, "-----------------------")?;
        writeln!(w, "  Total IDs Processed: {}", self.total_ids)?;
        writeln!(w, "  IDs Found: {}", self.found)?;
        writeln!(w, "  Percentage Found: {percentage:.2}%")?;
        if self.skipped > 0 {
            writeln!(w, "  Records Skipped: {}", self.skipped)?;
        }
        for path in &self.failed {
            writeln!(w, "  Failed file: {path}")?;
        }
        writeln!(w, "-----------------------")
    }
}

/// FASTQ files (`.fastq`, `.fq`, optionally gzipped) directly inside `dir`, sorted by name.
pub fn read_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::FileNotFound(dir.to_path_buf()));
    }
    let name = dir.to_string_lossy();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(&name, e))? {
        let path = entry.map_err(|e| Error::io(&name, e))?.path();
        if path.is_file() && is_fastq_path(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Finds the first record of every target ID in `files` and extracts its barcode.
pub fn lookup(ids: &IdSet, files: &[PathBuf], extractor: &BarcodeExtractor, keep_missing: bool) -> LookupSummary {
    let mut summary = LookupSummary {
        total_ids: ids.len(),
        ..Default::default()
    };
    let mut pending: HashSet<&str> = ids.iter().collect();

    for path in files {
        if pending.is_empty() {
            info!("All target IDs found, stopping search early");
            break;
        }
        info!("Processing: {}", path.display());
        let reader = match fastq::open(path) {
            Ok(reader) => reader,
            Err(e) => {
                error!("{e}");
                summary.failed.push(path.display().to_string());
                continue;
            }
        };

        for record in reader {
            let record = match record {
                Ok(record) => record,
                Err(e @ Error::MalformedFastq { .. }) => {
                    warn!("{e}, record skipped");
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!("{e}, skip the rest of the file");
                    summary.failed.push(path.display().to_string());
                    break;
                }
            };
            let id = MATE_SUFFIX.replace(record.id(), "");
            let id: &str = &id;
            if !pending.contains(id) {
                continue;
            }
            match extractor.extract(record.head()) {
                Ok(barcode) => {
                    pending.remove(id);
                    summary.rows.push(OutputRow {
                        id: id.to_owned(),
                        barcode: barcode.to_owned(),
                    });
                    if pending.is_empty() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{}: {}, record skipped", path.display(), e);
                    summary.skipped += 1;
                }
            }
        }
    }

    summary.found = summary.rows.len();
    if keep_missing {
        for id in ids.iter().filter(|x| pending.contains(x)) {
            summary.rows.push(OutputRow {
                id: id.to_owned(),
                barcode: MISSING.to_owned(),
            });
        }
    }
    summary
}

pub fn write_csv<P: AsRef<Path>>(path: P, rows: &[OutputRow]) -> Result<()> {
    let path = path.as_ref();
    let name = path.to_string_lossy();
    let csv_error = |source: csv::Error| Error::Csv {
        file: name.to_string(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer.write_record(["ID", "barcode"]).map_err(csv_error)?;
    for row in rows {
        writer
            .write_record([row.id.as_str(), row.barcode.as_str()])
            .map_err(csv_error)?;
    }
    writer.flush().map_err(|e| Error::io(&name, e))
}

/// Loads the IDs, searches every FASTQ file of `reads_dir` and writes the CSV to `output`.
pub fn run<P, Q, R>(id_file: P, reads_dir: Q, output: R, opts: &LookupOptions) -> Result<LookupSummary>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: AsRef<Path>,
{
    let extractor = BarcodeExtractor::new(opts.format.clone())?;
    debug!("Taking barcodes from header {}", extractor.format());
    let ids = IdSet::load(&id_file)?;
    info!(
        "Read {} target IDs from {}",
        ids.len(),
        id_file.as_ref().display()
    );
    if ids.is_empty() {
        warn!("No IDs found in {}", id_file.as_ref().display());
    }

    let files = read_files(&reads_dir)?;
    if files.is_empty() {
        warn!("No FASTQ files found in {}", reads_dir.as_ref().display());
    }

    let summary = lookup(&ids, &files, &extractor, opts.keep_missing);
    write_csv(&output, &summary.rows)?;
    info!(
        "Saved {} rows to {}",
        summary.rows.len(),
        output.as_ref().display()
    );
    Ok(summary)
}
