use super::common::is_gzip_path;
use super::error::{Error, Result};
use super::fastq;
use super::highlight::render;
use super::matcher::PatternMatcher;
use crossbeam_channel::{bounded, Receiver, Sender};
use crossbeam_utils::thread;
use hashbrown::HashSet;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

pub const DEFAULT_OUTPUT: &str = "matching_ids.txt";
pub const DEFAULT_SHOW: usize = 20;
const CHANNEL_SIZE: usize = 4096;
const STDOUT: &str = "<stdout>";

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// stop after this many distinct matching reads, 0 or None for no limit
    pub limit: Option<usize>,
    /// maximum lines printed to the terminal, 0 for no limit
    pub show: usize,
    pub print_all: bool,
    pub color: bool,
    pub threads: Option<usize>,
    pub output: PathBuf,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            limit: None,
            show: DEFAULT_SHOW,
            print_all: false,
            color: true,
            threads: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub path: PathBuf,
    /// decompression is serial, a compressed file gains nothing from splitting
    pub compressed: bool,
}

/// One task per file, compressed files queued first so the slow ones start early.
pub fn plan_tasks(files: &[PathBuf]) -> Vec<Task> {
    let mut tasks: Vec<Task> = files
        .iter()
        .map(|x| Task {
            path: x.clone(),
            compressed: is_gzip_path(x),
        })
        .collect();
    tasks.sort_by_key(|x| !x.compressed);
    tasks
}

pub fn pool_size(tasks: usize, threads: Option<usize>) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|x| x.get())
        .unwrap_or(1);
    threads.unwrap_or(cpus).min(tasks).max(1)
}

#[derive(Debug)]
struct Hit {
    id: String,
    line: String,
    matched: bool,
}

#[derive(Debug, Default, Clone)]
struct FileStats {
    reads: usize,
    matched: usize,
    term_hits: Vec<usize>,
    invalid_bases: usize,
}

#[derive(Debug)]
enum Event {
    Hit(Hit),
    Done(FileStats),
    Failed(String, Error),
}

#[derive(Debug, Default)]
pub struct ScanSummary {
    pub reads: usize,
    /// reads matching every term, duplicates included
    pub matched: usize,
    pub printed: usize,
    /// distinct IDs of fully matching reads, in arrival order
    pub ids: Vec<String>,
    pub term_hits: Vec<usize>,
    pub invalid_bases: usize,
    pub failed: Vec<String>,
    pub stopped: bool,
}

impl ScanSummary {
    pub fn report<W: Write>(&self, w: &mut W, matcher: &PatternMatcher, color: bool) -> io::Result<()> {
        let percentage = if self.reads > 0 {
            self.matched as f64 / self.reads as f64 * 100.0
        } else {
            0.0
        };
        writeln!(w, "\n--- Search Complete ---")?;
        writeln!(w, "Total reads processed: {}", self.reads)?;
        writeln!(
            w,
            "Total matching reads (ALL terms present, printed: {}): {} ({:.2}%)",
            self.printed, self.matched, percentage
        )?;
        writeln!(w, "Matching IDs written: {}", self.ids.len())?;
        writeln!(w, "--- Individual Term Hit Summary: ---")?;
        for (term, hits) in matcher.terms().iter().zip(&self.term_hits) {
            let (hits, text) = if color {
                (term.color().paint(&hits.to_string()), term.color().paint(&term.to_string()))
            } else {
                (hits.to_string(), term.to_string())
            };
            writeln!(w, "  {} total hits for term {}: {}", hits, term.label(), text)?;
        }
        if self.invalid_bases > 0 {
            writeln!(
                w,
                "Reads skipped by the reverse complement search (invalid bases): {}",
                self.invalid_bases
            )?;
        }
        if self.stopped {
            writeln!(w, "Stopped early after reaching the match limit")?;
        }
        for path in &self.failed {
            writeln!(w, "Failed file: {path}")?;
        }
        writeln!(w, "-----------------------")
    }

    fn merge(&mut self, stats: FileStats) {
        self.reads += stats.reads;
        self.matched += stats.matched;
        self.invalid_bases += stats.invalid_bases;
        for (total, n) in self.term_hits.iter_mut().zip(stats.term_hits) {
            *total += n;
        }
    }
}

fn scan_file(
    task: &Task,
    matcher: &PatternMatcher,
    opts: &ScanOptions,
    stop: &AtomicBool,
    tx: &Sender<Event>,
) -> Result<FileStats> {
    let reader = fastq::open(&task.path)?;
    let source = reader.source().to_owned();
    info!(
        "Processing file: {} ({})",
        source,
        if task.compressed { "gzip" } else { "plain" }
    );

    let mut stats = FileStats {
        term_hits: vec![0; matcher.terms().len()],
        ..Default::default()
    };
    for record in reader {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let record = record?;
        stats.reads += 1;

        let result = matcher.evaluate(record.seq());
        if let Some(e) = &result.invalid_base {
            if stats.invalid_bases == 0 {
                warn!(
                    "{}: read {}: {}, reverse complement search skipped (reported once per file)",
                    source,
                    record.id(),
                    e
                );
            }
            stats.invalid_bases += 1;
        }
        for (n, hit) in stats.term_hits.iter_mut().zip(&result.hits) {
            if *hit {
                *n += 1;
            }
        }

        let matched = result.all_matched();
        if matched {
            stats.matched += 1;
        }
        if matched || opts.print_all {
            let hit = Hit {
                id: record.id().to_owned(),
                line: render(record.seq(), matcher, opts.color),
                matched,
            };
            if tx.send(Event::Hit(hit)).is_err() {
                break;
            }
        }
    }
    debug!(
        "{}: {} reads, {} matching",
        source, stats.reads, stats.matched
    );
    Ok(stats)
}

fn collect<W: Write>(
    rx: Receiver<Event>,
    stop: &AtomicBool,
    n_terms: usize,
    opts: &ScanOptions,
    out: &mut W,
) -> Result<ScanSummary> {
    let limit = opts.limit.filter(|&x| x > 0);
    let mut summary = ScanSummary {
        term_hits: vec![0; n_terms],
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let mut truncated = false;

    for event in rx {
        match event {
            Event::Hit(hit) => {
                if summary.stopped {
                    continue;
                }
                if hit.matched {
                    if !seen.insert(hit.id.clone()) {
                        continue;
                    }
                    summary.ids.push(hit.id.clone());
                    if limit.map_or(false, |x| summary.ids.len() >= x) {
                        summary.stopped = true;
                        stop.store(true, Ordering::Relaxed);
                    }
                }
                if opts.show == 0 || summary.printed < opts.show {
                    writeln!(out, "[{}]: {}", hit.id, hit.line).map_err(|e| Error::io(STDOUT, e))?;
                    summary.printed += 1;
                } else if !truncated {
                    writeln!(
                        out,
                        "[... Output limited after {} reads, scanning continues ...]",
                        opts.show
                    )
                    .map_err(|e| Error::io(STDOUT, e))?;
                    truncated = true;
                }
            }
            Event::Done(stats) => summary.merge(stats),
            Event::Failed(path, e) => {
                error!("Failed to scan {}: {}", path, e);
                summary.failed.push(path);
            }
        }
    }
    Ok(summary)
}

/// Scans `files` on a worker pool and prints the selected reads to `out`.
///
/// Workers only read and match; the calling thread receives their events, so printing,
/// de-duplication of IDs and the limit cutoff happen in one place. Returns an error only
/// when an input path is missing or `out` fails. A file that fails midway is logged and
/// listed in [`ScanSummary::failed`].
pub fn scan<P, W>(files: &[P], matcher: &PatternMatcher, opts: &ScanOptions, out: &mut W) -> Result<ScanSummary>
where
    P: AsRef<Path>,
    W: Write,
{
    let paths: Vec<PathBuf> = files.iter().map(|x| x.as_ref().to_path_buf()).collect();
    if let Some(p) = paths.iter().find(|p| p.as_os_str() != "-" && !p.exists()) {
        return Err(Error::FileNotFound(p.clone()));
    }

    let tasks = plan_tasks(&paths);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size(tasks.len(), opts.threads))
        .build()?;
    debug!("Scanning {} files with {} workers", tasks.len(), pool.current_num_threads());

    let stop = AtomicBool::new(false);
    let (tx, rx) = bounded(CHANNEL_SIZE);
    thread::scope(|work| {
        let (tasks, pool, stop) = (&tasks, &pool, &stop);
        work.spawn(move |_| {
            pool.install(|| {
                tasks.par_iter().for_each_with(tx, |tx, task| {
                    let event = match scan_file(task, matcher, opts, stop, tx) {
                        Ok(stats) => Event::Done(stats),
                        Err(e) => Event::Failed(task.path.display().to_string(), e),
                    };
                    // the receiver is only gone when printing failed
                    let _ = tx.send(event);
                })
            })
        });
        collect(rx, stop, matcher.terms().len(), opts, out)
    })
    .unwrap_or_else(|e| std::panic::resume_unwind(e))
}

pub fn write_ids<P: AsRef<Path>>(path: P, ids: &[String]) -> Result<()> {
    let path = path.as_ref();
    let name = path.to_string_lossy();
    let file = File::create(path).map_err(|e| Error::io(&name, e))?;
    let mut writer = BufWriter::new(file);
    for id in ids {
        writeln!(writer, "{id}").map_err(|e| Error::io(&name, e))?;
    }
    writer.flush().map_err(|e| Error::io(&name, e))
}

/// Scans `files`, prints to stdout and writes the matching IDs to `opts.output`.
pub fn run<P: AsRef<Path>>(files: &[P], matcher: &PatternMatcher, opts: &ScanOptions) -> Result<ScanSummary> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let summary = scan(files, matcher, opts, &mut out)?;
    out.flush().map_err(|e| Error::io(STDOUT, e))?;
    write_ids(&opts.output, &summary.ids)?;
    info!(
        "Wrote {} matching IDs to {}",
        summary.ids.len(),
        opts.output.display()
    );
    Ok(summary)
}
