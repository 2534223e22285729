use anyhow::{bail, ensure, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches};
use env_logger::Env;
use hashbrown::HashSet;
use indoc::indoc;
use lazy_static::lazy_static;
use std::{io, path::PathBuf, process::ExitCode};

use fxgrep::{
    utils::{
        matcher::{Color, PatternMatcher, SearchTerm, MAX_SLOTS},
        scan::{self, ScanOptions},
    },
    VERSION,
};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

lazy_static! {
    // (color, slot, arg name, help) for --red1 .. --yellow9
    static ref TERM_SLOTS: Vec<(Color, u8, String, String)> = Color::ALL
        .iter()
        .flat_map(|&color| {
            (1..=MAX_SLOTS).map(move |slot| {
                let name = format!("{}{}", color.name(), slot);
                let help = format!(
                    "required term highlighted in {}, slots 1-9: --{}1..--{}9 or -{}1..-{}9",
                    color.name(),
                    color.name(),
                    color.name(),
                    color.initial(),
                    color.initial()
                );
                (color, slot, name, help)
            })
        })
        .collect();
}

/// Rewrites the single-dash forms `-r1`, `-b2`, ... and `-rc` to their long names.
fn normalize_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    args.into_iter()
        .map(|arg| {
            let mut chars = arg.chars();
            match (chars.next(), chars.next(), chars.next(), chars.next()) {
                (Some('-'), Some(c), Some(d @ '1'..='9'), None) => match Color::from_initial(c) {
                    Some(color) => format!("--{}{}", color.name(), d),
                    None => arg,
                },
                _ if arg == "-rc" => "--rc".to_owned(),
                _ => arg,
            }
        })
        .collect()
}

fn build_cli() -> App<'static> {
    let mut app = App::new("fxgrep")
        .version(VERSION)
        .about("Find FASTQ reads containing ALL given sequences and highlight them by color")
        .override_usage("fxgrep [OPTIONS] -r1 <SEQ> [-b1 <SEQ> ...] <input>...")
        .global_setting(AppSettings::ArgRequiredElseHelp)
        .global_setting(AppSettings::DeriveDisplayOrder)
        .arg(
            Arg::new("input")
                .help("input FASTQ files (.fq/.fastq, optionally .gz), - for stdin")
                .required(true)
                .multiple_values(true),
        )
        .arg(
            Arg::new("rc")
                .long("rc")
                .alias("reverse_complement")
                .help("also search the reverse complement of every term (-rc is accepted too)"),
        )
        .arg(
            Arg::new("rc-for")
                .long("rc-for")
                .value_name("SLOTS")
                .help("search the reverse complement of the given terms only, e.g. r1,b2")
                .takes_value(true),
        )
        .arg(
            Arg::new("limit")
                .short('l')
                .long("limit")
                .value_name("INT")
                .help("stop after INT matching reads, 0 means no limit")
                .takes_value(true),
        )
        .arg(
            Arg::new("show")
                .short('s')
                .long("show")
                .value_name("INT")
                .default_value("20")
                .help("print at most INT reads to the terminal, 0 means no limit")
                .takes_value(true),
        )
        .arg(
            Arg::new("all")
                .short('a')
                .long("all")
                .help("print every read, not only the reads matching all terms"),
        )
        .arg(
            Arg::new("case-sensitive")
                .long("case-sensitive")
                .help("match case exactly, soft-masked (lowercase) bases then never match"),
        )
        .arg(
            Arg::new("ignore-case")
                .short('i')
                .long("ignore-case")
                .conflicts_with("case-sensitive")
                .help("ignore case, the default"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .default_value(scan::DEFAULT_OUTPUT)
                .help("write IDs of reads matching all terms to FILE")
                .takes_value(true),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("INT")
                .help("maximum worker threads, default: min(input files, CPUs)")
                .takes_value(true),
        )
        .arg(
            Arg::new("color")
                .long("color")
                .value_name("WHEN")
                .possible_values(["auto", "always", "never"])
                .default_value("auto")
                .help(indoc! {"
                    highlight matches with ANSI colors:
                      auto:   only when the output is a terminal
                      always: always
                      never:  never"
                })
                .takes_value(true),
        );
    for (_, slot, name, help) in TERM_SLOTS.iter() {
        app = app.arg(
            Arg::new(name.as_str())
                .long(name.as_str())
                .value_name("SEQ")
                .help(help.as_str())
                .hide(*slot > 1)
                .takes_value(true),
        );
    }
    app
}

fn parse_rc_for(v: Option<&str>) -> Result<HashSet<String>> {
    let mut slots = HashSet::new();
    for label in v.unwrap_or("").split(',').map(|x| x.trim().to_ascii_lowercase()) {
        if label.is_empty() {
            continue;
        }
        let mut chars = label.chars();
        match (chars.next().and_then(Color::from_initial), chars.as_str().parse::<u8>()) {
            (Some(_), Ok(slot)) if (1..=MAX_SLOTS).contains(&slot) => {
                slots.insert(label);
            }
            _ => bail!("not a valid term slot for --rc-for: {}", label),
        }
    }
    Ok(slots)
}

fn collect_terms(args: &ArgMatches) -> Result<Vec<SearchTerm>> {
    let rc_all = args.is_present("rc");
    let rc_for = parse_rc_for(args.value_of("rc-for"))?;
    let mut terms = Vec::new();
    for (color, slot, name, _) in TERM_SLOTS.iter() {
        if let Some(v) = args.value_of(name.as_str()) {
            if v.trim().is_empty() {
                continue;
            }
            let label = format!("{}{}", color.initial(), slot);
            terms.push(SearchTerm::new(v, *color, *slot, rc_all || rc_for.contains(&label))?);
        }
    }
    ensure!(
        !terms.is_empty(),
        "At least one search term (e.g., -r1, --blue2) must be provided"
    );
    Ok(terms)
}

fn build_matcher(args: &ArgMatches) -> Result<PatternMatcher> {
    let terms = collect_terms(args)?;
    Ok(PatternMatcher::new(terms, !args.is_present("case-sensitive")))
}

fn parse_count(args: &ArgMatches, name: &str) -> Result<Option<usize>> {
    args.value_of(name)
        .map(|v| v.parse::<usize>())
        .transpose()
        .with_context(|| format!("not a valid value for --{name}"))
}

fn options(args: &ArgMatches) -> Result<ScanOptions> {
    let threads = parse_count(args, "threads")?;
    ensure!(threads != Some(0), "not a valid value for --threads: 0");
    let color = match args.value_of("color") {
        Some("always") => true,
        Some("never") => false,
        _ => atty::is(atty::Stream::Stdout),
    };
    Ok(ScanOptions {
        limit: parse_count(args, "limit")?.filter(|&x| x > 0),
        show: parse_count(args, "show")?.unwrap_or(scan::DEFAULT_SHOW),
        print_all: args.is_present("all"),
        color,
        threads,
        output: PathBuf::from(args.value_of("output").unwrap_or(scan::DEFAULT_OUTPUT)),
    })
}

fn fxgrep() -> Result<ExitCode> {
    let args = build_cli().get_matches_from(normalize_args(std::env::args()));
    let matcher = build_matcher(&args)?;
    let opts = options(&args)?;
    let paths: Vec<PathBuf> = args
        .values_of("input")
        .map_or_else(|| vec![PathBuf::from("-")], |v| v.map(PathBuf::from).collect());

    let summary = scan::run(&paths, &matcher, &opts)?;
    summary.report(&mut io::stderr(), &matcher, opts.color)?;

    Ok(if summary.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    match fxgrep() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        normalize_args(v.iter().map(|x| x.to_string()))
    }

    #[test]
    fn test_cli() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_normalize_args() {
        assert_eq!(
            args(&["fxgrep", "-r1", "ACGT", "-y9", "GG", "-rc", "-l", "5", "-x1", "in.fq"]),
            vec!["fxgrep", "--red1", "ACGT", "--yellow9", "GG", "--rc", "-l", "5", "-x1", "in.fq"]
        );
        assert_eq!(args(&["-r10", "--red1", "-b0"]), vec!["-r10", "--red1", "-b0"]);
    }

    #[test]
    fn test_collect_terms() {
        let m = build_cli()
            .try_get_matches_from(args(&["fxgrep", "-b2", "GGGA", "-r1", "ACGT", "--rc-for", "b2", "in.fq"]))
            .unwrap();
        let terms = collect_terms(&m).unwrap();
        assert_eq!(terms.len(), 2);
        // red terms are registered before blue ones
        assert_eq!(terms[0].label(), "r1");
        assert!(!terms[0].reverse_complement());
        assert_eq!(terms[1].label(), "b2");
        assert_eq!(terms[1].rc_text(), Some("TCCC"));

        let m = build_cli()
            .try_get_matches_from(args(&["fxgrep", "-g3", "AC", "-rc", "in.fq"]))
            .unwrap();
        assert!(collect_terms(&m).unwrap()[0].reverse_complement());

        let m = build_cli().try_get_matches_from(["fxgrep", "in.fq"]).unwrap();
        assert!(collect_terms(&m).is_err());
    }

    #[test]
    fn test_case_folding() {
        let m = build_cli()
            .try_get_matches_from(args(&["fxgrep", "-r1", "ACGT", "in.fq"]))
            .unwrap();
        assert!(build_matcher(&m).unwrap().sequence_all_match("ttacgttt"));

        let m = build_cli()
            .try_get_matches_from(args(&["fxgrep", "-r1", "ACGT", "--case-sensitive", "in.fq"]))
            .unwrap();
        let matcher = build_matcher(&m).unwrap();
        assert!(!matcher.sequence_all_match("ttacgttt"));
        assert!(matcher.sequence_all_match("TTACGTTT"));

        assert!(build_cli()
            .try_get_matches_from(args(&["fxgrep", "-r1", "A", "-i", "--case-sensitive", "in.fq"]))
            .is_err());
    }

    #[test]
    fn test_invalid_term_is_an_error() {
        for term in ["ACé", "ACRT"] {
            let m = build_cli()
                .try_get_matches_from(args(&["fxgrep", "-r1", term, "-rc", "in.fq"]))
                .unwrap();
            assert!(build_matcher(&m).is_err(), "{term}");
        }
    }

    #[test]
    fn test_options() {
        let m = build_cli()
            .try_get_matches_from(args(&["fxgrep", "-r1", "A", "-l", "3", "--color", "never", "a.fq", "b.fq"]))
            .unwrap();
        let opts = options(&m).unwrap();
        assert_eq!(opts.limit, Some(3));
        assert_eq!(opts.show, 20);
        assert!(!opts.color);
        assert_eq!(opts.output, PathBuf::from("matching_ids.txt"));
        assert_eq!(m.values_of("input").unwrap().count(), 2);

        assert!(parse_rc_for(Some("r1, y9")).is_ok());
        assert!(parse_rc_for(Some("r0")).is_err());
        assert!(parse_rc_for(Some("x1")).is_err());
    }
}
