use anyhow::{ensure, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches};
use env_logger::Env;
use indoc::indoc;
use std::{io, path::PathBuf, process::ExitCode};

use fxgrep::{
    utils::lookup::{self, HeaderFormat, LookupOptions},
    VERSION,
};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn build_cli() -> App<'static> {
    App::new("fxbarcode")
        .version(VERSION)
        .about("Look up the barcode of every listed read ID in a directory of FASTQ files")
        .global_setting(AppSettings::ArgRequiredElseHelp)
        .global_setting(AppSettings::DeriveDisplayOrder)
        .after_help(indoc! {"
            Headers are read as `@ID ... barcode=VALUE ...` unless --delimiter is given,
            in which case the barcode is field --field of the header split on the delimiter.
            The CSV has the columns ID,barcode."
        })
        .arg(
            Arg::new("ids")
                .help("file with one read ID per line, a leading @ is ignored")
                .required(true),
        )
        .arg(
            Arg::new("reads")
                .help("directory holding the FASTQ files (.fq/.fastq, optionally .gz)")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .default_value(lookup::DEFAULT_OUTPUT)
                .help("output CSV file")
                .takes_value(true),
        )
        .arg(
            Arg::new("tag")
                .short('t')
                .long("tag")
                .value_name("KEY")
                .default_value(lookup::DEFAULT_TAG)
                .help("header tag holding the barcode, ignored with --delimiter")
                .takes_value(true),
        )
        .arg(
            Arg::new("delimiter")
                .short('d')
                .long("delimiter")
                .value_name("CHAR")
                .help("split headers on CHAR and take the barcode from --field")
                .requires("field")
                .takes_value(true),
        )
        .arg(
            Arg::new("field")
                .short('f')
                .long("field")
                .value_name("INT")
                .help("0-based header field holding the barcode")
                .requires("delimiter")
                .takes_value(true),
        )
        .arg(
            Arg::new("keep-missing")
                .long("keep-missing")
                .help("write an NA row for every ID that was not found"),
        )
}

fn header_format(args: &ArgMatches) -> Result<HeaderFormat> {
    if let Some(d) = args.value_of("delimiter") {
        let mut chars = d.chars();
        let delimiter = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => anyhow::bail!("--delimiter takes a single character, got {:?}", d),
        };
        let index = args
            .value_of("field")
            .unwrap_or("0")
            .parse::<usize>()
            .context("not a valid value for --field")?;
        return Ok(HeaderFormat::Field { delimiter, index });
    }
    let tag = args.value_of("tag").unwrap_or(lookup::DEFAULT_TAG).trim();
    ensure!(!tag.is_empty(), "--tag must not be empty");
    Ok(HeaderFormat::Tag(tag.to_owned()))
}

fn fxbarcode() -> Result<ExitCode> {
    let args = build_cli().get_matches();
    let opts = LookupOptions {
        format: header_format(&args)?,
        keep_missing: args.is_present("keep-missing"),
    };
    let id_file = PathBuf::from(args.value_of("ids").unwrap_or_default());
    let reads_dir = PathBuf::from(args.value_of("reads").unwrap_or_default());
    let output = PathBuf::from(args.value_of("output").unwrap_or(lookup::DEFAULT_OUTPUT));

    let summary = lookup::run(&id_file, &reads_dir, &output, &opts)?;
    summary.report(&mut io::stderr())?;

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

    match fxbarcode() {
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

    #[test]
    fn test_cli() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_header_format() {
        let m = build_cli().try_get_matches_from(["fxbarcode", "ids.txt", "reads"]).unwrap();
        assert_eq!(header_format(&m).unwrap(), HeaderFormat::Tag("barcode".to_owned()));

        let m = build_cli()
            .try_get_matches_from(["fxbarcode", "ids.txt", "reads", "-d", "_", "-f", "2"])
            .unwrap();
        assert_eq!(
            header_format(&m).unwrap(),
            HeaderFormat::Field { delimiter: '_', index: 2 }
        );

        let m = build_cli()
            .try_get_matches_from(["fxbarcode", "ids.txt", "reads", "-d", "::", "-f", "1"])
            .unwrap();
        assert!(header_format(&m).is_err());

        assert!(build_cli()
            .try_get_matches_from(["fxbarcode", "ids.txt", "reads", "-d", "_"])
            .is_err());
    }
}
