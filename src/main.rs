use anyhow::{Context, Result};
use clap::{App, Arg};
use log::info;
use std::io::{stdout, BufWriter};

use pilecursor::config::{MalformedReadPolicy, PileupConfig};
use pilecursor::pileup::pileup_alignments;

fn main() -> Result<()> {
    let matches = App::new("pilecursor")
        .version("0.1.0")
        .about("Prints per-column pileups of a coordinate-sorted SAM/BAM file")
        .arg(
            Arg::with_name("bam")
                .short('b')
                .long("bam")
                .value_name("BAM")
                .help("Path to the coordinate-sorted SAM/BAM file")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("min-mapq")
                .short('q')
                .long("min-mapq")
                .value_name("N")
                .help("Skip reads with mapping quality below N")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            Arg::with_name("min-baseq")
                .short('Q')
                .long("min-baseq")
                .value_name("N")
                .help("Skip aligned bases with quality below N")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            Arg::with_name("no-deletions")
                .long("no-deletions")
                .help("Leave deleted bases out of the columns"),
        )
        .arg(
            Arg::with_name("error-mode")
                .short('e')
                .long("error-mode")
                .value_name("MODE")
                .help("Malformed read handling: skip, abort")
                .takes_value(true)
                .possible_values(["skip", "abort"])
                .default_value("skip"),
        )
        .arg(
            Arg::with_name("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log verbosity: error, warn, info, debug, trace")
                .takes_value(true)
                .default_value("warn"),
        )
        .get_matches();

    let level = matches
        .value_of("log-level")
        .unwrap_or("warn")
        .parse::<log::LevelFilter>()
        .map_err(|e| anyhow::anyhow!("Invalid log level: {}", e))?;
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let bam_path = matches.value_of("bam").context("Missing --bam")?;
    let config = PileupConfig {
        min_mapping_quality: matches
            .value_of("min-mapq")
            .unwrap_or("0")
            .parse()
            .context("Failed to parse --min-mapq")?,
        min_base_quality: matches
            .value_of("min-baseq")
            .unwrap_or("0")
            .parse()
            .context("Failed to parse --min-baseq")?,
        include_deletions: !matches.is_present("no-deletions"),
        malformed_reads: matches
            .value_of("error-mode")
            .unwrap_or("skip")
            .parse::<MalformedReadPolicy>()?,
    };

    info!("Using alignments: {}", bam_path);
    let mut output = BufWriter::new(stdout().lock());
    let summary = pileup_alignments(bam_path, &config, &mut output)
        .context("Failed to build pileup")?;

    info!(
        "Pileup completed: {} reads used, {} reads skipped, {} columns written",
        summary.reads_used, summary.reads_skipped, summary.columns
    );
    Ok(())
}
