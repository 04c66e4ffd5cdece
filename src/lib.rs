use clap::{ArgAction, Parser};

pub mod chunking;
pub mod filter;
pub mod idmap;
pub mod index;
pub mod io;
pub mod kmer;
pub mod links;
pub mod mask;
pub mod occurrence;
pub mod output;

use filter::FilterConfig;
use idmap::IdentifierMapping;
use index::{IndexConfig, SeedIndex};
use mask::SpacedSeedMaskCollection;

/// Find spaced-seed matches ("links") between genomes as a pre-alignment filter.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_version_flag = true)]
pub struct Args {
    /// First genome FASTA (plain or .gz)
    #[arg(long)]
    pub first: std::path::PathBuf,

    /// Second genome FASTA (plain or .gz)
    #[arg(long)]
    pub second: std::path::PathBuf,

    /// Additional genome FASTAs
    #[arg(long = "extra")]
    pub extra: Vec<std::path::PathBuf>,

    /// Number of care positions per seed [w=12]
    #[arg(short = 'w', long, default_value_t = 12, hide_default_value = true)]
    pub weight: usize,

    /// Seed window length; enables random spaced masks when > weight [s=weight]
    #[arg(short = 's', long)]
    pub span: Option<usize>,

    /// Number of masks to generate [n=1]
    #[arg(short = 'n', long = "seed-set-size", default_value_t = 1, hide_default_value = true)]
    pub seed_set_size: usize,

    /// Literal mask patterns of 1s (care) and 0s (don't care); overrides generation
    #[arg(long = "mask")]
    pub masks: Vec<String>,

    /// Use the precomputed optimal mask set for the given weight
    #[arg(long)]
    pub optimal: bool,

    /// Fixed seed for mask generation and match sampling
    #[arg(long = "rng-seed")]
    pub rng_seed: Option<u64>,

    /// Most matches a single seed may contribute [l=10]
    #[arg(short = 'l', long = "match-limit", default_value_t = 10, hide_default_value = true)]
    pub match_limit: usize,

    /// Drop a seed entirely once it exceeds the match limit
    #[arg(long = "discard-exceeding")]
    pub discard_exceeding: bool,

    /// Pair occurrences across all genomes, not only the first two
    #[arg(long = "create-all-matches")]
    pub create_all_matches: bool,

    /// Keep a per-sequence seed catalog of the first genome (one-vs-all)
    #[arg(long = "reference-mode")]
    pub reference_mode: bool,

    /// Skip the diagonal-consistency filter
    #[arg(long = "no-diagonal-filter")]
    pub no_diagonal_filter: bool,

    /// Minimum co-linear matches per diagonal [d=2]
    #[arg(short = 'd', long = "diagonal-threshold", default_value_t = 2, hide_default_value = true)]
    pub diagonal_threshold: usize,

    /// Neighbourhood width for the diagonal density test [a=1000]
    #[arg(short = 'a', long = "local-area-length", default_value_t = 1000, hide_default_value = true)]
    pub local_area_length: usize,

    /// Minimum gap between kept matches on a diagonal [m=0]
    #[arg(short = 'm', long = "min-match-distance", default_value_t = 0, hide_default_value = true)]
    pub min_match_distance: u64,

    /// Let matches on a diagonal overlap
    #[arg(long = "allow-overlap")]
    pub allow_overlap: bool,

    /// Number of threads [t=1]
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Output JSON file [o=seedlink.json]
    #[arg(short = 'o', long, default_value = "seedlink.json")]
    pub output: std::path::PathBuf,

    /// Display version information.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    pub version: (),
}

pub fn run_with_args(args: Args) -> anyhow::Result<()> {
    let num_threads = args.threads.unwrap_or(1);
    anyhow::ensure!(num_threads >= 1, "threads must be ≥ 1");
    anyhow::ensure!(args.match_limit >= 1, "match_limit must be ≥ 1");
    anyhow::ensure!(
        args.diagonal_threshold >= 1,
        "diagonal_threshold must be ≥ 1"
    );
    anyhow::ensure!(
        args.masks.is_empty() || !args.optimal,
        "--mask and --optimal are mutually exclusive"
    );

    let masks = if !args.masks.is_empty() {
        let patterns: Vec<&str> = args.masks.iter().map(String::as_str).collect();
        SpacedSeedMaskCollection::from_patterns(&patterns)?
    } else if args.optimal {
        SpacedSeedMaskCollection::optimal(args.weight, args.seed_set_size)?
    } else {
        let span = args.span.unwrap_or(args.weight);
        anyhow::ensure!(
            span >= args.weight,
            "span ({}) must be ≥ weight ({})",
            span,
            args.weight
        );
        if span == args.weight && args.seed_set_size == 1 {
            SpacedSeedMaskCollection::contiguous(args.weight)?
        } else {
            SpacedSeedMaskCollection::random(span, args.weight, args.seed_set_size, args.rng_seed)?
        }
    };

    let span = masks.max_span();
    anyhow::ensure!(
        span <= 128,
        "span ({}) exceeds the supported maximum of 128",
        span
    );

    eprintln!("seedlink v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "parameters: weight={} span={} masks={} match_limit={} diagonal_filter={} threads={} output={}",
        masks.weight(),
        span,
        masks.len(),
        args.match_limit,
        !args.no_diagonal_filter,
        num_threads,
        args.output.display()
    );
    for mask in masks.iter() {
        eprintln!("mask: {}", mask.pattern_string());
    }

    // One packed word covers 32 bases.
    match span.div_ceil(32) {
        1 => run_pipeline::<1>(&args, masks, num_threads),
        2 => run_pipeline::<2>(&args, masks, num_threads),
        3 | 4 => run_pipeline::<4>(&args, masks, num_threads),
        _ => unreachable!("span bound checked above"),
    }
}

fn run_pipeline<const W: usize>(
    args: &Args,
    masks: SpacedSeedMaskCollection,
    num_threads: usize,
) -> anyhow::Result<()> {
    let mut idmap = IdentifierMapping::new();
    let mut records = Vec::new();
    io::load_genome(&args.first, &mut idmap, &mut records)?;
    io::load_genome(&args.second, &mut idmap, &mut records)?;
    for path in &args.extra {
        io::load_genome(path, &mut idmap, &mut records)?;
    }
    eprintln!(
        "input: genomes={} sequences={}",
        idmap.genome_count(),
        idmap.sequence_count()
    );

    let cfg = IndexConfig {
        masks,
        genome_count: idmap.genome_count(),
        match_limit: args.match_limit,
        discard_on_limit: args.discard_exceeding,
        create_all_matches: args.create_all_matches,
        reference_mode: args.reference_mode,
        threads: num_threads,
        rng_seed: args.rng_seed,
    };

    let (index, catalog) = SeedIndex::<W>::build(&records, &cfg)?;
    let stats = index.stats();
    eprintln!(
        "seed index: seeds={} windows={} invalid_windows={} short_sequences={}",
        index.seed_count(),
        stats.window_count,
        stats.invalid_windows.iter().sum::<u64>(),
        stats.short_sequences.iter().sum::<u64>()
    );
    if let Some(cat) = &catalog {
        eprintln!(
            "reference catalog: sequences={} seeds={}",
            cat.sequence_count(),
            cat.seed_count()
        );
    }

    let (links, lstats) = index.into_links(&cfg);
    eprintln!(
        "links: emitted={} exhaustive_seeds={} sampled_seeds={} discarded_seeds={} discarded_links={}",
        lstats.emitted,
        lstats.exhaustive_seeds,
        lstats.sampled_seeds,
        lstats.discarded_seeds,
        lstats.discarded_links
    );

    let links = if args.no_diagonal_filter {
        links
    } else {
        let fcfg = FilterConfig {
            diagonal_threshold: args.diagonal_threshold,
            local_area_length: args.local_area_length,
            min_match_distance: args.min_match_distance,
            allow_overlap: args.allow_overlap,
            threads: num_threads,
        };
        let (kept, fstats) = filter::filter_links(links, &fcfg)?;
        eprintln!(
            "diagonal filter: kept={} not_primary={} overlapped={} sparse_diagonals={} sparse_neighbourhoods={}",
            fstats.kept,
            fstats.skipped_not_in_primary_genomes,
            fstats.skipped_overlapped_or_too_close,
            fstats.skipped_too_few_diagonal_elements,
            fstats.skipped_too_few_neighbours
        );
        kept
    };

    output::write_links(&args.output, &links, &idmap)?;
    eprintln!("output file:  {}", args.output.display());
    Ok(())
}
