#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use log::info;
use sparse_prs::calculate_prs;
use sparse_prs::config::PrsConfig;
use sparse_prs::intervals::write_interval_file;
use sparse_prs::reference::ReferenceGenome;
use sparse_prs::storage::{ArtifactStore, LocalStore, open_text};
use sparse_prs::vcf::load_vcf;
use sparse_prs::weights::WeightTable;
use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "sparse-prs",
    about = "Polygenic risk scores over sparse genotype datasets",
    long_about = "Computes one polygenic risk score per sample by joining a variant weight \
                 table against a sparse, interval-filtered genotype dataset."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct ScoreArgs {
    /// TOML file providing the run configuration; flags given alongside it override it
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Weight table (CSV, optionally .gz) with variant_id, weight, contig, position,
    /// effect_allele and noneffect_allele columns
    #[arg(long, value_name = "CSV")]
    weights: Option<PathBuf>,

    /// Sparse genotype dataset as a VCF (optionally .gz)
    #[arg(long, value_name = "VCF")]
    genotypes: PathBuf,

    /// Identifier used to name every artifact the run writes
    #[arg(long = "prs-id", value_name = "ID")]
    prs_id: Option<String>,

    /// Base directory for the interval and score artifacts
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Root directory every artifact location is resolved against
    #[arg(long, value_name = "DIR")]
    bucket: Option<String>,

    /// Also write the weight rows observed in the cohort
    #[arg(long)]
    save_found_variants: bool,

    /// Add a prs_identifier column to the score table
    #[arg(long)]
    include_identifier: bool,

    /// Reference assembly of the weight table coordinates
    #[arg(long, value_enum)]
    reference_genome: Option<ReferenceGenome>,
}

#[derive(Args)]
struct IntervalsArgs {
    /// Weight table (CSV, optionally .gz)
    #[arg(long, value_name = "CSV")]
    weights: PathBuf,

    /// Destination of the tab-separated interval list
    #[arg(long, value_name = "TSV")]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = ReferenceGenome::Grch38)]
    reference_genome: ReferenceGenome,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate polygenic risk scores for every sample of a genotype dataset
    #[command(about = "Calculate polygenic risk scores")]
    Score(ScoreArgs),

    /// Derive the single-point interval list from a weight table
    #[command(about = "Write the interval list for a weight table")]
    Intervals(IntervalsArgs),

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Score(args)) => run_score(args),
        Some(Commands::Intervals(args)) => run_intervals(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|e| Box::new(e) as Box<dyn Error>),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Merges the optional TOML file with the command-line flags. Flags win.
fn resolve_config(args: &ScoreArgs) -> Result<PrsConfig, Box<dyn Error>> {
    let base = args
        .config
        .as_deref()
        .map(PrsConfig::from_toml_file)
        .transpose()?;

    let missing = |flag: &str| format!("--{flag} is required when no --config file is given");

    let config = PrsConfig {
        prs_identifier: match (&args.prs_id, &base) {
            (Some(id), _) => id.clone(),
            (None, Some(b)) => b.prs_identifier.clone(),
            (None, None) => return Err(missing("prs-id").into()),
        },
        pgs_weight_path: match (&args.weights, &base) {
            (Some(w), _) => w.clone(),
            (None, Some(b)) => b.pgs_weight_path.clone(),
            (None, None) => return Err(missing("weights").into()),
        },
        output_path: match (&args.output, &base) {
            (Some(o), _) => o.clone(),
            (None, Some(b)) => b.output_path.clone(),
            (None, None) => return Err(missing("output").into()),
        },
        bucket: args
            .bucket
            .clone()
            .or_else(|| base.as_ref().and_then(|b| b.bucket.clone())),
        save_found_variants: args.save_found_variants
            || base.as_ref().is_some_and(|b| b.save_found_variants),
        include_identifier: args.include_identifier
            || base.as_ref().is_some_and(|b| b.include_identifier),
        reference_genome: args
            .reference_genome
            .or(base.as_ref().map(|b| b.reference_genome))
            .unwrap_or_default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_score(args: ScoreArgs) -> Result<(), Box<dyn Error>> {
    let config = resolve_config(&args)?;
    let store = LocalStore::new(config.bucket.as_deref())?;
    let dataset = load_vcf(&args.genotypes)?;

    let summary = calculate_prs(&dataset, &config, &store)?;

    println!(
        "Scored {} samples using {} of {} weight rows; scores written to {}",
        summary.n_samples,
        summary.n_bound,
        summary.n_weights,
        summary.paths.scores.display()
    );
    if let Some(count) = summary.found_variants {
        println!(
            "{count} found variants written to {}",
            summary.paths.found_variants.display()
        );
    }
    if !summary.warnings.is_empty() || !summary.skipped_intervals.is_empty() {
        println!(
            "{} join warnings, {} skipped intervals",
            summary.warnings.len(),
            summary.skipped_intervals.len()
        );
    }
    Ok(())
}

fn run_intervals(args: IntervalsArgs) -> Result<(), Box<dyn Error>> {
    let weights = WeightTable::load(open_text(&args.weights)?, args.reference_genome)?;
    let intervals = weights.intervals();

    let store = LocalStore::default();
    store.write_atomic(&args.output, &mut |w: &mut dyn Write| {
        write_interval_file(w, &intervals, args.reference_genome)
    })?;
    info!(
        "Wrote {} intervals to '{}'",
        intervals.len(),
        args.output.display()
    );
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("SPARSE_PRS_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("sparse-prs {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        println!("Built: {}", format_duration_ago(now.saturating_sub(build_timestamp)));
    }
}
