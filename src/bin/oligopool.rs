use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use oligopool::config::{read_config_lines, ConfigLine, Registry};
use oligopool::pool::{OligoPool, PoolSettings};
use oligopool::primer3::{Primer3, Primer3Settings};
use oligopool::probe::Orientation;
use oligopool::{output, seqio, FeatureFlags};

/// oligopool CLI
#[derive(Parser)]
#[command(name = "oligopool")]
#[command(version)]
#[command(about = "Design tiled oligo probe pools with shared amplification primers", long_about = None)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Design the oligo pool for a FASTA of transcripts
    Design(DesignArgs),

    /// List available probe layouts and filters with their config line grammar
    Features,

    /// Check a config file and print the canonical description of each feature
    Validate {
        /// Config file (one feature per line)
        config: PathBuf,
    },
}

#[derive(Args)]
struct DesignArgs {
    /// Transcript FASTA (optionally gzipped)
    fasta: PathBuf,
    /// Output prefix; writes <prefix>_oligos.tsv, _primers.tsv, _rejected_probes.tsv, _summary.json
    #[arg(short, long)]
    out: PathBuf,
    /// Config file selecting layout and filters; replaces the feature flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Probe length
    #[arg(long, default_value_t = 120)]
    probe_size: usize,
    /// Probe step size
    #[arg(long, default_value_t = 15)]
    step_size: usize,
    /// Offset of the first probe
    #[arg(long, default_value_t = 0)]
    first_position: usize,
    /// Probe orientation (sense|antisense)
    #[arg(long, default_value = "antisense")]
    orientation: String,
    /// Apply the probe low complexity filter
    #[arg(long)]
    low_complexity: bool,
    /// Apply the probe poly base filter
    #[arg(long)]
    poly_base: bool,
    /// Bases for the poly base filters
    #[arg(long, default_value = "ACGT")]
    poly_base_bases: String,
    /// Poly base window length
    #[arg(long, default_value_t = 15)]
    poly_base_window: usize,
    /// Max occurrences of one base per poly base window
    #[arg(long, default_value_t = 12)]
    poly_base_max_count: usize,
    /// Apply the probe repeat filter
    #[arg(long)]
    repeat: bool,
    /// Max fraction of repeat-masked bases
    #[arg(long, default_value_t = 0.07)]
    repeat_max_fraction: f64,
    /// Lower case bases count as repeats
    #[arg(long)]
    repeat_lower: bool,
    /// Ns count as repeats
    #[arg(long)]
    repeat_n: bool,
    /// Apply the poly base filter to primers too
    #[arg(long)]
    primer_poly_base: bool,
    /// Reject primer pairs found in more than this many probes of their group
    #[arg(long)]
    primer_probe_match: Option<usize>,

    /// primer3_core executable (default: $OLIGOPOOL_PRIMER3_BIN or primer3_core)
    #[arg(long)]
    primer3: Option<PathBuf>,
    /// primer3 settings file passed as --p3_settings_file
    #[arg(long)]
    p3_settings_file: Option<PathBuf>,
    /// Primer length
    #[arg(long, default_value_t = 20)]
    primer_length: usize,
    /// Optimal primer Tm
    #[arg(long, default_value_t = 60.0)]
    optimal_tm: f64,
    /// Allowed Tm deviation either side of the optimum
    #[arg(long, default_value_t = 3.0)]
    tm_tolerance: f64,
    /// Transcripts sharing one primer pair
    #[arg(long, default_value_t = 1)]
    group_size: usize,
    /// primer3 invocations per group before the group fails
    #[arg(long, default_value_t = 10)]
    max_primer_attempts: usize,
    /// Failed groups tolerated before aborting
    #[arg(long, default_value_t = 0)]
    max_failed_groups: usize,
    /// Random template length handed to primer3
    #[arg(long, default_value_t = 500)]
    template_length: usize,
    /// Primer pairs requested per primer3 call
    #[arg(long, default_value_t = 5)]
    pairs_per_call: usize,
    /// Seed for primer3 templates
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Threads (None = all)
    #[arg(long)]
    threads: Option<usize>,
}

/// Level used when RUST_LOG is unset or unparsable.
fn fallback_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_level(verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Design(args) => cmd_design(args),
        Commands::Features => {
            cmd_features();
            Ok(())
        }
        Commands::Validate { config } => cmd_validate(config),
    }
}

fn feature_lines(args: &DesignArgs) -> Result<Vec<ConfigLine>> {
    if let Some(path) = &args.config {
        return read_config_lines(path);
    }
    let orientation: Orientation = args.orientation.parse().map_err(anyhow::Error::msg)?;
    let flags = FeatureFlags {
        probe_size: args.probe_size,
        step_size: args.step_size,
        first_position: args.first_position,
        orientation,
        low_complexity: args.low_complexity,
        poly_base: args.poly_base,
        poly_base_bases: args.poly_base_bases.clone(),
        poly_base_window: args.poly_base_window,
        poly_base_max_count: args.poly_base_max_count,
        repeat: args.repeat,
        repeat_max_fraction: args.repeat_max_fraction,
        repeat_lower_case: args.repeat_lower,
        repeat_n: args.repeat_n,
        primer_poly_base: args.primer_poly_base,
        primer_probe_match: args.primer_probe_match,
    };
    Ok(flags.config_lines())
}

fn cmd_design(args: DesignArgs) -> Result<()> {
    let features = Registry::builtin().load(&feature_lines(&args)?)?;
    let settings = PoolSettings {
        primer_length: args.primer_length,
        optimal_tm: args.optimal_tm,
        group_size: args.group_size,
        max_primer_attempts: args.max_primer_attempts,
        max_failed_groups: args.max_failed_groups,
        threads: args.threads,
    };

    let mut p3_settings = Primer3Settings {
        template_length: args.template_length,
        tm_tolerance: args.tm_tolerance,
        pairs_per_call: args.pairs_per_call,
        seed: args.seed,
        ..Primer3Settings::default()
    };
    if let Some(exe) = args.primer3.clone() {
        p3_settings.executable = exe;
    }
    if let Some(file) = &args.p3_settings_file {
        p3_settings.args.push(format!("--p3_settings_file={}", file.display()));
    }

    p3_settings.check_primer_length(settings.primer_length)?;
    let mut designer = Primer3::new(p3_settings)?;

    let mut pool = OligoPool::new(features, settings)?;
    info!(features = ?pool.features(), "configured");

    let transcripts = seqio::read_transcripts(&args.fasta)?;
    let design = pool
        .create_oligos(&transcripts, &mut designer)
        .with_context(|| format!("designing pool for {}", args.fasta.display()))?;

    let paths = output::write_design(&design, &args.out)?;
    info!(oligos = design.entries.len(), path = %paths.oligos.display(), "wrote oligo table");
    Ok(())
}

fn cmd_features() {
    println!("category\tname\tgrammar");
    for (cat, name, grammar) in oligopool::list_feature_rows() {
        println!("{}\t{}\t{}", cat, name, grammar.replace('\t', " "));
    }
}

fn cmd_validate(config: PathBuf) -> Result<()> {
    let lines = read_config_lines(&config)?;
    let features = Registry::builtin()
        .load(&lines)
        .with_context(|| format!("validating {}", config.display()))?;
    for d in features.descriptions() {
        println!("{}", d);
    }
    Ok(())
}
