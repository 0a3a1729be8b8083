//! CLI for whisperline.
//!
//! Walks a Whisper directory, resolves every series against a JSON rule
//! file, and writes one line protocol file per retention bucket.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use whisperline::config::{load_rules, parse_retention_names};
use whisperline::whisper::WhisperOpener;
use whisperline::{
    BucketConfig, BucketRegistry, ExportOptions, Exporter, MatchState, Plan, RuleSet,
    SeriesDescriptor,
};

/// whisperline — Export Whisper archives to line protocol, one file per retention.
#[derive(Parser)]
#[command(name = "whisperline", version, about)]
struct Cli {
    /// Whisper files folder path.
    #[arg(long)]
    wsp_path: PathBuf,

    /// Target directory where line protocol files will be created.
    #[arg(long)]
    export_path: PathBuf,

    /// JSON rule file mapping paths to measurement, tags and field.
    #[arg(long)]
    config_file: PathBuf,

    /// Only export points at or after this timestamp (seconds).
    #[arg(long, default_value_t = 0)]
    from: u32,

    /// Only export points at or before this timestamp (seconds).
    #[arg(long, default_value_t = u32::MAX)]
    until: u32,

    /// Export points whose value is zero. They are skipped by default.
    #[arg(long)]
    zeros: bool,

    /// Gzip the bucket files.
    #[arg(long)]
    gz: bool,

    /// Database name written in each bucket header.
    #[arg(long, default_value = whisperline::config::DEFAULT_DATABASE)]
    database: String,

    /// Comma-separated retention names, assigned to sampling intervals in
    /// the order they are first seen.
    #[arg(long, default_value = "")]
    retentions: String,

    /// Write stored values as-is instead of multiplying by the sampling interval.
    #[arg(long)]
    raw_values: bool,

    /// Print the resolved series and exit without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Do not ask for confirmation before exporting.
    #[arg(short, long)]
    yes: bool,

    /// Log every series and every unmatched path.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        tracing::error!("export failed: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let rules = RuleSet::compile(load_rules(&cli.config_file)?)?;

    let options = ExportOptions {
        from: cli.from,
        until: cli.until,
        export_zeros: cli.zeros,
        scale_by_interval: !cli.raw_values,
    };
    options.validate()?;

    println!("Checking files to export...");
    let mut plan = Plan::build(&cli.wsp_path, &rules);

    for series in &plan.unmatched {
        if cli.verbose {
            println!(
                "File didn't match any config patterns: {}",
                series.source_path().display()
            );
        }
    }

    if cli.dry_run {
        print_plan(&plan);
        return Ok(());
    }

    println!("----------------");
    println!(
        "Exporting {} series to {}",
        plan.matched.len(),
        cli.export_path.display()
    );
    if !cli.yes && !confirm("Proceed ?")? {
        return Err("export cancelled".into());
    }
    println!("----------------");

    let buckets = BucketConfig {
        export_dir: cli.export_path.clone(),
        database: cli.database.clone(),
        compress: cli.gz,
        retention_names: parse_retention_names(&cli.retentions),
    };
    let exporter = Exporter::new(WhisperOpener, BucketRegistry::new(buckets), options);

    let verbose = cli.verbose;
    let summary = exporter.run(&mut plan.matched, |position, series| {
        report_progress(verbose, position, series);
    })?;
    if !verbose {
        eprintln!();
    }

    println!(
        "Exported {} series ({} failed, {} unmatched), {} points",
        summary.exported,
        summary.failed,
        plan.unmatched.len(),
        summary.points_written
    );
    if summary.failed_archives > 0 {
        println!("Skipped {} unreadable sub-archives", summary.failed_archives);
    }
    for bucket in &summary.buckets {
        println!(
            "  {} (interval={}s, retention={}, lines={})",
            bucket.path.display(),
            bucket.key,
            bucket.name,
            bucket.lines
        );
    }

    Ok(())
}

/// Prints each matched series with the metadata its lines will carry.
fn print_plan(plan: &Plan) {
    println!("{} matched, {} unmatched", plan.matched.len(), plan.unmatched.len());
    for series in &plan.matched {
        println!(
            "  {} -> {}{} {}=<value>",
            series.normalized_path(),
            series.measurement(),
            series.tags(),
            series.field()
        );
    }
}

fn report_progress(verbose: bool, position: usize, series: &SeriesDescriptor) {
    if verbose {
        match series.state() {
            MatchState::ExportFailed => {
                eprintln!("Failed: {}", series.source_path().display());
            }
            _ => eprintln!("Exported: {}", series.source_path().display()),
        }
    } else {
        eprint!("\rExported: {:>2} series", position + 1);
        let _ = std::io::stderr().flush();
    }
}

/// Asks a yes/no question on stdin until it gets an answer.
///
/// End of input counts as "no".
fn confirm(question: &str) -> std::io::Result<bool> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    loop {
        print!("{question} [y/n]: ");
        std::io::stdout().flush()?;

        let mut response = String::new();
        if input.read_line(&mut response)? == 0 {
            return Ok(false);
        }
        match response.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
    }
}
