#![forbid(unsafe_code)]
//! # chi_select CLI
//!
//! Command-line front end for the `chi_select` crate. Reads preprocessed
//! documents (JSON Lines, one `{"category": ..., "tokens": [...]}` object per
//! line) from a file or a directory and prints the top chi-squared terms per
//! category.
//!
//! ## Example
//! ```bash
//! cargo run --release -- data/reviews.jsonl --partitions 25 --top-k 75 --export-format csv
//! ```
//!
//! See `--help` for all available options.

use clap::Parser;
use log::{error, info, warn};
use std::path::Path;
use std::process;

use chi_select::{
    DEFAULT_PARTITIONS, DEFAULT_PRECISION, DEFAULT_TOP_K, ExportFormat, PipelineOptions,
    TieBreak, load_corpus, print_failed_files, render, run_pipeline, save_report,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON Lines file or directory of .json/.jsonl files
    path: String,

    /// Number of term partitions (P)
    #[arg(long, default_value_t = DEFAULT_PARTITIONS)]
    partitions: usize,

    /// Terms kept per category (K)
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Aggregation workers (default: number of CPU threads)
    #[arg(long)]
    workers: Option<usize>,

    /// Order of terms with equal scores
    #[arg(long, value_enum, default_value_t = TieBreak::TermAscending)]
    tie_break: TieBreak,

    /// Output format (txt, csv, tsv, json)
    #[arg(long, value_enum, default_value_t = ExportFormat::Txt)]
    export_format: ExportFormat,

    /// Decimal places for scores
    #[arg(long, default_value_t = DEFAULT_PRECISION)]
    precision: usize,

    /// Write the result to a timestamped file in this directory instead of stdout
    #[arg(long)]
    output_dir: Option<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let options = PipelineOptions {
        partitions: cli.partitions,
        top_k: cli.top_k,
        workers: cli.workers.unwrap_or_else(rayon::current_num_threads),
        tie_break: cli.tie_break,
    };
    if let Err(e) = options.validate() {
        error!("Error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }

    let corpus = match load_corpus(Path::new(&cli.path)) {
        Ok(corpus) => corpus,
        Err(e) => {
            error!("Error: {}", e);
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    if corpus.malformed_lines > 0 {
        warn!("{} input lines were not valid documents", corpus.malformed_lines);
    }

    let report = match run_pipeline(&corpus.documents, &options) {
        Ok(report) => report,
        Err(e) => {
            error!("Error: {}", e);
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    info!(
        "{} documents aggregated, {} malformed skipped",
        report.stats.aggregated, report.stats.malformed
    );

    let written = match &cli.output_dir {
        Some(dir) => save_report(&report, Path::new(dir), cli.export_format, cli.precision)
            .map(|path| eprintln!("Results saved to: {}", path.display())),
        None => render(&report, cli.export_format, cli.precision).map(|out| print!("{out}")),
    };
    if let Err(e) = written {
        error!("Error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }

    if !corpus.failed_files.is_empty() {
        print_failed_files(&corpus.failed_files);
        process::exit(1);
    }
}
