#![forbid(unsafe_code)]
//! # chi_select
//!
//! Chi-squared term selection over category-labeled documents. For every
//! (term, category) pair the crate scores how strongly the term's presence is
//! associated with the category and keeps the top K terms (75 by default) of
//! each category.
//!
//! The computation is a staged, data-parallel pipeline:
//!
//! 1. [`aggregate`](mod@aggregate): documents become summed presence counts.
//! 2. [`partition`](mod@partition): term-keyed counts are routed by a hash of the term; N and
//!    the category totals are broadcast to every partition.
//! 3. [`chi2`](mod@chi2): each partition scores its pairs from a 2x2 contingency table.
//! 4. [`topk`](mod@topk): partial top-K lists per partition are merged per category.
//!
//! Each stage finishes completely before the next one starts.
//!
//! ## Example
//! ```
//! use chi_select::{Document, PipelineOptions, run_pipeline};
//!
//! let docs = vec![
//!     Document::new("A", ["x", "y"]),
//!     Document::new("A", ["x"]),
//!     Document::new("B", ["y"]),
//! ];
//! let report = run_pipeline(&docs, &PipelineOptions::default()).unwrap();
//! assert_eq!(report.selection.ranking("A"), vec![("x", 3.0), ("y", 0.75)]);
//! assert_eq!(report.selection.vocabulary, vec!["x", "y"]);
//! ```

pub mod aggregate;
pub mod chi2;
pub mod document;
pub mod error;
pub mod export;
pub mod partition;
pub mod pipeline;
pub mod topk;

pub use aggregate::{CountKey, LocalCounts, aggregate, emit};
pub use chi2::{ChiScore, ContingencyTable, chi_squared, evaluate};
pub use document::{Document, LoadReport, Malformed, collect_files, load_corpus, read_documents};
pub use error::{PipelineError, Result};
pub use export::{DEFAULT_PRECISION, ExportFormat, csv_safe_cell, render, save_report};
pub use partition::{Broadcast, Partition, partition_of, route, shuffle};
pub use pipeline::{DEFAULT_PARTITIONS, PipelineOptions, PipelineReport, RunStats, run_pipeline};
pub use topk::{DEFAULT_TOP_K, RankedTerm, Selection, TieBreak, TopK};

/// Print files that could not be read, one per line, to stderr.
pub fn print_failed_files(failed: &[(String, String)]) {
    eprintln!("\nSome files could not be read:");
    for (file, reason) in failed {
        eprintln!("  {file}: {reason}");
    }
}
