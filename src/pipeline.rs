//! Orchestrates the four stages: aggregate, partition, evaluate, select.
//!
//! Each stage is a pure function of its input and runs its workers on rayon's
//! pool. A stage's output is fully collected before the next stage starts, so a
//! failed worker can always be re-run over the same input.

use std::time::Instant;

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::{LocalCounts, aggregate_parallel};
use crate::chi2::{ChiScore, evaluate};
use crate::document::Document;
use crate::error::{PipelineError, Result};
use crate::partition::{Partition, route, shuffle};
use crate::topk::{DEFAULT_TOP_K, Selection, TieBreak, merge_partials, select_partial};

/// Default partition count P; suits vocabularies in the tens of thousands of terms.
pub const DEFAULT_PARTITIONS: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// P, number of term partitions.
    pub partitions: usize,
    /// K, terms kept per category.
    pub top_k: usize,
    /// Stage-1 workers, each aggregating a disjoint chunk of the corpus.
    pub workers: usize,
    pub tie_break: TieBreak,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            partitions: DEFAULT_PARTITIONS,
            top_k: DEFAULT_TOP_K,
            workers: rayon::current_num_threads(),
            tie_break: TieBreak::default(),
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(PipelineError::InvalidOptions(
                "partition count must be at least 1".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(PipelineError::InvalidOptions("top-k must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(PipelineError::InvalidOptions(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Counters describing one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Documents handed to the pipeline.
    pub documents: usize,
    /// Documents that contributed to the counts (N).
    pub aggregated: u64,
    /// Documents skipped for a missing category or empty term set.
    pub malformed: u64,
    pub partitions: usize,
    pub unique_terms: usize,
    pub categories: usize,
    pub scored_pairs: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub selection: Selection,
    pub stats: RunStats,
}

/// Stage 1.
pub fn aggregate_stage(docs: &[Document], workers: usize) -> Vec<LocalCounts> {
    aggregate_parallel(docs, workers)
}

/// Stage 2: every worker routes its partial counts, then shards are shuffled together.
pub fn partition_stage(partials: Vec<LocalCounts>, partitions: usize) -> Result<Vec<Partition>> {
    let routed: Vec<Vec<Partition>> = partials
        .into_par_iter()
        .map(|counts| route(counts, partitions))
        .collect::<Result<_>>()?;
    shuffle(routed, partitions)
}

/// Stage 3: one evaluator per partition, no communication between them.
pub fn evaluate_stage(partitions: &[Partition]) -> Vec<Vec<ChiScore>> {
    partitions.par_iter().map(evaluate).collect()
}

/// Stage 4: partial top-K per partition, then one merge across all partitions.
pub fn select_stage(scores: Vec<Vec<ChiScore>>, top_k: usize, tie_break: TieBreak) -> Selection {
    let partials: Vec<_> = scores
        .into_par_iter()
        .map(|s| select_partial(s, top_k, tie_break))
        .collect();
    Selection::from_lists(merge_partials(partials, top_k, tie_break))
}

/// Run the whole pipeline over an in-memory corpus.
pub fn run_pipeline(docs: &[Document], options: &PipelineOptions) -> Result<PipelineReport> {
    options.validate()?;
    let started = Instant::now();

    let t = Instant::now();
    let partials = aggregate_stage(docs, options.workers);
    let aggregated: u64 = partials.iter().map(|c| c.total_docs).sum();
    let malformed: u64 = partials.iter().map(|c| c.malformed).sum();
    info!(
        "aggregate: {} documents ({} malformed) over {} workers in {:?}",
        docs.len(),
        malformed,
        partials.len(),
        t.elapsed()
    );

    let t = Instant::now();
    let partitions = partition_stage(partials, options.partitions)?;
    let unique_terms = partitions.iter().map(|p| p.terms.len()).sum();
    let categories = partitions
        .first()
        .map(|p| p.broadcast.categories.len())
        .unwrap_or(0);
    info!(
        "partition: {} terms, {} categories into {} partitions in {:?}",
        unique_terms,
        categories,
        partitions.len(),
        t.elapsed()
    );

    let t = Instant::now();
    let scores = evaluate_stage(&partitions);
    let scored_pairs = scores.iter().map(Vec::len).sum();
    info!("evaluate: {} pairs in {:?}", scored_pairs, t.elapsed());

    let t = Instant::now();
    let selection = select_stage(scores, options.top_k, options.tie_break);
    info!(
        "select: top {} for {} categories, {} distinct terms in {:?}",
        options.top_k,
        selection.categories.len(),
        selection.vocabulary.len(),
        t.elapsed()
    );
    info!("pipeline finished in {:?}", started.elapsed());

    Ok(PipelineReport {
        selection,
        stats: RunStats {
            documents: docs.len(),
            aggregated,
            malformed,
            partitions: options.partitions,
            unique_terms,
            categories,
            scored_pairs,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(partitions: usize, top_k: usize) -> PipelineOptions {
        PipelineOptions {
            partitions,
            top_k,
            workers: 3,
            tie_break: TieBreak::TermAscending,
        }
    }

    fn corpus() -> Vec<Document> {
        let vocab: Vec<String> = (0..60).map(|i| format!("term{i:02}")).collect();
        (0..200)
            .map(|i| {
                let category = ["books", "games", "music", "tools"][i % 4];
                let terms: Vec<&str> = vocab
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| (i * 7 + j * 3) % 5 == 0 || (j % 4 == i % 4 && i % 3 != 0))
                    .map(|(_, t)| t.as_str())
                    .collect();
                Document::new(category, terms)
            })
            .collect()
    }

    #[test]
    fn worked_example_end_to_end() {
        let docs = vec![
            Document::new("A", ["x", "y"]),
            Document::new("A", ["x"]),
            Document::new("B", ["y"]),
        ];
        let report = run_pipeline(&docs, &opts(1, 75)).unwrap();
        assert_eq!(report.selection.ranking("A"), vec![("x", 3.0), ("y", 0.75)]);
        assert_eq!(report.selection.ranking("B"), vec![("y", 0.75)]);
        assert_eq!(report.selection.vocabulary, vec!["x", "y"]);
        assert_eq!(report.stats.aggregated, 3);
        assert_eq!(report.stats.categories, 2);
        assert_eq!(report.stats.unique_terms, 2);
        assert_eq!(report.stats.scored_pairs, 3);
    }

    #[test]
    fn partition_count_does_not_change_result() {
        let docs = corpus();
        let one = run_pipeline(&docs, &opts(1, 10)).unwrap().selection;
        for p in [5, 25] {
            assert_eq!(run_pipeline(&docs, &opts(p, 10)).unwrap().selection, one);
        }
        let mut single_worker = opts(5, 10);
        single_worker.workers = 1;
        assert_eq!(run_pipeline(&docs, &single_worker).unwrap().selection, one);
    }

    #[test]
    fn reruns_are_identical() {
        let docs = corpus();
        let a = run_pipeline(&docs, &opts(5, 75)).unwrap();
        let b = run_pipeline(&docs, &opts(5, 75)).unwrap();
        assert_eq!(a.selection, b.selection);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn lists_are_bounded_and_descending() {
        let report = run_pipeline(&corpus(), &opts(5, 8)).unwrap();
        assert_eq!(report.selection.categories.len(), 4);
        for list in report.selection.categories.values() {
            assert!(list.len() <= 8);
            assert!(list.windows(2).all(|w| w[0].score() >= w[1].score()));
        }
        let mut vocab = report.selection.vocabulary.clone();
        vocab.sort();
        vocab.dedup();
        assert_eq!(vocab, report.selection.vocabulary);
    }

    #[test]
    fn malformed_documents_are_reported() {
        let mut docs = corpus();
        docs.push(Document::new("", ["term01"]));
        docs.push(Document::new("books", Vec::<String>::new()));
        let report = run_pipeline(&docs, &opts(5, 75)).unwrap();
        assert_eq!(report.stats.malformed, 2);
        assert_eq!(report.stats.documents, 202);
        assert_eq!(report.stats.aggregated, 200);
        let clean = run_pipeline(&corpus(), &opts(5, 75)).unwrap();
        assert_eq!(report.selection, clean.selection);
    }

    #[test]
    fn category_totals_sum_to_n() {
        let docs = corpus();
        let partitions = partition_stage(aggregate_stage(&docs, 4), 5).unwrap();
        for p in &partitions {
            let sum: u64 = p.broadcast.categories.values().sum();
            assert_eq!(sum, p.broadcast.total_docs);
        }
    }

    #[test]
    fn empty_corpus_yields_empty_selection() {
        let report = run_pipeline(&[], &opts(5, 75)).unwrap();
        assert!(report.selection.categories.is_empty());
        assert!(report.selection.vocabulary.is_empty());
        assert_eq!(report.stats.aggregated, 0);
    }

    #[test]
    fn rejects_zero_options() {
        let docs = corpus();
        for bad in [opts(0, 75), opts(5, 0)] {
            assert!(matches!(
                run_pipeline(&docs, &bad),
                Err(PipelineError::InvalidOptions(_))
            ));
        }
        let mut no_workers = opts(5, 75);
        no_workers.workers = 0;
        assert!(no_workers.validate().is_err());
    }
}
