//! Stage 1: turn documents into summed presence counts.
//!
//! Every document contributes a count of 1 to four kinds of keys. Counts are only
//! ever combined by integer addition, so partial sums over any grouping of the
//! corpus merge into the same totals as a single pass.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::document::{Document, Malformed};

/// Key of one emitted count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CountKey {
    TotalDocs,
    CategoryCount(String),
    TermGlobal(String),
    TermInCategory { term: String, category: String },
}

/// The records a single document contributes, each with count 1.
pub fn emit(doc: &Document) -> Result<Vec<(CountKey, u64)>, Malformed> {
    if let Some(defect) = doc.defect() {
        return Err(defect);
    }

    let mut records = Vec::with_capacity(2 + 2 * doc.terms.len());
    records.push((CountKey::TotalDocs, 1));
    records.push((CountKey::CategoryCount(doc.category.clone()), 1));
    for term in &doc.terms {
        records.push((CountKey::TermGlobal(term.clone()), 1));
        records.push((
            CountKey::TermInCategory {
                term: term.clone(),
                category: doc.category.clone(),
            },
            1,
        ));
    }
    Ok(records)
}

/// Pre-summed counts for some subset of the corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCounts {
    /// N, documents aggregated.
    pub total_docs: u64,
    pub categories: HashMap<String, u64>,
    /// Documents containing each term, across all categories.
    pub terms: HashMap<String, u64>,
    /// A: documents of a category containing a term, keyed by (term, category).
    pub term_categories: HashMap<(String, String), u64>,
    /// Documents skipped as malformed. Tallied apart from every aggregate.
    pub malformed: u64,
}

impl LocalCounts {
    /// Sum one record into the counts.
    pub fn add(&mut self, key: CountKey, count: u64) {
        match key {
            CountKey::TotalDocs => self.total_docs += count,
            CountKey::CategoryCount(category) => {
                *self.categories.entry(category).or_insert(0) += count
            }
            CountKey::TermGlobal(term) => *self.terms.entry(term).or_insert(0) += count,
            CountKey::TermInCategory { term, category } => {
                *self.term_categories.entry((term, category)).or_insert(0) += count
            }
        }
    }

    /// Combine two partial results. Associative and commutative.
    pub fn merge(self, other: LocalCounts) -> LocalCounts {
        // fold the smaller side into the larger one
        let (mut into, from) = if self.term_categories.len() >= other.term_categories.len() {
            (self, other)
        } else {
            (other, self)
        };
        into.total_docs += from.total_docs;
        into.malformed += from.malformed;
        for (category, count) in from.categories {
            *into.categories.entry(category).or_insert(0) += count;
        }
        for (term, count) in from.terms {
            *into.terms.entry(term).or_insert(0) += count;
        }
        for (pair, count) in from.term_categories {
            *into.term_categories.entry(pair).or_insert(0) += count;
        }
        into
    }

    /// Sum of all category counts. Never exceeds `total_docs`.
    pub fn category_total(&self) -> u64 {
        self.categories.values().sum()
    }
}

/// Aggregate one worker's share of the corpus.
pub fn aggregate<'a, I>(docs: I) -> LocalCounts
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut counts = LocalCounts::default();
    for doc in docs {
        match emit(doc) {
            Ok(records) => {
                for (key, count) in records {
                    counts.add(key, count);
                }
            }
            Err(_) => counts.malformed += 1,
        }
    }
    counts
}

/// Run `workers` aggregators over disjoint chunks of the corpus.
///
/// The partial results are returned unmerged; each is routed on its own in stage 2.
pub fn aggregate_parallel(docs: &[Document], workers: usize) -> Vec<LocalCounts> {
    if docs.is_empty() {
        return Vec::new();
    }
    let chunk = docs.len().div_ceil(workers.max(1));
    docs.par_chunks(chunk).map(aggregate).collect()
}
