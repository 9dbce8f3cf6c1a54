//! Stage 4: bounded best-of-K lists per category.
//!
//! Partitioning is by term, so one category's terms are spread over every
//! partition. Each partition produces partial lists, then all partial lists of a
//! category are merged and truncated once more to give the final ranking.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use clap::ValueEnum;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

use crate::chi2::ChiScore;

pub const DEFAULT_TOP_K: usize = 75;

/// How equal scores are ordered. Either way the ranking is a total order, so the
/// output does not depend on worker scheduling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Lexicographically smaller term ranks first.
    #[default]
    TermAscending,
    /// Lexicographically larger term ranks first.
    TermDescending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedTerm {
    pub term: String,
    score: NotNan<f64>,
}

impl RankedTerm {
    pub fn score(&self) -> f64 {
        self.score.into_inner()
    }
}

/// `Less` when `a` ranks ahead of `b`.
fn rank(tie_break: TieBreak, a: &RankedTerm, b: &RankedTerm) -> Ordering {
    b.score.cmp(&a.score).then_with(|| match tie_break {
        TieBreak::TermAscending => a.term.cmp(&b.term),
        TieBreak::TermDescending => b.term.cmp(&a.term),
    })
}

/// Up to `k` terms, best first.
///
/// A term is expected at most once per list: every (term, category) pair is
/// scored in exactly one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopK {
    k: usize,
    tie_break: TieBreak,
    entries: Vec<RankedTerm>,
}

impl TopK {
    pub fn new(k: usize, tie_break: TieBreak) -> Self {
        TopK {
            k,
            tie_break,
            entries: Vec::with_capacity(k.min(DEFAULT_TOP_K)),
        }
    }

    /// Insert-and-possibly-evict.
    ///
    /// Below capacity the term always goes in. At capacity it goes in only if it
    /// ranks strictly ahead of the current minimum, which is then evicted; without
    /// ties that is "score strictly greater than the minimum score". NaN never ranks.
    pub fn insert(mut self, term: impl Into<String>, score: f64) -> Self {
        let Ok(score) = NotNan::new(score) else {
            return self;
        };
        if self.k == 0 {
            return self;
        }
        let candidate = RankedTerm {
            term: term.into(),
            score,
        };
        if self.entries.len() >= self.k {
            let beats_min = self
                .entries
                .last()
                .is_some_and(|min| rank(self.tie_break, &candidate, min) == Ordering::Less);
            if !beats_min {
                return self;
            }
            self.entries.pop();
        }
        let tie_break = self.tie_break;
        let at = self
            .entries
            .partition_point(|e| rank(tie_break, e, &candidate) == Ordering::Less);
        self.entries.insert(at, candidate);
        self
    }

    /// Re-apply the bounded insert to every entry of `other`.
    pub fn merge(self, other: TopK) -> Self {
        other
            .entries
            .into_iter()
            .fold(self, |acc, e| acc.insert(e.term, e.score.into_inner()))
    }

    /// Lowest-ranked entry held.
    pub fn min(&self) -> Option<&RankedTerm> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankedTerm> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<RankedTerm> {
        self.entries
    }
}

/// Per-category partial lists for the scores of one partition.
pub fn select_partial(
    scores: Vec<ChiScore>,
    k: usize,
    tie_break: TieBreak,
) -> BTreeMap<String, TopK> {
    let mut lists: BTreeMap<String, TopK> = BTreeMap::new();
    for s in scores {
        let list = lists
            .remove(&s.category)
            .unwrap_or_else(|| TopK::new(k, tie_break));
        lists.insert(s.category, list.insert(s.term, s.score));
    }
    lists
}

/// Merge partial lists from all partitions into one list per category.
pub fn merge_partials(
    partials: Vec<BTreeMap<String, TopK>>,
    k: usize,
    tie_break: TieBreak,
) -> BTreeMap<String, TopK> {
    let mut merged: BTreeMap<String, TopK> = BTreeMap::new();
    for partial in partials {
        for (category, list) in partial {
            let acc = merged
                .remove(&category)
                .unwrap_or_else(|| TopK::new(k, tie_break));
            merged.insert(category, acc.merge(list));
        }
    }
    merged
}

/// Final result: ranked terms per category and the sorted union of all of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub categories: BTreeMap<String, Vec<RankedTerm>>,
    pub vocabulary: Vec<String>,
}

impl Selection {
    pub fn from_lists(lists: BTreeMap<String, TopK>) -> Self {
        let categories: BTreeMap<String, Vec<RankedTerm>> = lists
            .into_iter()
            .map(|(category, list)| (category, list.into_vec()))
            .collect();
        let vocabulary: BTreeSet<&str> = categories
            .values()
            .flatten()
            .map(|e| e.term.as_str())
            .collect();
        let vocabulary = vocabulary.into_iter().map(String::from).collect();
        Selection {
            categories,
            vocabulary,
        }
    }

    /// Terms and scores of one category, best first.
    pub fn ranking(&self, category: &str) -> Vec<(&str, f64)> {
        self.categories
            .get(category)
            .map(|list| list.iter().map(|e| (e.term.as_str(), e.score())).collect())
            .unwrap_or_default()
    }
}
