//! Stage 3: per-partition chi-squared scoring.
//!
//! For each (term, category) pair held by a partition the 2x2 contingency table is
//!
//! |              | in category | not in category |
//! |--------------|-------------|-----------------|
//! | has term     | A           | B               |
//! | lacks term   | C           | D               |
//!
//! and the score is `N (AD - BC)^2 / ((A+B)(A+C)(B+D)(C+D))`, or 0 when any
//! marginal is 0. The partition already holds every count it needs, so no data
//! crosses partitions here.

use log::{debug, warn};
use serde::Serialize;

use crate::partition::Partition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContingencyTable {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

impl ContingencyTable {
    /// Derive B, C and D from the marginals. `None` if the counts contradict each other.
    pub fn from_counts(a: u64, term_total: u64, category_total: u64, n: u64) -> Option<Self> {
        let b = term_total.checked_sub(a)?;
        let c = category_total.checked_sub(a)?;
        let d = n.checked_sub(a)?.checked_sub(b)?.checked_sub(c)?;
        Some(ContingencyTable { a, b, c, d })
    }

    pub fn n(&self) -> u64 {
        self.a + self.b + self.c + self.d
    }

    pub fn score(&self) -> f64 {
        chi_squared(self.a, self.b, self.c, self.d)
    }
}

/// Chi-squared statistic of a 2x2 table; 0 when a marginal is empty.
pub fn chi_squared(a: u64, b: u64, c: u64, d: u64) -> f64 {
    let (a, b, c, d) = (a as u128, b as u128, c as u128, d as u128);
    let factors = [a + b, a + c, b + d, c + d];
    if factors.contains(&0) {
        return 0.0;
    }
    let n = a + b + c + d;
    let diff = (a * d).abs_diff(b * c);

    // exact while it fits, which covers any realistic corpus
    let numerator = diff
        .checked_mul(diff)
        .and_then(|sq| sq.checked_mul(n));
    let denominator = factors
        .iter()
        .try_fold(1u128, |acc, f| acc.checked_mul(*f));
    match (numerator, denominator) {
        (Some(num), Some(den)) => num as f64 / den as f64,
        _ => {
            let diff = diff as f64;
            n as f64 * diff * diff / factors.iter().map(|f| *f as f64).product::<f64>()
        }
    }
}

/// One scored (term, category) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChiScore {
    pub category: String,
    pub term: String,
    pub score: f64,
}

/// Score every (term, category) pair of one partition.
pub fn evaluate(partition: &Partition) -> Vec<ChiScore> {
    let n = partition.broadcast.total_docs;
    let mut scores = Vec::with_capacity(partition.term_categories.len());

    for ((term, category), &a) in &partition.term_categories {
        let term_total = partition.terms.get(term).copied().unwrap_or(0);
        let category_total = partition
            .broadcast
            .categories
            .get(category)
            .copied()
            .unwrap_or(0);
        let Some(table) = ContingencyTable::from_counts(a, term_total, category_total, n) else {
            warn!(
                "partition {}: inconsistent counts for ({term}, {category}), skipped",
                partition.index
            );
            continue;
        };
        scores.push(ChiScore {
            category: category.clone(),
            term: term.clone(),
            score: table.score(),
        });
    }
    debug!("partition {}: scored {} pairs", partition.index, scores.len());
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::document::Document;
    use crate::partition::route;

    fn naive(a: u64, b: u64, c: u64, d: u64) -> f64 {
        let (a, b, c, d) = (a as f64, b as f64, c as f64, d as f64);
        let n = a + b + c + d;
        let den = (a + b) * (a + c) * (b + d) * (c + d);
        if den == 0.0 {
            0.0
        } else {
            n * (a * d - b * c).powi(2) / den
        }
    }

    #[test]
    fn formula_over_small_tables() {
        for n in 0..=6u64 {
            for a in 0..=n {
                for b in 0..=n - a {
                    for c in 0..=n - a - b {
                        let d = n - a - b - c;
                        let got = chi_squared(a, b, c, d);
                        let want = naive(a, b, c, d);
                        assert!((got - want).abs() < 1e-9, "{a} {b} {c} {d}: {got} vs {want}");
                        assert!(got >= 0.0 && got.is_finite());
                        if a + b == 0 || a + c == 0 || b + d == 0 || c + d == 0 {
                            assert_eq!(got, 0.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn table_from_counts() {
        let t = ContingencyTable::from_counts(2, 2, 2, 3).unwrap();
        assert_eq!(t, ContingencyTable { a: 2, b: 0, c: 0, d: 1 });
        assert_eq!(t.n(), 3);
        assert!((t.score() - 3.0).abs() < 1e-12);

        assert!(ContingencyTable::from_counts(3, 2, 5, 10).is_none());
        assert!(ContingencyTable::from_counts(1, 4, 4, 5).is_none());
    }

    #[test]
    fn huge_counts_stay_finite() {
        let big = u64::MAX / 8;
        let s = chi_squared(big, 1, 1, big);
        assert!(s.is_finite() && s > 0.0);
    }

    #[test]
    fn worked_example() {
        let docs = vec![
            Document::new("A", ["x", "y"]),
            Document::new("A", ["x"]),
            Document::new("B", ["y"]),
        ];
        let partition = route(aggregate(&docs), 1).unwrap().remove(0);
        let mut scores = evaluate(&partition);
        scores.sort_by(|l, r| (&l.category, &l.term).cmp(&(&r.category, &r.term)));

        let got: Vec<(&str, &str, f64)> = scores
            .iter()
            .map(|s| (s.category.as_str(), s.term.as_str(), s.score))
            .collect();
        assert_eq!(got, vec![("A", "x", 3.0), ("A", "y", 0.75), ("B", "y", 0.75)]);
    }

    #[test]
    fn universal_term_in_single_category_scores_zero() {
        // one category holding every document, one term present everywhere:
        // A = N, B = C = D = 0, so B + D = 0 and C + D = 0
        let docs = vec![Document::new("A", ["x"]), Document::new("A", ["x"])];
        let partition = route(aggregate(&docs), 1).unwrap().remove(0);
        let scores = evaluate(&partition);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 0.0);
    }

    #[test]
    fn term_in_every_document_scores_zero_across_categories() {
        let docs = vec![
            Document::new("A", ["common", "a"]),
            Document::new("B", ["common", "b"]),
            Document::new("C", ["common"]),
        ];
        let partition = route(aggregate(&docs), 1).unwrap().remove(0);
        for s in evaluate(&partition) {
            if s.term == "common" {
                assert_eq!(s.score, 0.0, "{}", s.category);
            } else {
                assert!(s.score > 0.0);
            }
        }
    }
}
