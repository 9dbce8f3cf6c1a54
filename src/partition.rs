//! Stage 2: route term-keyed counts to partitions, broadcast the global ones.
//!
//! Term counts and (term, category) counts go to `xxh64(term) mod P`, so every
//! category of a term lands in the same partition. N and the category totals are
//! small and copied to all P partitions. Traffic is O(unique terms) plus
//! O(P * categories), never O(terms * categories).

use std::collections::HashMap;

use log::debug;
use xxhash_rust::xxh64::xxh64;

use crate::aggregate::LocalCounts;
use crate::error::{PipelineError, Result};

const ROUTING_SEED: u64 = 0;

/// Partition owning `term` among `partitions` partitions.
///
/// Stable across runs, platforms and compiler versions. `partitions` must be
/// non-zero; [`route`] checks it before calling.
pub fn partition_of(term: &str, partitions: usize) -> usize {
    debug_assert!(partitions > 0);
    (xxh64(term.as_bytes(), ROUTING_SEED) % partitions as u64) as usize
}

/// Global aggregates replicated to every partition. Read-only to the evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Broadcast {
    pub total_docs: u64,
    pub categories: HashMap<String, u64>,
}

impl Broadcast {
    fn merge(&mut self, other: Broadcast) {
        self.total_docs += other.total_docs;
        for (category, count) in other.categories {
            *self.categories.entry(category).or_insert(0) += count;
        }
    }
}

/// Everything one evaluator worker needs: complete broadcast totals plus the
/// complete counts of the terms hashed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub broadcast: Broadcast,
    pub terms: HashMap<String, u64>,
    pub term_categories: HashMap<(String, String), u64>,
}

impl Partition {
    fn empty(index: usize) -> Self {
        Partition {
            index,
            ..Default::default()
        }
    }

    /// Sum another shard of the same partition into this one.
    pub fn merge(&mut self, other: Partition) {
        debug_assert_eq!(self.index, other.index);
        self.broadcast.merge(other.broadcast);
        for (term, count) in other.terms {
            *self.terms.entry(term).or_insert(0) += count;
        }
        for (pair, count) in other.term_categories {
            *self.term_categories.entry(pair).or_insert(0) += count;
        }
    }
}

/// Split one worker's partial counts into `partitions` shards.
pub fn route(counts: LocalCounts, partitions: usize) -> Result<Vec<Partition>> {
    if partitions == 0 {
        return Err(PipelineError::InvalidOptions(
            "partition count must be at least 1".into(),
        ));
    }
    let broadcast = Broadcast {
        total_docs: counts.total_docs,
        categories: counts.categories,
    };
    let mut shards: Vec<Partition> = (0..partitions)
        .map(|index| Partition {
            index,
            broadcast: broadcast.clone(),
            ..Default::default()
        })
        .collect();

    for (term, count) in counts.terms {
        let p = partition_of(&term, partitions);
        shards[p].terms.insert(term, count);
    }
    for ((term, category), count) in counts.term_categories {
        let p = partition_of(&term, partitions);
        shards[p].term_categories.insert((term, category), count);
    }
    Ok(shards)
}

/// Gather shards by index across all workers and sum them.
///
/// Every worker must have routed to the same partition count, one shard per index.
pub fn shuffle(worker_shards: Vec<Vec<Partition>>, partitions: usize) -> Result<Vec<Partition>> {
    let mut merged: Vec<Partition> = (0..partitions).map(Partition::empty).collect();
    for shards in worker_shards {
        if shards.len() != partitions {
            return Err(PipelineError::PartitionLayout {
                expected: partitions,
                found: shards.len(),
            });
        }
        let mut seen = vec![false; partitions];
        for shard in &shards {
            match seen.get_mut(shard.index) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(PipelineError::ShardIndex {
                        index: shard.index,
                        partitions,
                    });
                }
            }
        }
        for shard in shards {
            let index = shard.index;
            merged[index].merge(shard);
        }
    }
    for p in &merged {
        debug!(
            "partition {}: {} terms, {} term/category pairs",
            p.index,
            p.terms.len(),
            p.term_categories.len()
        );
    }
    Ok(merged)
}
