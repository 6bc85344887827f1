//! Stage B: per-directory maximum of contained content timestamps.

use crate::errors::{IndexError, IndexResult};
use crate::properties::{TimestampArray, MAX_LEAF_UNKNOWN};
use provenance_graph::GraphApi;
use provenance_model::counters::BuildCounters;
use provenance_model::{NodeId, NodeType};
use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, Ordering};

/// Computes `max_leaf(d) = max earliest(c)` over the contents of d's subtree,
/// processing directories in reverse topological order (children before
/// parents). Directories whose subtree holds no dated content keep the
/// unknown sentinel. Waves of ready directories run in parallel.
pub fn compute_directory_max_timestamps(
    graph: &dyn GraphApi,
    earliest: &TimestampArray,
    pool: &rayon::ThreadPool,
    counters: &BuildCounters,
) -> IndexResult<TimestampArray> {
    let num_nodes = graph.num_nodes() as usize;
    let directories = graph.nodes_of_type(NodeType::Directory);

    // pending child-directory edge counts and reverse edges
    let mut pending = vec![0u32; num_nodes];
    let mut parents: Vec<Vec<NodeId>> = vec![Vec::new(); num_nodes];
    for &dir in &directories {
        for entry in graph.directory_entries(dir) {
            if graph.node_type(entry.target) == Some(NodeType::Directory) {
                pending[dir as usize] += 1;
                parents[entry.target as usize].push(dir);
            }
        }
    }

    let max_leaf: Vec<AtomicI64> = std::iter::repeat_with(|| AtomicI64::new(MAX_LEAF_UNKNOWN)).take(num_nodes).collect();

    let mut ready: Vec<NodeId> = directories.iter().copied().filter(|&d| pending[d as usize] == 0).collect();
    let mut processed = 0usize;
    while !ready.is_empty() {
        pool.install(|| {
            ready.par_iter().for_each(|&dir| {
                let mut value = MAX_LEAF_UNKNOWN;
                for entry in graph.directory_entries(dir) {
                    match graph.node_type(entry.target) {
                        Some(NodeType::Content) => {
                            if let Some(t) = earliest.get(entry.target) {
                                value = value.max(t);
                            }
                        }
                        Some(NodeType::Directory) => {
                            let child = max_leaf[entry.target as usize].load(Ordering::Relaxed);
                            if child != MAX_LEAF_UNKNOWN {
                                value = value.max(child);
                            }
                        }
                        _ => {}
                    }
                }
                max_leaf[dir as usize].store(value, Ordering::Relaxed);
                counters.directories_processed.fetch_add(1, Ordering::Relaxed);
            })
        });
        processed += ready.len();

        let mut next = Vec::new();
        for &dir in &ready {
            for &parent in &parents[dir as usize] {
                pending[parent as usize] -= 1;
                if pending[parent as usize] == 0 {
                    next.push(parent);
                }
            }
        }
        ready = next;
    }

    if processed != directories.len() {
        return Err(IndexError::InvariantViolation(format!(
            "directory graph is cyclic: processed {processed} of {} directories",
            directories.len()
        )));
    }
    Ok(TimestampArray::from_atomic(max_leaf))
}
