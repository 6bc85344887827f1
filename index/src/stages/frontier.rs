//! Stage C: frontier directory selection.

use crate::properties::TimestampArray;
use crate::walk::{walk_nodes, VisitFlow};
use provenance_graph::GraphApi;
use provenance_model::counters::BuildCounters;
use provenance_model::{NodeId, NodeType};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Scans every dated revision's tree roots-down; the first directory whose
/// max-leaf timestamp is strictly older than the revision's committer date
/// becomes a frontier cut for that walk and the walk does not descend into
/// it. The returned set is the union of cuts over all revisions, sorted.
/// Directories with an unknown max-leaf never satisfy the predicate.
pub fn compute_directory_frontier(
    graph: &dyn GraphApi,
    max_leaf: &TimestampArray,
    pool: &rayon::ThreadPool,
    counters: &BuildCounters,
) -> Vec<NodeId> {
    let num_nodes = graph.num_nodes() as usize;
    let chosen: Vec<AtomicBool> = std::iter::repeat_with(|| AtomicBool::new(false)).take(num_nodes).collect();

    let revisions = graph.nodes_of_type(NodeType::Revision);
    pool.install(|| {
        revisions.par_iter().for_each(|&revision| {
            let Some(date) = graph.committer_date(revision) else {
                return;
            };
            let Some(root) = graph.root_directory(revision) else {
                return;
            };
            walk_nodes(
                graph,
                root,
                |dir| match max_leaf.get(dir) {
                    Some(leaf) if leaf < date => {
                        chosen[dir as usize].store(true, Ordering::Relaxed);
                        VisitFlow::Prune
                    }
                    _ => VisitFlow::Descend,
                },
                |_| {},
            );
        })
    });

    let frontier: Vec<NodeId> =
        chosen.iter().enumerate().filter(|(_, flag)| flag.load(Ordering::Relaxed)).map(|(node, _)| node as NodeId).collect();
    counters.frontier_directories.store(frontier.len() as u64, Ordering::Relaxed);
    frontier
}
