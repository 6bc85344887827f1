//! Stage A: per-content earliest committer date.

use crate::properties::{TimestampArray, EARLIEST_UNSET};
use crate::walk::{walk_nodes, VisitFlow};
use provenance_graph::GraphApi;
use provenance_model::counters::BuildCounters;
use provenance_model::NodeType;
use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, Ordering};

/// Computes `earliest(c) = min committer_date(r)` over all dated revisions r
/// whose tree reaches content c. Revisions without a date are skipped. Slots
/// never reached stay at the unset sentinel.
pub fn compute_earliest_timestamps(graph: &dyn GraphApi, pool: &rayon::ThreadPool, counters: &BuildCounters) -> TimestampArray {
    let num_nodes = graph.num_nodes() as usize;
    let earliest: Vec<AtomicI64> = std::iter::repeat_with(|| AtomicI64::new(EARLIEST_UNSET)).take(num_nodes).collect();

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
                |_| VisitFlow::Descend,
                |content| {
                    earliest[content as usize].fetch_min(date, Ordering::Relaxed);
                },
            );
            counters.revisions_processed.fetch_add(1, Ordering::Relaxed);
        })
    });

    TimestampArray::from_atomic(earliest)
}
