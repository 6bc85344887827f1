//! Shared helpers for the end-to-end tests.

use provenance_database::prelude::LocalTableStore;
use provenance_graph::{DirEntry, DynGraph, GraphSnapshot, MemoryGraph};
use provenance_index::IndexBuilder;
use provenance_model::NodeId;
use provenance_query::{ProvenanceQuery, QueryConfig};
use std::path::Path;
use std::sync::Arc;

/// Runs all four builder stages against the snapshot, leaving the tables
/// under `root`, and returns the loaded graph.
pub fn build_tables(snapshot: GraphSnapshot, root: &Path) -> DynGraph {
    let graph: DynGraph = Arc::new(MemoryGraph::from_snapshot(snapshot).expect("fixture snapshot is valid"));
    let store = Arc::new(LocalTableStore::new(root));
    let builder = IndexBuilder::new(graph.clone(), store, 2).expect("worker pool");
    builder.earliest_timestamps().expect("stage A");
    builder.directory_max_leaf_timestamps().expect("stage B");
    builder.directory_frontier().expect("stage C");
    builder.relations().expect("stage D");
    graph
}

pub fn engine(graph: DynGraph, root: &Path) -> Arc<ProvenanceQuery> {
    let store = LocalTableStore::new(root);
    ProvenanceQuery::new(graph, &store, QueryConfig { lookup_threads: 2, ..Default::default() })
        .expect("table set opens")
}

/// Renumbers a snapshot so node ids follow SWHID wire order, the id
/// assignment scheme the `nodes`-table fallback resolution relies on.
pub fn sort_by_swhid(snapshot: GraphSnapshot) -> GraphSnapshot {
    let mut order: Vec<usize> = (0..snapshot.swhids.len()).collect();
    order.sort_by_key(|&i| snapshot.swhids[i]);
    // order[new] = old; invert into remap[old] = new
    let mut remap = vec![0 as NodeId; snapshot.swhids.len()];
    for (new_id, &old_id) in order.iter().enumerate() {
        remap[old_id] = new_id as NodeId;
    }
    let m = |node: NodeId| remap[node as usize];

    GraphSnapshot {
        swhids: order.iter().map(|&old| snapshot.swhids[old]).collect(),
        directories: snapshot
            .directories
            .iter()
            .map(|(dir, entries)| {
                (m(*dir), entries.iter().map(|e| DirEntry { name: e.name.clone(), target: m(e.target) }).collect())
            })
            .collect(),
        revision_roots: snapshot.revision_roots.iter().map(|&(rev, root)| (m(rev), m(root))).collect(),
        revision_parents: snapshot
            .revision_parents
            .iter()
            .map(|(rev, parents)| (m(*rev), parents.iter().map(|&p| m(p)).collect()))
            .collect(),
        committer_dates: snapshot.committer_dates.iter().map(|&(rev, date)| (m(rev), date)).collect(),
        releases: snapshot.releases.iter().map(|&(rel, target)| (m(rel), m(target))).collect(),
        snapshots: snapshot
            .snapshots
            .iter()
            .map(|(snap, branches)| (m(*snap), branches.iter().map(|&b| m(b)).collect()))
            .collect(),
        origins: snapshot
            .origins
            .iter()
            .map(|(origin, url, snaps)| (m(*origin), url.clone(), snaps.iter().map(|&s| m(s)).collect()))
            .collect(),
    }
}
