//! Stage D: the three relation tables.

use crate::properties::TimestampArray;
use crate::walk::{walk_tree, VisitFlow};
use provenance_database::prelude::EliasFano;
use provenance_graph::GraphApi;
use provenance_model::counters::BuildCounters;
use provenance_model::rows::{ContentInFrontierDirRow, ContentInRevisionRow, FrontierDirInRevisionRow};
use provenance_model::NodeType;
use rayon::prelude::*;
use std::sync::atomic::Ordering;

#[derive(Default)]
pub struct RelationRows {
    pub fdir: Vec<FrontierDirInRevisionRow>,
    pub cfd: Vec<ContentInFrontierDirRow>,
    pub crnf: Vec<ContentInRevisionRow>,
}

/// Walks every revision tree with the frontier set as a cut, re-checking the
/// timestamp predicate per revision: a set member only cuts walks of
/// revisions strictly younger than its max leaf. Cut hits land in FDIR,
/// contents reached without a cut land in CRNF. Each frontier directory's
/// subtree is then walked once to fill CFD.
///
/// A `(frontier_dir, revision)` pair reachable at several paths keeps its
/// lexicographically smallest path; CFD keeps every path of a content inside
/// its frontier directory.
pub fn collect_relations(
    graph: &dyn GraphApi,
    max_leaf: &TimestampArray,
    frontier: &EliasFano,
    pool: &rayon::ThreadPool,
    counters: &BuildCounters,
) -> RelationRows {
    let revisions = graph.nodes_of_type(NodeType::Revision);
    let (mut fdir, crnf) = pool.install(|| {
        revisions
            .par_iter()
            .map(|&revision| {
                let date = graph.committer_date(revision);
                let mut fdir_rows = Vec::new();
                let mut crnf_rows = Vec::new();
                if let Some(root) = graph.root_directory(revision) {
                    walk_tree(
                        graph,
                        root,
                        |dir, path| {
                            if let (Some(date), Some(leaf)) = (date, max_leaf.get(dir)) {
                                if leaf < date && frontier.contains(dir) {
                                    fdir_rows.push(FrontierDirInRevisionRow {
                                        frontier_dir: dir,
                                        revision,
                                        path: path.to_vec(),
                                    });
                                    return VisitFlow::Prune;
                                }
                            }
                            VisitFlow::Descend
                        },
                        |content, path| {
                            crnf_rows.push(ContentInRevisionRow { content, revision, path: path.to_vec() });
                        },
                    );
                }
                (fdir_rows, crnf_rows)
            })
            .reduce(
                || (Vec::new(), Vec::new()),
                |mut acc, part| {
                    acc.0.extend(part.0);
                    acc.1.extend(part.1);
                    acc
                },
            )
    });

    // Unique (frontier_dir, revision) pairs, smallest path retained
    fdir.sort_unstable();
    fdir.dedup_by(|a, b| a.frontier_dir == b.frontier_dir && a.revision == b.revision);

    let frontier_dirs: Vec<u64> = frontier.iter().collect();
    let cfd = pool.install(|| {
        frontier_dirs
            .par_iter()
            .map(|&dir| {
                let mut rows = Vec::new();
                walk_tree(
                    graph,
                    dir,
                    |_, _| VisitFlow::Descend,
                    |content, path| {
                        rows.push(ContentInFrontierDirRow { content, frontier_dir: dir, path: path.to_vec() });
                    },
                );
                rows
            })
            .reduce(Vec::new, |mut acc, part| {
                acc.extend(part);
                acc
            })
    });

    counters.fdir_rows.fetch_add(fdir.len() as u64, Ordering::Relaxed);
    counters.cfd_rows.fetch_add(cfd.len() as u64, Ordering::Relaxed);
    counters.crnf_rows.fetch_add(crnf.len() as u64, Ordering::Relaxed);
    RelationRows { fdir, cfd, crnf }
}
