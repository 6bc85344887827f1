//! Tree walk helpers shared by the builder stages.

use provenance_graph::GraphApi;
use provenance_model::path::join_paths;
use provenance_model::{NodeId, NodeType};
use std::collections::HashSet;

pub enum VisitFlow {
    Descend,
    Prune,
}

/// Walks the directory tree under `root`, tracking the byte path from the
/// root for every visit. Directories reachable at several paths are visited
/// once per path; `on_dir` is called before descending (root included, with
/// the empty path) and may prune the subtree.
pub fn walk_tree(
    graph: &dyn GraphApi,
    root: NodeId,
    mut on_dir: impl FnMut(NodeId, &[u8]) -> VisitFlow,
    mut on_content: impl FnMut(NodeId, &[u8]),
) {
    let mut stack: Vec<(NodeId, Vec<u8>)> = vec![(root, Vec::new())];
    while let Some((dir, path)) = stack.pop() {
        if let VisitFlow::Prune = on_dir(dir, &path) {
            continue;
        }
        for entry in graph.directory_entries(dir) {
            match graph.node_type(entry.target) {
                Some(NodeType::Content) => {
                    let content_path = join_paths(&path, &entry.name);
                    on_content(entry.target, &content_path);
                }
                Some(NodeType::Directory) => {
                    stack.push((entry.target, join_paths(&path, &entry.name)));
                }
                _ => {}
            }
        }
    }
}

/// Path-less walk visiting every directory under `root` at most once; used
/// where only node identity matters and shared subtrees must not be
/// re-walked. `on_dir` may still prune.
pub fn walk_nodes(
    graph: &dyn GraphApi,
    root: NodeId,
    mut on_dir: impl FnMut(NodeId) -> VisitFlow,
    mut on_content: impl FnMut(NodeId),
) {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = vec![root];
    visited.insert(root);
    while let Some(dir) = stack.pop() {
        if let VisitFlow::Prune = on_dir(dir) {
            continue;
        }
        for entry in graph.directory_entries(dir) {
            match graph.node_type(entry.target) {
                Some(NodeType::Content) => on_content(entry.target),
                Some(NodeType::Directory) => {
                    if visited.insert(entry.target) {
                        stack.push(entry.target);
                    }
                }
                _ => {}
            }
        }
    }
}
