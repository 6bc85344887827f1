use crate::api::{DirEntry, GraphApi};
use crate::errors::{GraphError, GraphResult};
use provenance_model::{NodeId, NodeType, Swhid, Timestamp, SWHID_BYTES};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Serialized form of a graph snapshot. Node ids are the indexes into
/// `swhids`; all edge lists reference those ids.
#[derive(Serialize, Deserialize, Default, Clone)]
pub struct GraphSnapshot {
    /// SWHID wire forms; index = node id.
    pub swhids: Vec<[u8; SWHID_BYTES]>,
    pub directories: Vec<(NodeId, Vec<DirEntry>)>,
    /// revision → root directory
    pub revision_roots: Vec<(NodeId, NodeId)>,
    /// revision → direct parents
    pub revision_parents: Vec<(NodeId, Vec<NodeId>)>,
    /// revisions carrying a committer date
    pub committer_dates: Vec<(NodeId, Timestamp)>,
    /// release → revision target
    pub releases: Vec<(NodeId, NodeId)>,
    /// snapshot → branch targets (revisions or releases)
    pub snapshots: Vec<(NodeId, Vec<NodeId>)>,
    /// origin node, origin URL, snapshot targets
    pub origins: Vec<(NodeId, String, Vec<NodeId>)>,
}

impl GraphSnapshot {
    pub fn save(&self, path: &Path) -> GraphResult<()> {
        let bytes = bincode::serialize(self).expect("snapshot serialization is infallible");
        fs::write(path, bytes).map_err(|e| GraphError::Io { path: path.to_path_buf(), source: e })
    }

    pub fn load(path: &Path) -> GraphResult<Self> {
        let bytes = fs::read(path).map_err(|e| GraphError::Io { path: path.to_path_buf(), source: e })?;
        bincode::deserialize(&bytes).map_err(|e| GraphError::Decode { path: path.to_path_buf(), source: e })
    }
}

/// In-memory realization of [`GraphApi`] over a [`GraphSnapshot`].
///
/// Origin resolution is precomputed at load: origins are visited in URL
/// order and claim every revision their snapshots reach through history, so
/// `origin_of` answers with the lexicographically smallest claiming URL.
pub struct MemoryGraph {
    swhids: Vec<Swhid>,
    index: HashMap<Swhid, NodeId>,
    dir_entries: HashMap<NodeId, Vec<DirEntry>>,
    revision_roots: HashMap<NodeId, NodeId>,
    committer_dates: HashMap<NodeId, Timestamp>,
    revision_origins: HashMap<NodeId, (NodeId, String)>,
}

impl MemoryGraph {
    pub fn open(path: &Path) -> GraphResult<Self> {
        Self::from_snapshot(GraphSnapshot::load(path)?)
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> GraphResult<Self> {
        let num_nodes = snapshot.swhids.len() as u64;
        let mut swhids = Vec::with_capacity(snapshot.swhids.len());
        let mut index = HashMap::with_capacity(snapshot.swhids.len());
        for (node, wire) in snapshot.swhids.iter().enumerate() {
            let swhid = Swhid::from_bytes(wire).map_err(|e| GraphError::InvalidNode(format!("node {node}: {e}")))?;
            index.insert(swhid, node as NodeId);
            swhids.push(swhid);
        }

        let check = |node: NodeId| -> GraphResult<NodeId> {
            if node < num_nodes {
                Ok(node)
            } else {
                Err(GraphError::InvalidNode(format!("edge target {node} out of range")))
            }
        };

        let mut dir_entries: HashMap<NodeId, Vec<DirEntry>> = HashMap::new();
        for (dir, entries) in &snapshot.directories {
            for entry in entries {
                check(entry.target)?;
            }
            dir_entries.insert(check(*dir)?, entries.clone());
        }
        let revision_roots: HashMap<NodeId, NodeId> =
            snapshot.revision_roots.iter().map(|&(rev, root)| Ok((check(rev)?, check(root)?))).collect::<GraphResult<_>>()?;
        let committer_dates: HashMap<NodeId, Timestamp> = snapshot.committer_dates.iter().copied().collect();

        let revision_origins = resolve_origins(&snapshot);

        Ok(Self { swhids, index, dir_entries, revision_roots, committer_dates, revision_origins })
    }
}

/// Walks origin → snapshot → branch (→ release) → revision → ancestors,
/// claiming revisions for the smallest origin URL that reaches them.
fn resolve_origins(snapshot: &GraphSnapshot) -> HashMap<NodeId, (NodeId, String)> {
    let releases: HashMap<NodeId, NodeId> = snapshot.releases.iter().copied().collect();
    let snapshot_branches: HashMap<NodeId, &Vec<NodeId>> = snapshot.snapshots.iter().map(|(s, b)| (*s, b)).collect();
    let parents: HashMap<NodeId, &Vec<NodeId>> = snapshot.revision_parents.iter().map(|(r, p)| (*r, p)).collect();
    let revisions: std::collections::HashSet<NodeId> = snapshot.revision_roots.iter().map(|&(r, _)| r).collect();

    let mut origins: Vec<&(NodeId, String, Vec<NodeId>)> = snapshot.origins.iter().collect();
    origins.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut claimed: HashMap<NodeId, (NodeId, String)> = HashMap::new();
    for (origin, url, snapshot_nodes) in origins {
        let mut stack: Vec<NodeId> = Vec::new();
        for snapshot_node in snapshot_nodes {
            for &branch in snapshot_branches.get(snapshot_node).copied().into_iter().flatten() {
                stack.push(*releases.get(&branch).unwrap_or(&branch));
            }
        }
        while let Some(revision) = stack.pop() {
            if !revisions.contains(&revision) || claimed.contains_key(&revision) {
                continue;
            }
            claimed.insert(revision, (*origin, url.clone()));
            if let Some(parents) = parents.get(&revision) {
                stack.extend(parents.iter().copied());
            }
        }
    }
    claimed
}

impl GraphApi for MemoryGraph {
    fn num_nodes(&self) -> u64 {
        self.swhids.len() as u64
    }

    fn node_id(&self, swhid: &Swhid) -> Option<NodeId> {
        self.index.get(swhid).copied()
    }

    fn swhid(&self, node: NodeId) -> Option<Swhid> {
        self.swhids.get(node as usize).copied()
    }

    fn node_type(&self, node: NodeId) -> Option<NodeType> {
        self.swhids.get(node as usize).map(|s| s.node_type)
    }

    fn nodes_of_type(&self, node_type: NodeType) -> Vec<NodeId> {
        self.swhids
            .iter()
            .enumerate()
            .filter(|(_, s)| s.node_type == node_type)
            .map(|(node, _)| node as NodeId)
            .collect()
    }

    fn root_directory(&self, revision: NodeId) -> Option<NodeId> {
        self.revision_roots.get(&revision).copied()
    }

    fn directory_entries(&self, directory: NodeId) -> Vec<DirEntry> {
        self.dir_entries.get(&directory).cloned().unwrap_or_default()
    }

    fn committer_date(&self, revision: NodeId) -> Option<Timestamp> {
        self.committer_dates.get(&revision).copied()
    }

    fn origin_of(&self, revision: NodeId) -> Option<(NodeId, String)> {
        self.revision_origins.get(&revision).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::GraphBuilder;

    #[test]
    fn test_snapshot_file_roundtrip() {
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        let d = builder.directory(&[(b"a.c", c)]);
        let r = builder.revision(d, Some(10), &[]);
        let s = builder.snapshot(&[r]);
        builder.origin("https://example.org/repo", &[s]);
        let snapshot = builder.build();

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("graph.bin");
        snapshot.save(&path).unwrap();
        let graph = MemoryGraph::open(&path).unwrap();
        assert_eq!(graph.num_nodes(), 5);
        assert_eq!(graph.root_directory(r), Some(d));
        assert_eq!(graph.committer_date(r), Some(10));
    }

    #[test]
    fn test_swhid_node_id_roundtrip() {
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        let d = builder.directory(&[(b"f", c)]);
        builder.revision(d, Some(1), &[]);
        let graph = MemoryGraph::from_snapshot(builder.build()).unwrap();

        for node in 0..graph.num_nodes() {
            let swhid = graph.swhid(node).unwrap();
            assert_eq!(graph.node_id(&swhid), Some(node));
        }
    }

    #[test]
    fn test_origin_resolution_prefers_smallest_url() {
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        let d = builder.directory(&[(b"f", c)]);
        let r1 = builder.revision(d, Some(10), &[]);
        let r2 = builder.revision(d, Some(20), &[r1]);
        let s1 = builder.snapshot(&[r2]);
        let s2 = builder.snapshot(&[r2]);
        builder.origin("https://example.org/zzz", &[s1]);
        builder.origin("https://example.org/aaa", &[s2]);
        let graph = MemoryGraph::from_snapshot(builder.build()).unwrap();

        // Both origins reach both revisions (r1 through r2's history);
        // the smallest URL claims them
        assert_eq!(graph.origin_of(r2).unwrap().1, "https://example.org/aaa");
        assert_eq!(graph.origin_of(r1).unwrap().1, "https://example.org/aaa");
    }

    #[test]
    fn test_origin_through_release() {
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        let d = builder.directory(&[(b"f", c)]);
        let r = builder.revision(d, Some(10), &[]);
        let rel = builder.release(r);
        let s = builder.snapshot(&[rel]);
        builder.origin("https://example.org/repo", &[s]);
        let graph = MemoryGraph::from_snapshot(builder.build()).unwrap();

        assert_eq!(graph.origin_of(r).unwrap().1, "https://example.org/repo");
    }

    #[test]
    fn test_invalid_edge_rejected() {
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        builder.directory(&[(b"f", c)]);
        let mut snapshot = builder.build();
        snapshot.directories[0].1[0].target = 999;
        assert!(MemoryGraph::from_snapshot(snapshot).is_err());
    }
}
