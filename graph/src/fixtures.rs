//! Deterministic graph snapshot construction, used by tests and by the
//! `gen-test-database` command.

use crate::api::DirEntry;
use crate::memory::GraphSnapshot;
use provenance_model::{NodeId, NodeType, Swhid, Timestamp, SWHID_HASH_SIZE};

/// Builds a [`GraphSnapshot`] node by node with generated SWHIDs.
pub struct GraphBuilder {
    snapshot: GraphSnapshot,
    seed: u64,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self { snapshot: GraphSnapshot::default(), seed: 0x5EED }
    }

    fn next_hash(&mut self) -> [u8; SWHID_HASH_SIZE] {
        // splitmix64 keeps generated identifiers stable across runs
        let mut hash = [0u8; SWHID_HASH_SIZE];
        for chunk in hash.chunks_mut(8) {
            self.seed = self.seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = self.seed;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^= z >> 31;
            let bytes = z.to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
        hash
    }

    fn add_node(&mut self, node_type: NodeType) -> NodeId {
        let hash = self.next_hash();
        let node = self.snapshot.swhids.len() as NodeId;
        self.snapshot.swhids.push(Swhid::new(node_type, hash).to_bytes());
        node
    }

    pub fn content(&mut self) -> NodeId {
        self.add_node(NodeType::Content)
    }

    pub fn directory(&mut self, entries: &[(&[u8], NodeId)]) -> NodeId {
        let node = self.add_node(NodeType::Directory);
        let entries = entries.iter().map(|(name, target)| DirEntry { name: name.to_vec(), target: *target }).collect();
        self.snapshot.directories.push((node, entries));
        node
    }

    pub fn revision(&mut self, root: NodeId, date: Option<Timestamp>, parents: &[NodeId]) -> NodeId {
        let node = self.add_node(NodeType::Revision);
        self.snapshot.revision_roots.push((node, root));
        self.snapshot.revision_parents.push((node, parents.to_vec()));
        if let Some(date) = date {
            self.snapshot.committer_dates.push((node, date));
        }
        node
    }

    pub fn release(&mut self, target: NodeId) -> NodeId {
        let node = self.add_node(NodeType::Release);
        self.snapshot.releases.push((node, target));
        node
    }

    pub fn snapshot(&mut self, branches: &[NodeId]) -> NodeId {
        let node = self.add_node(NodeType::Snapshot);
        self.snapshot.snapshots.push((node, branches.to_vec()));
        node
    }

    pub fn origin(&mut self, url: &str, snapshots: &[NodeId]) -> NodeId {
        let node = self.add_node(NodeType::Origin);
        self.snapshot.origins.push((node, url.to_string(), snapshots.to_vec()));
        node
    }

    pub fn build(self) -> GraphSnapshot {
        self.snapshot
    }
}

/// A small archive with the interesting shapes: a directory shared by an old
/// and a young revision, a content duplicated at two paths of one revision,
/// a merge history behind two origins, and a revision without a committer
/// date.
pub fn demo_snapshot() -> GraphSnapshot {
    let mut builder = GraphBuilder::new();

    // Shared library tree, committed at t=10 and reused at t=20
    let lib_content = builder.content();
    let readme = builder.content();
    let lib_dir = builder.directory(&[(b"a.c", lib_content)]);
    let root_v1 = builder.directory(&[(b"README", readme), (b"lib", lib_dir)]);
    let rev_v1 = builder.revision(root_v1, Some(10), &[]);
    let rev_v2 = builder.revision(root_v1, Some(20), &[rev_v1]);

    // A content appearing at two paths of a single revision
    let duplicated = builder.content();
    let nested = builder.directory(&[(b"a", duplicated)]);
    let root_dup = builder.directory(&[(b"a", duplicated), (b"b", nested)]);
    let rev_dup = builder.revision(root_dup, Some(30), &[]);

    // A revision carrying no committer date
    let undated_content = builder.content();
    let undated_root = builder.directory(&[(b"orphan.txt", undated_content)]);
    let undated_rev = builder.revision(undated_root, None, &[]);

    let snap_main = builder.snapshot(&[rev_v2]);
    let snap_other = builder.snapshot(&[rev_dup, undated_rev]);
    builder.origin("https://example.org/library.git", &[snap_main]);
    builder.origin("https://example.org/misc.git", &[snap_other]);

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_snapshot_is_deterministic() {
        let a = bincode::serialize(&demo_snapshot()).unwrap();
        let b = bincode::serialize(&demo_snapshot()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_generated_swhids_are_distinct() {
        let snapshot = demo_snapshot();
        let mut wires = snapshot.swhids.clone();
        wires.sort();
        wires.dedup();
        assert_eq!(wires.len(), snapshot.swhids.len());
    }
}
