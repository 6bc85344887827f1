use provenance_model::{NodeId, NodeType, Swhid, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A named edge of a directory node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub target: NodeId,
}

/// The graph collaborator contract: SWHID ↔ node-id resolution, typed
/// successor iteration, revision timestamps, and origin resolution.
///
/// Node ids are dense in `0..num_nodes()` and only meaningful within the
/// snapshot that produced them.
pub trait GraphApi: Send + Sync {
    fn num_nodes(&self) -> u64;

    fn node_id(&self, swhid: &Swhid) -> Option<NodeId>;

    fn swhid(&self, node: NodeId) -> Option<Swhid>;

    fn node_type(&self, node: NodeId) -> Option<NodeType>;

    /// All nodes of the given type, in ascending node-id order.
    fn nodes_of_type(&self, node_type: NodeType) -> Vec<NodeId>;

    /// The root directory of a revision.
    fn root_directory(&self, revision: NodeId) -> Option<NodeId>;

    fn directory_entries(&self, directory: NodeId) -> Vec<DirEntry>;

    /// The committer date of a revision; `None` when the revision carries none.
    fn committer_date(&self, revision: NodeId) -> Option<Timestamp>;

    /// One origin whose snapshots point (transitively, through revision
    /// history) to the given revision.
    fn origin_of(&self, revision: NodeId) -> Option<(NodeId, String)>;
}

pub type DynGraph = Arc<dyn GraphApi>;
