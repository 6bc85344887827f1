//! Row types of the four provenance tables (§ on-disk layout: one directory of
//! sorted Parquet part files per table). Field order puts the primary key
//! first so the derived `Ord` is the on-disk sort order.

use crate::{NodeId, SWHID_BYTES};

/// Table directory names.
pub const NODES: &str = "nodes";
pub const FRONTIER_DIRECTORIES_IN_REVISIONS: &str = "frontier_directories_in_revisions";
pub const CONTENTS_IN_FRONTIER_DIRECTORIES: &str = "contents_in_frontier_directories";
pub const CONTENTS_IN_REVISIONS_WITHOUT_FRONTIERS: &str = "contents_in_revisions_without_frontiers";

/// `nodes`: node-id → SWHID wire form. Primary key: `node_id`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeRow {
    pub node_id: NodeId,
    pub swhid: [u8; SWHID_BYTES],
}

/// `frontier_directories_in_revisions`: a frontier directory used as a cut in
/// a revision's tree, with the path from the revision root to the directory.
/// Primary key: `frontier_dir`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FrontierDirInRevisionRow {
    pub frontier_dir: NodeId,
    pub revision: NodeId,
    pub path: Vec<u8>,
}

/// `contents_in_frontier_directories`: a content reachable inside a frontier
/// directory, with the path from the directory to the content. Primary key:
/// `content`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ContentInFrontierDirRow {
    pub content: NodeId,
    pub frontier_dir: NodeId,
    pub path: Vec<u8>,
}

/// `contents_in_revisions_without_frontiers`: a content reached by a revision
/// walk without crossing any frontier cut. Primary key: `content`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ContentInRevisionRow {
    pub content: NodeId,
    pub revision: NodeId,
    pub path: Vec<u8>,
}
