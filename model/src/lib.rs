pub mod counters;
pub mod errors;
pub mod path;
pub mod rows;
pub mod swhid;

pub use swhid::{NodeType, Swhid, SWHID_BYTES, SWHID_HASH_SIZE};

/// Dense node index assigned by a graph snapshot. Opaque outside that snapshot.
pub type NodeId = u64;

/// Committer date in seconds since the epoch.
pub type Timestamp = i64;
