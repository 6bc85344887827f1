mod builder;
mod errors;
mod properties;
pub mod stages;
mod walk;

pub use builder::IndexBuilder;
pub use errors::{IndexError, IndexResult};
pub use properties::TimestampArray;

/// Property-array directory names (stage A and B outputs).
pub const EARLIEST_TIMESTAMPS: &str = "earliest_timestamps";
pub const DIRECTORY_MAX_LEAF_TIMESTAMPS: &str = "directory_max_leaf_timestamps";
/// Frontier set directory name (stage C output).
pub const DIRECTORY_FRONTIER: &str = "directory_frontier";
