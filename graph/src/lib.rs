mod api;
mod errors;
pub mod fixtures;
mod memory;

pub use api::{DirEntry, DynGraph, GraphApi};
pub use errors::{GraphError, GraphResult};
pub use memory::{GraphSnapshot, MemoryGraph};
