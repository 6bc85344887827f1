mod cache;
mod ef;
mod errors;
mod reader;
mod schema;
mod store;
mod writer;

pub mod prelude {
    pub use super::cache::{Cache, CachePolicy, MemSized};
    pub use super::ef::EliasFano;
    pub use super::errors::{StoreError, StoreResult};
    pub use super::reader::{ReaderCaches, ReaderCachesConfig, TableReader};
    pub use super::schema::TableRow;
    pub use super::store::{LocalTableStore, PartFile, TableHandle, TableStore, SUCCESS_MARKER};
    pub use super::writer::{partition_of, PartitionedTableWriter, WriterSummary};
}
