//! Arrow schemas and batch conversion for the provenance table rows.
//!
//! The primary-key column is always column 0 and always `uint64`; the reader
//! relies on this when pruning row groups and pages by statistics.

use arrow::array::{BinaryArray, FixedSizeBinaryArray, FixedSizeBinaryBuilder, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use provenance_model::rows::{
    ContentInFrontierDirRow, ContentInRevisionRow, FrontierDirInRevisionRow, NodeRow, CONTENTS_IN_FRONTIER_DIRECTORIES,
    CONTENTS_IN_REVISIONS_WITHOUT_FRONTIERS, FRONTIER_DIRECTORIES_IN_REVISIONS, NODES,
};
use provenance_model::SWHID_BYTES;
use std::sync::Arc;

/// A row of one of the provenance tables, convertible to and from Arrow
/// record batches. The derived `Ord` of implementors is the on-disk sort
/// order (primary key first).
pub trait TableRow: Clone + Ord + Send + Sync + 'static {
    /// On-disk table directory name.
    const TABLE: &'static str;

    fn schema() -> SchemaRef;
    fn key(&self) -> u64;
    fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError>;
    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ArrowError>;
}

fn key_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt64Array, ArrowError> {
    column::<UInt64Array>(batch, 0, name)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, index: usize, name: &str) -> Result<&'a T, ArrowError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ArrowError::SchemaError(format!("column {index} ({name}) has an unexpected type")))
}

impl TableRow for NodeRow {
    const TABLE: &'static str = NODES;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("node_id", DataType::UInt64, false),
            Field::new("swhid", DataType::FixedSizeBinary(SWHID_BYTES as i32), false),
        ]))
    }

    fn key(&self) -> u64 {
        self.node_id
    }

    fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
        let node_ids = UInt64Array::from_iter_values(rows.iter().map(|r| r.node_id));
        let mut swhids = FixedSizeBinaryBuilder::with_capacity(rows.len(), SWHID_BYTES as i32);
        for row in rows {
            swhids.append_value(row.swhid)?;
        }
        RecordBatch::try_new(Self::schema(), vec![Arc::new(node_ids), Arc::new(swhids.finish())])
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ArrowError> {
        let node_ids = key_column(batch, "node_id")?;
        let swhids = column::<FixedSizeBinaryArray>(batch, 1, "swhid")?;
        if swhids.value_length() != SWHID_BYTES as i32 {
            return Err(ArrowError::SchemaError(format!("swhid column has width {}", swhids.value_length())));
        }
        Ok((0..batch.num_rows())
            .map(|i| {
                let mut swhid = [0u8; SWHID_BYTES];
                swhid.copy_from_slice(swhids.value(i));
                NodeRow { node_id: node_ids.value(i), swhid }
            })
            .collect())
    }
}

macro_rules! relation_table_row {
    ($row:ty, $table:expr, $key:ident, $second:ident) => {
        impl TableRow for $row {
            const TABLE: &'static str = $table;

            fn schema() -> SchemaRef {
                Arc::new(Schema::new(vec![
                    Field::new(stringify!($key), DataType::UInt64, false),
                    Field::new(stringify!($second), DataType::UInt64, false),
                    Field::new("path", DataType::Binary, false),
                ]))
            }

            fn key(&self) -> u64 {
                self.$key
            }

            fn to_batch(rows: &[Self]) -> Result<RecordBatch, ArrowError> {
                let keys = UInt64Array::from_iter_values(rows.iter().map(|r| r.$key));
                let seconds = UInt64Array::from_iter_values(rows.iter().map(|r| r.$second));
                let paths = BinaryArray::from_iter_values(rows.iter().map(|r| r.path.as_slice()));
                RecordBatch::try_new(Self::schema(), vec![Arc::new(keys), Arc::new(seconds), Arc::new(paths)])
            }

            fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>, ArrowError> {
                let keys = key_column(batch, stringify!($key))?;
                let seconds = column::<UInt64Array>(batch, 1, stringify!($second))?;
                let paths = column::<BinaryArray>(batch, 2, "path")?;
                Ok((0..batch.num_rows())
                    .map(|i| Self { $key: keys.value(i), $second: seconds.value(i), path: paths.value(i).to_vec() })
                    .collect())
            }
        }
    };
}

relation_table_row!(FrontierDirInRevisionRow, FRONTIER_DIRECTORIES_IN_REVISIONS, frontier_dir, revision);
relation_table_row!(ContentInFrontierDirRow, CONTENTS_IN_FRONTIER_DIRECTORIES, content, frontier_dir);
relation_table_row!(ContentInRevisionRow, CONTENTS_IN_REVISIONS_WITHOUT_FRONTIERS, content, revision);
