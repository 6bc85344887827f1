use crate::ef::EliasFano;
use crate::errors::{StoreError, StoreResult};
use crate::schema::TableRow;
use crate::store::SUCCESS_MARKER;
use itertools::Itertools;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use rayon::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Small row groups keep statistics pruning effective for point lookups.
const MAX_ROW_GROUP_SIZE: usize = 64 * 1024;
const WRITE_BATCH_SIZE: usize = 8 * 1024;

/// Part assignment by a fixed multiplicative hash of the primary key, so that
/// a key lives in exactly one part and a rebuild assigns parts identically.
pub fn partition_of(key: u64, num_parts: usize) -> usize {
    const M: u64 = 0x9E37_79B9_7F4A_7C15;
    ((key.wrapping_mul(M)) >> 17) as usize % num_parts
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WriterSummary {
    pub rows: u64,
    pub distinct_keys: u64,
    pub parts_written: u64,
}

/// Buffers rows per partition, then writes each non-empty partition as one
/// sorted, deduplicated Parquet file with its Elias–Fano sidecar, finishing
/// with the success marker. Rows are sorted by the full row tuple so repeated
/// builds produce byte-identical outputs.
pub struct PartitionedTableWriter<R: TableRow> {
    staging: PathBuf,
    parts: Vec<Vec<R>>,
}

impl<R: TableRow> PartitionedTableWriter<R> {
    pub fn new(staging: impl Into<PathBuf>, num_parts: usize) -> Self {
        assert!(num_parts > 0, "at least one partition is required");
        Self { staging: staging.into(), parts: vec![Vec::new(); num_parts] }
    }

    pub fn push(&mut self, row: R) {
        let part = partition_of(row.key(), self.parts.len());
        self.parts[part].push(row);
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = R>) {
        for row in rows {
            self.push(row);
        }
    }

    pub fn finish(self) -> StoreResult<WriterSummary> {
        let staging = self.staging;
        let per_part: Vec<(u64, u64)> = self
            .parts
            .into_par_iter()
            .enumerate()
            .map(|(idx, mut rows)| -> StoreResult<(u64, u64)> {
                if rows.is_empty() {
                    return Ok((0, 0));
                }
                rows.sort_unstable();
                rows.dedup();
                let path = staging.join(format!("part-{idx:05}.parquet"));
                write_part(&path, &rows)?;
                let keys: Vec<u64> = rows.iter().map(|r| r.key()).dedup().collect();
                let sidecar = path.with_extension("ef");
                fs::write(&sidecar, EliasFano::from_sorted(&keys).encode()).map_err(|e| StoreError::io(&sidecar, e))?;
                Ok((rows.len() as u64, keys.len() as u64))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let marker = staging.join(SUCCESS_MARKER);
        fs::write(&marker, b"").map_err(|e| StoreError::io(&marker, e))?;

        let mut summary = WriterSummary::default();
        for (rows, keys) in per_part {
            summary.rows += rows;
            summary.distinct_keys += keys;
            summary.parts_written += (rows > 0) as u64;
        }
        Ok(summary)
    }
}

fn write_part<R: TableRow>(path: &Path, rows: &[R]) -> StoreResult<()> {
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_dictionary_enabled(true)
        .set_statistics_enabled(EnabledStatistics::Page)
        .set_max_row_group_size(MAX_ROW_GROUP_SIZE)
        .build();
    let file = File::create(path).map_err(|e| StoreError::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, R::schema(), Some(props)).map_err(|e| StoreError::parquet(path, e))?;
    for chunk in rows.chunks(WRITE_BATCH_SIZE) {
        let batch = R::to_batch(chunk)?;
        writer.write(&batch).map_err(|e| StoreError::parquet(path, e))?;
    }
    writer.close().map_err(|e| StoreError::parquet(path, e))?;
    Ok(())
}
