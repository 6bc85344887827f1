//! Point lookups over a table directory.
//!
//! Per-file protocol: consult the Elias–Fano sidecar (skip the file on a
//! miss), load the cached footer, prune row groups by key statistics, prune
//! pages by the column index, decode only the candidate page range and filter
//! for exact key matches. Files that fail consistency checks are quarantined
//! in memory for the rest of the process lifetime.

use crate::cache::{Cache, CachePolicy, MemSized};
use crate::ef::EliasFano;
use crate::errors::{StoreError, StoreResult};
use crate::schema::TableRow;
use crate::store::{PartFile, TableStore};
use arrow::record_batch::RecordBatch;
use parking_lot::RwLock;
use parquet::arrow::arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder, RowSelection, RowSelector};
use parquet::file::metadata::ParquetMetaData;
use parquet::file::page_index::index::Index;
use parquet::file::statistics::Statistics;
use provenance_model::counters::QueryCounters;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::{self, File};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use triggered::Listener;

#[derive(Clone, Copy, Debug)]
pub struct ReaderCachesConfig {
    pub footer_entries: usize,
    pub sidecar_entries: usize,
    pub page_bytes: usize,
}

impl Default for ReaderCachesConfig {
    fn default() -> Self {
        Self { footer_entries: 1024, sidecar_entries: 1024, page_bytes: 256 * 1024 * 1024 }
    }
}

impl MemSized for ArrowReaderMetadata {
    fn mem_size(&self) -> usize {
        self.metadata().memory_size()
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PageKey {
    path: PathBuf,
    row_group: usize,
    start: usize,
    end: usize,
}

#[derive(Clone)]
struct PageEntry {
    batches: Arc<Vec<RecordBatch>>,
}

impl MemSized for PageEntry {
    fn mem_size(&self) -> usize {
        self.batches.iter().map(|b| b.get_array_memory_size()).sum()
    }
}

/// Caches shared by all table readers of a process: Parquet footers,
/// Elias–Fano sidecars, and decoded candidate pages. Quarantined files are
/// tracked here as well so every reader skips them.
pub struct ReaderCaches {
    footers: Cache<PathBuf, ArrowReaderMetadata>,
    sidecars: Cache<PathBuf, Arc<EliasFano>>,
    pages: Cache<PageKey, PageEntry>,
    bad_files: RwLock<HashSet<PathBuf>>,
}

impl ReaderCaches {
    pub fn new(config: ReaderCachesConfig) -> Self {
        Self {
            footers: Cache::new(CachePolicy::Count(config.footer_entries)),
            sidecars: Cache::new(CachePolicy::Count(config.sidecar_entries)),
            pages: Cache::new(CachePolicy::Bytes(config.page_bytes)),
            bad_files: RwLock::new(HashSet::new()),
        }
    }

    fn is_quarantined(&self, path: &Path) -> bool {
        self.bad_files.read().contains(path)
    }

    fn quarantine(&self, path: PathBuf) {
        self.bad_files.write().insert(path);
    }
}

impl Default for ReaderCaches {
    fn default() -> Self {
        Self::new(ReaderCachesConfig::default())
    }
}

/// Read-only point-query access to one table of a table set.
pub struct TableReader<R: TableRow> {
    parts: Vec<PartFile>,
    caches: Arc<ReaderCaches>,
    counters: Arc<QueryCounters>,
    _phantom: PhantomData<fn() -> R>,
}

impl<R: TableRow> TableReader<R> {
    pub fn open(store: &dyn TableStore, caches: Arc<ReaderCaches>, counters: Arc<QueryCounters>) -> StoreResult<Self> {
        let handle = store.open(R::TABLE)?;
        Ok(Self { parts: handle.parts, caches, counters, _phantom: PhantomData })
    }

    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    /// Total distinct primary keys across all parts, from the sidecars alone.
    pub fn num_keys(&self) -> StoreResult<u64> {
        let mut total = 0u64;
        for part in &self.parts {
            if self.caches.is_quarantined(&part.parquet) {
                continue;
            }
            total += self.sidecar(part)?.len() as u64;
        }
        Ok(total)
    }

    /// All rows whose primary key equals `key`.
    pub fn lookup(&self, key: u64) -> StoreResult<Vec<R>> {
        self.lookup_with_cancel(key, None)
    }

    pub fn lookup_with_cancel(&self, key: u64, cancel: Option<&Listener>) -> StoreResult<Vec<R>> {
        self.counters.points_looked_up.fetch_add(1, Ordering::Relaxed);
        let mut out = Vec::new();
        for part in &self.parts {
            if self.caches.is_quarantined(&part.parquet) {
                continue;
            }
            match self.lookup_in_part(part, key, cancel) {
                Ok(rows) => out.extend(rows),
                Err(err) if err.is_corruption() => {
                    log::error!("quarantining corrupt table file {}: {}", part.parquet.display(), err);
                    self.caches.quarantine(part.parquet.clone());
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    /// Parallel lookup of many keys on the given pool. Returns per-key row
    /// sets in input order; input duplicates yield duplicate entries.
    pub fn lookup_many(&self, keys: &[u64], pool: &rayon::ThreadPool) -> Vec<StoreResult<Vec<R>>> {
        pool.install(|| keys.par_iter().map(|&key| self.lookup(key)).collect())
    }

    fn sidecar(&self, part: &PartFile) -> StoreResult<Arc<EliasFano>> {
        if let Some(ef) = self.caches.sidecars.get(&part.sidecar) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(ef);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        let bytes = fs::read(&part.sidecar).map_err(|e| StoreError::io(&part.sidecar, e))?;
        let ef =
            Arc::new(EliasFano::decode(&bytes).map_err(|e| StoreError::Sidecar { path: part.sidecar.clone(), source: e })?);
        self.caches.sidecars.insert(part.sidecar.clone(), ef.clone());
        Ok(ef)
    }

    fn footer(&self, part: &PartFile) -> StoreResult<ArrowReaderMetadata> {
        if let Some(metadata) = self.caches.footers.get(&part.parquet) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(metadata);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        let file = File::open(&part.parquet).map_err(|e| StoreError::io(&part.parquet, e))?;
        let options = ArrowReaderOptions::new().with_page_index(true);
        let metadata = ArrowReaderMetadata::load(&file, options).map_err(|e| StoreError::parquet(&part.parquet, e))?;
        self.caches.footers.insert(part.parquet.clone(), metadata.clone());
        Ok(metadata)
    }

    fn lookup_in_part(&self, part: &PartFile, key: u64, cancel: Option<&Listener>) -> StoreResult<Vec<R>> {
        let ef = self.sidecar(part)?;
        if !ef.contains(key) {
            self.counters.files_pruned_by_ef.fetch_add(1, Ordering::Relaxed);
            return Ok(Vec::new());
        }

        let metadata = self.footer(part)?;
        let mut rows = Vec::new();
        for row_group in 0..metadata.metadata().num_row_groups() {
            if !row_group_may_contain(metadata.metadata(), row_group, key, &part.parquet)? {
                self.counters.row_groups_skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if cancel.is_some_and(|listener| listener.is_triggered()) {
                return Err(StoreError::Cancelled);
            }
            let batches = self.read_candidate_pages(part, &metadata, row_group, key)?;
            for batch in batches.iter() {
                rows.extend(R::from_batch(batch)?.into_iter().filter(|row| row.key() == key));
            }
        }
        if rows.is_empty() {
            // The sidecar listed the key but no data row carries it
            return Err(StoreError::corruption(&part.parquet, format!("sidecar lists key {key} absent from data pages")));
        }
        Ok(rows)
    }

    fn read_candidate_pages(
        &self,
        part: &PartFile,
        metadata: &ArrowReaderMetadata,
        row_group: usize,
        key: u64,
    ) -> StoreResult<Arc<Vec<RecordBatch>>> {
        let meta = metadata.metadata();
        let num_rows = meta.row_group(row_group).num_rows() as usize;
        let (start, end) = match page_candidate_range(meta, row_group, key) {
            Some(range) => range,
            None => (0, num_rows),
        };
        if start >= end {
            return Ok(Arc::new(Vec::new()));
        }

        let cache_key = PageKey { path: part.parquet.clone(), row_group, start, end };
        if let Some(entry) = self.caches.pages.get(&cache_key) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.batches);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let file = File::open(&part.parquet).map_err(|e| StoreError::io(&part.parquet, e))?;
        let builder = ParquetRecordBatchReaderBuilder::new_with_metadata(file, metadata.clone());
        let selection = RowSelection::from(vec![
            RowSelector::skip(start),
            RowSelector::select(end - start),
            RowSelector::skip(num_rows - end),
        ]);
        let reader = builder
            .with_row_groups(vec![row_group])
            .with_row_selection(selection)
            .build()
            .map_err(|e| StoreError::parquet(&part.parquet, e))?;
        let batches = reader.collect::<Result<Vec<_>, _>>().map_err(StoreError::Arrow)?;
        let entry = PageEntry { batches: Arc::new(batches) };
        self.caches.pages.insert(cache_key, entry.clone());
        Ok(entry.batches)
    }
}

fn row_group_may_contain(meta: &ParquetMetaData, row_group: usize, key: u64, path: &Path) -> StoreResult<bool> {
    match meta.row_group(row_group).column(0).statistics() {
        Some(Statistics::Int64(stats)) => match (stats.min_opt(), stats.max_opt()) {
            (Some(&min), Some(&max)) => Ok((min as u64) <= key && key <= (max as u64)),
            _ => Ok(true),
        },
        // key columns are uint64 (physical int64); anything else is a schema mismatch
        Some(_) => Err(StoreError::corruption(path, "unexpected statistics type for the key column")),
        None => Ok(true),
    }
}

/// Contiguous row range of the pages whose [min, max] covers `key`, from the
/// page index. `None` when the file carries no page index.
fn page_candidate_range(meta: &ParquetMetaData, row_group: usize, key: u64) -> Option<(usize, usize)> {
    let column_index = meta.column_index()?.get(row_group)?.first()?;
    let page_locations = meta.offset_index()?.get(row_group)?.first()?.page_locations();
    let Index::INT64(index) = column_index else {
        return None;
    };
    if index.indexes.len() != page_locations.len() {
        return None;
    }
    let num_rows = meta.row_group(row_group).num_rows() as usize;
    let mut start = None;
    let mut end = 0;
    for (i, page) in index.indexes.iter().enumerate() {
        let covers = match (page.min(), page.max()) {
            (Some(&min), Some(&max)) => (min as u64) <= key && key <= (max as u64),
            _ => true,
        };
        if covers {
            if start.is_none() {
                start = Some(page_locations[i].first_row_index as usize);
            }
            end = page_locations.get(i + 1).map(|p| p.first_row_index as usize).unwrap_or(num_rows);
        }
    }
    Some((start.unwrap_or(0), if start.is_some() { end } else { 0 }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalTableStore;
    use crate::writer::PartitionedTableWriter;
    use provenance_model::rows::ContentInRevisionRow;

    fn build_table(store: &LocalTableStore, rows: Vec<ContentInRevisionRow>, num_parts: usize) {
        let staging = store.create_staging(ContentInRevisionRow::TABLE).unwrap();
        let mut writer = PartitionedTableWriter::new(&staging, num_parts);
        writer.extend(rows);
        writer.finish().unwrap();
        store.put_atomic(ContentInRevisionRow::TABLE, &staging).unwrap();
    }

    fn reader(store: &LocalTableStore) -> TableReader<ContentInRevisionRow> {
        TableReader::open(store, Arc::new(ReaderCaches::default()), Arc::new(QueryCounters::default())).unwrap()
    }

    #[test]
    fn test_point_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(tmp.path());
        let rows: Vec<ContentInRevisionRow> =
            (0..500).map(|i| ContentInRevisionRow { content: i, revision: i * 3, path: format!("p/{i}").into_bytes() }).collect();
        build_table(&store, rows, 4);

        let reader = reader(&store);
        let hits = reader.lookup(42).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].revision, 126);
        assert_eq!(hits[0].path, b"p/42".to_vec());

        assert!(reader.lookup(10_000).unwrap().is_empty());
    }

    #[test]
    fn test_multi_row_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(tmp.path());
        let mut rows: Vec<ContentInRevisionRow> =
            (0..100).map(|i| ContentInRevisionRow { content: i, revision: i, path: b"x".to_vec() }).collect();
        rows.push(ContentInRevisionRow { content: 7, revision: 70, path: b"a".to_vec() });
        rows.push(ContentInRevisionRow { content: 7, revision: 71, path: b"b/a".to_vec() });
        build_table(&store, rows, 2);

        let reader = reader(&store);
        let mut hits = reader.lookup(7).unwrap();
        hits.sort();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|r| r.content == 7));
    }

    #[test]
    fn test_ef_prunes_untouched_parts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(tmp.path());
        let rows: Vec<ContentInRevisionRow> =
            (0..64).map(|i| ContentInRevisionRow { content: i, revision: i, path: b"f".to_vec() }).collect();
        build_table(&store, rows, 8);

        let counters = Arc::new(QueryCounters::default());
        let reader: TableReader<ContentInRevisionRow> =
            TableReader::open(&store, Arc::new(ReaderCaches::default()), counters.clone()).unwrap();
        reader.lookup(1).unwrap();
        // All parts but the owning one are pruned without opening the file
        assert_eq!(counters.files_pruned_by_ef.load(Ordering::Relaxed) as usize, reader.num_parts() - 1);
    }

    #[test]
    fn test_corrupt_sidecar_quarantines_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(tmp.path());
        let rows: Vec<ContentInRevisionRow> =
            (0..16).map(|i| ContentInRevisionRow { content: i, revision: i, path: b"f".to_vec() }).collect();
        build_table(&store, rows, 1);

        let handle = store.open(ContentInRevisionRow::TABLE).unwrap();
        fs::write(&handle.parts[0].sidecar, b"garbage").unwrap();

        let reader = reader(&store);
        assert!(matches!(reader.lookup(3), Err(StoreError::Sidecar { .. })));
        // Subsequent lookups skip the quarantined file instead of erroring
        assert!(reader.lookup(3).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_many_preserves_order_and_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(tmp.path());
        let rows: Vec<ContentInRevisionRow> =
            (0..32).map(|i| ContentInRevisionRow { content: i, revision: i + 100, path: b"f".to_vec() }).collect();
        build_table(&store, rows, 2);

        let reader = reader(&store);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let results = reader.lookup_many(&[3, 3, 99], &pool);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap()[0].revision, 103);
        assert_eq!(results[1].as_ref().unwrap()[0].revision, 103);
        assert!(results[2].as_ref().unwrap().is_empty());
    }
}
