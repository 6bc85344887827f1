use crate::errors::{IndexError, IndexResult};
use crate::properties::TimestampArray;
use crate::stages::directory_max::compute_directory_max_timestamps;
use crate::stages::earliest::compute_earliest_timestamps;
use crate::stages::frontier::compute_directory_frontier;
use crate::stages::relations::collect_relations;
use crate::{DIRECTORY_FRONTIER, DIRECTORY_MAX_LEAF_TIMESTAMPS, EARLIEST_TIMESTAMPS};
use provenance_core::info;
use provenance_database::prelude::{EliasFano, PartitionedTableWriter, TableRow, TableStore, WriterSummary, SUCCESS_MARKER};
use provenance_graph::DynGraph;
use provenance_model::counters::BuildCounters;
use provenance_model::rows::NodeRow;
use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const FRONTIER_EF_FILE: &str = "frontier.ef";
const FRONTIER_LIST_FILE: &str = "frontier.bin";

/// One part per million rows keeps point lookups to a single small file
/// while avoiding a sea of tiny files on large builds.
fn partition_count(rows: usize) -> usize {
    (rows / 1_000_000).clamp(1, 256)
}

/// The batch pipeline transforming a graph snapshot into the four provenance
/// tables. Each stage reads its prerequisites from the store, writes into a
/// staging directory and promotes it atomically, so a crashed stage re-runs
/// from scratch without sharing state with the failed attempt.
pub struct IndexBuilder {
    graph: DynGraph,
    store: Arc<dyn TableStore>,
    pool: Arc<rayon::ThreadPool>,
    counters: Arc<BuildCounters>,
}

impl IndexBuilder {
    pub fn new(graph: DynGraph, store: Arc<dyn TableStore>, workers: usize) -> IndexResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("index-{i}"))
            .build()
            .map_err(|e| IndexError::InvariantViolation(format!("failed to build worker pool: {e}")))?;
        Ok(Self { graph, store, pool: Arc::new(pool), counters: Arc::new(BuildCounters::default()) })
    }

    pub fn counters(&self) -> Arc<BuildCounters> {
        self.counters.clone()
    }

    /// Stage A: `earliest-timestamps`.
    pub fn earliest_timestamps(&self) -> IndexResult<()> {
        info!("computing earliest timestamps over {} nodes", self.graph.num_nodes());
        let earliest = compute_earliest_timestamps(self.graph.as_ref(), &self.pool, &self.counters);
        self.promote_property(EARLIEST_TIMESTAMPS, &earliest)
    }

    /// Stage B: `directory-max-leaf-timestamps`.
    pub fn directory_max_leaf_timestamps(&self) -> IndexResult<()> {
        let earliest = self.load_property(EARLIEST_TIMESTAMPS)?;
        info!("aggregating directory max-leaf timestamps");
        let max_leaf = compute_directory_max_timestamps(self.graph.as_ref(), &earliest, &self.pool, &self.counters)?;
        self.promote_property(DIRECTORY_MAX_LEAF_TIMESTAMPS, &max_leaf)
    }

    /// Stage C: `directory-frontier`.
    pub fn directory_frontier(&self) -> IndexResult<()> {
        let max_leaf = self.load_property(DIRECTORY_MAX_LEAF_TIMESTAMPS)?;
        let frontier = compute_directory_frontier(self.graph.as_ref(), &max_leaf, &self.pool, &self.counters);
        info!("selected {} frontier directories", frontier.len());

        let staging = self.store.create_staging(DIRECTORY_FRONTIER)?;
        let ef_path = staging.join(FRONTIER_EF_FILE);
        fs::write(&ef_path, EliasFano::from_sorted(&frontier).encode())
            .map_err(|e| IndexError::Io { path: ef_path, source: e })?;
        let list_path = staging.join(FRONTIER_LIST_FILE);
        fs::write(&list_path, encode_node_list(&frontier)).map_err(|e| IndexError::Io { path: list_path, source: e })?;
        let marker = staging.join(SUCCESS_MARKER);
        fs::write(&marker, b"").map_err(|e| IndexError::Io { path: marker, source: e })?;
        self.store.put_atomic(DIRECTORY_FRONTIER, &staging)?;
        Ok(())
    }

    /// Stage D: `relations` — the three relation tables plus `nodes`.
    pub fn relations(&self) -> IndexResult<()> {
        let max_leaf = self.load_property(DIRECTORY_MAX_LEAF_TIMESTAMPS)?;
        let frontier = self.load_frontier()?;

        info!("walking revision trees against {} frontier directories", frontier.len());
        let rows = collect_relations(self.graph.as_ref(), &max_leaf, &frontier, &self.pool, &self.counters);
        self.write_table(rows.fdir)?;
        self.write_table(rows.cfd)?;
        self.write_table(rows.crnf)?;

        let nodes = (0..self.graph.num_nodes())
            .map(|node| {
                self.graph
                    .swhid(node)
                    .map(|swhid| NodeRow { node_id: node, swhid: swhid.to_bytes() })
                    .ok_or_else(|| IndexError::InvariantViolation(format!("graph has no identifier for node {node}")))
            })
            .collect::<IndexResult<Vec<_>>>()?;
        self.write_table(nodes)?;
        Ok(())
    }

    fn write_table<R: TableRow>(&self, rows: Vec<R>) -> IndexResult<WriterSummary> {
        let staging = self.store.create_staging(R::TABLE)?;
        let mut writer = PartitionedTableWriter::new(&staging, partition_count(rows.len()));
        writer.extend(rows);
        let summary = writer.finish()?;
        self.store.put_atomic(R::TABLE, &staging)?;
        self.counters.parts_written.fetch_add(summary.parts_written, Ordering::Relaxed);
        info!("{}: {} rows, {} distinct keys, {} parts", R::TABLE, summary.rows, summary.distinct_keys, summary.parts_written);
        Ok(summary)
    }

    fn promote_property(&self, name: &str, array: &TimestampArray) -> IndexResult<()> {
        let staging = self.store.create_staging(name)?;
        array.save(&staging)?;
        let marker = staging.join(SUCCESS_MARKER);
        fs::write(&marker, b"").map_err(|e| IndexError::Io { path: marker, source: e })?;
        self.store.put_atomic(name, &staging)?;
        Ok(())
    }

    fn load_property(&self, name: &str) -> IndexResult<TimestampArray> {
        let handle = self
            .store
            .open(name)
            .map_err(|e| IndexError::IncompleteInput(format!("{name} is not built yet: {e}")))?;
        let array = TimestampArray::load(&handle.dir)?;
        if array.len() as u64 != self.graph.num_nodes() {
            return Err(IndexError::IncompleteInput(format!(
                "{name} was built against a different snapshot ({} slots, {} nodes)",
                array.len(),
                self.graph.num_nodes()
            )));
        }
        Ok(array)
    }

    fn load_frontier(&self) -> IndexResult<EliasFano> {
        let handle = self
            .store
            .open(DIRECTORY_FRONTIER)
            .map_err(|e| IndexError::IncompleteInput(format!("{DIRECTORY_FRONTIER} is not built yet: {e}")))?;
        let path = handle.dir.join(FRONTIER_EF_FILE);
        let bytes = fs::read(&path).map_err(|e| IndexError::Io { path: path.clone(), source: e })?;
        EliasFano::decode(&bytes)
            .map_err(|e| IndexError::IncompleteInput(format!("{}: undecodable frontier set: {e}", path.display())))
    }
}

/// Plain sorted list written next to the Elias–Fano form for external
/// consumers of the frontier set.
fn encode_node_list(nodes: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + nodes.len() * 8);
    bytes.extend_from_slice(&(nodes.len() as u64).to_le_bytes());
    for node in nodes {
        bytes.extend_from_slice(&node.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_database::prelude::LocalTableStore;
    use provenance_graph::fixtures::demo_snapshot;
    use provenance_graph::MemoryGraph;
    use provenance_model::rows::{ContentInFrontierDirRow, ContentInRevisionRow, FrontierDirInRevisionRow};
    use std::path::Path;

    fn build_all(root: &Path) -> (DynGraph, Arc<LocalTableStore>) {
        let graph: DynGraph = Arc::new(MemoryGraph::from_snapshot(demo_snapshot()).unwrap());
        let store = Arc::new(LocalTableStore::new(root));
        let builder = IndexBuilder::new(graph.clone(), store.clone(), 2).unwrap();
        builder.earliest_timestamps().unwrap();
        builder.directory_max_leaf_timestamps().unwrap();
        builder.directory_frontier().unwrap();
        builder.relations().unwrap();
        (graph, store)
    }

    #[test]
    fn test_stage_order_is_enforced() {
        let tmp = tempfile::tempdir().unwrap();
        let graph: DynGraph = Arc::new(MemoryGraph::from_snapshot(demo_snapshot()).unwrap());
        let store = Arc::new(LocalTableStore::new(tmp.path()));
        let builder = IndexBuilder::new(graph, store, 2).unwrap();
        assert!(matches!(builder.directory_max_leaf_timestamps(), Err(IndexError::IncompleteInput(_))));
        assert!(matches!(builder.relations(), Err(IndexError::IncompleteInput(_))));
    }

    #[test]
    fn test_full_pipeline_produces_all_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let (_graph, store) = build_all(tmp.path());

        for table in [
            provenance_model::rows::NODES,
            provenance_model::rows::FRONTIER_DIRECTORIES_IN_REVISIONS,
            provenance_model::rows::CONTENTS_IN_FRONTIER_DIRECTORIES,
            provenance_model::rows::CONTENTS_IN_REVISIONS_WITHOUT_FRONTIERS,
        ] {
            let handle = store.open(table).unwrap();
            assert!(!handle.parts.is_empty(), "{table} has no part files");
        }
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let tmp_a = tempfile::tempdir().unwrap();
        let tmp_b = tempfile::tempdir().unwrap();
        build_all(tmp_a.path());
        build_all(tmp_b.path());

        for table in [
            provenance_model::rows::FRONTIER_DIRECTORIES_IN_REVISIONS,
            provenance_model::rows::CONTENTS_IN_FRONTIER_DIRECTORIES,
            provenance_model::rows::CONTENTS_IN_REVISIONS_WITHOUT_FRONTIERS,
            provenance_model::rows::NODES,
        ] {
            let a = collect_table_bytes(tmp_a.path(), table);
            let b = collect_table_bytes(tmp_b.path(), table);
            assert_eq!(a, b, "{table} differs between rebuilds");
        }
    }

    fn collect_table_bytes(root: &Path, table: &str) -> Vec<Vec<u8>> {
        let store = LocalTableStore::new(root);
        let handle = store.open(table).unwrap();
        handle.parts.iter().flat_map(|p| [fs::read(&p.parquet).unwrap(), fs::read(&p.sidecar).unwrap()]).collect()
    }

    #[test]
    fn test_coverage_and_path_faithfulness() {
        use crate::walk::{walk_tree, VisitFlow};
        use provenance_database::prelude::{ReaderCaches, TableReader};
        use provenance_model::counters::QueryCounters;
        use std::collections::HashSet;

        let tmp = tempfile::tempdir().unwrap();
        let (graph, store) = build_all(tmp.path());
        let caches = Arc::new(ReaderCaches::default());
        let counters = Arc::new(QueryCounters::default());
        let fdir: TableReader<FrontierDirInRevisionRow> =
            TableReader::open(store.as_ref(), caches.clone(), counters.clone()).unwrap();
        let cfd: TableReader<ContentInFrontierDirRow> =
            TableReader::open(store.as_ref(), caches.clone(), counters.clone()).unwrap();
        let crnf: TableReader<ContentInRevisionRow> = TableReader::open(store.as_ref(), caches, counters).unwrap();

        // Ground truth: every (content, revision, path) in the graph
        let mut expected: HashSet<(u64, u64, Vec<u8>)> = HashSet::new();
        for revision in graph.nodes_of_type(provenance_model::NodeType::Revision) {
            if let Some(root) = graph.root_directory(revision) {
                walk_tree(
                    graph.as_ref(),
                    root,
                    |_, _| VisitFlow::Descend,
                    |content, path| {
                        expected.insert((content, revision, path.to_vec()));
                    },
                );
            }
        }

        // Union query over both branches must reproduce exactly that set
        let contents: HashSet<u64> = expected.iter().map(|(content, _, _)| *content).collect();
        let mut actual: HashSet<(u64, u64, Vec<u8>)> = HashSet::new();
        for &content in &contents {
            for row in crnf.lookup(content).unwrap() {
                actual.insert((row.content, row.revision, row.path));
            }
            for inner in cfd.lookup(content).unwrap() {
                for outer in fdir.lookup(inner.frontier_dir).unwrap() {
                    actual.insert((
                        content,
                        outer.revision,
                        provenance_model::path::join_paths(&outer.path, &inner.path),
                    ));
                }
            }
        }
        assert_eq!(actual, expected);
    }
}
