//! The resolution pipeline: Resolving → Scanning → Merging → Enriching.
//!
//! Each stage is a linear step of [`ProvenanceQuery::where_is_one`]; errors
//! short-circuit the element they belong to and never poison siblings of a
//! batched request.

use crate::errors::{QueryError, QueryResult};
use crate::tables::{TableSet, TableSetManager};
use provenance_core::{debug, trace, warn};
use provenance_database::prelude::{ReaderCaches, ReaderCachesConfig, StoreError, StoreResult, TableStore};
use provenance_graph::DynGraph;
use provenance_model::counters::QueryCounters;
use provenance_model::path::join_paths;
use provenance_model::{NodeId, Swhid, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use triggered::{trigger, Listener, Trigger};

#[derive(Clone, Debug)]
pub struct QueryConfig {
    /// Whole-request budget.
    pub request_timeout: Duration,
    /// Budget of each point lookup dispatched to the worker pool.
    pub lookup_timeout: Duration,
    /// Retries for transient storage failures, with exponential backoff.
    pub max_retries: usize,
    /// Worker threads of the shared lookup pool.
    pub lookup_threads: usize,
    /// Concurrent elements of a streaming request.
    pub stream_concurrency: usize,
    pub caches: ReaderCachesConfig,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            lookup_timeout: Duration::from_secs(5),
            max_retries: 3,
            lookup_threads: std::cmp::max(num_cpus::get() / 2, 2),
            stream_concurrency: 32,
            caches: ReaderCachesConfig::default(),
        }
    }
}

/// One provenance answer. Both fields empty means "no known provenance".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvenanceResult {
    pub swhid: Swhid,
    pub anchor: Option<Swhid>,
    pub origin: Option<String>,
}

impl ProvenanceResult {
    fn empty(swhid: Swhid) -> Self {
        Self { swhid, anchor: None, origin: None }
    }
}

/// A provenance candidate before the tie-break: the anchor revision, its
/// committer date, and the path from the revision root to the content.
struct Candidate {
    date: Option<Timestamp>,
    revision_swhid: Swhid,
    revision: NodeId,
    path: Vec<u8>,
}

/// The query engine handle: table-set pointer, caches, lookup pool, and the
/// graph client, constructed at startup and shared by reference.
pub struct ProvenanceQuery {
    graph: DynGraph,
    tables: TableSetManager,
    caches: Arc<ReaderCaches>,
    pool: Arc<rayon::ThreadPool>,
    counters: Arc<QueryCounters>,
    config: QueryConfig,
}

impl ProvenanceQuery {
    pub fn new(graph: DynGraph, store: &dyn TableStore, config: QueryConfig) -> StoreResult<Arc<Self>> {
        let caches = Arc::new(ReaderCaches::new(config.caches));
        let counters = Arc::new(QueryCounters::default());
        let tables = TableSet::open(store, caches.clone(), counters.clone())?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.lookup_threads)
            .thread_name(|i| format!("lookup-{i}"))
            .build()
            .expect("failed to build the lookup pool");
        Ok(Arc::new(Self {
            graph,
            tables: TableSetManager::new(Arc::new(tables)),
            caches,
            pool: Arc::new(pool),
            counters,
            config,
        }))
    }

    pub fn counters(&self) -> Arc<QueryCounters> {
        self.counters.clone()
    }

    /// Swaps in a freshly built table set (e.g. after a new snapshot build).
    pub fn reload(&self, store: &dyn TableStore) -> StoreResult<()> {
        let next = TableSet::open(store, self.caches.clone(), self.counters.clone())?;
        let _retired = self.tables.swap(Arc::new(next));
        debug!("table set swapped");
        Ok(())
    }

    /// One anchor revision and one origin for the given SWHID, or an empty
    /// result. Deterministic for a fixed table set: candidates are ordered by
    /// `(earliest_date, revision_swhid, origin_url, path)`; the origin is a
    /// function of the revision, so ordering by `(date, revision, path)` and
    /// resolving the winner's origin realizes the same total order.
    pub async fn where_is_one(&self, swhid: Swhid) -> QueryResult<ProvenanceResult> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let (cancel_trigger, cancel) = trigger();
        let _guard = TriggerOnDrop(cancel_trigger);
        match tokio::time::timeout(self.config.request_timeout, self.resolve_one(swhid, cancel.clone())).await {
            Ok(result) => result,
            Err(_) => {
                self.counters.deadline_exceeded.fetch_add(1, Ordering::Relaxed);
                Err(QueryError::DeadlineExceeded)
            }
        }
    }

    /// Streaming variant: each input element resolves independently; output
    /// order is unspecified and duplicates in the input produce duplicates in
    /// the output. Dropping the receiver cancels the remaining work.
    pub fn where_are_one(self: &Arc<Self>, swhids: Vec<Swhid>) -> mpsc::Receiver<(Swhid, QueryResult<ProvenanceResult>)> {
        let (tx, rx) = mpsc::channel(self.config.stream_concurrency.max(1));
        let semaphore = Arc::new(Semaphore::new(self.config.stream_concurrency.max(1)));
        for swhid in swhids {
            let engine = self.clone();
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                let result = engine.where_is_one(swhid).await;
                engine.counters.stream_items.fetch_add(1, Ordering::Relaxed);
                // a closed channel means the consumer hung up; drop the result
                let _ = tx.send((swhid, result)).await;
            });
        }
        rx
    }

    async fn resolve_one(&self, swhid: Swhid, cancel: Listener) -> QueryResult<ProvenanceResult> {
        let tables = self.tables.current();

        // Resolving
        let Some(node) = self.resolve_node(&tables, &swhid, &cancel).await? else {
            self.counters.empty_results.fetch_add(1, Ordering::Relaxed);
            return Ok(ProvenanceResult::empty(swhid));
        };

        // Scanning: the direct branch and the frontier branch
        let direct = {
            let tables = tables.clone();
            let cancel = cancel.clone();
            self.run_lookup(move || tables.crnf.lookup_with_cancel(node, Some(&cancel)))
        };
        let via_frontier = {
            let tables = tables.clone();
            let cancel = cancel.clone();
            self.run_lookup(move || tables.cfd.lookup_with_cancel(node, Some(&cancel)))
        };
        let (direct, via_frontier) = tokio::join!(direct, via_frontier);
        let (direct, via_frontier) = (direct?, via_frontier?);

        let mut tuples: Vec<(NodeId, Vec<u8>)> =
            direct.into_iter().map(|row| (row.revision, row.path)).collect();

        // Frontier branch: join CFD suffixes with FDIR prefixes per directory
        let mut suffixes: HashMap<NodeId, Vec<Vec<u8>>> = HashMap::new();
        for row in via_frontier {
            suffixes.entry(row.frontier_dir).or_default().push(row.path);
        }
        for (frontier_dir, suffix_paths) in suffixes {
            let anchors = {
                let tables = tables.clone();
                let cancel = cancel.clone();
                self.run_lookup(move || tables.fdir.lookup_with_cancel(frontier_dir, Some(&cancel))).await?
            };
            for anchor in &anchors {
                for suffix in &suffix_paths {
                    tuples.push((anchor.revision, join_paths(&anchor.path, suffix)));
                }
            }
        }

        if tuples.is_empty() {
            self.counters.empty_results.fetch_add(1, Ordering::Relaxed);
            return Ok(ProvenanceResult::empty(swhid));
        }

        // Merging: order by the tie-break key and keep the winner
        let mut candidates = Vec::with_capacity(tuples.len());
        for (revision, path) in tuples {
            let date = self.graph.committer_date(revision);
            let revision_swhid = match self.graph.swhid(revision) {
                Some(s) => s,
                None => {
                    let tables = tables.clone();
                    let cancel = cancel.clone();
                    self.run_lookup(move || tables.swhid_of(revision, Some(&cancel)))
                        .await?
                        .ok_or_else(|| QueryError::Corruption(format!("revision {revision} has no identifier")))?
                }
            };
            candidates.push(Candidate { date, revision_swhid, revision, path });
        }
        candidates.sort_by(|a, b| {
            (a.date.is_none(), a.date, a.revision_swhid, &a.path).cmp(&(b.date.is_none(), b.date, b.revision_swhid, &b.path))
        });
        let winner = candidates.into_iter().next().expect("at least one candidate");
        trace!("{} anchored at {} via {}", swhid, winner.revision_swhid, String::from_utf8_lossy(&winner.path));

        // Enriching
        let origin = self.graph.origin_of(winner.revision).map(|(_, url)| url);
        Ok(ProvenanceResult { swhid, anchor: Some(winner.revision_swhid), origin })
    }

    async fn resolve_node(&self, tables: &Arc<TableSet>, swhid: &Swhid, cancel: &Listener) -> QueryResult<Option<NodeId>> {
        if let Some(node) = self.graph.node_id(swhid) {
            return Ok(Some(node));
        }
        let tables = tables.clone();
        let cancel = cancel.clone();
        let swhid = *swhid;
        self.run_lookup(move || tables.resolve_swhid(&swhid, Some(&cancel))).await
    }

    /// Dispatches a blocking point lookup to the shared pool and awaits it
    /// under the sub-lookup deadline, retrying transient failures with
    /// exponential backoff. A timed-out job keeps running on its worker; its
    /// result is discarded and the cooperative cancel token stops it at the
    /// next checkpoint.
    async fn run_lookup<T, F>(&self, lookup: F) -> QueryResult<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, StoreError> + Clone + Send + 'static,
    {
        let mut attempt = 0;
        loop {
            let (tx, rx) = oneshot::channel();
            let job = lookup.clone();
            self.pool.spawn(move || {
                let _ = tx.send(job());
            });
            let outcome = match tokio::time::timeout(self.config.lookup_timeout, rx).await {
                Err(_) => {
                    self.counters.deadline_exceeded.fetch_add(1, Ordering::Relaxed);
                    return Err(QueryError::DeadlineExceeded);
                }
                Ok(Err(_)) => Err(QueryError::Unavailable("lookup worker dropped its result".to_string())),
                Ok(Ok(result)) => result.map_err(QueryError::from),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(50 * (1 << attempt.min(6)));
                    warn!("transient lookup failure (attempt {attempt}): {err}; retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Fires the cooperative cancellation token when the request future is
/// dropped (timeout or consumer hang-up).
struct TriggerOnDrop(Trigger);

impl Drop for TriggerOnDrop {
    fn drop(&mut self) {
        self.0.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_database::prelude::LocalTableStore;
    use provenance_graph::fixtures::GraphBuilder;
    use provenance_graph::{GraphSnapshot, MemoryGraph};
    use provenance_index::IndexBuilder;
    use provenance_model::NodeType;

    fn build(snapshot: GraphSnapshot, root: &std::path::Path) -> (DynGraph, LocalTableStore) {
        let graph: DynGraph = Arc::new(MemoryGraph::from_snapshot(snapshot).unwrap());
        let store = LocalTableStore::new(root);
        let builder = IndexBuilder::new(graph.clone(), Arc::new(LocalTableStore::new(root)), 2).unwrap();
        builder.earliest_timestamps().unwrap();
        builder.directory_max_leaf_timestamps().unwrap();
        builder.directory_frontier().unwrap();
        builder.relations().unwrap();
        (graph, store)
    }

    fn engine(graph: DynGraph, store: &LocalTableStore) -> Arc<ProvenanceQuery> {
        ProvenanceQuery::new(graph, store, QueryConfig { lookup_threads: 2, ..Default::default() }).unwrap()
    }

    #[tokio::test]
    async fn test_anchor_prefers_oldest_revision() {
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        let lib = builder.directory(&[(b"a.c", c)]);
        let root = builder.directory(&[(b"lib", lib)]);
        let r1 = builder.revision(root, Some(10), &[]);
        let r2 = builder.revision(root, Some(20), &[r1]);
        let snap = builder.snapshot(&[r2]);
        builder.origin("https://example.org/repo", &[snap]);

        let tmp = tempfile::tempdir().unwrap();
        let (graph, store) = build(builder.build(), tmp.path());
        let engine = engine(graph.clone(), &store);

        let c_swhid = graph.swhid(c).unwrap();
        let result = engine.where_is_one(c_swhid).await.unwrap();
        assert_eq!(result.anchor, Some(graph.swhid(r1).unwrap()));
        assert_eq!(result.origin.as_deref(), Some("https://example.org/repo"));
    }

    #[tokio::test]
    async fn test_unknown_content_yields_empty_result() {
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        let root = builder.directory(&[(b"f", c)]);
        builder.revision(root, Some(10), &[]);

        let tmp = tempfile::tempdir().unwrap();
        let (graph, store) = build(builder.build(), tmp.path());
        let engine = engine(graph.clone(), &store);

        // a valid SWHID that is not in the snapshot
        let missing: Swhid = "swh:1:cnt:ffffffffffffffffffffffffffffffffffffffff".parse().unwrap();
        let result = engine.where_is_one(missing).await.unwrap();
        assert_eq!(result, ProvenanceResult::empty(missing));
    }

    #[tokio::test]
    async fn test_dateless_revision_is_still_an_anchor() {
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        let root = builder.directory(&[(b"orphan", c)]);
        let r = builder.revision(root, None, &[]);

        let tmp = tempfile::tempdir().unwrap();
        let (graph, store) = build(builder.build(), tmp.path());
        let engine = engine(graph.clone(), &store);

        let result = engine.where_is_one(graph.swhid(c).unwrap()).await.unwrap();
        assert_eq!(result.anchor, Some(graph.swhid(r).unwrap()));
        assert_eq!(result.origin, None);
    }

    #[tokio::test]
    async fn test_where_are_one_preserves_counts_and_duplicates() {
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        let root = builder.directory(&[(b"f", c)]);
        builder.revision(root, Some(10), &[]);

        let tmp = tempfile::tempdir().unwrap();
        let (graph, store) = build(builder.build(), tmp.path());
        let engine = engine(graph.clone(), &store);

        let known = graph.swhid(c).unwrap();
        let unknown: Swhid = "swh:1:cnt:ffffffffffffffffffffffffffffffffffffffff".parse().unwrap();
        let inputs = vec![known, unknown, known, unknown, known];
        let mut rx = engine.where_are_one(inputs.clone());
        let mut results = Vec::new();
        while let Some(item) = rx.recv().await {
            results.push(item);
        }
        assert_eq!(results.len(), inputs.len());
        let with_anchor = results.iter().filter(|(_, r)| r.as_ref().unwrap().anchor.is_some()).count();
        assert_eq!(with_anchor, 3);
    }

    #[tokio::test]
    async fn test_revision_lookup_returns_itself_content_only_semantics() {
        // directories and revisions resolve to nodes but have no provenance
        // rows keyed by their id in CRNF/CFD; expect an empty result
        let mut builder = GraphBuilder::new();
        let c = builder.content();
        let root = builder.directory(&[(b"f", c)]);
        let r = builder.revision(root, Some(10), &[]);

        let tmp = tempfile::tempdir().unwrap();
        let (graph, store) = build(builder.build(), tmp.path());
        let engine = engine(graph.clone(), &store);

        let result = engine.where_is_one(graph.swhid(r).unwrap()).await.unwrap();
        assert_eq!(result.anchor, None);
    }

    #[test]
    fn test_candidate_ordering_matches_tie_break() {
        let old: Swhid = "swh:1:rev:0000000000000000000000000000000000000001".parse().unwrap();
        let young: Swhid = "swh:1:rev:0000000000000000000000000000000000000002".parse().unwrap();
        let mut candidates = vec![
            Candidate { date: Some(20), revision_swhid: young, revision: 2, path: b"a".to_vec() },
            Candidate { date: None, revision_swhid: young, revision: 2, path: b"a".to_vec() },
            Candidate { date: Some(10), revision_swhid: old, revision: 1, path: b"b/a".to_vec() },
            Candidate { date: Some(10), revision_swhid: old, revision: 1, path: b"a".to_vec() },
        ];
        candidates.sort_by(|a, b| {
            (a.date.is_none(), a.date, a.revision_swhid, &a.path).cmp(&(b.date.is_none(), b.date, b.revision_swhid, &b.path))
        });
        assert_eq!(candidates[0].path, b"a".to_vec());
        assert_eq!(candidates[0].date, Some(10));
        assert!(candidates.last().unwrap().date.is_none());
    }
}
