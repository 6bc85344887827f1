use parking_lot::RwLock;
use provenance_database::prelude::{ReaderCaches, StoreResult, TableReader, TableStore};
use provenance_model::counters::QueryCounters;
use provenance_model::rows::{ContentInFrontierDirRow, ContentInRevisionRow, FrontierDirInRevisionRow, NodeRow};
use provenance_model::{NodeId, Swhid};
use std::sync::Arc;
use triggered::Listener;

/// Readers over one immutable table set. The set's lifetime is bound to the
/// graph snapshot it was built against; queries keep an `Arc` to the set they
/// started with.
pub struct TableSet {
    pub nodes: TableReader<NodeRow>,
    pub fdir: TableReader<FrontierDirInRevisionRow>,
    pub cfd: TableReader<ContentInFrontierDirRow>,
    pub crnf: TableReader<ContentInRevisionRow>,
    node_count: u64,
}

impl TableSet {
    pub fn open(store: &dyn TableStore, caches: Arc<ReaderCaches>, counters: Arc<QueryCounters>) -> StoreResult<Self> {
        let nodes = TableReader::open(store, caches.clone(), counters.clone())?;
        let fdir = TableReader::open(store, caches.clone(), counters.clone())?;
        let cfd = TableReader::open(store, caches.clone(), counters.clone())?;
        let crnf = TableReader::open(store, caches, counters)?;
        let node_count = nodes.num_keys()?;
        Ok(Self { nodes, fdir, cfd, crnf, node_count })
    }

    /// Point query: node-id → SWHID through the `nodes` table.
    pub fn swhid_of(&self, node: NodeId, cancel: Option<&Listener>) -> StoreResult<Option<Swhid>> {
        let rows = self.nodes.lookup_with_cancel(node, cancel)?;
        Ok(rows.first().and_then(|row| Swhid::from_bytes(&row.swhid).ok()))
    }

    /// Fallback SWHID → node-id resolution: node ids are dense and assigned
    /// in SWHID wire order by the snapshot, so a binary search over the id
    /// space with one point query per probe locates the identifier.
    pub fn resolve_swhid(&self, swhid: &Swhid, cancel: Option<&Listener>) -> StoreResult<Option<NodeId>> {
        let wire = swhid.to_bytes();
        let (mut lo, mut hi) = (0u64, self.node_count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let Some(probe) = self.nodes.lookup_with_cancel(mid, cancel)?.into_iter().next() else {
                // dense id space has a hole: give up on the fallback
                return Ok(None);
            };
            match probe.swhid.cmp(&wire) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Some(mid)),
            }
        }
        Ok(None)
    }
}

/// Holds the active table set behind a readers–writer lock; the lock is taken
/// for the duration of the pointer swap only. Retired sets are dropped when
/// the last in-flight query releases its reference.
pub struct TableSetManager {
    current: RwLock<Arc<TableSet>>,
}

impl TableSetManager {
    pub fn new(initial: Arc<TableSet>) -> Self {
        Self { current: RwLock::new(initial) }
    }

    pub fn current(&self) -> Arc<TableSet> {
        self.current.read().clone()
    }

    /// Atomically installs a new set, returning the retired one.
    pub fn swap(&self, next: Arc<TableSet>) -> Arc<TableSet> {
        std::mem::replace(&mut *self.current.write(), next)
    }
}
