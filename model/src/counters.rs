use std::sync::atomic::{AtomicU64, Ordering};

/// Query-side counters, exported by the monitor service in StatsD-compatible
/// `name:delta|c` lines.
#[derive(Default)]
pub struct QueryCounters {
    pub requests: AtomicU64,
    pub stream_items: AtomicU64,
    pub points_looked_up: AtomicU64,
    pub files_pruned_by_ef: AtomicU64,
    pub row_groups_skipped: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub deadline_exceeded: AtomicU64,
    pub empty_results: AtomicU64,
}

impl QueryCounters {
    pub fn snapshot(&self) -> QueryCountersSnapshot {
        QueryCountersSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            stream_items: self.stream_items.load(Ordering::Relaxed),
            points_looked_up: self.points_looked_up.load(Ordering::Relaxed),
            files_pruned_by_ef: self.files_pruned_by_ef.load(Ordering::Relaxed),
            row_groups_skipped: self.row_groups_skipped.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            deadline_exceeded: self.deadline_exceeded.load(Ordering::Relaxed),
            empty_results: self.empty_results.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct QueryCountersSnapshot {
    pub requests: u64,
    pub stream_items: u64,
    pub points_looked_up: u64,
    pub files_pruned_by_ef: u64,
    pub row_groups_skipped: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub deadline_exceeded: u64,
    pub empty_results: u64,
}

impl core::ops::Sub for &QueryCountersSnapshot {
    type Output = QueryCountersSnapshot;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output {
            requests: self.requests.saturating_sub(rhs.requests),
            stream_items: self.stream_items.saturating_sub(rhs.stream_items),
            points_looked_up: self.points_looked_up.saturating_sub(rhs.points_looked_up),
            files_pruned_by_ef: self.files_pruned_by_ef.saturating_sub(rhs.files_pruned_by_ef),
            row_groups_skipped: self.row_groups_skipped.saturating_sub(rhs.row_groups_skipped),
            cache_hits: self.cache_hits.saturating_sub(rhs.cache_hits),
            cache_misses: self.cache_misses.saturating_sub(rhs.cache_misses),
            deadline_exceeded: self.deadline_exceeded.saturating_sub(rhs.deadline_exceeded),
            empty_results: self.empty_results.saturating_sub(rhs.empty_results),
        }
    }
}

/// Builder-side counters, logged as per-stage throughput by the monitor.
#[derive(Default)]
pub struct BuildCounters {
    pub revisions_processed: AtomicU64,
    pub directories_processed: AtomicU64,
    pub frontier_directories: AtomicU64,
    pub fdir_rows: AtomicU64,
    pub cfd_rows: AtomicU64,
    pub crnf_rows: AtomicU64,
    pub parts_written: AtomicU64,
}

impl BuildCounters {
    pub fn snapshot(&self) -> BuildCountersSnapshot {
        BuildCountersSnapshot {
            revisions_processed: self.revisions_processed.load(Ordering::Relaxed),
            directories_processed: self.directories_processed.load(Ordering::Relaxed),
            frontier_directories: self.frontier_directories.load(Ordering::Relaxed),
            fdir_rows: self.fdir_rows.load(Ordering::Relaxed),
            cfd_rows: self.cfd_rows.load(Ordering::Relaxed),
            crnf_rows: self.crnf_rows.load(Ordering::Relaxed),
            parts_written: self.parts_written.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BuildCountersSnapshot {
    pub revisions_processed: u64,
    pub directories_processed: u64,
    pub frontier_directories: u64,
    pub fdir_rows: u64,
    pub cfd_rows: u64,
    pub crnf_rows: u64,
    pub parts_written: u64,
}

impl core::ops::Sub for &BuildCountersSnapshot {
    type Output = BuildCountersSnapshot;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output {
            revisions_processed: self.revisions_processed.saturating_sub(rhs.revisions_processed),
            directories_processed: self.directories_processed.saturating_sub(rhs.directories_processed),
            frontier_directories: self.frontier_directories.saturating_sub(rhs.frontier_directories),
            fdir_rows: self.fdir_rows.saturating_sub(rhs.fdir_rows),
            cfd_rows: self.cfd_rows.saturating_sub(rhs.cfd_rows),
            crnf_rows: self.crnf_rows.saturating_sub(rhs.crnf_rows),
            parts_written: self.parts_written.saturating_sub(rhs.parts_written),
        }
    }
}
