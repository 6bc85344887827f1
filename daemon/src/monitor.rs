use provenance_core::info;
use provenance_core::task::service::{AsyncService, AsyncServiceFuture};
use provenance_core::task::tick::{TickReason, TickService};
use provenance_model::counters::{QueryCounters, QueryCountersSnapshot};
use std::sync::Arc;
use std::time::Duration;

const MONITOR: &str = "query-monitor";
const SNAPSHOT_INTERVAL_IN_SECS: u64 = 10;

/// Periodically logs query counter deltas as StatsD-compatible counter
/// lines (`name:delta|c`).
pub struct QueryMonitor {
    tick_service: Arc<TickService>,
    counters: Arc<QueryCounters>,
}

impl QueryMonitor {
    pub fn new(tick_service: Arc<TickService>, counters: Arc<QueryCounters>) -> Self {
        Self { tick_service, counters }
    }

    async fn worker(self: &Arc<Self>) {
        let mut last_snapshot = self.counters.snapshot();
        while let TickReason::Wakeup = self.tick_service.tick(Duration::from_secs(SNAPSHOT_INTERVAL_IN_SECS)).await {
            let snapshot = self.counters.snapshot();
            let delta = &snapshot - &last_snapshot;
            if delta.requests > 0 || delta.points_looked_up > 0 {
                info!("{}", statsd_line(&delta));
            }
            last_snapshot = snapshot;
        }
    }
}

fn statsd_line(delta: &QueryCountersSnapshot) -> String {
    format!(
        "requests:{}|c stream_items:{}|c points_looked_up:{}|c files_pruned_by_ef:{}|c row_groups_skipped:{}|c \
         cache_hits:{}|c cache_misses:{}|c deadline_exceeded:{}|c empty_results:{}|c",
        delta.requests,
        delta.stream_items,
        delta.points_looked_up,
        delta.files_pruned_by_ef,
        delta.row_groups_skipped,
        delta.cache_hits,
        delta.cache_misses,
        delta.deadline_exceeded,
        delta.empty_results,
    )
}

impl AsyncService for QueryMonitor {
    fn ident(self: Arc<Self>) -> &'static str {
        MONITOR
    }

    fn start(self: Arc<Self>) -> AsyncServiceFuture {
        Box::pin(async move {
            self.worker().await;
            Ok(())
        })
    }

    fn signal_exit(self: Arc<Self>) {
        self.tick_service.shutdown();
    }

    fn stop(self: Arc<Self>) -> AsyncServiceFuture {
        Box::pin(async move { Ok(()) })
    }
}
