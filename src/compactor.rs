use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::Engine;
use crate::observability::WAL_COMPACTIONS_TOTAL;

const CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Background task that rewrites a tenant's WAL from live state once
/// `threshold` events have been appended since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor pass. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            debug!("compacted WAL after {appends} appends");
            metrics::counter!(WAL_COMPACTIONS_TOTAL, "status" => "ok").increment(1);
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            metrics::counter!(WAL_COMPACTIONS_TOTAL, "status" => "error").increment(1);
            false
        }
    }
}
