use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "spacebook_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "spacebook_query_duration_seconds";

/// Counter: engine operations rejected. Labels: op, kind.
pub const REJECTIONS_TOTAL: &str = "spacebook_rejections_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "spacebook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "spacebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "spacebook_connections_rejected_total";

/// Gauge: number of loaded tenants.
pub const TENANTS_ACTIVE: &str = "spacebook_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "spacebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "spacebook_wal_flush_batch_size";

/// Counter: background WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "spacebook_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a command, used on every per-statement metric.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertSpace(_) => "insert_space",
        Command::UpdateSpace { .. } => "update_space",
        Command::DeleteSpace { .. } => "delete_space",
        Command::SelectSpaces(_) => "select_spaces",
        Command::SelectSpaceTypes => "select_space_types",
        Command::InsertBooking(_) => "insert_booking",
        Command::UpdateBooking { .. } => "update_booking",
        Command::CancelBooking { .. } => "cancel_booking",
        Command::ConfirmBooking { .. } => "confirm_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectBooking { .. } => "select_booking",
        Command::SelectUserBookings(_) => "select_user_bookings",
        Command::SelectSpaceBookings { .. } => "select_space_bookings",
        Command::SelectAvailability { .. } => "select_availability",
    }
}
