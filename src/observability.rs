use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking operations. Labels: operation, outcome.
pub const BOOKINGS_TOTAL: &str = "reservo_bookings_total";

/// Counter: operations refused because the slot was taken. Labels: operation.
pub const CONFLICTS_TOTAL: &str = "reservo_conflicts_total";

/// Histogram: operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "reservo_operation_duration_seconds";

/// Histogram: slots returned per availability query.
pub const AVAILABILITY_SLOTS: &str = "reservo_availability_slots";

// ── Background work ─────────────────────────────────────────────

/// Counter: stale requests rejected by the expiry sweep.
pub const REQUESTS_EXPIRED_TOTAL: &str = "reservo_requests_expired_total";

/// Engine operations, as metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Cancel,
    StoreCancel,
    Confirm,
    Reject,
    Start,
    Complete,
    Expire,
    Availability,
}

pub fn operation_label(op: Operation) -> &'static str {
    match op {
        Operation::Create => "create",
        Operation::Update => "update",
        Operation::Cancel => "cancel",
        Operation::StoreCancel => "store_cancel",
        Operation::Confirm => "confirm",
        Operation::Reject => "reject",
        Operation::Start => "start",
        Operation::Complete => "complete",
        Operation::Expire => "expire",
        Operation::Availability => "availability",
    }
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }

    #[test]
    fn labels_are_distinct() {
        let ops = [
            Operation::Create,
            Operation::Update,
            Operation::Cancel,
            Operation::StoreCancel,
            Operation::Confirm,
            Operation::Reject,
            Operation::Start,
            Operation::Complete,
            Operation::Expire,
            Operation::Availability,
        ];
        let mut labels: Vec<_> = ops.iter().map(|o| operation_label(*o)).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), ops.len());
    }
}
