mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{calendar_slots, clamp_range};
pub use conflict::{has_conflict, overlapping_bookings};
pub use error::{EngineError, ErrorKind};
pub use store::{BookingStore, InMemoryStore, SharedLedger};

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OwnedRwLockWriteGuard;
use ulid::Ulid;

use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{self, Operation};

/// The booking engine. Share it as `Arc<Engine>`; every method takes `&self`.
pub struct Engine {
    config: EngineConfig,
    pub(super) catalog: Arc<dyn Catalog>,
    pub(super) store: Arc<dyn BookingStore>,
    pub(super) clock: Arc<dyn Clock>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn BookingStore>,
    ) -> Result<Self, EngineError> {
        if config.slot_interval_minutes == 0 {
            return Err(EngineError::InvalidConfig("slot interval must be positive"));
        }
        if config.max_advance_days == 0 {
            return Err(EngineError::InvalidConfig("advance window must be positive"));
        }
        Ok(Self {
            config,
            catalog,
            store,
            clock: Arc::new(SystemClock),
            notify: Arc::new(NotifyHub::new()),
        })
    }

    /// Engine over a fresh `InMemoryStore`.
    pub fn in_memory(config: EngineConfig, catalog: Arc<dyn Catalog>) -> Result<Self, EngineError> {
        Self::new(config, catalog, Arc::new(InMemoryStore::new()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notify(mut self, notify: Arc<NotifyHub>) -> Self {
        self.notify = notify;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> Ms {
        self.clock.now()
    }

    /// Service lookup for anything that claims new time: the store must take
    /// bookings, the service must belong to it and be switched on.
    pub(super) async fn bookable_service(
        &self,
        store_id: Ulid,
        service_id: Ulid,
    ) -> Result<Service, EngineError> {
        if !self.catalog.booking_enabled(store_id).await {
            return Err(EngineError::BookingDisabled(store_id));
        }
        let service = self
            .catalog
            .service(service_id)
            .await
            .filter(|s| s.store_id == store_id)
            .ok_or(EngineError::NotFound(service_id))?;
        if !service.is_active {
            return Err(EngineError::ServiceInactive(service_id));
        }
        Ok(service)
    }

    /// Lookup booking → service, get its ledger, acquire the write lock.
    pub(super) async fn lock_for_booking(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ServiceLedger>, EngineError> {
        let service_id = self
            .store
            .service_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let ledger = self
            .store
            .get_ledger(&service_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        Ok(ledger.write_owned().await)
    }

    /// Run `check` and `apply` against a booking while holding its ledger's
    /// write lock. Nothing is written unless `check` passes.
    pub(super) async fn transition<T>(
        &self,
        id: Ulid,
        check: impl FnOnce(&ServiceLedger, &Booking, Ms) -> Result<T, EngineError>,
        apply: impl FnOnce(&mut Booking, T, Ms) -> Event,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.lock_for_booking(&id).await?;
        let current = guard.get(&id).cloned().ok_or(EngineError::NotFound(id))?;
        let now = self.now();
        let checked = check(&guard, &current, now)?;

        let mut next = current;
        let event = apply(&mut next, checked, now);
        next.updated_at = now;
        self.commit(&mut guard, next.clone(), &event);
        Ok(next)
    }

    /// Write + index + notify in one call. Caller holds the ledger lock.
    pub(super) fn commit(&self, ledger: &mut ServiceLedger, booking: Booking, event: &Event) {
        self.store.index_booking(&booking);
        ledger.replace(booking);
        self.notify.send(event);
    }

    /// Would `span` fit on the service right now? `exclude` skips a booking
    /// being checked against itself.
    pub async fn has_conflict(
        &self,
        service_id: Ulid,
        span: Span,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        conflict::validate_span(&span)?;
        let service = self
            .catalog
            .service(service_id)
            .await
            .ok_or(EngineError::NotFound(service_id))?;
        let Some(ledger) = self.store.get_ledger(&service_id) else {
            return Ok(service.effective_capacity() == 0);
        };
        let guard = ledger.read().await;
        Ok(has_conflict(
            &guard,
            &service,
            &span,
            exclude,
            self.config.default_buffer_minutes,
        ))
    }
}

/// Record outcome and latency of one operation.
pub(super) fn observe<T>(op: Operation, started: Instant, result: &Result<T, EngineError>) {
    let label = observability::operation_label(op);
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::counter!(observability::BOOKINGS_TOTAL, "operation" => label, "outcome" => outcome)
        .increment(1);
    if let Err(EngineError::SlotUnavailable { .. }) = result {
        metrics::counter!(observability::CONFLICTS_TOTAL, "operation" => label).increment(1);
    }
    metrics::histogram!(observability::OPERATION_DURATION_SECONDS, "operation" => label)
        .record(started.elapsed().as_secs_f64());
}
