use std::cmp::Reverse;
use std::time::Instant;

use ulid::Ulid;

use crate::model::*;
use crate::observability::{self, Operation};

use super::availability::{calendar_slots, clamp_range};
use super::conflict::check_timestamp;
use super::{observe, Engine, EngineError};

impl Engine {
    /// Calendar view of one service over `[from, to)`, with `to` clamped to
    /// the advance window. Slots occupied by someone other than `viewer`
    /// reveal only the service name.
    pub async fn get_calendar_availability(
        &self,
        store_id: Ulid,
        service_id: Ulid,
        from: Ms,
        to: Ms,
        viewer: Option<Ulid>,
    ) -> Result<Availability, EngineError> {
        let started = Instant::now();
        let result = async {
            check_timestamp(from)?;
            check_timestamp(to)?;
            let service = self.bookable_service(store_id, service_id).await?;
            let range = clamp_range(from, to, self.config().max_advance_ms());
            let interval = self.config().slot_interval_ms();

            let slots = match self.store.get_ledger(&service.id) {
                Some(ledger) => {
                    let guard = ledger.read().await;
                    calendar_slots(Some(&*guard), range, interval, viewer)
                }
                None => calendar_slots(None, range, interval, viewer),
            };
            metrics::histogram!(observability::AVAILABILITY_SLOTS).record(slots.len() as f64);

            Ok::<_, EngineError>(Availability {
                store_id,
                service_id,
                range,
                slots,
            })
        }
        .await;
        observe(Operation::Availability, started, &result);
        result
    }

    /// A user's bookings matching `filter`, most recent start first.
    /// Nothing matching is an empty `Vec`, not `NotFound`.
    pub async fn get_user_bookings(&self, user_id: Ulid, filter: &BookingFilter) -> Vec<Booking> {
        let mut out = Vec::new();
        for id in self.store.booking_ids_for_user(&user_id) {
            if let Ok(b) = self.read_booking(&id).await
                && b.is_owned_by(&user_id)
                && filter.matches(&b)
            {
                out.push(b);
            }
        }
        out.sort_by_key(|b| Reverse(b.start_at()));
        out
    }

    /// Every booking of a store matching `filter`, most recent start first.
    /// An unknown store yields an empty `Vec`.
    pub async fn get_store_bookings(&self, store_id: Ulid, filter: &BookingFilter) -> Vec<Booking> {
        let mut out = Vec::new();
        for service_id in self.store.service_ids_for_store(&store_id) {
            let Some(ledger) = self.store.get_ledger(&service_id) else {
                continue;
            };
            let guard = ledger.read().await;
            out.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.store_id == store_id && filter.matches(b))
                    .cloned(),
            );
        }
        out.sort_by_key(|b| Reverse(b.start_at()));
        out
    }

    /// One booking, visible only to the user who made it.
    pub async fn get_booking_detail(&self, id: Ulid, user_id: Ulid) -> Result<Booking, EngineError> {
        let booking = self.read_booking(&id).await?;
        if !booking.is_owned_by(&user_id) {
            return Err(EngineError::Unauthorized(id));
        }
        Ok(booking)
    }

    pub(super) async fn read_booking(&self, id: &Ulid) -> Result<Booking, EngineError> {
        let service_id = self
            .store
            .service_for_booking(id)
            .ok_or(EngineError::NotFound(*id))?;
        let ledger = self
            .store
            .get_ledger(&service_id)
            .ok_or(EngineError::NotFound(*id))?;
        let guard = ledger.read().await;
        guard.get(id).cloned().ok_or(EngineError::NotFound(*id))
    }
}
