use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::Operation;

use super::conflict::{check_no_conflict, validate_window};
use super::{observe, Engine, EngineError};

fn check_len(value: Option<&str>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max => Err(EngineError::LimitExceeded(what)),
        _ => Ok(()),
    }
}

fn forbid(booking: &Booking, action: &'static str) -> EngineError {
    EngineError::InvalidStateTransition {
        id: booking.id,
        from: booking.status,
        action,
    }
}

fn require_owner(booking: &Booking, user_id: &Ulid) -> Result<(), EngineError> {
    if booking.is_owned_by(user_id) {
        Ok(())
    } else {
        Err(EngineError::Unauthorized(booking.id))
    }
}

fn require_store(booking: &Booking, store_id: &Ulid) -> Result<(), EngineError> {
    if booking.store_id == *store_id {
        Ok(())
    } else {
        Err(EngineError::Unauthorized(booking.id))
    }
}

impl Engine {
    // ── Customer actions ─────────────────────────────────────

    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
        user_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.create_booking_inner(request, user_id).await;
        observe(Operation::Create, started, &result);
        result
    }

    async fn create_booking_inner(
        &self,
        request: CreateBookingRequest,
        user_id: Ulid,
    ) -> Result<Booking, EngineError> {
        if request.user_name.trim().is_empty() {
            return Err(EngineError::InvalidRequest("user name is required"));
        }
        check_len(Some(request.user_name.as_str()), MAX_NAME_LEN, "user name too long")?;
        check_len(Some(request.user_contact.as_str()), MAX_CONTACT_LEN, "contact too long")?;
        check_len(request.note.as_deref(), MAX_NOTE_LEN, "note too long")?;

        let service = self
            .bookable_service(request.store_id, request.service_id)
            .await?;
        let end_at = match request.end_at {
            Some(end) => end,
            None => match service.duration_minutes {
                Some(d) => request.start_at + minutes(d),
                None => {
                    return Err(EngineError::InvalidRequest(
                        "end time required for a service without a default duration",
                    ));
                }
            },
        };

        let now = self.now();
        let span = validate_window(request.start_at, end_at, now, self.config())?;

        let ledger = self.store.ledger(service.id, service.store_id);
        let mut guard = ledger.write_owned().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_SERVICE {
            return Err(EngineError::LimitExceeded("too many bookings on service"));
        }
        check_no_conflict(
            &guard,
            &service,
            &span,
            None,
            self.config().default_buffer_minutes,
        )?;

        let booking = Booking {
            id: Ulid::new(),
            store_id: service.store_id,
            service_id: service.id,
            user_id,
            span,
            user_name: request.user_name,
            user_contact: request.user_contact,
            service_name: service.name.clone(),
            service_description: service.description.clone(),
            note: request.note,
            store_note: None,
            status: BookingStatus::Requested,
            status_reason: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
            requested_at: now,
            confirmed_at: None,
            completed_at: None,
        };
        let event = Event::BookingRequested {
            id: booking.id,
            store_id: booking.store_id,
            service_id: booking.service_id,
            user_id,
            span,
        };
        self.commit(&mut guard, booking.clone(), &event);
        info!(
            "booking {} requested on service {} by user {user_id} [{}, {})",
            booking.id, booking.service_id, span.start, span.end
        );
        Ok(booking)
    }

    /// Change a booking's time or note. A new time sends it back to
    /// `requested` because the store has to approve it again.
    pub async fn update_booking(
        &self,
        id: Ulid,
        request: UpdateBookingRequest,
        user_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.update_booking_inner(id, request, user_id).await;
        observe(Operation::Update, started, &result);
        result
    }

    async fn update_booking_inner(
        &self,
        id: Ulid,
        request: UpdateBookingRequest,
        user_id: Ulid,
    ) -> Result<Booking, EngineError> {
        check_len(request.note.as_deref(), MAX_NOTE_LEN, "note too long")?;

        // The catalog is read before the ledger lock is taken.
        let wants_move = request.start_at.is_some() || request.end_at.is_some();
        let service = if wants_move {
            let service_id = self
                .store
                .service_for_booking(&id)
                .ok_or(EngineError::NotFound(id))?;
            match self.catalog.service(service_id).await {
                Some(s) => Some(self.bookable_service(s.store_id, s.id).await),
                None => Some(Err(EngineError::NotFound(service_id))),
            }
        } else {
            None
        };
        let default_buffer = self.config().default_buffer_minutes;

        let booking = self
            .transition(
                id,
                |ledger, current, now| {
                    require_owner(current, &user_id)?;
                    if matches!(
                        current.status,
                        BookingStatus::Cancelled
                            | BookingStatus::Rejected
                            | BookingStatus::Completed
                            | BookingStatus::InProgress
                    ) {
                        return Err(forbid(current, "update"));
                    }
                    let start = request.start_at.unwrap_or(current.start_at());
                    let end = request.end_at.unwrap_or(current.end_at());
                    if start == current.start_at() && end == current.end_at() {
                        return Ok(None);
                    }
                    let service = service.ok_or(EngineError::NotFound(id))??;
                    let span = validate_window(start, end, now, self.config())?;
                    check_no_conflict(ledger, &service, &span, Some(id), default_buffer)?;
                    Ok(Some(span))
                },
                |b, moved, now| {
                    if let Some(span) = moved {
                        b.span = span;
                        b.status = BookingStatus::Requested;
                        b.requested_at = now;
                        b.confirmed_at = None;
                    }
                    if let Some(note) = request.note {
                        b.note = Some(note);
                    }
                    Event::BookingUpdated {
                        id: b.id,
                        store_id: b.store_id,
                        service_id: b.service_id,
                        span: b.span,
                        status: b.status,
                    }
                },
            )
            .await?;
        info!("booking {id} updated by user {user_id}, now {}", booking.status);
        Ok(booking)
    }

    pub async fn cancel_booking(
        &self,
        id: Ulid,
        request: CancelBookingRequest,
        user_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = async move {
            check_len(request.reason.as_deref(), MAX_REASON_LEN, "reason too long")?;
            self.transition(
                id,
                |_, current, _| {
                    require_owner(current, &user_id)?;
                    if current.status.is_terminal() {
                        return Err(forbid(current, "cancel"));
                    }
                    Ok(())
                },
                |b, (), _| mark_cancelled(b, CancelledBy::User, request.reason),
            )
            .await
        }
        .await;
        observe(Operation::Cancel, started, &result);
        if result.is_ok() {
            info!("booking {id} cancelled by user {user_id}");
        }
        result
    }

    // ── Store actions ────────────────────────────────────────

    /// Approve a request. The slot is checked once more: another booking may
    /// have claimed it, or the service's rules may have tightened, since the
    /// request was admitted.
    pub async fn confirm_booking(
        &self,
        id: Ulid,
        store_id: Ulid,
        request: ConfirmBookingRequest,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.confirm_booking_inner(id, store_id, request).await;
        observe(Operation::Confirm, started, &result);
        result
    }

    async fn confirm_booking_inner(
        &self,
        id: Ulid,
        store_id: Ulid,
        request: ConfirmBookingRequest,
    ) -> Result<Booking, EngineError> {
        check_len(request.note.as_deref(), MAX_NOTE_LEN, "note too long")?;
        let service_id = self
            .store
            .service_for_booking(&id)
            .ok_or(EngineError::NotFound(id))?;
        let service = self
            .catalog
            .service(service_id)
            .await
            .ok_or(EngineError::NotFound(service_id))?;
        let default_buffer = self.config().default_buffer_minutes;

        let booking = self
            .transition(
                id,
                |ledger, current, _| {
                    require_store(current, &store_id)?;
                    if current.status != BookingStatus::Requested {
                        return Err(forbid(current, "confirm"));
                    }
                    check_no_conflict(ledger, &service, &current.span, Some(id), default_buffer)
                },
                |b, (), now| {
                    b.status = BookingStatus::Confirmed;
                    b.confirmed_at = Some(now);
                    b.store_note = request.note;
                    Event::BookingConfirmed {
                        id: b.id,
                        store_id: b.store_id,
                        service_id: b.service_id,
                        span: b.span,
                    }
                },
            )
            .await?;
        info!("booking {id} confirmed by store {store_id}");
        Ok(booking)
    }

    pub async fn reject_booking(
        &self,
        id: Ulid,
        store_id: Ulid,
        request: RejectBookingRequest,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = async move {
            if request.reason.trim().is_empty() {
                return Err(EngineError::InvalidRequest("a reason is required to reject"));
            }
            check_len(Some(request.reason.as_str()), MAX_REASON_LEN, "reason too long")?;
            self.transition(
                id,
                |_, current, _| {
                    require_store(current, &store_id)?;
                    if current.status != BookingStatus::Requested {
                        return Err(forbid(current, "reject"));
                    }
                    Ok(())
                },
                |b, (), _| mark_rejected(b, request.reason),
            )
            .await
        }
        .await;
        observe(Operation::Reject, started, &result);
        if result.is_ok() {
            info!("booking {id} rejected by store {store_id}");
        }
        result
    }

    pub async fn cancel_booking_by_store(
        &self,
        id: Ulid,
        store_id: Ulid,
        request: CancelBookingRequest,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = async move {
            check_len(request.reason.as_deref(), MAX_REASON_LEN, "reason too long")?;
            self.transition(
                id,
                |_, current, _| {
                    require_store(current, &store_id)?;
                    if current.status.is_terminal() {
                        return Err(forbid(current, "cancel"));
                    }
                    Ok(())
                },
                |b, (), _| mark_cancelled(b, CancelledBy::Store, request.reason),
            )
            .await
        }
        .await;
        observe(Operation::StoreCancel, started, &result);
        if result.is_ok() {
            info!("booking {id} cancelled by store {store_id}");
        }
        result
    }

    /// `confirmed` → `in_progress`.
    pub async fn start_booking(&self, id: Ulid, store_id: Ulid) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self
            .transition(
                id,
                |_, current, _| {
                    require_store(current, &store_id)?;
                    if current.status != BookingStatus::Confirmed {
                        return Err(forbid(current, "start"));
                    }
                    Ok(())
                },
                |b, (), _| {
                    b.status = BookingStatus::InProgress;
                    Event::BookingStarted {
                        id: b.id,
                        store_id: b.store_id,
                        service_id: b.service_id,
                    }
                },
            )
            .await;
        observe(Operation::Start, started, &result);
        result
    }

    /// `confirmed` | `in_progress` → `completed`.
    pub async fn complete_booking(&self, id: Ulid, store_id: Ulid) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self
            .transition(
                id,
                |_, current, _| {
                    require_store(current, &store_id)?;
                    if !matches!(
                        current.status,
                        BookingStatus::Confirmed | BookingStatus::InProgress
                    ) {
                        return Err(forbid(current, "complete"));
                    }
                    Ok(())
                },
                |b, (), now| {
                    b.status = BookingStatus::Completed;
                    b.completed_at = Some(now);
                    Event::BookingCompleted {
                        id: b.id,
                        store_id: b.store_id,
                        service_id: b.service_id,
                    }
                },
            )
            .await;
        observe(Operation::Complete, started, &result);
        result
    }

    // ── Request expiry ───────────────────────────────────────

    /// Requests still waiting for the store that entered `requested` more
    /// than `ttl` ago, or whose start time has already passed. Contended ledgers are
    /// skipped; the next sweep picks them up.
    pub fn collect_stale_requests(&self, now: Ms, ttl: Ms) -> Vec<Ulid> {
        let mut stale = Vec::new();
        for service_id in self.store.service_ids() {
            let Some(ledger) = self.store.get_ledger(&service_id) else {
                continue;
            };
            if let Ok(guard) = ledger.try_read() {
                stale.extend(
                    guard
                        .bookings
                        .iter()
                        .filter(|b| b.is_stale_request(now, ttl))
                        .map(|b| b.id),
                );
            }
        }
        stale
    }

    /// Reject a request that was never answered. Staleness is checked again
    /// under the lock: if the store answered it or the user rescheduled it
    /// since it was collected, this fails and nothing changes.
    pub async fn expire_request(&self, id: Ulid, ttl: Ms) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self
            .transition(
                id,
                |_, current, now| {
                    if !current.is_stale_request(now, ttl) {
                        return Err(forbid(current, "expire"));
                    }
                    Ok(())
                },
                |b, (), _| mark_rejected(b, "request expired".to_string()),
            )
            .await;
        observe(Operation::Expire, started, &result);
        if result.is_ok() {
            debug!("booking {id} expired while awaiting confirmation");
        }
        result
    }
}

fn mark_cancelled(b: &mut Booking, by: CancelledBy, reason: Option<String>) -> Event {
    b.status = BookingStatus::Cancelled;
    b.cancelled_by = Some(by);
    b.status_reason = reason.clone();
    Event::BookingCancelled {
        id: b.id,
        store_id: b.store_id,
        service_id: b.service_id,
        by,
        reason,
    }
}

fn mark_rejected(b: &mut Booking, reason: String) -> Event {
    b.status = BookingStatus::Rejected;
    b.status_reason = Some(reason.clone());
    Event::BookingRejected {
        id: b.id,
        store_id: b.store_id,
        service_id: b.service_id,
        reason,
    }
}
