use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 24 * 60 * MINUTE_MS;

pub fn minutes(m: u32) -> Ms {
    m as Ms * MINUTE_MS
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Pad the span by setup time before and cleanup time after. Saturates
    /// at the ends of the `Ms` range.
    pub fn expand(&self, before: Ms, after: Ms) -> Span {
        Span::new(
            self.start.saturating_sub(before),
            self.end.saturating_add(after),
        )
    }
}

// ── Catalog ──────────────────────────────────────────────────────

/// A bookable offering of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub store_id: Ulid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Default booking length when a request gives no end time.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub buffer_before_minutes: Option<u32>,
    #[serde(default)]
    pub buffer_after_minutes: Option<u32>,
    /// Max concurrent buffer-overlapping bookings (default 1).
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Service {
    pub fn effective_capacity(&self) -> u32 {
        self.capacity.unwrap_or(1)
    }

    /// `(before, after)` buffers in ms, unset sides taking `default_minutes`.
    pub fn buffers(&self, default_minutes: u32) -> (Ms, Ms) {
        (
            minutes(self.buffer_before_minutes.unwrap_or(default_minutes)),
            minutes(self.buffer_after_minutes.unwrap_or(default_minutes)),
        )
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Requested,
    Confirmed,
    Rejected,
    Cancelled,
    InProgress,
    Completed,
}

impl BookingStatus {
    /// Holds time on the calendar and counts against capacity.
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Rejected | BookingStatus::Cancelled)
    }

    /// No operation may move a booking out of a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Cancelled | BookingStatus::Completed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Requested => "requested",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    User,
    Store,
}

/// A single reservation of a service's time.
///
/// `user_name`, `user_contact`, `service_name` and `service_description` are
/// copied in at creation and never refreshed: a booking keeps describing the
/// service as it was when the customer asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub store_id: Ulid,
    pub service_id: Ulid,
    pub user_id: Ulid,
    pub span: Span,
    pub user_name: String,
    pub user_contact: String,
    pub service_name: String,
    pub service_description: String,
    pub note: Option<String>,
    pub store_note: Option<String>,
    pub status: BookingStatus,
    pub status_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub created_at: Ms,
    pub updated_at: Ms,
    /// When the booking last entered `requested`: creation, or a reschedule.
    pub requested_at: Ms,
    pub confirmed_at: Option<Ms>,
    pub completed_at: Option<Ms>,
}

impl Booking {
    pub fn start_at(&self) -> Ms {
        self.span.start
    }

    pub fn end_at(&self) -> Ms {
        self.span.end
    }

    pub fn is_owned_by(&self, user_id: &Ulid) -> bool {
        self.user_id == *user_id
    }

    /// A request nobody answered within `ttl`, or whose start has passed.
    pub fn is_stale_request(&self, now: Ms, ttl: Ms) -> bool {
        self.status == BookingStatus::Requested
            && (self.requested_at.saturating_add(ttl) <= now || self.start_at() <= now)
    }
}

/// All bookings of one service, sorted by `span.start`. Guarded as a unit:
/// whoever holds the write lock owns every conflict decision for the service.
#[derive(Debug, Clone)]
pub struct ServiceLedger {
    pub service_id: Ulid,
    pub store_id: Ulid,
    pub bookings: Vec<Booking>,
}

impl ServiceLedger {
    pub fn new(service_id: Ulid, store_id: Ulid) -> Self {
        Self {
            service_id,
            store_id,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    /// Swap in a new version of a booking; its span may have moved.
    pub fn replace(&mut self, booking: Booking) -> Option<Booking> {
        let old = self.remove(booking.id);
        self.insert(booking);
        old
    }

    /// Return only bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }

    /// Like `overlapping`, restricted to bookings that still hold time.
    pub fn active_overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        self.overlapping(query).filter(|b| b.status.is_active())
    }
}

/// Booking lifecycle events, broadcast per store after each committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingRequested {
        id: Ulid,
        store_id: Ulid,
        service_id: Ulid,
        user_id: Ulid,
        span: Span,
    },
    BookingUpdated {
        id: Ulid,
        store_id: Ulid,
        service_id: Ulid,
        span: Span,
        status: BookingStatus,
    },
    BookingConfirmed {
        id: Ulid,
        store_id: Ulid,
        service_id: Ulid,
        span: Span,
    },
    BookingRejected {
        id: Ulid,
        store_id: Ulid,
        service_id: Ulid,
        reason: String,
    },
    BookingCancelled {
        id: Ulid,
        store_id: Ulid,
        service_id: Ulid,
        by: CancelledBy,
        reason: Option<String>,
    },
    BookingStarted {
        id: Ulid,
        store_id: Ulid,
        service_id: Ulid,
    },
    BookingCompleted {
        id: Ulid,
        store_id: Ulid,
        service_id: Ulid,
    },
}

impl Event {
    pub fn booking_id(&self) -> Ulid {
        match self {
            Event::BookingRequested { id, .. }
            | Event::BookingUpdated { id, .. }
            | Event::BookingConfirmed { id, .. }
            | Event::BookingRejected { id, .. }
            | Event::BookingCancelled { id, .. }
            | Event::BookingStarted { id, .. }
            | Event::BookingCompleted { id, .. } => *id,
        }
    }

    pub fn store_id(&self) -> Ulid {
        match self {
            Event::BookingRequested { store_id, .. }
            | Event::BookingUpdated { store_id, .. }
            | Event::BookingConfirmed { store_id, .. }
            | Event::BookingRejected { store_id, .. }
            | Event::BookingCancelled { store_id, .. }
            | Event::BookingStarted { store_id, .. }
            | Event::BookingCompleted { store_id, .. } => *store_id,
        }
    }
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub store_id: Ulid,
    pub service_id: Ulid,
    pub start_at: Ms,
    /// Defaults to `start_at` plus the service's duration.
    pub end_at: Option<Ms>,
    pub user_name: String,
    pub user_contact: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBookingRequest {
    pub start_at: Option<Ms>,
    pub end_at: Option<Ms>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmBookingRequest {
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectBookingRequest {
    pub reason: String,
}

/// Every field narrows the result; `None` means "don't care".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFilter {
    pub statuses: Option<Vec<BookingStatus>>,
    pub store_id: Option<Ulid>,
    /// Inclusive lower bound on `start_at`.
    pub from: Option<Ms>,
    /// Inclusive upper bound on `start_at`.
    pub to: Option<Ms>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        if let Some(statuses) = &self.statuses
            && !statuses.contains(&booking.status)
        {
            return false;
        }
        if self.store_id.is_some_and(|s| s != booking.store_id) {
            return false;
        }
        if self.from.is_some_and(|f| booking.start_at() < f) {
            return false;
        }
        if self.to.is_some_and(|t| booking.start_at() > t) {
            return false;
        }
        true
    }
}

// ── Query result types ───────────────────────────────────────────

/// What a calendar slot reveals about the booking occupying it.
/// `id` and `user_id` are only filled in for the viewer's own booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBooking {
    pub id: Option<Ulid>,
    pub user_id: Option<Ulid>,
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSlot {
    pub start: Ms,
    pub end: Ms,
    pub busy: bool,
    /// Active bookings overlapping the slot.
    pub occupancy: u32,
    pub booking: Option<SlotBooking>,
}

/// Effective query range after clamping; `from >= to` means empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub from: Ms,
    pub to: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub store_id: Ulid,
    pub service_id: Ulid,
    pub range: SlotRange,
    pub slots: Vec<CalendarSlot>,
}

#[cfg(test)]
pub(crate) fn test_booking(service_id: Ulid, span: Span, status: BookingStatus) -> Booking {
    Booking {
        id: Ulid::new(),
        store_id: Ulid::nil(),
        service_id,
        user_id: Ulid::new(),
        span,
        user_name: "Ada".into(),
        user_contact: "ada@example.com".into(),
        service_name: "Haircut".into(),
        service_description: String::new(),
        note: None,
        store_note: None,
        status,
        status_reason: None,
        cancelled_by: None,
        created_at: 0,
        updated_at: 0,
        requested_at: 0,
        confirmed_at: None,
        completed_at: None,
    }
}
