use ulid::Ulid;

use crate::config::EngineConfig;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn check_timestamp(t: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&t) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Bounds and width of a span handed in from outside.
pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    check_timestamp(span.start)?;
    check_timestamp(span.end)?;
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Check a requested `[start, end)` window against lead-time and length
/// rules. Returns the window as a `Span` once it is known to be well formed.
pub(crate) fn validate_window(
    start: Ms,
    end: Ms,
    now: Ms,
    config: &EngineConfig,
) -> Result<Span, EngineError> {
    check_timestamp(start)?;
    check_timestamp(end)?;
    if start < now {
        return Err(EngineError::InvalidTimeRange("start is in the past"));
    }
    if start > now + config.max_advance_ms() {
        return Err(EngineError::InvalidTimeRange(
            "start is beyond the advance booking window",
        ));
    }
    if end <= start {
        return Err(EngineError::InvalidTimeRange("end must be after start"));
    }
    if end - start < config.min_booking_ms() {
        return Err(EngineError::InvalidTimeRange(
            "shorter than the minimum booking length",
        ));
    }
    let span = Span::new(start, end);
    validate_span(&span)?;
    Ok(span)
}

/// Active bookings whose buffer-padded span overlaps the padded candidate.
///
/// Both sides get the same padding: `[start - before, end + after)`.
pub fn overlapping_bookings<'a>(
    ledger: &'a ServiceLedger,
    candidate: &Span,
    before: Ms,
    after: Ms,
    exclude: Option<Ulid>,
) -> Vec<&'a Booking> {
    let padded = candidate.expand(before, after);
    // Raw spans that can reach `padded` once expanded themselves.
    let search = candidate.expand(before + after, before + after);
    ledger
        .active_overlapping(&search)
        .filter(|b| Some(b.id) != exclude)
        .filter(|b| b.span.expand(before, after).overlaps(&padded))
        .collect()
}

/// Admission check: the candidate fits while fewer than `capacity` active
/// bookings overlap it once buffers are applied.
pub(crate) fn check_no_conflict(
    ledger: &ServiceLedger,
    service: &Service,
    candidate: &Span,
    exclude: Option<Ulid>,
    default_buffer_minutes: u32,
) -> Result<(), EngineError> {
    let (before, after) = service.buffers(default_buffer_minutes);
    let capacity = service.effective_capacity();
    let overlapping = overlapping_bookings(ledger, candidate, before, after, exclude).len();
    if overlapping >= capacity as usize {
        return Err(EngineError::SlotUnavailable {
            service_id: service.id,
            overlapping,
            capacity,
        });
    }
    Ok(())
}

pub fn has_conflict(
    ledger: &ServiceLedger,
    service: &Service,
    candidate: &Span,
    exclude: Option<Ulid>,
    default_buffer_minutes: u32,
) -> bool {
    check_no_conflict(ledger, service, candidate, exclude, default_buffer_minutes).is_err()
}
