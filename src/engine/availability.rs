use ulid::Ulid;

use crate::model::*;

// ── Calendar slots ────────────────────────────────────────────────

/// Clamp a requested range so it never reaches past `from + max_advance`.
pub fn clamp_range(from: Ms, to: Ms, max_advance: Ms) -> SlotRange {
    SlotRange {
        from,
        to: to.min(from.saturating_add(max_advance)),
    }
}

/// Walk `range` in fixed `interval` steps and mark each slot busy when an
/// active booking's raw span overlaps it. Only whole slots are produced.
///
/// Busy slots carry a summary of one occupying booking, preferring the
/// viewer's own. Anyone else's booking is redacted down to its service name.
pub fn calendar_slots(
    ledger: Option<&ServiceLedger>,
    range: SlotRange,
    interval: Ms,
    viewer: Option<Ulid>,
) -> Vec<CalendarSlot> {
    if interval <= 0 || range.from >= range.to {
        return Vec::new();
    }
    let count = ((range.to - range.from) / interval) as usize;
    let mut slots = Vec::with_capacity(count);

    let mut start = range.from;
    while start + interval <= range.to {
        let span = Span::new(start, start + interval);
        let mut occupancy = 0u32;
        let mut shown: Option<&Booking> = None;
        if let Some(ledger) = ledger {
            for b in ledger.active_overlapping(&span) {
                occupancy += 1;
                let own = viewer.is_some_and(|v| b.is_owned_by(&v));
                if shown.is_none() || own {
                    shown = Some(b);
                }
            }
        }
        slots.push(CalendarSlot {
            start: span.start,
            end: span.end,
            busy: occupancy > 0,
            occupancy,
            booking: shown.map(|b| summarize(b, viewer)),
        });
        start += interval;
    }

    slots
}

fn summarize(booking: &Booking, viewer: Option<Ulid>) -> SlotBooking {
    if viewer.is_some_and(|v| booking.is_owned_by(&v)) {
        SlotBooking {
            id: Some(booking.id),
            user_id: Some(booking.user_id),
            service_name: booking.service_name.clone(),
        }
    } else {
        SlotBooking {
            id: None,
            user_id: None,
            service_name: booking.service_name.clone(),
        }
    }
}
