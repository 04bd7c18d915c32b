//! Hard caps on caller-supplied input.

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CONTACT_LEN: usize = 256;
pub const MAX_NOTE_LEN: usize = 2_000;
pub const MAX_REASON_LEN: usize = 1_000;

/// Bookings kept per service ledger, terminal ones included.
pub const MAX_BOOKINGS_PER_SERVICE: usize = 100_000;

/// Services a single JSON catalog fixture may declare.
pub const MAX_CATALOG_SERVICES: usize = 10_000;

/// Caller-supplied timestamps must fall in `[MIN_VALID_TIMESTAMP_MS, MAX_VALID_TIMESTAMP_MS]`:
/// 1970-01-01 through 9999-12-31.
pub const MIN_VALID_TIMESTAMP_MS: i64 = 0;
pub const MAX_VALID_TIMESTAMP_MS: i64 = 253_402_300_799_999;

/// Longest single booking: 7 days.
pub const MAX_SPAN_DURATION_MS: i64 = 7 * 24 * 3_600_000;
