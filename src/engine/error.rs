use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    BookingDisabled(Ulid),
    ServiceInactive(Ulid),
    InvalidTimeRange(&'static str),
    SlotUnavailable {
        service_id: Ulid,
        overlapping: usize,
        capacity: u32,
    },
    InvalidStateTransition {
        id: Ulid,
        from: BookingStatus,
        action: &'static str,
    },
    Unauthorized(Ulid),
    InvalidRequest(&'static str),
    LimitExceeded(&'static str),
    InvalidConfig(&'static str),
}

/// Stable, machine-readable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    BookingDisabled,
    ServiceInactive,
    InvalidTimeRange,
    SlotUnavailable,
    InvalidStateTransition,
    Unauthorized,
    InvalidRequest,
    LimitExceeded,
    InvalidConfig,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::BookingDisabled => "booking_disabled",
            ErrorKind::ServiceInactive => "service_inactive",
            ErrorKind::InvalidTimeRange => "invalid_time_range",
            ErrorKind::SlotUnavailable => "slot_unavailable",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::LimitExceeded => "limit_exceeded",
            ErrorKind::InvalidConfig => "invalid_config",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::BookingDisabled(_) => ErrorKind::BookingDisabled,
            EngineError::ServiceInactive(_) => ErrorKind::ServiceInactive,
            EngineError::InvalidTimeRange(_) => ErrorKind::InvalidTimeRange,
            EngineError::SlotUnavailable { .. } => ErrorKind::SlotUnavailable,
            EngineError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            EngineError::LimitExceeded(_) => ErrorKind::LimitExceeded,
            EngineError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::BookingDisabled(store) => {
                write!(f, "store {store} does not accept bookings")
            }
            EngineError::ServiceInactive(id) => write!(f, "service {id} is not bookable"),
            EngineError::InvalidTimeRange(msg) => write!(f, "invalid time range: {msg}"),
            EngineError::SlotUnavailable {
                overlapping,
                capacity,
                ..
            } => write!(
                f,
                "slot unavailable: {overlapping} overlapping booking(s), capacity {capacity}"
            ),
            EngineError::InvalidStateTransition { id, from, action } => {
                write!(f, "cannot {action} booking {id} while {from}")
            }
            EngineError::Unauthorized(id) => write!(f, "not allowed to access booking {id}"),
            EngineError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
