use std::env;

use crate::model::{DAY_MS, Ms, minutes};

/// Scheduling knobs the engine is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How far ahead bookings and calendar queries may reach.
    pub max_advance_days: u32,
    pub min_booking_minutes: u32,
    /// Width of a calendar slot.
    pub slot_interval_minutes: u32,
    /// Buffer applied to a side a service leaves unset.
    pub default_buffer_minutes: u32,
    /// Age after which a `requested` booking is swept. `None` disables the sweep.
    pub request_ttl_minutes: Option<u32>,
    pub sweep_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_advance_days: 90,
            min_booking_minutes: 30,
            slot_interval_minutes: 30,
            default_buffer_minutes: 15,
            request_ttl_minutes: None,
            sweep_interval_secs: 60,
        }
    }
}

impl EngineConfig {
    /// Read `RESERVO_*` variables, keeping the default for anything unset or unparseable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_advance_days: parse_var("RESERVO_MAX_ADVANCE_DAYS").unwrap_or(d.max_advance_days),
            min_booking_minutes: parse_var("RESERVO_MIN_BOOKING_MINUTES")
                .unwrap_or(d.min_booking_minutes),
            slot_interval_minutes: parse_var("RESERVO_SLOT_INTERVAL_MINUTES")
                .unwrap_or(d.slot_interval_minutes),
            default_buffer_minutes: parse_var("RESERVO_DEFAULT_BUFFER_MINUTES")
                .unwrap_or(d.default_buffer_minutes),
            request_ttl_minutes: parse_var("RESERVO_REQUEST_TTL_MINUTES").or(d.request_ttl_minutes),
            sweep_interval_secs: parse_var("RESERVO_SWEEP_INTERVAL_SECS")
                .unwrap_or(d.sweep_interval_secs),
        }
    }

    pub fn max_advance_ms(&self) -> Ms {
        self.max_advance_days as Ms * DAY_MS
    }

    pub fn min_booking_ms(&self) -> Ms {
        minutes(self.min_booking_minutes)
    }

    pub fn slot_interval_ms(&self) -> Ms {
        minutes(self.slot_interval_minutes)
    }

    pub fn request_ttl_ms(&self) -> Option<Ms> {
        self.request_ttl_minutes.map(minutes)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
