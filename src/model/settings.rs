use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Per-tenant presence configuration.
///
/// Resolved once at the request boundary and threaded into every engine call;
/// the engine never reads it ambiently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSettings {
    pub auto_checkout_enabled: bool,
    /// Countdown before a forced checkout once a violation is observed.
    /// Zero means checkout immediately on the first violating heartbeat.
    pub countdown_seconds: i64,
    pub grace_period_minutes: i64,
    pub late_window_minutes: i64,
    /// Fallback shift start for employees without an assigned shift.
    pub default_shift_start: NaiveTime,
    /// Offset of the tenant's local day from UTC.
    pub tz_offset_minutes: i32,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            auto_checkout_enabled: true,
            countdown_seconds: 300,
            grace_period_minutes: 5,
            late_window_minutes: 60,
            default_shift_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            tz_offset_minutes: 0,
        }
    }
}
