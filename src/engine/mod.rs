pub mod classifier;
pub mod error;
pub mod locks;
pub mod memory;
pub mod mysql;
pub mod presence;
pub mod session_guard;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use self::error::EngineError;
use self::locks::LockRegistry;
use self::store::{AttendanceStore, Directory};
use crate::model::settings::TenantSettings;

/// The presence engine: session guard, heartbeat processor, auto-checkout
/// state machine and lateness/absence classifier behind one handle.
///
/// Storage and the employee directory are injected; tenant settings are
/// resolved per call and threaded through, never read ambiently.
pub struct AttendanceEngine {
    store: Arc<dyn AttendanceStore>,
    directory: Arc<dyn Directory>,
    locks: LockRegistry,
}

impl AttendanceEngine {
    pub fn new(store: Arc<dyn AttendanceStore>, directory: Arc<dyn Directory>) -> Self {
        Self {
            store,
            directory,
            locks: LockRegistry::new(),
        }
    }

    pub(crate) fn store(&self) -> &dyn AttendanceStore {
        self.store.as_ref()
    }

    pub(crate) fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    pub(crate) fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Tenant settings, falling back to documented defaults when the tenant
    /// has no settings row. The missing row is recoverable, not an error.
    pub(crate) async fn settings(&self, tenant_id: u64) -> Result<TenantSettings, EngineError> {
        match self.directory.tenant_settings(tenant_id).await? {
            Some(settings) => Ok(settings),
            None => {
                tracing::warn!(tenant_id, "tenant settings missing, using defaults");
                Ok(TenantSettings::default())
            }
        }
    }
}

/// The tenant-local calendar day that `now` falls on.
pub fn local_day(now: DateTime<Utc>, settings: &TenantSettings) -> NaiveDate {
    (now + Duration::minutes(i64::from(settings.tz_offset_minutes))).date_naive()
}

/// UTC half-open window `[from, to)` covering the tenant-local day.
pub fn day_window_utc(day: NaiveDate, settings: &TenantSettings) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_hms_opt(0, 0, 0).unwrap().and_utc()
        - Duration::minutes(i64::from(settings.tz_offset_minutes));
    (start, start + Duration::days(1))
}

/// UTC instant of a local shift start on the given local day.
pub fn shift_start_utc(
    day: NaiveDate,
    shift_start: NaiveTime,
    settings: &TenantSettings,
) -> DateTime<Utc> {
    day.and_time(shift_start).and_utc() - Duration::minutes(i64::from(settings.tz_offset_minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_day_respects_tenant_offset() {
        let settings = TenantSettings {
            tz_offset_minutes: 360,
            ..TenantSettings::default()
        };
        // 22:00 UTC is already the next day at UTC+6.
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 22, 0, 0).unwrap();
        assert_eq!(
            local_day(now, &settings),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
        );
    }

    #[test]
    fn day_window_covers_exactly_one_day() {
        let settings = TenantSettings {
            tz_offset_minutes: 360,
            ..TenantSettings::default()
        };
        let day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let (from, to) = day_window_utc(day, &settings);
        assert_eq!(from, Utc.with_ymd_and_hms(2026, 1, 1, 18, 0, 0).unwrap());
        assert_eq!(to - from, Duration::days(1));
    }
}
