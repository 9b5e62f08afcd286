use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};

use attendance_engine::engine::memory::{MemoryDirectory, MemoryStore};
use attendance_engine::engine::AttendanceEngine;
use attendance_engine::model::employee::Employee;
use attendance_engine::model::settings::TenantSettings;

pub const TENANT: u64 = 1;

pub struct Fixture {
    pub engine: Arc<AttendanceEngine>,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<MemoryDirectory>,
}

pub fn fixture(settings: TenantSettings) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    directory.set_settings(TENANT, settings);
    let engine = Arc::new(AttendanceEngine::new(store.clone(), directory.clone()));
    Fixture {
        engine,
        store,
        directory,
    }
}

pub fn default_settings() -> TenantSettings {
    TenantSettings {
        auto_checkout_enabled: true,
        countdown_seconds: 300,
        grace_period_minutes: 15,
        late_window_minutes: 60,
        default_shift_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        tz_offset_minutes: 0,
    }
}

pub fn employee(id: u64, name: &str) -> Employee {
    Employee {
        id,
        tenant_id: TENANT,
        display_name: name.to_string(),
        branch_id: None,
        shift_start: Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
        active: true,
    }
}

/// Instant on the fixture day (2026-01-05) at the given offset from 09:00.
pub fn at(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, hour, min, sec).unwrap()
}
