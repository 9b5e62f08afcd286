//! MySQL-backed storage and directory.
//!
//! Queries are runtime-bound. Serialization of same-employee operations is
//! the engine's lock registry; the unique keys created by
//! `migrations/0001_init.sql` (open-session marker, one-per-day, one-pending
//! marker) back it up under races.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::MySqlPool;

use crate::engine::error::StoreError;
use crate::engine::store::{
    AttendanceSession, AttendanceStore, CheckoutType, Directory, LocationEvidence, NewPending,
    NewSession, PendingAutoCheckout, PendingStatus, PresenceHeartbeat, SessionClose,
    ViolationReason,
};
use crate::model::employee::Employee;
use crate::model::settings::TenantSettings;

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23000"))
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: u64,
    employee_id: u64,
    tenant_id: u64,
    check_in: DateTime<Utc>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy_m: Option<f64>,
    device_reported_at: Option<DateTime<Utc>>,
    source_ip: Option<String>,
    check_out: Option<DateTime<Utc>>,
    checkout_type: Option<String>,
    checkout_reason: Option<String>,
    working_secs: Option<i64>,
}

impl SessionRow {
    fn into_session(self) -> AttendanceSession {
        AttendanceSession {
            id: self.id,
            employee_id: self.employee_id,
            tenant_id: self.tenant_id,
            check_in: self.check_in,
            check_in_evidence: LocationEvidence {
                latitude: self.latitude,
                longitude: self.longitude,
                accuracy_m: self.accuracy_m,
                device_reported_at: self.device_reported_at,
                source_ip: self.source_ip,
            },
            check_out: self.check_out,
            checkout_type: self.checkout_type.as_deref().and_then(CheckoutType::from_str),
            checkout_reason: self
                .checkout_reason
                .as_deref()
                .and_then(ViolationReason::from_str),
            working_secs: self.working_secs,
        }
    }
}

const SESSION_COLUMNS: &str = "id, employee_id, tenant_id, check_in, latitude, longitude, \
     accuracy_m, device_reported_at, source_ip, check_out, checkout_type, checkout_reason, \
     working_secs";

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: u64,
    employee_id: u64,
    tenant_id: u64,
    session_id: u64,
    reason: String,
    deadline: DateTime<Utc>,
    status: String,
    resolved_at: Option<DateTime<Utc>>,
}

impl PendingRow {
    fn into_pending(self) -> Result<PendingAutoCheckout, StoreError> {
        Ok(PendingAutoCheckout {
            id: self.id,
            employee_id: self.employee_id,
            tenant_id: self.tenant_id,
            session_id: self.session_id,
            reason: ViolationReason::from_str(&self.reason)
                .ok_or_else(|| StoreError::Backend(format!("bad violation reason: {}", self.reason)))?,
            deadline: self.deadline,
            status: PendingStatus::from_str(&self.status)
                .ok_or_else(|| StoreError::Backend(format!("bad pending status: {}", self.status)))?,
            resolved_at: self.resolved_at,
        })
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn insert_session(&self, new: NewSession) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_session
                (employee_id, tenant_id, check_in, local_day, latitude, longitude,
                 accuracy_m, device_reported_at, source_ip)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.employee_id)
        .bind(new.tenant_id)
        .bind(new.check_in)
        .bind(new.local_day)
        .bind(new.evidence.latitude)
        .bind(new.evidence.longitude)
        .bind(new.evidence.accuracy_m)
        .bind(new.evidence.device_reported_at)
        .bind(new.evidence.source_ip.as_deref())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_id()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateOpenSession),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_session(&self, session_id: u64) -> Result<Option<AttendanceSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM attendance_session WHERE id = ?"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRow::into_session))
    }

    async fn find_open_session(
        &self,
        tenant_id: u64,
        employee_id: u64,
    ) -> Result<Option<AttendanceSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM attendance_session \
             WHERE tenant_id = ? AND employee_id = ? AND check_out IS NULL"
        ))
        .bind(tenant_id)
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRow::into_session))
    }

    async fn close_session(
        &self,
        session_id: u64,
        close: SessionClose,
    ) -> Result<bool, StoreError> {
        // The `check_out IS NULL` filter makes the close idempotent-safe:
        // an already-closed row is untouched and reported back.
        let done = sqlx::query(
            r#"
            UPDATE attendance_session
            SET check_out = ?, checkout_type = ?, checkout_reason = ?, working_secs = ?
            WHERE id = ? AND check_out IS NULL
            "#,
        )
        .bind(close.at)
        .bind(close.checkout_type.as_str())
        .bind(close.checkout_reason.map(|r| r.as_str()))
        .bind(close.working_secs)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn sessions_in_window(
        &self,
        tenant_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceSession>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM attendance_session \
             WHERE tenant_id = ? AND check_in >= ? AND check_in < ?"
        ))
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionRow::into_session).collect())
    }

    async fn upsert_heartbeat(&self, hb: PresenceHeartbeat) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO presence_heartbeat
                (employee_id, tenant_id, session_id, last_seen, in_zone, gps_valid, violation)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                tenant_id = VALUES(tenant_id),
                session_id = VALUES(session_id),
                last_seen = VALUES(last_seen),
                in_zone = VALUES(in_zone),
                gps_valid = VALUES(gps_valid),
                violation = VALUES(violation)
            "#,
        )
        .bind(hb.employee_id)
        .bind(hb.tenant_id)
        .bind(hb.session_id)
        .bind(hb.last_seen)
        .bind(hb.in_zone)
        .bind(hb.gps_valid)
        .bind(hb.violation.map(|v| v.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_pending(
        &self,
        tenant_id: u64,
        employee_id: u64,
        session_id: u64,
    ) -> Result<Option<PendingAutoCheckout>, StoreError> {
        let row = sqlx::query_as::<_, PendingRow>(
            "SELECT id, employee_id, tenant_id, session_id, reason, deadline, status, resolved_at \
             FROM pending_auto_checkout \
             WHERE tenant_id = ? AND employee_id = ? AND session_id = ? AND status = 'pending'",
        )
        .bind(tenant_id)
        .bind(employee_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PendingRow::into_pending).transpose()
    }

    async fn insert_pending(&self, new: NewPending) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO pending_auto_checkout
                (employee_id, tenant_id, session_id, reason, deadline, status)
            VALUES (?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(new.employee_id)
        .bind(new.tenant_id)
        .bind(new.session_id)
        .bind(new.reason.as_str())
        .bind(new.deadline)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_id()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicatePending),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_pending(
        &self,
        pending_id: u64,
        status: PendingStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let done = sqlx::query(
            "UPDATE pending_auto_checkout SET status = ?, resolved_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(at)
        .bind(pending_id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn expired_pending(
        &self,
        tenant_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingAutoCheckout>, StoreError> {
        let rows = sqlx::query_as::<_, PendingRow>(
            "SELECT id, employee_id, tenant_id, session_id, reason, deadline, status, resolved_at \
             FROM pending_auto_checkout \
             WHERE tenant_id = ? AND status = 'pending' AND deadline <= ?",
        )
        .bind(tenant_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PendingRow::into_pending).collect()
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    auto_checkout_enabled: bool,
    countdown_seconds: i64,
    grace_period_minutes: i64,
    late_window_minutes: i64,
    default_shift_start: NaiveTime,
    tz_offset_minutes: i32,
}

#[async_trait]
impl Directory for MySqlStore {
    async fn employee(
        &self,
        tenant_id: u64,
        employee_id: u64,
    ) -> Result<Option<Employee>, StoreError> {
        let row = sqlx::query_as::<_, Employee>(
            "SELECT id, tenant_id, display_name, branch_id, shift_start, active \
             FROM employee WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn active_employees(&self, tenant_id: u64) -> Result<Vec<Employee>, StoreError> {
        let rows = sqlx::query_as::<_, Employee>(
            "SELECT id, tenant_id, display_name, branch_id, shift_start, active \
             FROM employee WHERE tenant_id = ? AND active = 1",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn tenant_settings(&self, tenant_id: u64) -> Result<Option<TenantSettings>, StoreError> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT auto_checkout_enabled, countdown_seconds, grace_period_minutes, \
                    late_window_minutes, default_shift_start, tz_offset_minutes \
             FROM tenant_settings WHERE tenant_id = ?",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| TenantSettings {
            auto_checkout_enabled: r.auto_checkout_enabled,
            countdown_seconds: r.countdown_seconds,
            grace_period_minutes: r.grace_period_minutes,
            late_window_minutes: r.late_window_minutes,
            default_shift_start: r.default_shift_start,
            tz_offset_minutes: r.tz_offset_minutes,
        }))
    }

    async fn employees_on_leave(
        &self,
        tenant_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<u64>, StoreError> {
        let ids = sqlx::query_scalar::<_, u64>(
            "SELECT employee_id FROM leave_request \
             WHERE tenant_id = ? AND status = 'approved' AND start_date <= ? AND end_date >= ?",
        )
        .bind(tenant_id)
        .bind(day)
        .bind(day)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn employees_on_free_task(
        &self,
        tenant_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<u64>, StoreError> {
        let ids = sqlx::query_scalar::<_, u64>(
            "SELECT employee_id FROM free_task \
             WHERE tenant_id = ? AND status = 'active' AND start_date <= ? AND end_date >= ?",
        )
        .bind(tenant_id)
        .bind(day)
        .bind(day)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
