use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::engine::error::StoreError;
use crate::model::employee::Employee;
use crate::model::settings::TenantSettings;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutType {
    Manual,
    Automatic,
}

impl CheckoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutType::Manual => "manual",
            CheckoutType::Automatic => "automatic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(CheckoutType::Manual),
            "automatic" => Some(CheckoutType::Automatic),
            _ => None,
        }
    }
}

/// Why a heartbeat is considered violating. GPS invalidity takes precedence
/// over a zone violation when both hold.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    GpsInvalid,
    OutOfZone,
}

impl ViolationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationReason::GpsInvalid => "gps_invalid",
            ViolationReason::OutOfZone => "out_of_zone",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "gps_invalid" => Some(ViolationReason::GpsInvalid),
            "out_of_zone" => Some(ViolationReason::OutOfZone),
            _ => None,
        }
    }

    /// Reason for a violating heartbeat, or `None` when the report is clean.
    pub fn from_signals(in_zone: bool, gps_valid: bool) -> Option<Self> {
        if !gps_valid {
            Some(ViolationReason::GpsInvalid)
        } else if !in_zone {
            Some(ViolationReason::OutOfZone)
        } else {
            None
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Cancelled,
    Completed,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Cancelled => "cancelled",
            PendingStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PendingStatus::Pending),
            "cancelled" => Some(PendingStatus::Cancelled),
            "completed" => Some(PendingStatus::Completed),
            _ => None,
        }
    }
}

/// Device-reported evidence attached to check-in, check-out and heartbeats.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LocationEvidence {
    #[schema(example = 23.8103, nullable = true)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125, nullable = true)]
    pub longitude: Option<f64>,
    /// Reported accuracy radius in meters.
    #[schema(example = 12.5, nullable = true)]
    pub accuracy_m: Option<f64>,
    #[schema(example = "2026-01-01T09:00:00Z", value_type = String, format = "date-time", nullable = true)]
    pub device_reported_at: Option<DateTime<Utc>>,
    #[schema(example = "203.0.113.10", nullable = true)]
    pub source_ip: Option<String>,
}

/// One employee's work interval for one calendar day. Open while
/// `check_out` is null; mutated exactly once, on checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub id: u64,
    pub employee_id: u64,
    pub tenant_id: u64,
    pub check_in: DateTime<Utc>,
    pub check_in_evidence: LocationEvidence,
    pub check_out: Option<DateTime<Utc>>,
    pub checkout_type: Option<CheckoutType>,
    pub checkout_reason: Option<ViolationReason>,
    /// Computed once on close; never recomputed.
    pub working_secs: Option<i64>,
}

impl AttendanceSession {
    pub fn is_open(&self) -> bool {
        self.check_out.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub employee_id: u64,
    pub tenant_id: u64,
    pub check_in: DateTime<Utc>,
    /// Local calendar day of the check-in under the tenant's timezone.
    /// Persisted so the one-session-per-day rule is a storage constraint.
    pub local_day: NaiveDate,
    pub evidence: LocationEvidence,
}

#[derive(Debug, Clone)]
pub struct SessionClose {
    pub at: DateTime<Utc>,
    pub checkout_type: CheckoutType,
    pub checkout_reason: Option<ViolationReason>,
    pub working_secs: i64,
}

/// Latest-value presence row, one per employee. Upserted in place on every
/// heartbeat; stale once the associated session closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceHeartbeat {
    pub employee_id: u64,
    pub tenant_id: u64,
    pub session_id: u64,
    pub last_seen: DateTime<Utc>,
    pub in_zone: bool,
    pub gps_valid: bool,
    pub violation: Option<ViolationReason>,
}

/// An active or resolved auto-checkout countdown tied to one open session.
/// Terminal rows are never reused; a fresh violation gets a fresh row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAutoCheckout {
    pub id: u64,
    pub employee_id: u64,
    pub tenant_id: u64,
    pub session_id: u64,
    pub reason: ViolationReason,
    pub deadline: DateTime<Utc>,
    pub status: PendingStatus,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPending {
    pub employee_id: u64,
    pub tenant_id: u64,
    pub session_id: u64,
    pub reason: ViolationReason,
    pub deadline: DateTime<Utc>,
}

/// Durable storage for sessions, heartbeats and countdowns.
///
/// Implementations must enforce the open-session and at-most-one-pending
/// uniqueness rules themselves; the engine's per-employee lock is the first
/// line of defense, the constraint the second.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn insert_session(&self, new: NewSession) -> Result<u64, StoreError>;

    async fn find_session(&self, session_id: u64) -> Result<Option<AttendanceSession>, StoreError>;

    async fn find_open_session(
        &self,
        tenant_id: u64,
        employee_id: u64,
    ) -> Result<Option<AttendanceSession>, StoreError>;

    /// Closes the session only if it is still open. Returns `false` when the
    /// session was already closed (the caller reports `AlreadyClosed`).
    async fn close_session(&self, session_id: u64, close: SessionClose)
        -> Result<bool, StoreError>;

    /// All sessions whose check-in falls inside `[from, to)`.
    async fn sessions_in_window(
        &self,
        tenant_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceSession>, StoreError>;

    async fn upsert_heartbeat(&self, hb: PresenceHeartbeat) -> Result<(), StoreError>;

    async fn find_pending(
        &self,
        tenant_id: u64,
        employee_id: u64,
        session_id: u64,
    ) -> Result<Option<PendingAutoCheckout>, StoreError>;

    async fn insert_pending(&self, new: NewPending) -> Result<u64, StoreError>;

    /// Moves a pending row to a terminal status. Returns `false` when the row
    /// was no longer pending (lost a race with a concurrent resolution).
    async fn resolve_pending(
        &self,
        pending_id: u64,
        status: PendingStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Pending rows whose deadline has passed, for the sweep path.
    async fn expired_pending(
        &self,
        tenant_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingAutoCheckout>, StoreError>;
}

/// Employee/shift directory plus the leave/free-task exemption providers.
/// External collaborators from the engine's point of view.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn employee(
        &self,
        tenant_id: u64,
        employee_id: u64,
    ) -> Result<Option<Employee>, StoreError>;

    async fn active_employees(&self, tenant_id: u64) -> Result<Vec<Employee>, StoreError>;

    /// `None` when the tenant has no settings row; the engine falls back to
    /// `TenantSettings::default()`.
    async fn tenant_settings(&self, tenant_id: u64) -> Result<Option<TenantSettings>, StoreError>;

    /// Employee ids with an approved leave covering `day`.
    async fn employees_on_leave(
        &self,
        tenant_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<u64>, StoreError>;

    /// Employee ids with an active free task covering `day`.
    async fn employees_on_free_task(
        &self,
        tenant_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<u64>, StoreError>;
}
