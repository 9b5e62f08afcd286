//! Session guard: enforces the single-open-session invariant and owns the
//! only code paths that close a session.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::engine::error::EngineError;
use crate::engine::store::{
    AttendanceSession, CheckoutType, LocationEvidence, NewSession, PendingStatus, SessionClose,
    ViolationReason,
};
use crate::engine::{local_day, AttendanceEngine};

impl AttendanceEngine {
    /// Opens a session for the employee, rejecting with
    /// `DuplicateOpenSession` when one is already open anywhere (not just
    /// today). The pre-check runs under the per-employee lock; the storage
    /// unique key backs it up under concurrent requests from stale clients.
    pub async fn check_in(
        &self,
        tenant_id: u64,
        employee_id: u64,
        evidence: LocationEvidence,
        now: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        let _guard = self.locks().acquire(tenant_id, employee_id).await?;

        let employee = self
            .directory()
            .employee(tenant_id, employee_id)
            .await?
            .filter(|e| e.active)
            .ok_or(EngineError::EmployeeInactiveOrNotFound)?;

        let settings = self.settings(tenant_id).await?;
        let day = local_day(now, &settings);

        if self
            .store()
            .find_open_session(tenant_id, employee_id)
            .await?
            .is_some()
        {
            return Err(EngineError::DuplicateOpenSession);
        }

        let session_id = self
            .store()
            .insert_session(NewSession {
                employee_id,
                tenant_id,
                check_in: now,
                local_day: day,
                evidence,
            })
            .await?;

        info!(
            tenant_id,
            employee_id = employee.id,
            session_id,
            "check-in recorded"
        );
        Ok(session_id)
    }

    /// Manual checkout. Closing an already-closed session is a no-op that
    /// reports `AlreadyClosed`; the stored working duration is never
    /// recomputed. Any pending countdown for the session is cancelled as a
    /// side effect so no dangling pending row outlives its session.
    pub async fn check_out(
        &self,
        tenant_id: u64,
        session_id: u64,
        now: DateTime<Utc>,
    ) -> Result<i64, EngineError> {
        let session = self
            .store()
            .find_session(session_id)
            .await?
            .filter(|s| s.tenant_id == tenant_id)
            .ok_or(EngineError::EmployeeInactiveOrNotFound)?;

        let _guard = self
            .locks()
            .acquire(session.tenant_id, session.employee_id)
            .await?;

        // Re-read under the lock; a heartbeat may have closed it meanwhile.
        let session = self
            .store()
            .find_session(session_id)
            .await?
            .ok_or(EngineError::EmployeeInactiveOrNotFound)?;
        if !session.is_open() {
            return Err(EngineError::AlreadyClosed);
        }

        let working_secs = (now - session.check_in).num_seconds().max(0);
        let closed = self
            .store()
            .close_session(
                session_id,
                SessionClose {
                    at: now,
                    checkout_type: CheckoutType::Manual,
                    checkout_reason: None,
                    working_secs,
                },
            )
            .await?;
        if !closed {
            return Err(EngineError::AlreadyClosed);
        }

        if let Some(pending) = self
            .store()
            .find_pending(session.tenant_id, session.employee_id, session_id)
            .await?
        {
            self.store()
                .resolve_pending(pending.id, PendingStatus::Cancelled, now)
                .await?;
        }

        info!(
            tenant_id = session.tenant_id,
            employee_id = session.employee_id,
            session_id,
            working_secs,
            "manual checkout recorded"
        );
        Ok(working_secs)
    }

    /// Shared forced-close path used by the state machine and the sweep.
    /// Caller holds the employee lock. The audit log line is best-effort and
    /// never gates the close itself.
    pub(crate) async fn force_checkout(
        &self,
        session: &AttendanceSession,
        reason: ViolationReason,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let working_secs = (now - session.check_in).num_seconds().max(0);
        let closed = self
            .store()
            .close_session(
                session.id,
                SessionClose {
                    at: now,
                    checkout_type: CheckoutType::Automatic,
                    checkout_reason: Some(reason),
                    working_secs,
                },
            )
            .await?;

        if closed {
            info!(
                tenant_id = session.tenant_id,
                employee_id = session.employee_id,
                session_id = session.id,
                reason = reason.as_str(),
                working_secs,
                "automatic checkout executed"
            );
        }
        Ok(closed)
    }
}
