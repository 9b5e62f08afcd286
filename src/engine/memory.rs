//! In-memory storage and directory, used by the test suite and by runs
//! without a `DATABASE_URL`. Enforces the same uniqueness rules as the
//! MySQL schema so the guard's defense-in-depth path is exercised too.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::engine::error::StoreError;
use crate::engine::store::{
    AttendanceSession, AttendanceStore, Directory, NewPending, NewSession, PendingAutoCheckout,
    PendingStatus, PresenceHeartbeat, SessionClose,
};
use crate::model::employee::Employee;
use crate::model::settings::TenantSettings;

struct StoredSession {
    session: AttendanceSession,
    local_day: NaiveDate,
}

#[derive(Default)]
struct StoreInner {
    sessions: Vec<StoredSession>,
    heartbeats: HashMap<u64, PresenceHeartbeat>,
    pendings: Vec<PendingAutoCheckout>,
    next_session_id: u64,
    next_pending_id: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest presence row for an employee, for assertions in tests.
    pub fn heartbeat(&self, employee_id: u64) -> Option<PresenceHeartbeat> {
        self.lock().heartbeats.get(&employee_id).cloned()
    }

    /// All countdown rows ever created for an employee, in creation order.
    pub fn pending_history(&self, employee_id: u64) -> Vec<PendingAutoCheckout> {
        self.lock()
            .pendings
            .iter()
            .filter(|p| p.employee_id == employee_id)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn insert_session(&self, new: NewSession) -> Result<u64, StoreError> {
        let mut inner = self.lock();

        let conflict = inner.sessions.iter().any(|s| {
            s.session.tenant_id == new.tenant_id
                && s.session.employee_id == new.employee_id
                && (s.session.is_open() || s.local_day == new.local_day)
        });
        if conflict {
            return Err(StoreError::DuplicateOpenSession);
        }

        inner.next_session_id += 1;
        let id = inner.next_session_id;
        inner.sessions.push(StoredSession {
            session: AttendanceSession {
                id,
                employee_id: new.employee_id,
                tenant_id: new.tenant_id,
                check_in: new.check_in,
                check_in_evidence: new.evidence,
                check_out: None,
                checkout_type: None,
                checkout_reason: None,
                working_secs: None,
            },
            local_day: new.local_day,
        });
        Ok(id)
    }

    async fn find_session(&self, session_id: u64) -> Result<Option<AttendanceSession>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .find(|s| s.session.id == session_id)
            .map(|s| s.session.clone()))
    }

    async fn find_open_session(
        &self,
        tenant_id: u64,
        employee_id: u64,
    ) -> Result<Option<AttendanceSession>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .find(|s| {
                s.session.tenant_id == tenant_id
                    && s.session.employee_id == employee_id
                    && s.session.is_open()
            })
            .map(|s| s.session.clone()))
    }

    async fn close_session(
        &self,
        session_id: u64,
        close: SessionClose,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(stored) = inner
            .sessions
            .iter_mut()
            .find(|s| s.session.id == session_id)
        else {
            return Ok(false);
        };
        if !stored.session.is_open() {
            return Ok(false);
        }
        stored.session.check_out = Some(close.at);
        stored.session.checkout_type = Some(close.checkout_type);
        stored.session.checkout_reason = close.checkout_reason;
        stored.session.working_secs = Some(close.working_secs);
        Ok(true)
    }

    async fn sessions_in_window(
        &self,
        tenant_id: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceSession>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .filter(|s| {
                s.session.tenant_id == tenant_id
                    && s.session.check_in >= from
                    && s.session.check_in < to
            })
            .map(|s| s.session.clone())
            .collect())
    }

    async fn upsert_heartbeat(&self, hb: PresenceHeartbeat) -> Result<(), StoreError> {
        self.lock().heartbeats.insert(hb.employee_id, hb);
        Ok(())
    }

    async fn find_pending(
        &self,
        tenant_id: u64,
        employee_id: u64,
        session_id: u64,
    ) -> Result<Option<PendingAutoCheckout>, StoreError> {
        Ok(self
            .lock()
            .pendings
            .iter()
            .find(|p| {
                p.tenant_id == tenant_id
                    && p.employee_id == employee_id
                    && p.session_id == session_id
                    && p.status == PendingStatus::Pending
            })
            .cloned())
    }

    async fn insert_pending(&self, new: NewPending) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let conflict = inner.pendings.iter().any(|p| {
            p.employee_id == new.employee_id
                && p.session_id == new.session_id
                && p.status == PendingStatus::Pending
        });
        if conflict {
            return Err(StoreError::DuplicatePending);
        }
        inner.next_pending_id += 1;
        let id = inner.next_pending_id;
        inner.pendings.push(PendingAutoCheckout {
            id,
            employee_id: new.employee_id,
            tenant_id: new.tenant_id,
            session_id: new.session_id,
            reason: new.reason,
            deadline: new.deadline,
            status: PendingStatus::Pending,
            resolved_at: None,
        });
        Ok(id)
    }

    async fn resolve_pending(
        &self,
        pending_id: u64,
        status: PendingStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(pending) = inner.pendings.iter_mut().find(|p| p.id == pending_id) else {
            return Ok(false);
        };
        if pending.status != PendingStatus::Pending {
            return Ok(false);
        }
        pending.status = status;
        pending.resolved_at = Some(at);
        Ok(true)
    }

    async fn expired_pending(
        &self,
        tenant_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingAutoCheckout>, StoreError> {
        Ok(self
            .lock()
            .pendings
            .iter()
            .filter(|p| {
                p.tenant_id == tenant_id && p.status == PendingStatus::Pending && p.deadline <= now
            })
            .cloned()
            .collect())
    }
}

struct ExemptionRange {
    tenant_id: u64,
    employee_id: u64,
    from: NaiveDate,
    to: NaiveDate,
}

#[derive(Default)]
struct DirectoryInner {
    employees: Vec<Employee>,
    settings: HashMap<u64, TenantSettings>,
    leaves: Vec<ExemptionRange>,
    free_tasks: Vec<ExemptionRange>,
}

#[derive(Default)]
pub struct MemoryDirectory {
    inner: Mutex<DirectoryInner>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_employee(&self, employee: Employee) {
        self.lock().employees.push(employee);
    }

    pub fn set_settings(&self, tenant_id: u64, settings: TenantSettings) {
        self.lock().settings.insert(tenant_id, settings);
    }

    pub fn add_leave(&self, tenant_id: u64, employee_id: u64, from: NaiveDate, to: NaiveDate) {
        self.lock().leaves.push(ExemptionRange {
            tenant_id,
            employee_id,
            from,
            to,
        });
    }

    pub fn add_free_task(&self, tenant_id: u64, employee_id: u64, from: NaiveDate, to: NaiveDate) {
        self.lock().free_tasks.push(ExemptionRange {
            tenant_id,
            employee_id,
            from,
            to,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn employee(
        &self,
        tenant_id: u64,
        employee_id: u64,
    ) -> Result<Option<Employee>, StoreError> {
        Ok(self
            .lock()
            .employees
            .iter()
            .find(|e| e.tenant_id == tenant_id && e.id == employee_id)
            .cloned())
    }

    async fn active_employees(&self, tenant_id: u64) -> Result<Vec<Employee>, StoreError> {
        Ok(self
            .lock()
            .employees
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.active)
            .cloned()
            .collect())
    }

    async fn tenant_settings(&self, tenant_id: u64) -> Result<Option<TenantSettings>, StoreError> {
        Ok(self.lock().settings.get(&tenant_id).cloned())
    }

    async fn employees_on_leave(
        &self,
        tenant_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<u64>, StoreError> {
        Ok(self
            .lock()
            .leaves
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.from <= day && day <= r.to)
            .map(|r| r.employee_id)
            .collect())
    }

    async fn employees_on_free_task(
        &self,
        tenant_id: u64,
        day: NaiveDate,
    ) -> Result<Vec<u64>, StoreError> {
        Ok(self
            .lock()
            .free_tasks
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.from <= day && day <= r.to)
            .map(|r| r.employee_id)
            .collect())
    }
}
