//! Presence heartbeat processor and the auto-checkout state machine.
//!
//! The countdown is evaluated lazily: every heartbeat (and the sweep) runs
//! the same `evaluate` transition under the per-employee lock, so the
//! machine needs no timer callback of its own.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::error::EngineError;
use crate::engine::store::{
    AttendanceSession, LocationEvidence, NewPending, PendingStatus, PresenceHeartbeat,
    ViolationReason,
};
use crate::engine::AttendanceEngine;
use crate::model::settings::TenantSettings;

/// Outcome of one heartbeat, mirroring the state machine transition taken.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PresenceDecision {
    /// No violation and no countdown in flight.
    Ok,
    /// A countdown had been running and this heartbeat recovered it.
    PendingCancelled,
    /// The countdown keeps running; nothing was mutated.
    PendingActive {
        reason: ViolationReason,
        #[schema(value_type = String, format = "date-time")]
        deadline: DateTime<Utc>,
        seconds_remaining: i64,
    },
    /// First violating heartbeat; a fresh countdown was started.
    PendingCreated {
        reason: ViolationReason,
        #[schema(value_type = String, format = "date-time")]
        deadline: DateTime<Utc>,
    },
    /// Deadline reached; the session was force-closed in the same
    /// logical transaction as this decision.
    CheckoutExecuted { reason: ViolationReason },
}

impl AttendanceEngine {
    /// Ingests one heartbeat: upserts the latest-value presence row, then
    /// drives the state machine. When the tenant has auto-checkout disabled
    /// the heartbeat is still recorded for observability but no countdown is
    /// ever created.
    pub async fn record_heartbeat(
        &self,
        tenant_id: u64,
        employee_id: u64,
        session_id: u64,
        in_zone: bool,
        gps_valid: bool,
        evidence: LocationEvidence,
        now: DateTime<Utc>,
    ) -> Result<PresenceDecision, EngineError> {
        let _guard = self.locks().acquire(tenant_id, employee_id).await?;

        self.directory()
            .employee(tenant_id, employee_id)
            .await?
            .filter(|e| e.active)
            .ok_or(EngineError::EmployeeInactiveOrNotFound)?;

        let session = self
            .store()
            .find_session(session_id)
            .await?
            .filter(|s| s.tenant_id == tenant_id && s.employee_id == employee_id)
            .ok_or(EngineError::EmployeeInactiveOrNotFound)?;

        // Heartbeats for a closed session are stale; nothing to drive.
        if !session.is_open() {
            return Ok(PresenceDecision::Ok);
        }

        let violation = ViolationReason::from_signals(in_zone, gps_valid);
        self.store()
            .upsert_heartbeat(PresenceHeartbeat {
                employee_id,
                tenant_id,
                session_id,
                last_seen: evidence.device_reported_at.unwrap_or(now),
                in_zone,
                gps_valid,
                violation,
            })
            .await?;

        let settings = self.settings(tenant_id).await?;
        if !settings.auto_checkout_enabled {
            return Ok(PresenceDecision::Ok);
        }

        self.evaluate(&session, violation, &settings, now).await
    }

    /// The state-machine transition, evaluated once per heartbeat as a
    /// single atomic unit (caller holds the employee lock).
    async fn evaluate(
        &self,
        session: &AttendanceSession,
        violation: Option<ViolationReason>,
        settings: &TenantSettings,
        now: DateTime<Utc>,
    ) -> Result<PresenceDecision, EngineError> {
        let pending = self
            .store()
            .find_pending(session.tenant_id, session.employee_id, session.id)
            .await?;

        match (violation, pending) {
            (None, Some(p)) => {
                self.store()
                    .resolve_pending(p.id, PendingStatus::Cancelled, now)
                    .await?;
                Ok(PresenceDecision::PendingCancelled)
            }
            (None, None) => Ok(PresenceDecision::Ok),
            (Some(_), Some(p)) if now >= p.deadline => {
                // Checkout reason is the stored one, not this heartbeat's.
                self.force_checkout(session, p.reason, now).await?;
                self.store()
                    .resolve_pending(p.id, PendingStatus::Completed, now)
                    .await?;
                Ok(PresenceDecision::CheckoutExecuted { reason: p.reason })
            }
            (Some(_), Some(p)) => Ok(PresenceDecision::PendingActive {
                reason: p.reason,
                deadline: p.deadline,
                seconds_remaining: (p.deadline - now).num_seconds(),
            }),
            (Some(reason), None) => {
                let countdown = settings.countdown_seconds.max(0);
                let deadline = now + Duration::seconds(countdown);
                let pending_id = self
                    .store()
                    .insert_pending(NewPending {
                        employee_id: session.employee_id,
                        tenant_id: session.tenant_id,
                        session_id: session.id,
                        reason,
                        deadline,
                    })
                    .await?;

                // Zero countdown: checkout immediately on the first
                // violation, no second heartbeat required.
                if countdown == 0 {
                    self.force_checkout(session, reason, now).await?;
                    self.store()
                        .resolve_pending(pending_id, PendingStatus::Completed, now)
                        .await?;
                    return Ok(PresenceDecision::CheckoutExecuted { reason });
                }

                Ok(PresenceDecision::PendingCreated { reason, deadline })
            }
        }
    }

    /// Force-executes expired countdowns for a tenant even if heartbeats
    /// stopped arriving (device offline). Reuses the exact completion
    /// transition of the state machine. Returns the number of forced
    /// checkouts executed.
    pub async fn sweep_expired(
        &self,
        tenant_id: u64,
        now: DateTime<Utc>,
    ) -> Result<u32, EngineError> {
        let expired = self.store().expired_pending(tenant_id, now).await?;
        let mut executed = 0u32;

        for row in expired {
            let _guard = self.locks().acquire(row.tenant_id, row.employee_id).await?;

            // Re-read under the lock; a heartbeat may have resolved it.
            let Some(pending) = self
                .store()
                .find_pending(row.tenant_id, row.employee_id, row.session_id)
                .await?
            else {
                continue;
            };
            if pending.id != row.id || now < pending.deadline {
                continue;
            }

            let Some(session) = self.store().find_session(pending.session_id).await? else {
                continue;
            };
            if session.is_open() {
                self.force_checkout(&session, pending.reason, now).await?;
                self.store()
                    .resolve_pending(pending.id, PendingStatus::Completed, now)
                    .await?;
                executed += 1;
            } else {
                // Dangling countdown for a session closed elsewhere.
                self.store()
                    .resolve_pending(pending.id, PendingStatus::Cancelled, now)
                    .await?;
            }
        }

        Ok(executed)
    }
}
