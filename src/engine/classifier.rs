//! Lateness/absence classifier.
//!
//! One predicate, `classify_employee`, feeds every caller: the absent list,
//! the absent count and the present-now lateness figure all derive from it,
//! so the aggregate and the detail view cannot drift apart.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::error::EngineError;
use crate::engine::store::AttendanceSession;
use crate::engine::{day_window_utc, local_day, shift_start_utc, AttendanceEngine};
use crate::model::settings::TenantSettings;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DayStatus {
    /// The grace + late window has not closed yet.
    NotYetDue,
    OnTime,
    Late,
    Absent,
}

/// Per-employee classifier input, composed at query time.
#[derive(Debug, Clone)]
pub struct ClassificationInput {
    pub employee_id: u64,
    pub display_name: String,
    /// Assigned shift start, or `None` for the tenant default.
    pub shift_start: Option<NaiveTime>,
    /// Earliest check-in on the day, if any session exists.
    pub check_in: Option<DateTime<Utc>>,
    pub on_leave: bool,
    pub on_free_task: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DayClassification {
    pub employee_id: u64,
    pub display_name: String,
    pub status: DayStatus,
    /// Only meaningful for employees with a session; minutes past
    /// shift start + grace, floored at zero.
    pub minutes_late: Option<i64>,
}

/// The single minutes-late formula shared by every call site.
pub fn minutes_late(
    check_in: DateTime<Utc>,
    shift_start: DateTime<Utc>,
    grace_period_minutes: i64,
) -> i64 {
    (check_in - (shift_start + Duration::minutes(grace_period_minutes)))
        .num_minutes()
        .max(0)
}

/// Classifies one employee for one day. Returns `None` for employees exempt
/// from consideration by an approved leave or active free task (and without
/// a session).
pub fn classify_employee(
    input: &ClassificationInput,
    day: NaiveDate,
    now: DateTime<Utc>,
    settings: &TenantSettings,
) -> Option<DayClassification> {
    let shift = input.shift_start.unwrap_or(settings.default_shift_start);
    let shift_start = shift_start_utc(day, shift, settings);

    if let Some(check_in) = input.check_in {
        let late = minutes_late(check_in, shift_start, settings.grace_period_minutes);
        let status = if late > 0 {
            DayStatus::Late
        } else {
            DayStatus::OnTime
        };
        return Some(DayClassification {
            employee_id: input.employee_id,
            display_name: input.display_name.clone(),
            status,
            minutes_late: Some(late),
        });
    }

    if input.on_leave || input.on_free_task {
        return None;
    }

    let deadline = shift_start
        + Duration::minutes(settings.grace_period_minutes + settings.late_window_minutes);
    let status = if now <= deadline {
        DayStatus::NotYetDue
    } else {
        DayStatus::Absent
    };
    Some(DayClassification {
        employee_id: input.employee_id,
        display_name: input.display_name.clone(),
        status,
        minutes_late: None,
    })
}

/// Classifies every input and orders the output by display name ascending
/// for deterministic pagination.
pub fn classify_day(
    inputs: &[ClassificationInput],
    day: NaiveDate,
    now: DateTime<Utc>,
    settings: &TenantSettings,
) -> Vec<DayClassification> {
    let mut out: Vec<DayClassification> = inputs
        .iter()
        .filter_map(|input| classify_employee(input, day, now, settings))
        .collect();
    out.sort_by(|a, b| {
        a.display_name
            .cmp(&b.display_name)
            .then(a.employee_id.cmp(&b.employee_id))
    });
    out
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AbsenceDetail {
    #[schema(example = 42)]
    pub employee_id: u64,
    #[schema(example = "John Doe")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AbsenceReport {
    /// Always equals `employees.len()`; both come from one classifier pass.
    #[schema(example = 2)]
    pub count: u64,
    pub employees: Vec<AbsenceDetail>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummary {
    #[schema(example = 100)]
    pub session_id: u64,
    #[schema(example = 42)]
    pub employee_id: u64,
    #[schema(example = "John Doe")]
    pub display_name: String,
    #[schema(value_type = String, format = "date-time")]
    pub check_in: DateTime<Utc>,
    #[schema(example = 5)]
    pub minutes_late: i64,
}

impl AttendanceEngine {
    /// Absent count and detail list for a day, from a single classifier
    /// pass over the same fixture of sessions, leaves and tasks.
    pub async fn absence_report(
        &self,
        tenant_id: u64,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AbsenceReport, EngineError> {
        let settings = self.settings(tenant_id).await?;
        let employees = self.directory().active_employees(tenant_id).await?;

        let (from, to) = day_window_utc(day, &settings);
        let sessions = self.store().sessions_in_window(tenant_id, from, to).await?;
        let earliest_check_in = earliest_by_employee(&sessions);

        let on_leave: HashSet<u64> = self
            .directory()
            .employees_on_leave(tenant_id, day)
            .await?
            .into_iter()
            .collect();
        let on_free_task: HashSet<u64> = self
            .directory()
            .employees_on_free_task(tenant_id, day)
            .await?
            .into_iter()
            .collect();

        let inputs: Vec<ClassificationInput> = employees
            .iter()
            .map(|e| ClassificationInput {
                employee_id: e.id,
                display_name: e.display_name.clone(),
                shift_start: e.shift_start,
                check_in: earliest_check_in.get(&e.id).copied(),
                on_leave: on_leave.contains(&e.id),
                on_free_task: on_free_task.contains(&e.id),
            })
            .collect();

        let classified = classify_day(&inputs, day, now, &settings);
        let absent: Vec<AbsenceDetail> = classified
            .into_iter()
            .filter(|c| c.status == DayStatus::Absent)
            .map(|c| AbsenceDetail {
                employee_id: c.employee_id,
                display_name: c.display_name,
            })
            .collect();

        Ok(AbsenceReport {
            count: absent.len() as u64,
            employees: absent,
        })
    }

    pub async fn absent_count(
        &self,
        tenant_id: u64,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        Ok(self.absence_report(tenant_id, day, now).await?.count)
    }

    /// Open sessions for the current local day, optionally branch-filtered,
    /// ordered by display name. Lateness uses the same `minutes_late`
    /// formula as the classifier.
    pub async fn present_now(
        &self,
        tenant_id: u64,
        branch_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionSummary>, EngineError> {
        let settings = self.settings(tenant_id).await?;
        let day = local_day(now, &settings);
        let (from, to) = day_window_utc(day, &settings);

        let sessions = self.store().sessions_in_window(tenant_id, from, to).await?;
        let employees: HashMap<u64, _> = self
            .directory()
            .active_employees(tenant_id)
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        let mut out = Vec::new();
        for session in sessions.iter().filter(|s| s.is_open()) {
            let Some(employee) = employees.get(&session.employee_id) else {
                continue;
            };
            if branch_id.is_some() && employee.branch_id != branch_id {
                continue;
            }
            let shift = employee.shift_start.unwrap_or(settings.default_shift_start);
            out.push(SessionSummary {
                session_id: session.id,
                employee_id: session.employee_id,
                display_name: employee.display_name.clone(),
                check_in: session.check_in,
                minutes_late: minutes_late(
                    session.check_in,
                    shift_start_utc(day, shift, &settings),
                    settings.grace_period_minutes,
                ),
            });
        }
        out.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(out)
    }
}

fn earliest_by_employee(sessions: &[AttendanceSession]) -> HashMap<u64, DateTime<Utc>> {
    let mut map: HashMap<u64, DateTime<Utc>> = HashMap::new();
    for s in sessions {
        map.entry(s.employee_id)
            .and_modify(|t| {
                if s.check_in < *t {
                    *t = s.check_in;
                }
            })
            .or_insert(s.check_in);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> TenantSettings {
        TenantSettings {
            grace_period_minutes: 15,
            late_window_minutes: 60,
            default_shift_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            tz_offset_minutes: 0,
            ..TenantSettings::default()
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, h, m, 0).unwrap()
    }

    fn input(check_in: Option<DateTime<Utc>>) -> ClassificationInput {
        ClassificationInput {
            employee_id: 1,
            display_name: "Jane Roe".into(),
            shift_start: Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            check_in,
            on_leave: false,
            on_free_task: false,
        }
    }

    #[test]
    fn no_check_in_by_day_end_is_absent() {
        let c = classify_employee(&input(None), day(), at(23, 0), &settings()).unwrap();
        assert_eq!(c.status, DayStatus::Absent);
        assert_eq!(c.minutes_late, None);
    }

    #[test]
    fn window_still_open_is_not_yet_due() {
        // Deadline is 09:00 + 15 + 60 = 10:15.
        let c = classify_employee(&input(None), day(), at(10, 0), &settings()).unwrap();
        assert_eq!(c.status, DayStatus::NotYetDue);
        let c = classify_employee(&input(None), day(), at(10, 15), &settings()).unwrap();
        assert_eq!(c.status, DayStatus::NotYetDue);
        let c = classify_employee(&input(None), day(), at(10, 16), &settings()).unwrap();
        assert_eq!(c.status, DayStatus::Absent);
    }

    #[test]
    fn check_in_within_grace_is_on_time_with_zero_minutes_late() {
        let c = classify_employee(&input(Some(at(9, 10))), day(), at(23, 0), &settings()).unwrap();
        assert_eq!(c.status, DayStatus::OnTime);
        assert_eq!(c.minutes_late, Some(0));
    }

    #[test]
    fn check_in_past_grace_is_late_by_the_shared_formula() {
        let c = classify_employee(&input(Some(at(9, 20))), day(), at(23, 0), &settings()).unwrap();
        assert_eq!(c.status, DayStatus::Late);
        assert_eq!(c.minutes_late, Some(5));
    }

    #[test]
    fn leave_and_free_task_exempt_without_session() {
        let mut i = input(None);
        i.on_leave = true;
        assert!(classify_employee(&i, day(), at(23, 0), &settings()).is_none());

        let mut i = input(None);
        i.on_free_task = true;
        assert!(classify_employee(&i, day(), at(23, 0), &settings()).is_none());

        // A session wins over the exemption flags.
        let mut i = input(Some(at(9, 0)));
        i.on_leave = true;
        assert!(classify_employee(&i, day(), at(23, 0), &settings()).is_some());
    }

    #[test]
    fn missing_shift_falls_back_to_tenant_default() {
        let mut i = input(None);
        i.shift_start = None;
        let mut s = settings();
        s.default_shift_start = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
        // 13:00 + 75 min = 14:15 deadline; 14:00 is still open.
        let c = classify_employee(&i, day(), at(14, 0), &s).unwrap();
        assert_eq!(c.status, DayStatus::NotYetDue);
    }

    #[test]
    fn list_is_ordered_by_display_name() {
        let mut a = input(None);
        a.employee_id = 1;
        a.display_name = "Zoe".into();
        let mut b = input(None);
        b.employee_id = 2;
        b.display_name = "Amy".into();

        let out = classify_day(&[a, b], day(), at(23, 0), &settings());
        let names: Vec<&str> = out.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["Amy", "Zoe"]);
    }
}
