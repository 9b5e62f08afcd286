use crate::auth::auth::AuthUser;
use crate::engine::AttendanceEngine;
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use super::attendance::engine_error;

#[derive(Deserialize, IntoParams)]
pub struct PresentQuery {
    /// Restrict to one branch
    pub branch_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct AbsentQuery {
    /// Day to classify, defaults to the tenant-local current day
    pub day: Option<NaiveDate>,
}

/// Who is present right now: open sessions for the current local day.
#[utoipa::path(
    get,
    path = "/api/v1/presence/now",
    params(PresentQuery),
    responses(
        (status = 200, description = "Open sessions for the current day", body = Object, example = json!({
            "data": [{
                "session_id": 100,
                "employee_id": 42,
                "display_name": "John Doe",
                "check_in": "2026-01-01T09:10:00Z",
                "minutes_late": 0
            }]
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn present_now(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<PresentQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let summaries = engine
        .present_now(auth.tenant_id, query.branch_id, Utc::now())
        .await
        .map_err(engine_error)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "data": summaries })))
}

/// Absent count and list for a day. Both fields come from a single
/// classifier pass, so the count always equals the list length.
#[utoipa::path(
    get,
    path = "/api/v1/presence/absent",
    params(AbsentQuery),
    responses(
        (status = 200, description = "Absence report", body = Object, example = json!({
            "count": 1,
            "employees": [{ "employee_id": 42, "display_name": "John Doe" }]
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn absent(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    query: web::Query<AbsentQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let now = Utc::now();
    let day = match query.day {
        Some(day) => day,
        None => {
            let settings = match engine.settings(auth.tenant_id).await {
                Ok(s) => s,
                Err(e) => return Err(engine_error(e)),
            };
            crate::engine::local_day(now, &settings)
        }
    };

    let report = engine
        .absence_report(auth.tenant_id, day, now)
        .await
        .map_err(engine_error)?;

    Ok(HttpResponse::Ok().json(report))
}

/// Force-executes expired auto-checkout countdowns for the tenant. Meant
/// for a scheduled job covering devices that stopped sending heartbeats.
#[utoipa::path(
    post,
    path = "/api/v1/presence/sweep",
    responses(
        (status = 200, description = "Sweep finished", body = Object, example = json!({
            "executed": 2
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn sweep(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
) -> actix_web::Result<impl Responder> {
    auth.require_system_or_admin()?;

    let executed = engine
        .sweep_expired(auth.tenant_id, Utc::now())
        .await
        .map_err(engine_error)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "executed": executed })))
}
