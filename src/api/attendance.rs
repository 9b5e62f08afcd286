use crate::auth::auth::AuthUser;
use crate::engine::error::EngineError;
use crate::engine::store::LocationEvidence;
use crate::engine::AttendanceEngine;
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CheckInRequest {
    #[serde(default)]
    pub evidence: LocationEvidence,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckOutRequest {
    #[schema(example = 100)]
    pub session_id: u64,
    #[serde(default)]
    pub evidence: LocationEvidence,
}

#[derive(Deserialize, ToSchema)]
pub struct HeartbeatRequest {
    #[schema(example = 100)]
    pub session_id: u64,
    #[schema(example = false)]
    pub in_zone: bool,
    #[schema(example = true)]
    pub gps_valid: bool,
    #[serde(default)]
    pub evidence: LocationEvidence,
}

pub(crate) fn engine_error(e: EngineError) -> actix_web::Error {
    match e {
        EngineError::Busy => actix_web::error::ErrorServiceUnavailable("Busy, retry later"),
        EngineError::EmployeeInactiveOrNotFound => {
            actix_web::error::ErrorNotFound("Employee inactive or not found")
        }
        other => {
            tracing::error!(error = %other, "engine request failed");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        }
    }
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/v1/attendance",
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Checked in successfully", body = Object, example = json!({
            "message": "Checked in successfully",
            "session_id": 100
        })),
        (status = 409, description = "An open session already exists", body = Object, example = json!({
            "message": "An open session already exists for this employee"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee inactive or not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    body: web::Json<CheckInRequest>,
    req: HttpRequest,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee_id()?;

    let mut evidence = body.into_inner().evidence;
    if evidence.source_ip.is_none() {
        evidence.source_ip = req.peer_addr().map(|a| a.ip().to_string());
    }

    match engine
        .check_in(auth.tenant_id, employee_id, evidence, Utc::now())
        .await
    {
        Ok(session_id) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Checked in successfully",
            "session_id": session_id
        }))),
        Err(EngineError::DuplicateOpenSession) => {
            Ok(HttpResponse::Conflict().json(serde_json::json!({
                "message": "An open session already exists for this employee"
            })))
        }
        Err(e) => Err(engine_error(e)),
    }
}

/// Manual check-out endpoint. Idempotent: a second call reports the session
/// as already closed without touching the stored working duration.
#[utoipa::path(
    put,
    path = "/api/v1/attendance",
    request_body = CheckOutRequest,
    responses(
        (status = 200, description = "Checked out successfully", body = Object, example = json!({
            "message": "Checked out successfully",
            "working_secs": 28800
        })),
        (status = 400, description = "Session already closed", body = Object, example = json!({
            "message": "Session already closed"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    body: web::Json<CheckOutRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_employee_id()?;

    match engine
        .check_out(auth.tenant_id, body.session_id, Utc::now())
        .await
    {
        Ok(working_secs) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "Checked out successfully",
            "working_secs": working_secs
        }))),
        Err(EngineError::AlreadyClosed) => Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "Session already closed"
        }))),
        Err(e) => Err(engine_error(e)),
    }
}

/// Presence heartbeat endpoint. Returns the auto-checkout decision taken for
/// this report.
#[utoipa::path(
    post,
    path = "/api/v1/attendance/heartbeat",
    request_body = HeartbeatRequest,
    responses(
        (status = 200, description = "Heartbeat processed", body = Object, example = json!({
            "decision": "pending_created",
            "reason": "out_of_zone",
            "deadline": "2026-01-01T09:05:00Z"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Employee or session not found"),
        (status = 503, description = "Employee busy, retry later"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn heartbeat(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    body: web::Json<HeartbeatRequest>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee_id()?;
    let body = body.into_inner();

    let decision = engine
        .record_heartbeat(
            auth.tenant_id,
            employee_id,
            body.session_id,
            body.in_zone,
            body.gps_valid,
            body.evidence,
            Utc::now(),
        )
        .await
        .map_err(engine_error)?;

    Ok(HttpResponse::Ok().json(decision))
}
