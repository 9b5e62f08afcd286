use crate::api::attendance::{CheckInRequest, CheckOutRequest, HeartbeatRequest};
use crate::engine::classifier::{AbsenceDetail, AbsenceReport, DayStatus, SessionSummary};
use crate::engine::presence::PresenceDecision;
use crate::engine::store::{CheckoutType, LocationEvidence, ViolationReason};
use crate::model::employee::Employee;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Presence Engine API",
        version = "1.0.0",
        description = r#"
## Attendance Presence & Auto-Checkout Engine

Multi-tenant employee presence backend.

### Key Features
- **Attendance Sessions**
  - Check-in/check-out with a single-open-session guarantee per employee
- **Presence Heartbeats**
  - Geofence/GPS heartbeat ingestion with an auto-checkout countdown
- **Lateness & Absence**
  - One deterministic classifier behind both the absent count and the absent list

### Security
Endpoints are protected with **JWT Bearer authentication** issued by the
external auth service; claims carry the tenant and employee identity.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::heartbeat,

        crate::api::presence::present_now,
        crate::api::presence::absent,
        crate::api::presence::sweep
    ),
    components(
        schemas(
            CheckInRequest,
            CheckOutRequest,
            HeartbeatRequest,
            LocationEvidence,
            PresenceDecision,
            CheckoutType,
            ViolationReason,
            DayStatus,
            AbsenceDetail,
            AbsenceReport,
            SessionSummary,
            Employee
        )
    ),
    tags(
        (name = "Attendance", description = "Check-in, check-out and heartbeat APIs"),
        (name = "Presence", description = "Presence and absence reporting APIs"),
    )
)]
pub struct ApiDoc;
