use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Directory read model consumed by the presence engine.
///
/// `shift_start` is the employee's assigned shift start in the tenant's local
/// time; `None` means the tenant default applies.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "tenant_id": 10,
        "display_name": "John Doe",
        "branch_id": 3,
        "shift_start": "09:00:00",
        "active": true
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 10)]
    pub tenant_id: u64,

    #[schema(example = "John Doe")]
    pub display_name: String,

    #[schema(example = 3, nullable = true)]
    pub branch_id: Option<u64>,

    #[schema(example = "09:00:00", value_type = String, format = "time", nullable = true)]
    pub shift_start: Option<NaiveTime>,

    #[schema(example = true)]
    pub active: bool,
}
