use serde::{Deserialize, Serialize};

/// JWT claims issued by the external auth service. The engine trusts the
/// tenant/employee identity validated here at the request boundary and never
/// re-derives permissions inside business logic.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    pub tenant_id: u64,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
