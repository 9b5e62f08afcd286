use thiserror::Error;

/// Failures surfaced by storage implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique-constraint hit on the open-session / one-per-day rule.
    #[error("an open session already exists for this employee")]
    DuplicateOpenSession,

    /// Unique-constraint hit on the at-most-one-pending rule.
    #[error("a pending countdown already exists for this session")]
    DuplicatePending,

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // SQLSTATE 23000 is MySQL's integrity-constraint violation class.
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().as_deref() == Some("23000") {
                return StoreError::DuplicateOpenSession;
            }
        }
        StoreError::Backend(e.to_string())
    }
}

/// Engine-level error taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Recoverable: the caller should fetch the existing open session
    /// instead of retrying blindly.
    #[error("an open session already exists for this employee")]
    DuplicateOpenSession,

    /// Recoverable, idempotent no-op on the close path.
    #[error("session is already closed")]
    AlreadyClosed,

    /// Fatal to the request.
    #[error("employee is inactive or unknown")]
    EmployeeInactiveOrNotFound,

    /// Per-employee lock could not be acquired after bounded retries.
    #[error("employee is busy, retry later")]
    Busy,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateOpenSession => EngineError::DuplicateOpenSession,
            other => EngineError::Store(other),
        }
    }
}
