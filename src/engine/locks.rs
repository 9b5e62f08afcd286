use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::engine::error::EngineError;

const ACQUIRE_ATTEMPTS: u32 = 3;
const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(500);
const BACKOFF_STEP: Duration = Duration::from_millis(50);

/// Per `(tenant_id, employee_id)` serialization point.
///
/// Every engine operation that touches sessions, heartbeats or countdowns for
/// an employee runs under this lock, so the state-machine transitions in
/// `presence.rs` evaluate as a single atomic unit per employee. Acquisition is
/// retried with backoff a bounded number of times before surfacing `Busy`.
pub struct LockRegistry {
    inner: std::sync::Mutex<HashMap<(u64, u64), Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(
        &self,
        tenant_id: u64,
        employee_id: u64,
    ) -> Result<OwnedMutexGuard<()>, EngineError> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry((tenant_id, employee_id))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        for attempt in 0..ACQUIRE_ATTEMPTS {
            match tokio::time::timeout(ACQUIRE_TIMEOUT, lock.clone().lock_owned()).await {
                Ok(guard) => return Ok(guard),
                Err(_) => {
                    tracing::warn!(tenant_id, employee_id, attempt, "employee lock contended");
                    tokio::time::sleep(BACKOFF_STEP * (attempt + 1)).await;
                }
            }
        }

        Err(EngineError::Busy)
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
