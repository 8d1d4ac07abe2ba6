//! Bounded retry with exponential backoff for transient downstream
//! failures.
//!
//! Only `Timeout` and `Transient` kinds are retried; validation,
//! authorization, and cryptographic failures surface unchanged on the first
//! attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use aegis_core::error::AegisError;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_secs(2);

/// Run `op` under `deadline`, retrying transient failures with exponential
/// backoff. Deadline expiry surfaces as `Timeout`.
pub async fn with_retry<T, F, Fut>(
    op_name: &str,
    deadline: Duration,
    mut op: F,
) -> Result<T, AegisError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AegisError>>,
{
    let mut delay = BASE_DELAY;
    let mut attempt = 1;
    loop {
        let result = tokio::time::timeout(deadline, op())
            .await
            .map_err(|_| AegisError::Timeout(op_name.to_string()))?;

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.kind().retryable() && attempt < MAX_ATTEMPTS => {
                warn!(op = op_name, attempt, error = %e, "transient failure; retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
