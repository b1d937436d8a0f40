use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// Run `operation` up to `max_attempts` times with exponential backoff
/// (`base_delay`, 2×, 4×, …). Returns the last error when all attempts fail.
pub async fn with_retry<T, E, F, Fut>(
    name: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}/{}", name, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                warn!("{} failed after {} attempts: {}", name, attempt, e);
                return Err(e);
            }
            Err(e) => {
                let delay = base_delay * 2u32.saturating_pow(attempt - 1);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    name, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
