//! Retry with exponential backoff and jitter.
//!
//! Transient network failures (timeouts, connection resets, 5xx) are
//! retried up to three times; permanent failures short-circuit on the
//! first attempt.

use crate::error::FastBrewError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Whether an error is worth another attempt.
///
/// 4xx statuses (other than the 401 the downloader handles itself),
/// checksum mismatches and local failures are permanent; connection
/// problems, timeouts and 5xx statuses are transient.
pub fn is_retryable(err: &FastBrewError) -> bool {
    match err {
        FastBrewError::Http(e) => {
            if let Some(status) = e.status() {
                status.is_server_error()
            } else {
                // Connect errors, timeouts, resets.
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
        }
        FastBrewError::ApiStatus { status, .. } => *status >= 500,
        FastBrewError::Io(_) => true,
        FastBrewError::Cancelled
        | FastBrewError::UnknownPackage(_)
        | FastBrewError::UnsupportedPlatform(_)
        | FastBrewError::NoBottleForPlatform { .. }
        | FastBrewError::ChecksumMismatch { .. }
        | FastBrewError::UnsupportedFormat(_)
        | FastBrewError::ExtractionUnsafe(_)
        | FastBrewError::InvalidStateTransition { .. }
        | FastBrewError::CacheCorrupt { .. }
        | FastBrewError::Json(_) => false,
        _ => false,
    }
}

/// Run `op` with the default retry policy.
pub async fn with_retry<T, F, Fut>(cancel: &CancellationToken, op: F) -> crate::error::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    with_retry_config(RetryConfig::default(), cancel, op).await
}

pub async fn with_retry_config<T, F, Fut>(
    cfg: RetryConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> crate::error::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    let mut delay = cfg.initial_delay;
    let mut last_err = FastBrewError::Cancelled;

    for attempt in 1..=cfg.max_attempts {
        if cancel.is_cancelled() {
            return Err(FastBrewError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt == cfg.max_attempts {
                    return Err(err);
                }
                if !is_retryable(&err) {
                    return Err(err);
                }
                tracing::debug!(attempt, error = %err, "retrying after failure");
                last_err = err;
            }
        }

        let jitter = {
            let spread = delay.as_secs_f64() * cfg.jitter_factor;
            rand::thread_rng().gen_range(-spread..=spread)
        };
        let sleep_for = Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0));

        tokio::select! {
            _ = cancel.cancelled() => return Err(FastBrewError::Cancelled),
            _ = tokio::time::sleep(sleep_for) => {}
        }

        delay = Duration::from_secs_f64(delay.as_secs_f64() * cfg.multiplier);
    }

    Err(last_err)
}
