//! Bounded timeout and sequential retry around vendor calls.
//!
//! Only transport failures (timeouts and connection errors) are retried. The delay before
//! retry `n` (0-based) is `min(initial * factor^n, max)`, reduced by a random fraction of up
//! to `interval_randomness`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::domain::ApplicantPii;
use super::result::VendorResult;
use super::vendor::{Proofer, VendorError};
use crate::config::VendorConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub interval_randomness: f64,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&VendorConfig::default())
    }
}

impl From<&VendorConfig> for RetryPolicy {
    fn from(config: &VendorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: config.timeout,
            initial_interval: config.initial_interval,
            backoff_factor: config.backoff_factor,
            interval_randomness: config.interval_randomness.clamp(0.0, 1.0),
            max_interval: config.max_interval,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_interval.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = base.min(self.max_interval.as_secs_f64()).max(0.0);

        let jitter = 1.0 - rand::random::<f64>() * self.interval_randomness;
        Duration::try_from_secs_f64(capped * jitter).unwrap_or(self.max_interval)
    }
}

/// Outcome of a retried call together with the number of vendor calls made.
#[derive(Debug)]
pub struct Attempted<T> {
    pub outcome: Result<T, VendorError>,
    pub attempts: u32,
}

/// Runs `call` until it succeeds, fails with a non-retryable error, or the attempt budget
/// is spent. Each attempt is bounded by `policy.timeout`.
pub async fn call_with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    vendor: &str,
    mut call: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VendorError>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let started = Instant::now();
        let outcome = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(VendorError::Timeout {
                vendor: vendor.to_string(),
                elapsed: started.elapsed(),
            }),
        };

        match outcome {
            Ok(value) => {
                return Attempted {
                    outcome: Ok(value),
                    attempts,
                }
            }
            Err(error) if error.is_retryable() && attempts < policy.max_attempts() => {
                let delay = policy.delay_for(attempts - 1);
                metrics::counter!("idv_vendor_retries_total", "vendor" => vendor.to_string())
                    .increment(1);
                tracing::debug!(
                    vendor,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying vendor call"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                if matches!(error, VendorError::Timeout { .. }) {
                    tracing::warn!(vendor, attempts, "vendor call timed out");
                }
                return Attempted {
                    outcome: Err(error),
                    attempts,
                };
            }
        }
    }
}

/// Validates required attributes, then proofs with retries. Never fails: errors are folded
/// into the returned [`VendorResult`].
pub async fn proof_with_retries(
    policy: &RetryPolicy,
    proofer: &dyn Proofer,
    applicant: &ApplicantPii,
) -> VendorResult {
    let missing = applicant.missing_attributes(proofer.required_attributes());
    if !missing.is_empty() {
        let error = VendorError::Validation { missing };
        return VendorResult::from_error(proofer.vendor_name(), &error, 0);
    }

    let attempted =
        call_with_retries(policy, proofer.vendor_name(), || proofer.proof(applicant)).await;
    vendor_result_from(proofer.vendor_name(), attempted)
}

/// Collapses an [`Attempted`] vendor call into a [`VendorResult`] carrying the attempt count.
pub fn vendor_result_from(vendor: &str, attempted: Attempted<VendorResult>) -> VendorResult {
    match attempted.outcome {
        Ok(mut result) => {
            result.attempts = attempted.attempts;
            result
        }
        Err(error) => VendorResult::from_error(vendor, &error, attempted.attempts),
    }
}
