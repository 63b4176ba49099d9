//! Attempt-bounded captcha loop shared by every download variant.
//!
//! A captcha round fails far more often than it succeeds, so the loop is
//! bounded by attempt count rather than elapsed time. Between failed rounds
//! it sleeps a small random jitter (sum of two uniform draws) to pace
//! requests like a person would. Callers needing a wall-clock bound wrap
//! the whole call or raise the interrupt flag.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! use sicar_core::download::{AttemptError, CaptchaRetryPolicy, run_attempts};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let policy = CaptchaRetryPolicy::new(3, Duration::ZERO);
//! let interrupt = AtomicBool::new(false);
//! let (value, attempts) = run_attempts(&policy, "demo", &interrupt, |attempt| async move {
//!     if attempt < 2 {
//!         Err(AttemptError::rejected(200, "wrong captcha"))
//!     } else {
//!         Ok(attempt * 10)
//!     }
//! })
//! .await
//! .unwrap();
//! assert_eq!((value, attempts), (20, 2));
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::constants::{DEFAULT_JITTER_MAX, DEFAULT_MAX_ATTEMPTS};
use super::{AttemptError, DownloadError};
use crate::config::SicarConfig;

/// Attempt budget and pacing for the captcha loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaRetryPolicy {
    max_attempts: u32,
    jitter_max: Duration,
}

impl Default for CaptchaRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter_max: DEFAULT_JITTER_MAX,
        }
    }
}

impl CaptchaRetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, jitter_max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            jitter_max,
        }
    }

    /// Builds the policy described by `config`.
    #[must_use]
    pub fn from_config(config: &SicarConfig) -> Self {
        Self::new(config.max_attempts, config.jitter_max())
    }

    /// Returns the maximum number of captcha rounds.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the upper bound of the inter-attempt sleep.
    #[must_use]
    pub fn jitter_max(&self) -> Duration {
        self.jitter_max
    }

    /// Draws one inter-attempt delay in `[0, jitter_max)`.
    ///
    /// Two uniform draws over half the range are summed, giving a triangular
    /// distribution centred on `jitter_max / 2`.
    #[must_use]
    pub fn jitter(&self) -> Duration {
        if self.jitter_max.is_zero() {
            return Duration::ZERO;
        }
        let half = self.jitter_max.as_secs_f64() / 2.0;
        let mut rng = rand::thread_rng();
        let secs = rng.gen_range(0.0..half) + rng.gen_range(0.0..half);
        Duration::from_secs_f64(secs)
    }
}

/// Runs `op` until it succeeds, the budget is spent, or `interrupt` is set.
///
/// `op` receives the 1-based attempt number. Each failure is logged and
/// discarded; only the last one is kept for [`DownloadError::Exhausted`].
/// The interrupt flag is checked before every attempt, which includes the
/// moment right after each jitter sleep. No sleep follows the final attempt.
///
/// Returns the successful value together with the attempt that produced it.
///
/// # Errors
///
/// - [`DownloadError::Exhausted`] after `max_attempts` failed rounds
/// - [`DownloadError::Interrupted`] when the flag is observed
/// - [`DownloadError::Io`] on the first [`AttemptError::Storage`]
pub async fn run_attempts<T, F, Fut>(
    policy: &CaptchaRetryPolicy,
    label: &str,
    interrupt: &AtomicBool,
    mut op: F,
) -> Result<(T, u32), DownloadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        if interrupt.load(Ordering::SeqCst) {
            info!(download = label, attempts = attempt, "download interrupted");
            return Err(DownloadError::Interrupted {
                target: label.to_string(),
                attempts: attempt,
            });
        }

        attempt += 1;
        let error = match op(attempt).await {
            Ok(value) => {
                info!(download = label, attempt, "download attempt succeeded");
                return Ok((value, attempt));
            }
            Err(AttemptError::Storage { path, source }) => {
                warn!(download = label, attempt, path = %path.display(), error = %source, "local write failed, not retrying");
                return Err(DownloadError::io(path, source));
            }
            Err(error) => error,
        };

        match &error {
            AttemptError::CaptchaLength { .. } => {
                debug!(download = label, attempt, max_attempts, error = %error, "captcha guess discarded");
            }
            _ => {
                warn!(download = label, attempt, max_attempts, error = %error, "download attempt failed");
            }
        }

        if attempt >= max_attempts {
            warn!(download = label, attempts = attempt, "attempt budget exhausted");
            return Err(DownloadError::Exhausted {
                target: label.to_string(),
                attempts: attempt,
                last_error: error,
            });
        }

        let delay = policy.jitter();
        debug!(download = label, delay_ms = delay.as_millis(), "pausing before next attempt");
        tokio::time::sleep(delay).await;
    }
}
