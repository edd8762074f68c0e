//! Exponential backoff with bounded jitter.

use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to every delay.
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_max: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately; for tests and offline runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }

    /// `min(base * 2^attempt, max_delay)` without jitter.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    /// Capped exponential delay plus uniform jitter in `[0, jitter_max]`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter_max.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.capped_delay(attempt) + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails terminally, or transient failures
    /// exceed the retry ceiling. `op` receives the zero-based attempt number.
    pub fn run<T, F>(&self, op: F) -> Result<T, LlmError>
    where
        F: FnMut(u32) -> Result<T, LlmError>,
    {
        self.run_with_sleep(op, std::thread::sleep)
    }

    pub fn run_with_sleep<T, F, S>(&self, mut op: F, sleep: S) -> Result<T, LlmError>
    where
        F: FnMut(u32) -> Result<T, LlmError>,
        S: Fn(Duration),
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= self.max_retries => {
                    tracing::debug!(attempts = attempt + 1, "all retry attempts exhausted");
                    return Err(LlmError::Exhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "request failed, retrying after backoff"
                    );
                    sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            jitter_max: Duration::from_millis(20),
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.capped_delay(0), Duration::from_millis(100));
        assert_eq!(p.capped_delay(1), Duration::from_millis(200));
        assert_eq!(p.capped_delay(2), Duration::from_millis(350));
        assert_eq!(p.capped_delay(200), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let p = policy();
        for attempt in 0..4 {
            let d = p.backoff_delay(attempt);
            let base = p.capped_delay(attempt);
            assert!(d >= base && d <= base + p.jitter_max, "{d:?}");
        }
    }

    #[test]
    fn transient_failures_then_success() {
        let slept = RefCell::new(Vec::new());
        let result = policy().run_with_sleep(
            |attempt| {
                if attempt < 2 {
                    Err(LlmError::Status {
                        code: 503,
                        body: String::new(),
                    })
                } else {
                    Ok(attempt)
                }
            },
            |d| slept.borrow_mut().push(d),
        );
        assert_eq!(result.unwrap(), 2);
        assert_eq!(slept.borrow().len(), 2);
    }

    #[test]
    fn terminal_failure_is_not_retried() {
        let mut calls = 0;
        let err = policy()
            .run_with_sleep(
                |_| -> Result<(), LlmError> {
                    calls += 1;
                    Err(LlmError::Status {
                        code: 400,
                        body: "bad".into(),
                    })
                },
                |_| {},
            )
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, LlmError::Status { code: 400, .. }));
    }

    #[test]
    fn exhaustion_reports_attempt_count() {
        let mut calls = 0;
        let err = policy()
            .run_with_sleep(
                |_| -> Result<(), LlmError> {
                    calls += 1;
                    Err(LlmError::Timeout)
                },
                |_| {},
            )
            .unwrap_err();
        assert_eq!(calls, 4);
        match err {
            LlmError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, LlmError::Timeout));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
