// Lyric Director Supervisor - Retry with Exponential Backoff
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// Wraps backend calls in a Try-Wait-Retry loop:
//   1. Execute the call
//   2. Ask the error whether it is transient (and whether the server
//      suggested a wait)
//   3. Retry with jittered exponential backoff, bounded by max_retries

use crate::config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

const JITTER_LOW: f64 = 0.8;
const JITTER_HIGH: f64 = 1.2;

/// What the supervisor needs to know about an error to decide on a retry.
pub trait RetryHint {
    fn is_transient(&self) -> bool;

    /// Server-suggested wait before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            initial_delay: cfg.initial_delay,
            max_delay: cfg.max_delay,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl BackoffPolicy {
    /// Delay before retry `retry` (0-based) for a given jitter factor.
    ///
    /// Jitter is applied before the cap so consecutive delays never shrink:
    /// doubling beats the worst jitter ratio (0.8 / 1.2).
    pub fn delay_for(&self, retry: u32, jitter: f64) -> Duration {
        let base = self.initial_delay.as_secs_f64() * 2f64.powi(retry.min(30) as i32);
        let jittered = base * jitter.clamp(JITTER_LOW, JITTER_HIGH);
        Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
    }
}

pub struct AntifragileSupervisor {
    policy: BackoffPolicy,
}

impl AntifragileSupervisor {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy }
    }

    /// Execute an async task with automatic retry and exponential backoff,
    /// sleeping on the tokio timer.
    pub async fn execute_with_retry<T, E, F, Fut>(&self, task_name: &str, run: F) -> Result<T, E>
    where
        E: RetryHint + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_sleeper(task_name, run, tokio::time::sleep)
            .await
    }

    /// Same as [`execute_with_retry`](Self::execute_with_retry) with an
    /// injected sleeper.
    pub async fn execute_with_sleeper<T, E, F, Fut, S, SFut>(
        &self,
        task_name: &str,
        mut run: F,
        mut sleep: S,
    ) -> Result<T, E>
    where
        E: RetryHint + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        S: FnMut(Duration) -> SFut,
        SFut: Future<Output = ()>,
    {
        let mut retries = 0u32;
        let mut last_delay = Duration::ZERO;

        loop {
            match run().await {
                Ok(result) => {
                    if retries > 0 {
                        info!(
                            "[SUPERVISOR] ✅ Task '{}' succeeded after {} retries.",
                            task_name, retries
                        );
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_transient() => {
                    return Err(e);
                }
                Err(e) => {
                    if retries >= self.policy.max_retries {
                        error!(
                            "[SUPERVISOR] Task '{}' exhausted all {} retries. Last error: {}",
                            task_name, self.policy.max_retries, e
                        );
                        return Err(e);
                    }

                    let jitter = rand::thread_rng().gen_range(JITTER_LOW..=JITTER_HIGH);
                    let mut delay = self.policy.delay_for(retries, jitter);
                    if let Some(hint) = e.retry_after() {
                        delay = delay.max(hint);
                    }
                    // A server hint on an earlier attempt must not make the
                    // schedule go backwards.
                    delay = delay.max(last_delay);
                    last_delay = delay;
                    retries += 1;

                    warn!(
                        "[SUPERVISOR] Task '{}' failed ({}). Retry {}/{} in {:.1}s",
                        task_name,
                        e,
                        retries,
                        self.policy.max_retries,
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            max_retries: 8,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for(0, 1.0), Duration::from_secs(2));
        assert_eq!(p.delay_for(1, 1.0), Duration::from_secs(4));
        assert_eq!(p.delay_for(3, 1.0), Duration::from_secs(16));
        assert_eq!(p.delay_for(10, 1.0), Duration::from_secs(120));
        assert_eq!(p.delay_for(10, 0.8), Duration::from_secs(120));
    }

    #[test]
    fn test_worst_case_jitter_is_still_monotonic() {
        let p = policy();
        for n in 0..12 {
            assert!(p.delay_for(n + 1, JITTER_LOW) >= p.delay_for(n, JITTER_HIGH));
        }
    }

    #[test]
    fn test_jitter_is_clamped() {
        let p = policy();
        assert_eq!(p.delay_for(0, 5.0), p.delay_for(0, JITTER_HIGH));
    }
}
