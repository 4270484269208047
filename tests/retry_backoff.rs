// Lyric Director Retry Supervisor Tests
// Copyright (c) 2026 Xing_The_Creator | Lyric Director

use lyric_director::agent::gemini_bridge::GenAiError;
use lyric_director::agent::supervisor::{AntifragileSupervisor, BackoffPolicy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn policy(max_retries: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        initial_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(120),
    }
}

fn recording_sleeper(
    log: Arc<Mutex<Vec<Duration>>>,
) -> impl FnMut(Duration) -> std::future::Ready<()> {
    move |d| {
        log.lock().unwrap().push(d);
        std::future::ready(())
    }
}

#[tokio::test]
async fn test_k_failures_then_success_sleeps_k_times() {
    for k in 0..5u32 {
        let supervisor = AntifragileSupervisor::new(policy(5));
        let calls = Arc::new(AtomicU32::new(0));
        let sleeps = Arc::new(Mutex::new(Vec::new()));

        let result: Result<&str, GenAiError> = supervisor
            .execute_with_sleeper(
                "flaky",
                || {
                    let calls = calls.clone();
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n < k {
                            Err(GenAiError::Server {
                                status: 503,
                                message: "overloaded".to_string(),
                            })
                        } else {
                            Ok("done")
                        }
                    }
                },
                recording_sleeper(sleeps.clone()),
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), k + 1);
        let sleeps = sleeps.lock().unwrap();
        assert_eq!(sleeps.len(), k as usize);
        for pair in sleeps.windows(2) {
            assert!(pair[0] <= pair[1], "delays decreased: {:?}", *sleeps);
        }
    }
}

#[tokio::test]
async fn test_exhaustion_returns_last_error() {
    let supervisor = AntifragileSupervisor::new(policy(2));
    let sleeps = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicU32::new(0));

    let result: Result<(), GenAiError> = supervisor
        .execute_with_sleeper(
            "always down",
            || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err(GenAiError::Network(format!("attempt {}", n)))
                }
            },
            recording_sleeper(sleeps.clone()),
        )
        .await;

    match result {
        Err(GenAiError::Network(msg)) => assert_eq!(msg, "attempt 2"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(sleeps.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_safety_block_is_never_retried() {
    let supervisor = AntifragileSupervisor::new(policy(3));
    let sleeps = Arc::new(Mutex::new(Vec::new()));

    let result: Result<(), GenAiError> = supervisor
        .execute_with_sleeper(
            "blocked",
            || async {
                Err(GenAiError::Blocked {
                    reason: "SAFETY".to_string(),
                })
            },
            recording_sleeper(sleeps.clone()),
        )
        .await;

    assert!(result.unwrap_err().is_blocked());
    assert!(sleeps.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limit_hint_raises_delay() {
    let supervisor = AntifragileSupervisor::new(policy(3));
    let sleeps = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicU32::new(0));

    let result: Result<u8, GenAiError> = supervisor
        .execute_with_sleeper(
            "rate limited",
            || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(GenAiError::RateLimited {
                            retry_after: Some(Duration::from_secs(30)),
                            message: "quota".to_string(),
                        })
                    } else {
                        Ok(7)
                    }
                }
            },
            recording_sleeper(sleeps.clone()),
        )
        .await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(*sleeps.lock().unwrap(), vec![Duration::from_secs(30)]);
}
