use std::future::Future;
use std::time::Duration;

use super::InferenceError;

/// Retry policy for the one transient signal the model API emits (HTTP 503).
///
/// After overloaded attempt `n` (1-based) the caller sleeps `2 * n` backoff
/// units. Every other failure is returned immediately.
#[derive(Debug, Clone, Copy)]
pub struct OverloadRetry {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for OverloadRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl OverloadRetry {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * (2 * attempt)
    }
}

/// Outcome of one request attempt.
pub enum Attempt<T> {
    Done(T),
    Overloaded,
}

pub async fn retry_on_overload<T, F, Fut>(
    policy: &OverloadRetry,
    mut attempt_fn: F,
) -> Result<T, InferenceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, InferenceError>>,
{
    for attempt in 1..=policy.max_attempts {
        match attempt_fn(attempt).await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Overloaded => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Model overloaded (503), backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    tracing::error!(
        attempts = policy.max_attempts,
        "Giving up after repeated overload responses"
    );
    Err(InferenceError::Overloaded {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fast() -> OverloadRetry {
        OverloadRetry {
            max_attempts: 3,
            backoff_unit: Duration::from_millis(1),
        }
    }

    #[test]
    fn default_backoff_grows_two_units_per_attempt() {
        let policy = OverloadRetry::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn three_overloads_exhaust_retries() {
        let seen = Mutex::new(Vec::new());
        let result: Result<(), _> = retry_on_overload(&fast(), |attempt| {
            seen.lock().unwrap().push(attempt);
            async { Ok(Attempt::Overloaded) }
        })
        .await;

        assert!(matches!(
            result,
            Err(InferenceError::Overloaded { attempts: 3 })
        ));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn backoff_waits_accumulate() {
        let policy = OverloadRetry {
            max_attempts: 3,
            backoff_unit: Duration::from_millis(5),
        };
        let started = std::time::Instant::now();
        let _: Result<(), _> =
            retry_on_overload(&policy, |_| async { Ok(Attempt::Overloaded) }).await;
        // 2 + 4 + 6 units
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn recovers_after_one_overload() {
        let result = retry_on_overload(&fast(), |attempt| async move {
            if attempt == 1 {
                Ok(Attempt::Overloaded)
            } else {
                Ok(Attempt::Done(format!("answer on attempt {attempt}")))
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "answer on attempt 2");
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = Mutex::new(0u32);
        let result: Result<(), _> = retry_on_overload(&fast(), |_| {
            *calls.lock().unwrap() += 1;
            async {
                Err(InferenceError::Api {
                    status: 400,
                    body: "bad request".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(InferenceError::Api { status: 400, .. })));
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
