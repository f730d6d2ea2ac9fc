use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Breaker guarding a remote collaborator.
pub type UpstreamBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

pub const FAILURE_THRESHOLD: u32 = 5;

/// Creates a circuit breaker for calls to a flaky upstream (the narrative generator).
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures trips the breaker OPEN.
/// - **Backoff**: exponential from 10s to 60s before a trial call is let through.
///
/// While OPEN every call is rejected immediately, so callers reach their fallback
/// without waiting on a timeout.
pub fn create_upstream_circuit_breaker() -> UpstreamBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));
    let policy = failure_policy::consecutive_failures(FAILURE_THRESHOLD, backoff_strategy);
    Config::new().failure_policy(policy).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use failsafe::futures::CircuitBreaker as _;
    use failsafe::Error;

    #[tokio::test]
    async fn test_breaker_opens_after_consecutive_failures() {
        let cb = create_upstream_circuit_breaker();

        for _ in 0..FAILURE_THRESHOLD {
            let result = cb.call(async { Err::<(), &str>("upstream down") }).await;
            assert!(matches!(result, Err(Error::Inner("upstream down"))));
        }

        let result = cb.call(async { Ok::<(), &str>(()) }).await;
        assert!(matches!(result, Err(Error::Rejected)));
    }

    #[tokio::test]
    async fn test_breaker_passes_success_through() {
        let cb = create_upstream_circuit_breaker();
        let result = cb.call(async { Ok::<i32, &str>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = create_upstream_circuit_breaker();
        for _ in 0..FAILURE_THRESHOLD - 1 {
            let _ = cb.call(async { Err::<(), &str>("blip") }).await;
        }
        assert!(cb.call(async { Ok::<(), &str>(()) }).await.is_ok());
        let _ = cb.call(async { Err::<(), &str>("blip") }).await;
        assert!(cb.call(async { Ok::<(), &str>(()) }).await.is_ok());
    }
}
