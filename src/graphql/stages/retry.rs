use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use rand::Rng;
use tracing::warn;

use crate::graphql::pipeline::{GraphqlReply, GraphqlRequest, Next, PipelineError, Stage};

const METRIC_RETRY: &str = "vetrina_graphql_retry_total";

/// Backoff schedule for retryable failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub factor: u32,
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Ceiling for a single delay; `None` leaves delays uncapped.
    pub max_delay: Option<Duration>,
    /// Draw each delay uniformly from `[0, base)` instead of sleeping the
    /// full base delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(300),
            factor: 2,
            max_attempts: 5,
            max_delay: None,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let multiplier = self.factor.max(1).saturating_pow(exponent);
        let delay = self.initial_delay.saturating_mul(multiplier);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let millis = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..millis.max(1)))
    }
}

/// Re-runs the rest of the chain on retryable failures.
#[derive(Debug, Clone, Default)]
pub struct RetryStage {
    policy: RetryPolicy,
}

impl RetryStage {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Stage for RetryStage {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn call(
        &self,
        request: GraphqlRequest,
        next: Next<'_>,
    ) -> Result<GraphqlReply, PipelineError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match next.run(request.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.delay(attempt);
                    counter!(METRIC_RETRY).increment(1);
                    warn!(
                        target = "vetrina::graphql",
                        operation = request.operation.label(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_grows_geometrically() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(1), Duration::from_millis(300));
        assert_eq!(policy.base_delay(2), Duration::from_millis(600));
        assert_eq!(policy.base_delay(4), Duration::from_millis(2400));
    }

    #[test]
    fn jittered_delay_stays_below_base() {
        let policy = RetryPolicy::default();
        for retry in 1..5 {
            assert!(policy.delay(retry) < policy.base_delay(retry));
        }
    }

    #[test]
    fn cap_applies_when_set() {
        let policy = RetryPolicy {
            max_delay: Some(Duration::from_millis(500)),
            jitter: false,
            ..Default::default()
        };
        assert_eq!(policy.delay(3), Duration::from_millis(500));
    }
}
