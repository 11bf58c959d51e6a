//! ---
//! ws_section: "04-orchestration"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Update orchestration state machine and lifecycle operations."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use worldshift_common::config::{PolicyConfig, PostRollbackPolicyKind};

/// Exponential backoff for retrying the idempotent restore sync pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: usize,
    /// Delay before the second attempt; doubles afterwards.
    pub base_delay: Duration,
    /// Upper bound of random jitter added to each delay.
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter,
        }
    }

    /// Delay before `attempt` (1-indexed, so attempt 2 waits `base_delay`).
    pub fn backoff_delay(&self, attempt: usize, rng: &mut StdRng) -> Duration {
        let exponent = (attempt.saturating_sub(2) as u32).min(8);
        let base = self.base_delay.mul_f64(2u32.pow(exponent) as f64);
        if self.jitter.is_zero() {
            base
        } else {
            let jitter_ms = rng.gen_range(0..=self.jitter.as_millis().max(1)) as u64;
            base + Duration::from_millis(jitter_ms)
        }
    }

    pub fn rng() -> StdRng {
        StdRng::from_entropy()
    }
}

/// What to do when a step fails after the rollback point has been crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostRollbackPolicy {
    /// Stop in `Failed` and leave recovery to the operator.
    #[default]
    HaltForOperator,
    /// Retry the restore sync pair before failing.
    RetryRestore(RetryPolicy),
}

impl PostRollbackPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        match config.post_rollback {
            PostRollbackPolicyKind::HaltForOperator => PostRollbackPolicy::HaltForOperator,
            PostRollbackPolicyKind::RetryRestore => PostRollbackPolicy::RetryRestore(RetryPolicy::new(
                config.restore_attempts,
                config.restore_backoff,
                config.restore_backoff / 10,
            )),
        }
    }

    pub fn restore_attempts(&self) -> usize {
        match self {
            PostRollbackPolicy::HaltForOperator => 1,
            PostRollbackPolicy::RetryRestore(retry) => retry.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_second_attempt() {
        let policy = RetryPolicy::new(4, Duration::from_secs(5), Duration::ZERO);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(policy.backoff_delay(2, &mut rng), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(3, &mut rng), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(4, &mut rng), Duration::from_secs(20));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1), Duration::from_millis(100));
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..32 {
            let delay = policy.backoff_delay(2, &mut rng);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn halt_is_the_default() {
        let policy = PostRollbackPolicy::from_config(&PolicyConfig::default());
        assert_eq!(policy, PostRollbackPolicy::HaltForOperator);
        assert_eq!(policy.restore_attempts(), 1);
    }
}
