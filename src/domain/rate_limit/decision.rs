//! Outcome of a single rate limit check.

use std::fmt;

use super::policy::Policy;

/// How a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionOutcome {
    /// Counted and under the limit.
    Allowed,
    /// Counted and over the limit.
    Denied,
    /// Counting failed; the request is let through.
    DegradedAllowed,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Allowed => "allowed",
            DecisionOutcome::Denied => "denied",
            DecisionOutcome::DegradedAllowed => "degraded_allowed",
        }
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-request verdict plus the metadata exposed in response headers.
///
/// Built fresh for every request and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: DecisionOutcome,
    pub policy_name: String,
    /// `X-RateLimit-Policy` value for the resolved policy.
    pub policy_descriptor: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: u64,
    pub observed_count: u64,
}

impl Decision {
    /// Builds a counted decision: allowed while `observed_count <= limit`.
    pub fn counted(policy: &Policy, observed_count: u64, reset_at_ms: u64) -> Self {
        let limit = policy.request_limit();
        let outcome = if observed_count <= u64::from(limit) {
            DecisionOutcome::Allowed
        } else {
            DecisionOutcome::Denied
        };

        Self {
            outcome,
            policy_name: policy.name().to_string(),
            policy_descriptor: policy.descriptor(),
            limit,
            remaining: u64::from(limit).saturating_sub(observed_count) as u32,
            reset_at_ms,
            observed_count,
        }
    }

    /// Builds the fail-open decision used when counting failed.
    pub fn degraded(policy: &Policy, now_ms: u64) -> Self {
        Self {
            outcome: DecisionOutcome::DegradedAllowed,
            policy_name: policy.name().to_string(),
            policy_descriptor: policy.descriptor(),
            limit: policy.request_limit(),
            remaining: policy.request_limit(),
            reset_at_ms: now_ms.saturating_add(policy.window().millis()),
            observed_count: 0,
        }
    }

    /// Whether the request may proceed.
    pub fn allowed(&self) -> bool {
        !matches!(self.outcome, DecisionOutcome::Denied)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, DecisionOutcome::DegradedAllowed)
    }

    /// Reset time as epoch seconds, for `X-RateLimit-Reset`.
    pub fn reset_at_secs(&self) -> u64 {
        ceil_secs(self.reset_at_ms)
    }

    /// Whole seconds until reset, rounded up and never negative.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        ceil_secs(self.reset_at_ms.saturating_sub(now_ms))
    }
}

fn ceil_secs(millis: u64) -> u64 {
    millis / 1000 + u64::from(millis % 1000 != 0)
}
