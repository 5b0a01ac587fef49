//! Token accounting for model calls.
//!
//! Every `LlmClient` clone records into the same `UsageMeter`. The orchestrator reads the
//! meter before and after each step, so the difference is what that step spent.

use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// USD per million input tokens for `MODEL`.
const INPUT_USD_PER_MILLION: f64 = 3.0;
/// USD per million output tokens for `MODEL`.
const OUTPUT_USD_PER_MILLION: f64 = 15.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn cost_usd(&self) -> f64 {
        (self.input_tokens as f64 * INPUT_USD_PER_MILLION
            + self.output_tokens as f64 * OUTPUT_USD_PER_MILLION)
            / 1_000_000.0
    }

    /// What was spent between `earlier` and `self`.
    pub fn since(&self, earlier: &TokenUsage) -> TokenUsage {
        TokenUsage {
            calls: self.calls.saturating_sub(earlier.calls),
            input_tokens: self.input_tokens.saturating_sub(earlier.input_tokens),
            output_tokens: self.output_tokens.saturating_sub(earlier.output_tokens),
        }
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            calls: self.calls + rhs.calls,
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> TokenUsage {
        iter.fold(TokenUsage::default(), Add::add)
    }
}

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

/// Shared running total of model usage.
#[derive(Debug, Clone, Default)]
pub struct UsageMeter(Arc<Counters>);

impl UsageMeter {
    pub fn record(&self, input_tokens: u64, output_tokens: u64) {
        self.0.calls.fetch_add(1, Ordering::Relaxed);
        self.0.input_tokens.fetch_add(input_tokens, Ordering::Relaxed);
        self.0.output_tokens.fetch_add(output_tokens, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TokenUsage {
        TokenUsage {
            calls: self.0.calls.load(Ordering::Relaxed),
            input_tokens: self.0.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.0.output_tokens.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_one_total() {
        let meter = UsageMeter::default();
        let other = meter.clone();
        meter.record(1_000, 200);
        other.record(500, 100);

        let total = meter.snapshot();
        assert_eq!(total.calls, 2);
        assert_eq!(total.input_tokens, 1_500);
        assert_eq!(total.output_tokens, 300);
    }

    #[test]
    fn test_since_and_cost() {
        let meter = UsageMeter::default();
        meter.record(2_000, 0);
        let before = meter.snapshot();
        meter.record(1_000_000, 1_000_000);

        let spent = meter.snapshot().since(&before);
        assert_eq!(spent.calls, 1);
        assert_eq!(spent.total_tokens(), 2_000_000);
        assert!((spent.cost_usd() - 18.0).abs() < 1e-9);
    }
}
