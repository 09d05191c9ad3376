// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use rand::Rng;

use otto_config::{RetryConfig, RetryPreset};

/// Backoff policy for provider calls.
///
/// The delay before retry `n` (0-based) follows the exponential envelope
/// `base · multiplier^n`, capped at `max_delay_ms`.  With jitter enabled the
/// computed delay is multiplied by a uniform sample from `[0.75, 1.0]`.
/// The jitter is reduce-only: the realized delay never exceeds the envelope
/// but still decorrelates clients that fail in lockstep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// 8 attempts, for flaky networks or heavily throttled accounts.
    pub fn aggressive() -> Self {
        Self { max_attempts: 8, ..Self::default() }
    }

    /// 3 attempts, fail fast.
    pub fn conservative() -> Self {
        Self { max_attempts: 3, ..Self::default() }
    }

    /// Resolve a policy from configuration: preset baseline, then explicit
    /// field overrides.
    pub fn from_config(config: &RetryConfig) -> Self {
        let mut policy = match config.preset {
            RetryPreset::Default => Self::default(),
            RetryPreset::Aggressive => Self::aggressive(),
            RetryPreset::Conservative => Self::conservative(),
        };
        if let Some(n) = config.max_attempts {
            policy.max_attempts = n;
        }
        if let Some(ms) = config.base_delay_ms {
            policy.base_delay_ms = ms;
        }
        if let Some(ms) = config.max_delay_ms {
            policy.max_delay_ms = ms;
        }
        policy.jitter = config.jitter;
        policy
    }

    /// Envelope value for retry step `n`, before jitter.
    fn envelope_ms(&self, step: u32) -> u64 {
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(step as i32);
        (raw as u64).min(self.max_delay_ms)
    }

    /// Delay to sleep before the retry following failed attempt `step`
    /// (0-based).
    pub fn backoff_delay(&self, step: u32) -> Duration {
        let envelope = self.envelope_ms(step);
        let ms = if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.75..=1.0);
            (envelope as f64 * factor) as u64
        } else {
            envelope
        };
        Duration::from_millis(ms)
    }

    /// Like [`backoff_delay`], but a server-provided `Retry-After` value
    /// overrides the computed backoff: `(seconds + 1) · 1000 ms`, giving the
    /// server a small margin beyond what it asked for.
    pub fn delay_for(&self, step: u32, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_millis((secs + 1) * 1_000),
            None => self.backoff_delay(step),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.base_delay_ms, 1_000);
        assert_eq!(p.multiplier, 2.0);
        assert_eq!(p.max_delay_ms, 30_000);
        assert!(p.jitter);
    }

    #[test]
    fn presets_differ_only_in_attempts() {
        assert_eq!(RetryPolicy::aggressive().max_attempts, 8);
        assert_eq!(RetryPolicy::conservative().max_attempts, 3);
        assert_eq!(RetryPolicy::aggressive().base_delay_ms, 1_000);
    }

    #[test]
    fn envelope_grows_exponentially_and_caps() {
        let p = RetryPolicy { jitter: false, ..Default::default() };
        assert_eq!(p.backoff_delay(0).as_millis(), 1_000);
        assert_eq!(p.backoff_delay(1).as_millis(), 2_000);
        assert_eq!(p.backoff_delay(2).as_millis(), 4_000);
        assert_eq!(p.backoff_delay(10).as_millis(), 30_000);
    }

    #[test]
    fn jittered_delays_stay_inside_reduce_only_window() {
        // Realized delay for step n must be in [0.75·B, B] where B is the
        // envelope value 1000·2^n.
        let p = RetryPolicy::default();
        for (step, envelope) in [(0u32, 1_000u64), (1, 2_000), (2, 4_000)] {
            for _ in 0..200 {
                let d = p.backoff_delay(step).as_millis() as u64;
                assert!(
                    d >= envelope * 3 / 4 && d <= envelope,
                    "step {step}: delay {d} outside [{}, {envelope}]",
                    envelope * 3 / 4
                );
            }
        }
    }

    #[test]
    fn jitter_mean_is_near_seven_eighths_of_envelope() {
        // E[U(0.75, 1.0)] = 0.875; over a large sample the mean delay must
        // converge there.
        let p = RetryPolicy::default();
        let n = 2_000;
        let sum: u64 = (0..n).map(|_| p.backoff_delay(0).as_millis() as u64).sum();
        let mean = sum as f64 / n as f64;
        assert!(
            (mean - 875.0).abs() < 20.0,
            "mean {mean} too far from 875"
        );
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(3, Some(7)).as_millis(), 8_000);
    }

    #[test]
    fn no_retry_after_uses_backoff() {
        let p = RetryPolicy { jitter: false, ..Default::default() };
        assert_eq!(p.delay_for(1, None).as_millis(), 2_000);
    }

    #[test]
    fn from_config_applies_preset_then_overrides() {
        let config = RetryConfig {
            preset: otto_config::RetryPreset::Aggressive,
            max_attempts: None,
            base_delay_ms: Some(500),
            max_delay_ms: None,
            jitter: false,
        };
        let p = RetryPolicy::from_config(&config);
        assert_eq!(p.max_attempts, 8);
        assert_eq!(p.base_delay_ms, 500);
        assert!(!p.jitter);
    }
}
