// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection retry with exponential backoff.

use std::time::Duration;

/// Backoff policy for connection establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay before the second attempt (ms).
    pub base_ms: u64,
    /// Delay cap (ms).
    pub max_ms: u64,
    /// Attempts before giving up, including the first.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_ms: 50,
            max_ms: 2_000,
            max_attempts: 8,
        }
    }
}

impl RetryConfig {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Fit the attempt count into a total time budget.
    pub fn within(mut self, budget: Duration) -> Self {
        let mut spent = 0u64;
        let mut attempts = 1;
        while attempts < 1_000 {
            let next = self.delay_after(attempts).as_millis() as u64;
            if spent + next > budget.as_millis() as u64 {
                break;
            }
            spent += next;
            attempts += 1;
        }
        self.max_attempts = attempts;
        self
    }

    /// Wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self.base_ms.saturating_mul(1u64 << shift).min(self.max_ms);
        Duration::from_millis(ms)
    }

    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// Returns the last error together with the number of attempts made.
    pub fn run<T, E>(&self, mut op: impl FnMut(u32) -> Result<T, E>) -> Result<T, (E, u32)> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= self.max_attempts => return Err((e, attempt)),
                Err(_) => {
                    std::thread::sleep(self.delay_after(attempt));
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let cfg = RetryConfig::new(10, 50);
        assert_eq!(cfg.delay_after(1), Duration::from_millis(10));
        assert_eq!(cfg.delay_after(2), Duration::from_millis(20));
        assert_eq!(cfg.delay_after(3), Duration::from_millis(40));
        assert_eq!(cfg.delay_after(4), Duration::from_millis(50));
        assert_eq!(cfg.delay_after(40), Duration::from_millis(50));
    }

    #[test]
    fn test_run_gives_up_after_max_attempts() {
        let cfg = RetryConfig::new(1, 1).with_max_attempts(3);
        let mut calls = 0;
        let res: Result<(), (&str, u32)> = cfg.run(|_| {
            calls += 1;
            Err("refused")
        });
        assert_eq!(res, Err(("refused", 3)));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_run_returns_first_success() {
        let cfg = RetryConfig::new(1, 1).with_max_attempts(5);
        let res: Result<u32, (&str, u32)> =
            cfg.run(|attempt| if attempt == 2 { Ok(attempt) } else { Err("no") });
        assert_eq!(res, Ok(2));
    }

    #[test]
    fn test_within_budget() {
        let cfg = RetryConfig::new(100, 100).within(Duration::from_millis(350));
        assert_eq!(cfg.max_attempts, 4);
    }
}
