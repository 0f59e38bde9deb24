use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Error, Result};

/// 5 MiB, the smallest part size S3 accepts for any part but the last.
pub const DEFAULT_MAX_PART_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

fn default_max_part_size() -> u64 {
    DEFAULT_MAX_PART_SIZE
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

fn default_concurrency() -> usize {
    1
}

/// Knobs for a single multipart upload run.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UploadConfig {
    #[serde(default = "default_max_part_size")]
    pub max_part_size: u64,

    /// Maximum number of part uploads in flight; `1` uploads parts strictly in order.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound on every individual remote call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_part_size: DEFAULT_MAX_PART_SIZE,
            concurrency: default_concurrency(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl UploadConfig {
    #[inline]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_part_size == 0 {
            return Err(Error::InvalidConfiguration(String::from(
                "max_part_size must be positive",
            )));
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidConfiguration(String::from(
                "concurrency must be positive",
            )));
        }
        if self.call_timeout_ms == 0 {
            return Err(Error::InvalidConfiguration(String::from(
                "call_timeout_ms must be positive",
            )));
        }
        self.retry.validate()
    }
}

/// Per-part retry policy.
///
/// Every failure counts against the same budget; no error is treated as more or less retryable
/// than another. Backoff is disabled while `initial_backoff_ms` is zero, otherwise the delay
/// before retry `n` is `initial_backoff_ms * 2^(n-1)`, capped at `max_backoff_ms`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per part, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub initial_backoff_ms: u64,

    #[serde(default)]
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfiguration(String::from(
                "retry.max_attempts must be at least 1",
            )));
        }
        Ok(())
    }

    /// Delay to wait after `failed_attempts` consecutive failures.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        if self.initial_backoff_ms == 0 || failed_attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = (failed_attempts - 1).min(32);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        let delay = if self.max_backoff_ms > 0 {
            delay.min(self.max_backoff_ms)
        } else {
            delay
        };
        Duration::from_millis(delay)
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::disabled(0, 0, 1, 0)]
    #[case::disabled_later(0, 1000, 5, 0)]
    #[case::first_retry(100, 0, 1, 100)]
    #[case::doubles(100, 0, 3, 400)]
    #[case::capped(100, 250, 3, 250)]
    #[case::huge_exponent(1, 0, 200, 1 << 32)]
    fn backoff_delay(
        #[case] initial_backoff_ms: u64,
        #[case] max_backoff_ms: u64,
        #[case] failed_attempts: u32,
        #[case] expected_ms: u64,
    ) {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms,
            max_backoff_ms,
        };
        assert_eq!(
            policy.backoff(failed_attempts),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn defaults_from_empty_yaml() {
        let config: UploadConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, UploadConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_yaml() {
        let config: UploadConfig = serde_yaml::from_str(
            "max_part_size: 1024\nconcurrency: 4\nretry:\n  max_attempts: 5\n",
        )
        .unwrap();
        assert_eq!(config.max_part_size, 1024);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 0);
    }

    #[rstest]
    #[case::zero_part_size(UploadConfig { max_part_size: 0, ..Default::default() })]
    #[case::zero_concurrency(UploadConfig { concurrency: 0, ..Default::default() })]
    #[case::zero_timeout(UploadConfig { call_timeout_ms: 0, ..Default::default() })]
    #[case::zero_attempts(UploadConfig {
        retry: RetryPolicy { max_attempts: 0, ..Default::default() },
        ..Default::default()
    })]
    fn rejects_invalid(#[case] config: UploadConfig) {
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
