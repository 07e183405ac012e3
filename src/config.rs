//! Run configuration and its startup validation.

use crate::transport::MessageProperties;
use std::time::Duration;

pub const DEFAULT_EXCHANGES: [&str; 3] = ["amq.fanout", "amq.headers", "amq.topic"];
pub const DEFAULT_TOTAL_MESSAGES: u64 = 50_000;
pub const DEFAULT_ROUTING_KEY: &str = "dasds";
pub const DEFAULT_PROGRESS_EVERY: u64 = 1_000;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("exchange list is empty")]
    NoExchanges,
    #[error("exchange name at position {0} is empty")]
    EmptyExchangeName(usize),
    #[error("message count must be greater than zero")]
    ZeroMessages,
    #[error("progress interval must be greater than zero")]
    ZeroProgressInterval,
    #[error("rate must be a positive number of messages per second, got {0}")]
    InvalidRate(f64),
}

/// Retry behaviour for recoverable publish failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// First failure aborts the run.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Exponential backoff: `backoff * 2^attempt`, saturating.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Clone, Debug)]
pub struct PublishConfig {
    pub exchanges: Vec<String>,
    pub total_messages: u64,
    pub routing_key: String,
    pub properties: MessageProperties,
    /// Report progress when the remaining count at the start of a pass is a multiple of this.
    pub progress_every: u64,
    /// Messages per second; `None` publishes back to back.
    pub rate: Option<f64>,
    pub retry: RetryPolicy,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            exchanges: DEFAULT_EXCHANGES.iter().map(|s| s.to_string()).collect(),
            total_messages: DEFAULT_TOTAL_MESSAGES,
            routing_key: DEFAULT_ROUTING_KEY.to_string(),
            properties: MessageProperties::json(),
            progress_every: DEFAULT_PROGRESS_EVERY,
            rate: None,
            retry: RetryPolicy::none(),
        }
    }
}

impl PublishConfig {
    pub fn new<I, S>(exchanges: I, total_messages: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exchanges: exchanges.into_iter().map(Into::into).collect(),
            total_messages,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchanges.is_empty() {
            return Err(ConfigError::NoExchanges);
        }
        if let Some(pos) = self.exchanges.iter().position(|e| e.is_empty()) {
            return Err(ConfigError::EmptyExchangeName(pos));
        }
        if self.total_messages == 0 {
            return Err(ConfigError::ZeroMessages);
        }
        if self.progress_every == 0 {
            return Err(ConfigError::ZeroProgressInterval);
        }
        if let Some(rate) = self.rate {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigError::InvalidRate(rate));
            }
        }
        Ok(())
    }
}

/// Split a comma-separated exchange argument; `None` yields the default list.
/// Names are trimmed; empty entries are kept so validation can reject them.
pub fn parse_exchange_list(arg: Option<&str>) -> Vec<String> {
    match arg {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => DEFAULT_EXCHANGES.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PublishConfig::default();
        assert_eq!(cfg.exchanges, vec!["amq.fanout", "amq.headers", "amq.topic"]);
        assert_eq!(cfg.total_messages, 50_000);
        assert_eq!(cfg.routing_key, "dasds");
        assert_eq!(cfg.properties.content_type, "application/json");
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn exchange_argument_is_comma_split() {
        assert_eq!(parse_exchange_list(Some("a,b, c")), vec!["a", "b", "c"]);
        assert_eq!(parse_exchange_list(None).len(), 3);
    }

    #[test]
    fn rejects_invalid_configs() {
        let empty: [&str; 0] = [];
        assert_eq!(
            PublishConfig::new(empty, 10).validate(),
            Err(ConfigError::NoExchanges)
        );
        assert_eq!(
            PublishConfig::new(parse_exchange_list(Some("a,,b")), 10).validate(),
            Err(ConfigError::EmptyExchangeName(1))
        );
        assert_eq!(
            PublishConfig::new(["a"], 0).validate(),
            Err(ConfigError::ZeroMessages)
        );

        let mut cfg = PublishConfig::new(["a"], 1);
        cfg.progress_every = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroProgressInterval));

        let mut cfg = PublishConfig::new(["a"], 1);
        cfg.rate = Some(0.0);
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidRate(0.0)));
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(10),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(80));
    }
}
