//! Engine configuration loaded from environment variables.

use std::time::Duration;

/// Dispatcher tuning with sensible defaults.
///
/// Reads from environment variables:
/// - `ENGINE_MAX_TX_ATTEMPTS` — transaction attempts per event before giving
///   up with a concurrency conflict (default: `5`)
/// - `ENGINE_CHAIN_SUCCESSORS` — dispatch successor events right after the
///   commit that emitted them (default: `true`)
/// - `ENGINE_MAX_CONCURRENT_DISPATCHES` — events handled at once by
///   `dispatch_pending` (default: `8`)
/// - `ENGINE_MAX_DEFERRALS` — failed dispatches before a non-fatal failure
///   is receipted as failed (default: `5`)
/// - `ENGINE_RETRY_BACKOFF_MS` — delay before a deferred event is polled
///   again, doubled on every further failure (default: `1000`)
/// - `ENGINE_CURSOR_SETTLE_MS` — how old a settled event must be before the
///   pending cursor moves past it (default: `30000`)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_tx_attempts: u32,
    pub chain_successors: bool,
    pub max_concurrent_dispatches: usize,
    pub max_deferrals: u32,
    pub retry_backoff: Duration,
    /// Postgres hands out sequences before commit, so a younger event can
    /// become visible after an older one was settled.
    pub cursor_settle: Duration,
}

impl EngineConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_tx_attempts: std::env::var("ENGINE_MAX_TX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_tx_attempts),
            chain_successors: std::env::var("ENGINE_CHAIN_SUCCESSORS")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.chain_successors),
            max_concurrent_dispatches: std::env::var("ENGINE_MAX_CONCURRENT_DISPATCHES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_concurrent_dispatches),
            max_deferrals: std::env::var("ENGINE_MAX_DEFERRALS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_deferrals),
            retry_backoff: std::env::var("ENGINE_RETRY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            cursor_settle: std::env::var("ENGINE_CURSOR_SETTLE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.cursor_settle),
        }
    }

    /// Delay before the next attempt after `failures` failed dispatches.
    pub fn backoff_after(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(10);
        self.retry_backoff.saturating_mul(1 << doublings)
    }

    pub fn with_max_tx_attempts(mut self, attempts: u32) -> Self {
        self.max_tx_attempts = attempts.max(1);
        self
    }

    pub fn with_chain_successors(mut self, chain: bool) -> Self {
        self.chain_successors = chain;
        self
    }

    pub fn with_max_concurrent_dispatches(mut self, n: usize) -> Self {
        self.max_concurrent_dispatches = n.max(1);
        self
    }

    pub fn with_max_deferrals(mut self, n: u32) -> Self {
        self.max_deferrals = n.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_cursor_settle(mut self, settle: Duration) -> Self {
        self.cursor_settle = settle;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tx_attempts: 5,
            chain_successors: true,
            max_concurrent_dispatches: 8,
            max_deferrals: 5,
            retry_backoff: Duration::from_secs(1),
            cursor_settle: Duration::from_secs(30),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_tx_attempts, 5);
        assert!(config.chain_successors);
        assert_eq!(config.max_concurrent_dispatches, 8);
        assert_eq!(config.max_deferrals, 5);
        assert_eq!(config.retry_backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_doubles() {
        let config = EngineConfig::default().with_retry_backoff(Duration::from_millis(100));
        assert_eq!(config.backoff_after(1), Duration::from_millis(100));
        assert_eq!(config.backoff_after(3), Duration::from_millis(400));
        assert_eq!(config.backoff_after(40), Duration::from_millis(102_400));
    }

    #[test]
    fn test_builders_clamp_to_one() {
        let config = EngineConfig::default()
            .with_max_tx_attempts(0)
            .with_max_concurrent_dispatches(0);
        assert_eq!(config.max_tx_attempts, 1);
        assert_eq!(config.max_concurrent_dispatches, 1);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
