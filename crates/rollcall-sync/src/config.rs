//! Sync agent configuration loaded from environment variables.
//!
//! Every setting has a default so an agent can start against a local
//! `rollcall-server` with no configuration at all.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rollcall_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_RETRY_INITIAL_SECS, DEFAULT_RETRY_MAX_SECS,
    DEFAULT_SYNC_INTERVAL_SECS,
};
use rollcall_shared::types::Role;

use crate::scheduler::SchedulerConfig;
use crate::session::SessionPolicy;

/// Exponential backoff applied by the scheduler to failed cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Retries after the first failure; `None` retries until success.
    pub max_attempts: Option<u32>,
}

impl RetryConfig {
    /// Backoff with no attempt limit.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 is the
    /// first run and has no delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Whether retry number `attempt` (1-based) is still allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_RETRY_INITIAL_SECS),
            Duration::from_secs(DEFAULT_RETRY_MAX_SECS),
        )
    }
}

/// Everything the sync agent needs to know about itself and the remote.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote database.
    /// Env: `ROLLCALL_REMOTE_URL`
    /// Default: `http://127.0.0.1:8080`
    pub remote_url: String,

    /// Bearer token sent with every remote request.
    /// Env: `ROLLCALL_AUTH_TOKEN`
    /// Default: none.
    pub auth_token: Option<String>,

    /// Label stamped on pushed records. When unset the agent derives a
    /// stable one from its data directory.
    /// Env: `ROLLCALL_DEVICE_LABEL`
    pub device_label: Option<String>,

    /// Env: `ROLLCALL_USER_ID`
    /// Default: `local`
    pub user_id: String,

    /// Env: `ROLLCALL_ROLE` (student|teacher|admin)
    /// Default: `teacher`
    pub role: Role,

    /// Periodic sync interval; zero disables periodic sync.
    /// Env: `ROLLCALL_SYNC_INTERVAL_SECS`
    /// Default: one hour.
    pub sync_interval: Option<Duration>,

    /// Env: `ROLLCALL_RETRY_INITIAL_SECS`, `ROLLCALL_RETRY_MAX_SECS`
    pub retry: RetryConfig,

    /// Per-request timeout for the HTTP remote.
    /// Env: `ROLLCALL_HTTP_TIMEOUT_SECS`
    /// Default: 30 seconds.
    pub http_timeout: Duration,

    /// Env: `ROLLCALL_SESSION_POLICY` (fail-open|fail-closed)
    pub session_policy: SessionPolicy,

    /// Where the database and the sync cursor live.
    /// Env: `ROLLCALL_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// How often pending work re-probes connectivity while offline.
    pub connectivity_poll: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: format!("http://127.0.0.1:{DEFAULT_HTTP_PORT}"),
            auth_token: None,
            device_label: None,
            user_id: "local".to_string(),
            role: Role::Teacher,
            sync_interval: Some(Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS)),
            retry: RetryConfig::default(),
            http_timeout: Duration::from_secs(30),
            session_policy: SessionPolicy::default(),
            data_dir: None,
            connectivity_poll: Duration::from_secs(15),
        }
    }
}

impl SyncConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// missing or invalid values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = non_empty(lookup("ROLLCALL_REMOTE_URL")) {
            config.remote_url = url;
        }
        config.auth_token = non_empty(lookup("ROLLCALL_AUTH_TOKEN"));
        config.device_label = non_empty(lookup("ROLLCALL_DEVICE_LABEL"));

        if let Some(user) = non_empty(lookup("ROLLCALL_USER_ID")) {
            config.user_id = user;
        }
        if let Some(role) = parsed(&lookup, "ROLLCALL_ROLE") {
            config.role = role;
        }

        if let Some(secs) = parsed::<u64>(&lookup, "ROLLCALL_SYNC_INTERVAL_SECS") {
            config.sync_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = parsed::<u64>(&lookup, "ROLLCALL_RETRY_INITIAL_SECS") {
            config.retry.initial_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64>(&lookup, "ROLLCALL_RETRY_MAX_SECS") {
            config.retry.max_delay = Duration::from_secs(secs);
        }
        if config.retry.max_delay < config.retry.initial_delay {
            tracing::warn!(
                initial = ?config.retry.initial_delay,
                max = ?config.retry.max_delay,
                "Retry max delay below initial delay, raising it"
            );
            config.retry.max_delay = config.retry.initial_delay;
        }
        if let Some(secs) = parsed::<u64>(&lookup, "ROLLCALL_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(policy) = parsed(&lookup, "ROLLCALL_SESSION_POLICY") {
            config.session_policy = policy;
        }
        if let Some(dir) = non_empty(lookup("ROLLCALL_DATA_DIR")) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        config
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.sync_interval,
            retry: self.retry.clone(),
            connectivity_poll: self.connectivity_poll,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = non_empty(lookup(key))?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Invalid setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> SyncConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = from_pairs(&[]);
        assert_eq!(config.remote_url, "http://127.0.0.1:8080");
        assert_eq!(config.sync_interval, Some(Duration::from_secs(3600)));
        assert_eq!(config.retry.initial_delay, Duration::from_secs(30));
        assert_eq!(config.retry.max_delay, Duration::from_secs(5 * 3600));
        assert_eq!(config.session_policy, SessionPolicy::FailOpen);
        assert_eq!(config.role, Role::Teacher);
    }

    #[test]
    fn overrides_and_invalid_values() {
        let config = from_pairs(&[
            ("ROLLCALL_REMOTE_URL", "https://school.example"),
            ("ROLLCALL_AUTH_TOKEN", "  "),
            ("ROLLCALL_ROLE", "admin"),
            ("ROLLCALL_SYNC_INTERVAL_SECS", "0"),
            ("ROLLCALL_RETRY_INITIAL_SECS", "not-a-number"),
            ("ROLLCALL_SESSION_POLICY", "fail-closed"),
            ("ROLLCALL_DATA_DIR", "/var/lib/rollcall"),
        ]);

        assert_eq!(config.remote_url, "https://school.example");
        assert_eq!(config.auth_token, None);
        assert_eq!(config.role, Role::Admin);
        assert_eq!(config.sync_interval, None);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(30));
        assert_eq!(config.session_policy, SessionPolicy::FailClosed);
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/rollcall")));
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for(0), Duration::ZERO);
        assert_eq!(retry.delay_for(1), Duration::from_secs(30));
        assert_eq!(retry.delay_for(2), Duration::from_secs(60));
        assert_eq!(retry.delay_for(3), Duration::from_secs(120));
        assert_eq!(retry.delay_for(20), Duration::from_secs(18_000));
        assert_eq!(retry.delay_for(u32::MAX), Duration::from_secs(18_000));
    }

    #[test]
    fn custom_multiplier() {
        let retry = RetryConfig::new(Duration::from_secs(10), Duration::from_secs(100))
            .with_multiplier(3.0);
        assert_eq!(retry.delay_for(1), Duration::from_secs(10));
        assert_eq!(retry.delay_for(2), Duration::from_secs(30));
        assert_eq!(retry.delay_for(3), Duration::from_secs(90));
        assert_eq!(retry.delay_for(4), Duration::from_secs(100));
    }

    #[test]
    fn attempt_limit() {
        let unlimited = RetryConfig::default();
        assert!(unlimited.allows(1_000));

        let limited = RetryConfig::default().with_max_attempts(2);
        assert!(limited.allows(2));
        assert!(!limited.allows(3));
    }
}
