//! Configuration loading and representation.

use std::time::Duration;

use anyhow::{Context, bail};

pub const ENV_INTERVAL_SECS: &str = "SUBTRACK_SCHEDULER_INTERVAL_SECS";
pub const ENV_RUN_ON_START: &str = "SUBTRACK_SCHEDULER_RUN_ON_START";
pub const ENV_NAME: &str = "SUBTRACK_SCHEDULER_NAME";

/// Payment scheduler worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Thread name, also used in logs
    pub name: String,
    /// Time between scheduled runs
    pub interval: Duration,
    /// Run once immediately after the worker starts
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "payment-scheduler".to_string(),
            interval: Duration::from_secs(60 * 60),
            run_on_start: true,
        }
    }
}

impl SchedulerConfig {
    /// Load from `SUBTRACK_SCHEDULER_*` environment variables, falling back to
    /// defaults for unset ones.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_NAME) {
            config.name = name;
        }

        if let Some(raw) = lookup(ENV_INTERVAL_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_INTERVAL_SECS} must be an integer, got {raw:?}"))?;
            if secs == 0 {
                bail!("{ENV_INTERVAL_SECS} must be greater than zero");
            }
            config.interval = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(ENV_RUN_ON_START) {
            config.run_on_start = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => bail!("{ENV_RUN_ON_START} must be a boolean, got {other:?}"),
            };
        }

        Ok(config)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }
}
