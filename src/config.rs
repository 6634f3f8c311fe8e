//! Daemon configuration.
//!
//! Defaults mirror the ceilings the Docker runner image applies. Every
//! knob can be overridden through a `CPP_PLAYGROUND_*` environment
//! variable, falling back to the default when unset or unparsable.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding per-identifier ephemeral artifacts
    /// (`<id>.src`, `<id>.bin`, `<id>.stdin`).
    pub workdir: PathBuf,

    /// Docker image used by the isolated backend.
    pub docker_image: String,

    /// Wall-clock ceiling for one execution.
    pub exec_timeout: Duration,

    /// Slack granted to the in-sandbox supervisor before the external
    /// watchdog fires in isolated mode.
    pub watchdog_epsilon: Duration,

    /// Wait after writing a debugger command before the output buffer
    /// is snapshotted and returned.
    pub settle_delay: Duration,

    /// Grace between the debugger `quit` and the forced kill in `end()`.
    pub kill_grace: Duration,

    /// Resource ceilings applied by the isolated backend.
    pub limits: ResourceLimits,
}

/// Resource ceilings for one sandboxed execution.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Memory ceiling in megabytes.
    pub memory_mb: u64,

    /// Fraction of one CPU.
    pub cpu_share: f64,

    /// Container-wide process count ceiling.
    pub pids_limit: u32,

    /// Per-user process ulimit inside the sandbox.
    pub nproc: u32,

    /// Open file descriptor ulimit inside the sandbox.
    pub nofile: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 128,
            cpu_share: 0.5,
            pids_limit: 100,
            nproc: 32,
            nofile: 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workdir: std::env::temp_dir().join("cpp-playground"),
            docker_image: "cpp-runner".to_string(),
            exec_timeout: Duration::from_secs(10),
            watchdog_epsilon: Duration::from_secs(2),
            settle_delay: Duration::from_millis(300),
            kill_grace: Duration::from_secs(1),
            limits: ResourceLimits::default(),
        }
    }
}

impl Config {
    /// Create from environment variables, falling back to defaults.
    ///
    /// Reads `CPP_PLAYGROUND_WORKDIR`, `CPP_PLAYGROUND_IMAGE`,
    /// `CPP_PLAYGROUND_TIMEOUT_SECONDS`, `CPP_PLAYGROUND_SETTLE_MS` and
    /// `CPP_PLAYGROUND_KILL_GRACE_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("CPP_PLAYGROUND_WORKDIR") {
            config.workdir = PathBuf::from(dir);
        }
        if let Ok(image) = std::env::var("CPP_PLAYGROUND_IMAGE") {
            config.docker_image = image;
        }
        if let Some(timeout) = env_duration_secs("CPP_PLAYGROUND_TIMEOUT_SECONDS") {
            config.exec_timeout = timeout;
        }
        if let Some(settle) = env_duration_millis("CPP_PLAYGROUND_SETTLE_MS") {
            config.settle_delay = settle;
        }
        if let Some(grace) = env_duration_millis("CPP_PLAYGROUND_KILL_GRACE_MS") {
            config.kill_grace = grace;
        }
        config
    }

    /// The execution ceiling in whole seconds, as quoted in boundary
    /// messages and passed to the in-sandbox supervisor.
    pub fn timeout_seconds(&self) -> u64 {
        self.exec_timeout.as_secs()
    }
}

fn env_duration_secs(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}

fn env_duration_millis(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.exec_timeout, Duration::from_secs(10));
        assert_eq!(config.watchdog_epsilon, Duration::from_secs(2));
        assert_eq!(config.settle_delay, Duration::from_millis(300));
        assert_eq!(config.kill_grace, Duration::from_secs(1));
        assert_eq!(config.docker_image, "cpp-runner");
        assert_eq!(config.limits.memory_mb, 128);
        assert_eq!(config.limits.pids_limit, 100);
    }

    #[test]
    fn from_env_uses_defaults_when_unset() {
        // When env vars are not set, from_env() matches the defaults
        let config = Config::from_env();
        assert_eq!(config.exec_timeout, Duration::from_secs(10));
        assert_eq!(config.settle_delay, Duration::from_millis(300));
    }

    #[test]
    fn timeout_seconds_matches_ceiling() {
        let config = Config {
            exec_timeout: Duration::from_secs(7),
            ..Config::default()
        };
        assert_eq!(config.timeout_seconds(), 7);
    }
}
