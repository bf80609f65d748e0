use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Per-subscriber outbound buffer for the realtime fanout. A subscriber
    /// that falls this many events behind is disconnected.
    pub subscriber_buffer: usize,
    /// Readings older than this are eligible for the periodic purge.
    pub retention_days: i64,
    /// How often the retention purge runs. `0` disables the task.
    pub purge_interval_secs: u64,
    /// Upper bound on waiting for a contested actuator's command lock.
    pub command_lock_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            subscriber_buffer: optional("SUBSCRIBER_BUFFER", "64")
                .parse()
                .context("SUBSCRIBER_BUFFER must be a positive integer")?,
            retention_days: optional("RETENTION_DAYS", "30")
                .parse()
                .context("RETENTION_DAYS must be a positive integer")?,
            purge_interval_secs: optional("PURGE_INTERVAL_SECS", "3600")
                .parse()
                .context("PURGE_INTERVAL_SECS must be an integer (0 disables purging)")?,
            command_lock_timeout_ms: optional("COMMAND_LOCK_TIMEOUT_MS", "5000")
                .parse()
                .context("COMMAND_LOCK_TIMEOUT_MS must be a positive integer")?,
        })
    }
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_is_empty() {
        // Env-var tests share a process; only read keys unlikely to be set.
        let config = Config::from_env().unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.subscriber_buffer, 64);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.purge_interval_secs, 3600);
        assert_eq!(config.command_lock_timeout_ms, 5000);
    }

    #[test]
    fn optional_falls_back_to_default() {
        assert_eq!(optional("CHAMBER_TEST_UNSET_KEY", "fallback"), "fallback");
    }
}
