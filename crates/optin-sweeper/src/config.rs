use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "optin.db";
const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Sweeper configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// SQLite database file. Env var: `OPTIN_DB_PATH`.
    pub db_path: PathBuf,
    /// Time between sweeps (default 1 hour). Env var: `OPTIN_SWEEP_INTERVAL_SECS`.
    pub interval: Duration,
    /// Run a single sweep and exit. Env var: `OPTIN_SWEEP_ONCE`.
    pub once: bool,
}

impl SweeperConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("OPTIN_DB_PATH")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.into())
            .into();
        let interval_secs = lookup("OPTIN_SWEEP_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        let once = lookup("OPTIN_SWEEP_ONCE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            db_path,
            interval: Duration::from_secs(interval_secs),
            once,
        }
    }
}
