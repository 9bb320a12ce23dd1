use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// Secret used when `HUB_JWT_SECRET` is unset. Fine for local runs only.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub require_session: bool,
    pub scheduler_interval: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests never touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = get("HUB_PORT", "3000")
            .parse()
            .context("HUB_PORT must be a port number")?;

        let require_session = match get("HUB_REQUIRE_SESSION", "false").to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" | "" => false,
            other => bail!("HUB_REQUIRE_SESSION must be true or false, got '{other}'"),
        };

        let interval_ms: u64 = get("HUB_SCHEDULER_INTERVAL_MS", "1000")
            .parse()
            .context("HUB_SCHEDULER_INTERVAL_MS must be a whole number of milliseconds")?;
        if interval_ms == 0 {
            bail!("HUB_SCHEDULER_INTERVAL_MS must be greater than zero");
        }

        Ok(Self {
            host: get("HUB_HOST", "0.0.0.0"),
            port,
            db_path: get("HUB_DB_PATH", "community-hub.db").into(),
            jwt_secret: get("HUB_JWT_SECRET", DEV_JWT_SECRET),
            require_session,
            scheduler_interval: Duration::from_millis(interval_ms),
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
