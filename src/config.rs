use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    /// Deadline applied to every conversation operation.
    pub request_timeout: Duration,
    pub session_ttl: chrono::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://duo-chat.db".to_owned(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 16,
            request_timeout: Duration::from_millis(5000),
            session_ttl: chrono::Duration::hours(24),
        }
    }
}

fn parsed<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenvy::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} has an invalid value {raw:?}")),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Reads the process environment (and `.env`, if loaded) once at startup.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            database_url: dotenvy::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: parsed("BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            max_connections: parsed("DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            request_timeout: parsed::<u64>("REQUEST_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            session_ttl: parsed::<i64>("SESSION_TTL_HOURS")?
                .map(chrono::Duration::hours)
                .unwrap_or(defaults.session_ttl),
        })
    }
}
