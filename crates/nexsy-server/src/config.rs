use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// JWT secrets that ship in sample configs and must never reach a server.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your_jwt_secret",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub heartbeat: Duration,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("NEXSY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("NEXSY_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let heartbeat_secs: u64 = parse_or(&lookup, "NEXSY_HEARTBEAT_SECS", 25)?;
        if heartbeat_secs == 0 {
            bail!("NEXSY_HEARTBEAT_SECS must be greater than zero");
        }

        let cors_origins = lookup("NEXSY_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: lookup("NEXSY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "NEXSY_PORT", 5000)?,
            db_path: lookup("NEXSY_DB_PATH")
                .unwrap_or_else(|| "nexsy.db".into())
                .into(),
            jwt_secret,
            token_ttl_days: parse_or(&lookup, "NEXSY_TOKEN_TTL_DAYS", 7)?,
            heartbeat: Duration::from_secs(heartbeat_secs),
            cors_origins,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value {:?}", key, raw)),
        None => Ok(default),
    }
}
