// Runtime configuration from the environment (and an optional .env file)

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "shipping.db";
const DEFAULT_BIND: &str = "0.0.0.0:5000";
const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file (`SHIPTRACK_DB`)
    pub db_path: PathBuf,
    /// Listen address (`SHIPTRACK_BIND`)
    pub bind: SocketAddr,
    /// Token signing key (`SHIPTRACK_SECRET`)
    pub secret: String,
    /// Emit JSON log lines (`SHIPTRACK_LOG_JSON`)
    pub log_json: bool,
    /// True when no secret was configured and one was generated for this run
    pub ephemeral_secret: bool,
}

impl Config {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` passes `std::env::var`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("SHIPTRACK_DB")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
            .into();

        let bind_raw = lookup("SHIPTRACK_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse()
            .with_context(|| format!("SHIPTRACK_BIND is not a socket address: {}", bind_raw))?;

        let (secret, ephemeral_secret) = match lookup("SHIPTRACK_SECRET") {
            Some(secret) if secret.len() >= MIN_SECRET_LEN => (secret, false),
            Some(_) => anyhow::bail!("SHIPTRACK_SECRET must be at least {} bytes", MIN_SECRET_LEN),
            None => (
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple()),
                true,
            ),
        };

        let log_json = lookup("SHIPTRACK_LOG_JSON")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Config {
            db_path,
            bind,
            secret,
            log_json,
            ephemeral_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.bind.port(), 5000);
        assert!(config.ephemeral_secret);
        assert!(config.secret.len() >= MIN_SECRET_LEN);
        assert!(!config.log_json);
    }

    #[test]
    fn test_explicit_values() {
        let config = Config::from_lookup(lookup(&[
            ("SHIPTRACK_DB", "/tmp/ship.db"),
            ("SHIPTRACK_BIND", "127.0.0.1:8080"),
            ("SHIPTRACK_SECRET", "a-long-enough-secret"),
            ("SHIPTRACK_LOG_JSON", "true"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/ship.db"));
        assert_eq!(config.bind.to_string(), "127.0.0.1:8080");
        assert_eq!(config.secret, "a-long-enough-secret");
        assert!(!config.ephemeral_secret);
        assert!(config.log_json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("SHIPTRACK_BIND", "nowhere")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SHIPTRACK_SECRET", "short")])).is_err());
    }
}
