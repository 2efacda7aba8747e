//! Server configuration loaded from environment variables.
//!
//! Everything except the JWT secret has a default, so a local instance needs
//! only `CITY_JWT_SECRET` to start.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use tracing::warn;

use city_api::subscriptions::{InvalidTierPolicy, SubscriptionPolicy};

/// Largest accepted `CITY_MAIL_PAGE_LIMIT`.
const MAX_MAIL_PAGE_LIMIT: u32 = 1000;

/// Secrets shipped in sample `.env` files. Starting with one is refused.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `CITY_HOST`, default `0.0.0.0`
    pub host: String,
    /// Env: `CITY_PORT`, default `3000`
    pub port: u16,
    /// Env: `CITY_DB_PATH`, default `city.db`
    pub db_path: PathBuf,
    /// Env: `CITY_JWT_SECRET`, required
    pub jwt_secret: String,
    /// Env: `CITY_INVALID_TIER` and `CITY_CANCEL_PRIOR_SUBSCRIPTION`
    pub subscriptions: SubscriptionPolicy,
    /// Env: `CITY_MAIL_PAGE_LIMIT`, default `100`
    pub mail_page_limit: u32,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unparseable optional values are
    /// logged and replaced by their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("CITY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CITY_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let mut config = Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            db_path: PathBuf::from("city.db"),
            jwt_secret,
            subscriptions: SubscriptionPolicy::default(),
            mail_page_limit: 100,
        };

        if let Some(host) = lookup("CITY_HOST") {
            config.host = host;
        }

        if let Some(val) = lookup("CITY_PORT") {
            match val.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => warn!(value = %val, "Invalid CITY_PORT, using default"),
            }
        }

        if let Some(path) = lookup("CITY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(val) = lookup("CITY_INVALID_TIER") {
            match val.parse::<InvalidTierPolicy>() {
                Ok(policy) => config.subscriptions.invalid_tier = policy,
                Err(e) => warn!(error = %e, "Invalid CITY_INVALID_TIER, using default"),
            }
        }

        if let Some(val) = lookup("CITY_CANCEL_PRIOR_SUBSCRIPTION") {
            config.subscriptions.cancel_prior = val != "false" && val != "0";
        }

        if let Some(val) = lookup("CITY_MAIL_PAGE_LIMIT") {
            match val.parse::<u32>() {
                Ok(n) if (1..=MAX_MAIL_PAGE_LIMIT).contains(&n) => config.mail_page_limit = n,
                _ => warn!(value = %val, "Invalid CITY_MAIL_PAGE_LIMIT, using default"),
            }
        }

        Ok(config)
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
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
    fn defaults_apply_with_only_a_secret() {
        let config = ServerConfig::from_lookup(lookup(&[("CITY_JWT_SECRET", "s3cr3t-value")])).unwrap();
        assert_eq!(config.addr().unwrap(), ([0, 0, 0, 0], 3000).into());
        assert_eq!(config.db_path, PathBuf::from("city.db"));
        assert_eq!(config.subscriptions.invalid_tier, InvalidTierPolicy::Fallback);
        assert!(config.subscriptions.cancel_prior);
        assert_eq!(config.mail_page_limit, 100);
    }

    #[test]
    fn missing_or_placeholder_secret_is_fatal() {
        assert!(ServerConfig::from_lookup(lookup(&[])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("CITY_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn overrides_and_bad_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("CITY_JWT_SECRET", "s3cr3t-value"),
            ("CITY_PORT", "not-a-port"),
            ("CITY_INVALID_TIER", "Reject"),
            ("CITY_CANCEL_PRIOR_SUBSCRIPTION", "false"),
            ("CITY_MAIL_PAGE_LIMIT", "0"),
        ]))
        .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.subscriptions.invalid_tier, InvalidTierPolicy::Reject);
        assert!(!config.subscriptions.cancel_prior);
        assert_eq!(config.mail_page_limit, 100);
    }

    #[test]
    fn mail_page_limit_is_capped() {
        let secret = ("CITY_JWT_SECRET", "s3cr3t-value");
        let huge = ServerConfig::from_lookup(lookup(&[secret, ("CITY_MAIL_PAGE_LIMIT", "4294967295")])).unwrap();
        assert_eq!(huge.mail_page_limit, 100);

        let max = ServerConfig::from_lookup(lookup(&[secret, ("CITY_MAIL_PAGE_LIMIT", "1000")])).unwrap();
        assert_eq!(max.mail_page_limit, 1000);
    }
}
