use std::time::Duration;

use freshdesk_core::{FreshdeskClient, FreshdeskError};
use thiserror::Error;
use url::Url;

use crate::sync::backoff::Backoff;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u64 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("FRESHDESK_BASE_URL is not a valid url: {0}")]
    InvalidBaseUrl(String),
}

/// Settings for talking to a Freshdesk helpdesk, read from the environment.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub token: String,
    pub helpdesk_name: String,
    pub base_url: Url,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let token = required("FRESHDESK_TOKEN")?;
        let helpdesk_name = required("FRESHDESK_HELPDESK_NAME")?;
        let raw_base = lookup("FRESHDESK_BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| format!("https://{helpdesk_name}.freshdesk.com"));
        let base_url =
            Url::parse(raw_base.trim()).map_err(|_| ConfigError::InvalidBaseUrl(raw_base.clone()))?;
        let timeout = Duration::from_secs(read_u64_env(
            &lookup,
            "FRESHDESK_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        ));
        let max_attempts = read_u64_env(&lookup, "DOCBUILD_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)
            .min(u64::from(u32::MAX)) as u32;

        Ok(Self {
            token,
            helpdesk_name,
            base_url,
            timeout,
            max_attempts,
        })
    }

    pub fn client(&self) -> Result<FreshdeskClient, FreshdeskError> {
        FreshdeskClient::with_base_url(self.base_url.as_str(), self.token.clone())?
            .with_timeout(self.timeout)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            true,
        )
        .with_max_attempts(self.max_attempts)
    }
}

fn read_u64_env<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn missing_token_is_reported_first() {
        let err = SyncConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("FRESHDESK_TOKEN"));
    }

    #[test]
    fn blank_helpdesk_name_counts_as_missing() {
        let err = SyncConfig::from_lookup(lookup_from(&[
            ("FRESHDESK_TOKEN", "secret"),
            ("FRESHDESK_HELPDESK_NAME", "  "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("FRESHDESK_HELPDESK_NAME"));
    }

    #[test]
    fn defaults_derive_from_helpdesk_name() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("FRESHDESK_TOKEN", "secret"),
            ("FRESHDESK_HELPDESK_NAME", "acme"),
        ]))
        .unwrap();

        assert_eq!(config.base_url.as_str(), "https://acme.freshdesk.com/");
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn optional_values_override_defaults() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("FRESHDESK_TOKEN", "secret"),
            ("FRESHDESK_HELPDESK_NAME", "acme"),
            ("FRESHDESK_BASE_URL", "http://127.0.0.1:9000"),
            ("FRESHDESK_TIMEOUT_SECS", "5"),
            ("DOCBUILD_MAX_ATTEMPTS", "7"),
        ]))
        .unwrap();

        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:9000/");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_attempts, 7);
        assert_eq!(
            config.client().unwrap().base_url().as_str(),
            "http://127.0.0.1:9000/"
        );
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let lookup = lookup_from(&[("ZERO", "0"), ("WORD", "soon")]);
        assert_eq!(read_u64_env(&lookup, "ZERO", 4), 4);
        assert_eq!(read_u64_env(&lookup, "WORD", 4), 4);
        assert_eq!(read_u64_env(&lookup, "UNSET", 4), 4);
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        let err = SyncConfig::from_lookup(lookup_from(&[
            ("FRESHDESK_TOKEN", "secret"),
            ("FRESHDESK_HELPDESK_NAME", "acme"),
            ("FRESHDESK_BASE_URL", "not a url"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidBaseUrl("not a url".into()));
    }
}
