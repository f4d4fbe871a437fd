use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use tracing::debug;

use crate::error::CatalogError;

const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 2000;

/// Runtime settings, layered: `catalog.toml` (optional), then `CATALOG_*`
/// env vars, then the Supabase env vars shared with the storefront.
#[derive(Debug, Clone)]
pub struct Settings {
    pub supabase_url: Option<String>,
    pub service_key: Option<String>,
    pub ruleset: Option<PathBuf>,
    pub batch_size: usize,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            supabase_url: None,
            service_key: None,
            ruleset: None,
            batch_size: DEFAULT_BATCH_SIZE,
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let raw = Config::builder()
            .add_source(File::with_name("catalog").required(false))
            .add_source(Environment::with_prefix("CATALOG"))
            .set_override_option("supabase_url", std::env::var("NEXT_PUBLIC_SUPABASE_URL").ok())?
            .set_override_option("supabase_url", std::env::var("SUPABASE_URL").ok())?
            .set_override_option(
                "service_key",
                std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
            )?
            .build()
            .context("Failed to read catalog settings")?;

        let settings = Self::from_config(&raw)?;
        debug!(
            url = ?settings.supabase_url,
            has_key = settings.service_key.is_some(),
            batch_size = settings.batch_size,
            "Settings loaded"
        );
        Ok(settings)
    }

    fn from_config(raw: &Config) -> Result<Self> {
        let defaults = Settings::default();
        let non_empty = |key: &str| raw.get_string(key).ok().filter(|s| !s.trim().is_empty());

        let batch_size = match raw.get_int("batch_size") {
            Ok(n) if n > 0 => n as usize,
            Ok(n) => anyhow::bail!("batch_size must be positive, got {}", n),
            Err(_) => defaults.batch_size,
        };
        let retries = match raw.get_int("retries") {
            Ok(n) if n >= 1 => n as u32,
            Ok(n) => anyhow::bail!("retries must be at least 1, got {}", n),
            Err(_) => defaults.retries,
        };
        let retry_delay = raw
            .get_int("retry_delay_ms")
            .ok()
            .filter(|ms| *ms >= 0)
            .map(|ms| Duration::from_millis(ms as u64))
            .unwrap_or(defaults.retry_delay);

        Ok(Settings {
            supabase_url: non_empty("supabase_url").map(|u| u.trim_end_matches('/').to_string()),
            service_key: non_empty("service_key"),
            ruleset: non_empty("ruleset").map(PathBuf::from),
            batch_size,
            retries,
            retry_delay,
        })
    }

    /// Supabase URL and service key, or the first missing variable.
    pub fn credentials(&self) -> Result<(&str, &str), CatalogError> {
        let url = self
            .supabase_url
            .as_deref()
            .ok_or(CatalogError::MissingEnv("SUPABASE_URL"))?;
        let key = self
            .service_key
            .as_deref()
            .ok_or(CatalogError::MissingEnv("SUPABASE_SERVICE_ROLE_KEY"))?;
        Ok((url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(pairs: &[(&str, &str)]) -> Config {
        let mut b = Config::builder();
        for (k, v) in pairs {
            b = b.set_override(*k, *v).unwrap();
        }
        b.build().unwrap()
    }

    #[test]
    fn defaults_when_empty() {
        let s = Settings::from_config(&build(&[])).unwrap();
        assert_eq!(s.batch_size, 50);
        assert_eq!(s.retries, 3);
        assert_eq!(s.retry_delay, Duration::from_secs(2));
        assert!(s.supabase_url.is_none());
    }

    #[test]
    fn string_values_are_coerced() {
        let s = Settings::from_config(&build(&[
            ("batch_size", "20"),
            ("retries", "5"),
            ("retry_delay_ms", "10"),
            ("supabase_url", "https://abc.supabase.co/"),
        ]))
        .unwrap();
        assert_eq!(s.batch_size, 20);
        assert_eq!(s.retries, 5);
        assert_eq!(s.retry_delay, Duration::from_millis(10));
        assert_eq!(s.supabase_url.as_deref(), Some("https://abc.supabase.co"));
    }

    #[test]
    fn zero_batch_size_rejected() {
        assert!(Settings::from_config(&build(&[("batch_size", "0")])).is_err());
    }

    #[test]
    fn missing_key_is_reported() {
        let s = Settings {
            supabase_url: Some("https://abc.supabase.co".into()),
            ..Settings::default()
        };
        let err = s.credentials().unwrap_err();
        assert!(matches!(err, CatalogError::MissingEnv("SUPABASE_SERVICE_ROLE_KEY")));
    }
}
