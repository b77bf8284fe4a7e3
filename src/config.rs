use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{0} must be set (e.g. in .env)")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Shows the write, create-column and login entries.
    #[serde(default)]
    pub admin_enabled: bool,
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Public site address, used for shareable post links.
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    /// Reads `.env` (if present) and then `BLOG_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "loaded .env");
        }
        Self::from_source(config::Environment::with_prefix("BLOG").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .set_default("supabase_url", "")?
            .set_default("supabase_anon_key", "")?
            .add_source(source)
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        if config.supabase_url.trim().is_empty() {
            return Err(ConfigError::Missing("BLOG_SUPABASE_URL"));
        }
        if config.supabase_anon_key.trim().is_empty() {
            return Err(ConfigError::Missing("BLOG_SUPABASE_ANON_KEY"));
        }
        Ok(config)
    }

    /// Cache entries are scoped to the backend they came from.
    pub fn origin(&self) -> &str {
        self.supabase_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("BLOG")
            .try_parsing(true)
            .source(Some(map))
    }

    #[test]
    fn reads_prefixed_variables() {
        let config = AppConfig::from_source(source(&[
            ("BLOG_SUPABASE_URL", "https://x.supabase.co/"),
            ("BLOG_SUPABASE_ANON_KEY", "key"),
            ("BLOG_ADMIN_ENABLED", "true"),
            ("BLOG_REQUEST_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();

        assert!(config.admin_enabled);
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.origin(), "https://x.supabase.co");
        assert_eq!(config.cache_path, None);
    }

    #[test]
    fn missing_url_is_reported() {
        let err = AppConfig::from_source(source(&[("BLOG_SUPABASE_ANON_KEY", "key")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BLOG_SUPABASE_URL")));
    }

    #[test]
    fn admin_is_off_by_default() {
        let config = AppConfig::from_source(source(&[
            ("BLOG_SUPABASE_URL", "https://x.supabase.co"),
            ("BLOG_SUPABASE_ANON_KEY", "key"),
        ]))
        .unwrap();
        assert!(!config.admin_enabled);
        assert_eq!(config.request_timeout_secs, 60);
    }
}
