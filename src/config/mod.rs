//! Process configuration.
//!
//! Non-secret settings come from a TOML file (`AREA_CONFIG`, default
//! `area.toml`); every section and key is optional. Secrets only come from
//! the environment: `AREA_ENCRYPTION_KEY` and the per-service
//! `AREA_OAUTH_<SERVICE>_CLIENT_ID` / `_CLIENT_SECRET` pairs.

use crate::error::AreaError;
use crate::scheduler::{SchedulerConfig, UnresolvedReactionPolicy, POLL_INTERVAL};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const CONFIG_PATH_ENV: &str = "AREA_CONFIG";
pub const ENCRYPTION_KEY_ENV: &str = "AREA_ENCRYPTION_KEY";
const DEFAULT_CONFIG_PATH: &str = "area.toml";

/// Complete configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AreaConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// `[scheduler]`
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Timeout of each trigger check and reaction execution
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,
    #[serde(default)]
    pub on_unresolved_reaction: UnresolvedReactionPolicy,
}

fn default_max_concurrency() -> usize {
    64
}

fn default_call_timeout() -> u64 {
    30
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            call_timeout_seconds: default_call_timeout(),
            on_unresolved_reaction: UnresolvedReactionPolicy::default(),
        }
    }
}

/// `[database]`
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    "area.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// `[oauth]`
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// Public base URL of the API, used to build OAuth callback URLs
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            public_url: default_public_url(),
        }
    }
}

/// `[http]` - outbound client used by connectors
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_request_timeout() -> u64 {
    20
}

fn default_user_agent() -> String {
    "area-connector-hub".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl AreaConfig {
    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), AreaError> {
        if self.scheduler.max_concurrency == 0 {
            return Err(AreaError::Configuration(
                "scheduler.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.scheduler.call_timeout_seconds == 0 {
            return Err(AreaError::Configuration(
                "scheduler.call_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.http.request_timeout_seconds == 0 {
            return Err(AreaError::Configuration(
                "http.request_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if !self.oauth.public_url.starts_with("http://") && !self.oauth.public_url.starts_with("https://") {
            return Err(AreaError::Configuration(format!(
                "oauth.public_url must be an http(s) URL, got '{}'",
                self.oauth.public_url
            )));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: POLL_INTERVAL,
            max_concurrency: self.scheduler.max_concurrency,
            call_timeout: Duration::from_secs(self.scheduler.call_timeout_seconds),
            on_unresolved_reaction: self.scheduler.on_unresolved_reaction,
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AreaConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AreaConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Loads the file named by `AREA_CONFIG` (default `area.toml`).
///
/// A missing file yields the defaults; an unreadable or malformed one is an
/// error.
pub fn load_from_env() -> Result<AreaConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if !Path::new(&path).exists() {
        info!(path = %path, "Config file not found, using defaults");
        return Ok(AreaConfig::default());
    }
    let config = load_config(&path)?;
    info!(path = %path, "Loaded configuration");
    Ok(config)
}

/// Reads the base64 master key used to encrypt tokens at rest.
pub fn encryption_key_from_env() -> Result<String, AreaError> {
    match std::env::var(ENCRYPTION_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(AreaError::Configuration(format!(
            "{} must be set to a base64-encoded 32-byte key",
            ENCRYPTION_KEY_ENV
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Tests that touch process-wide env vars run one at a time.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = AreaConfig::default();
        assert_eq!(config.scheduler.max_concurrency, 64);
        assert_eq!(config.scheduler.call_timeout_seconds, 30);
        assert_eq!(config.scheduler.on_unresolved_reaction, UnresolvedReactionPolicy::Retain);
        assert_eq!(config.database.path, "area.db");
        assert_eq!(config.oauth.public_url, "http://localhost:8080");
        assert_eq!(config.http.request_timeout_seconds, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [scheduler]
            max_concurrency = 8
            call_timeout_seconds = 5
            on_unresolved_reaction = "advance"

            [database]
            path = "/var/lib/area/area.db"

            [oauth]
            public_url = "https://area.example.com"

            [http]
            request_timeout_seconds = 10
            user_agent = "area-test"
        "#;

        let config: AreaConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.scheduler.max_concurrency, 8);
        assert_eq!(config.scheduler.on_unresolved_reaction, UnresolvedReactionPolicy::Advance);
        assert_eq!(config.database.path, "/var/lib/area/area.db");
        assert_eq!(config.oauth.public_url, "https://area.example.com");
        assert_eq!(config.http.user_agent, "area-test");

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.poll_interval, POLL_INTERVAL);
        assert_eq!(scheduler.call_timeout, Duration::from_secs(5));
        assert_eq!(scheduler.max_concurrency, 8);
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [scheduler]
            max_concurrency = 4
        "#;

        let config: AreaConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.scheduler.max_concurrency, 4);
        assert_eq!(config.scheduler.call_timeout_seconds, 30); // Default
        assert_eq!(config.database.path, "area.db"); // Default
    }

    #[test]
    fn test_validation() {
        let mut config = AreaConfig::default();
        config.scheduler.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(AreaError::Configuration(_))));

        let mut config = AreaConfig::default();
        config.oauth.public_url = "localhost:8080".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"custom.db\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.database.path, "custom.db");

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[scheduler]\nmax_concurrency = \"many\"").unwrap();
        let err = load_config(bad.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_from_env_missing_file_uses_defaults() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(CONFIG_PATH_ENV, dir.path().join("absent.toml"));

        let config = load_from_env().unwrap();
        assert_eq!(config.database.path, "area.db");

        std::env::remove_var(CONFIG_PATH_ENV);
    }

    #[test]
    fn test_encryption_key_required() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::remove_var(ENCRYPTION_KEY_ENV);
        assert!(matches!(encryption_key_from_env(), Err(AreaError::Configuration(_))));

        std::env::set_var(ENCRYPTION_KEY_ENV, "a2V5");
        assert_eq!(encryption_key_from_env().unwrap(), "a2V5");
        std::env::remove_var(ENCRYPTION_KEY_ENV);
    }
}
