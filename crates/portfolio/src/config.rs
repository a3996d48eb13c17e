//! Configuration management for the portfolio backend.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "portfolio";

/// Environment variable prefix.
const ENV_PREFIX: &str = "PORTFOLIO_";

/// Default logical database name.
pub const DEFAULT_DATABASE_NAME: &str = "portfolio";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PORTFOLIO_`, sections split on `__`)
/// 2. TOML config file at `~/.config/portfolio/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Document store configuration.
    pub database: DatabaseConfig,
    /// Stats endpoint configuration.
    pub stats: StatsConfig,
    /// Mail relay configuration.
    pub mail: MailConfig,
    /// View log retention configuration.
    pub retention: RetentionConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Origins allowed to call the API from a browser.
    /// Empty disables CORS.
    pub allow_origins: Vec<String>,
}

/// Document store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string: `sqlite::memory:`, `sqlite://<dir>` or a directory.
    /// There is no default; the store fails on first use when unset.
    pub url: Option<String>,
    /// Logical database name, resolved to `<dir>/<name>.db`.
    pub name: String,
}

/// Stats endpoint configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Bearer token required to read stats.
    /// When unset every stats request is rejected.
    #[serde(skip_serializing)]
    pub secret: Option<String>,
}

/// Mail relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// SMTP relay host.
    pub smtp_host: String,
    /// SMTP relay port (implicit TLS).
    pub smtp_port: u16,
    /// SMTP username.
    pub username: Option<String>,
    /// SMTP password.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Address contact messages are delivered to.
    pub contact_email: Option<String>,
}

/// View log retention. Both limits are opt-in and only applied by `prune`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Maximum number of log entries to keep. 0 keeps everything.
    pub max_log_entries: usize,
    /// Maximum age of log entries in days. 0 keeps everything.
    pub max_log_age_days: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            allow_origins: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            name: DEFAULT_DATABASE_NAME.to_string(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            username: None,
            password: None,
            contact_email: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// A missing database url is not a validation failure: the connection
    /// manager reports it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        let name = self.database.name.trim();
        if name.is_empty() {
            return Err(Error::ConfigValidation {
                message: "database.name cannot be empty".to_string(),
            });
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::ConfigValidation {
                message: format!("database.name must be a plain name, got {name:?}"),
            });
        }

        if self.mail.username.is_some() && self.mail.password.is_none() {
            return Err(Error::ConfigValidation {
                message: "mail.username is set but mail.password is missing".to_string(),
            });
        }

        Ok(())
    }

    /// Get the HTTP bind address.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get the log retention age as a Duration.
    #[must_use]
    pub fn max_log_age(&self) -> Option<Duration> {
        if self.retention.max_log_age_days == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.retention.max_log_age_days) * 24 * 60 * 60,
            ))
        }
    }

    /// Get the log retention count.
    #[must_use]
    pub fn max_log_entries(&self) -> Option<usize> {
        match self.retention.max_log_entries {
            0 => None,
            n => Some(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "portfolio_config_{}_{name}.toml",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.port, 3000);
        assert!(config.database.url.is_none());
        assert_eq!(config.database.name, "portfolio");
        assert!(config.stats.secret.is_none());
        assert_eq!(config.mail.smtp_host, "smtp.gmail.com");
    }

    #[test]
    fn test_default_retention_is_unbounded() {
        let config = Config::default();

        assert!(config.max_log_age().is_none());
        assert!(config.max_log_entries().is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.port"));
    }

    #[test]
    fn test_validate_empty_database_name() {
        let mut config = Config::default();
        config.database.name = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("database.name"));
    }

    #[test]
    fn test_validate_path_like_database_name() {
        let mut config = Config::default();
        config.database.name = "../escape".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_username_without_password() {
        let mut config = Config::default();
        config.mail.username = Some("me@example.com".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("mail.password"));
    }

    #[test]
    fn test_bind_address() {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 8080;

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_max_log_age_some_when_set() {
        let mut config = Config::default();
        config.retention.max_log_age_days = 30;

        assert_eq!(
            config.max_log_age(),
            Some(Duration::from_secs(30 * 24 * 60 * 60))
        );
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("portfolio"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = write_temp_config(
            "full",
            r#"
            [server]
            port = 8081

            [database]
            url = "sqlite:///var/lib/portfolio"
            name = "site"

            [stats]
            secret = "hunter2"

            [retention]
            max_log_entries = 1000
            "#,
        );

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(
            config.database.url.as_deref(),
            Some("sqlite:///var/lib/portfolio")
        );
        assert_eq!(config.database.name, "site");
        assert_eq!(config.stats.secret.as_deref(), Some("hunter2"));
        assert_eq!(config.max_log_entries(), Some(1000));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let path = write_temp_config(
            "invalid",
            r#"
            [database]
            name = ""
            "#,
        );

        let result = Config::load_from(Some(path.clone()));
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = Config::default();
        config.stats.secret = Some("hunter2".to_string());
        config.mail.password = Some("app-password".to_string());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("app-password"));
        assert!(json.contains("smtp_host"));
    }

    #[test]
    fn test_database_config_deserialize() {
        let json = r#"{"url": "sqlite::memory:"}"#;
        let database: DatabaseConfig = serde_json::from_str(json).unwrap();
        assert_eq!(database.url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(database.name, DEFAULT_DATABASE_NAME);
    }
}
