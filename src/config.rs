use crate::models::activity_models::Severity;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for WebConfig {
    fn default() -> Self {
        WebConfig { host: default_host(), port: default_port() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_seconds: u64,
    pub lookback_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { tick_seconds: 60, lookback_minutes: 30 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RssConfig {
    pub heartbeat_seconds: u64,
    pub max_feeds_per_tick: usize,
    pub fetch_timeout_seconds: u64,
    pub default_category: String,
    pub default_interval_minutes: u32,
    pub max_items_per_fetch: usize,
}

impl Default for RssConfig {
    fn default() -> Self {
        RssConfig {
            heartbeat_seconds: 60,
            max_feeds_per_tick: 5,
            fetch_timeout_seconds: 15,
            default_category: "General".to_string(),
            default_interval_minutes: 30,
            max_items_per_fetch: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub default_max_per_hour: u32,
    pub default_max_per_day: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig { default_max_per_hour: 5, default_max_per_day: 20 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActivityConfig {
    pub info_ttl_days: i64,
    pub warning_ttl_days: i64,
    pub critical_ttl_days: i64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        ActivityConfig { info_ttl_days: 30, warning_ttl_days: 90, critical_ttl_days: 365 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VapidConfig {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub rss: RssConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    // Populated from the .env file
    pub database_path: String,
    pub jwt_secret: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub token_expiry_hours: i64,
    pub expose_error_details: bool,
    #[serde(default)]
    pub vapid: Option<VapidConfig>,
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;

        let database_path = required_var("DATABASE_PATH")?;
        validate_database_path(&database_path)?;

        let jwt_secret = required_var("JWT_SECRET")?;
        validate_jwt_secret(&jwt_secret)?;

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let token_expiry_hours = match env::var("TOKEN_EXPIRY_HOURS") {
            Ok(raw) => raw.trim().parse::<i64>().ok().filter(|h| *h > 0).ok_or_else(|| {
                config::ConfigError::Message(format!(
                    "FATAL: 'TOKEN_EXPIRY_HOURS' must be a positive integer, got '{}'.",
                    raw
                ))
            })?,
            Err(_) => 24,
        };

        let expose_error_details = env::var("EXPOSE_ERROR_DETAILS")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let mut builder = config::Config::builder()
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml).required(false))
            .set_override("database_path", database_path)?
            .set_override("jwt_secret", jwt_secret)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("token_expiry_hours", token_expiry_hours)?
            .set_override("expose_error_details", expose_error_details)?;

        // Web push stays disabled unless all three VAPID values are present.
        if let (Ok(public_key), Ok(private_key), Ok(subject)) = (
            env::var("VAPID_PUBLIC_KEY"),
            env::var("VAPID_PRIVATE_KEY"),
            env::var("VAPID_SUBJECT"),
        ) {
            builder = builder
                .set_override("vapid.public_key", public_key)?
                .set_override("vapid.private_key", private_key)?
                .set_override("vapid.subject", subject)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Defaults for every tunable, used by the setup tool and tests.
    pub fn with_defaults(database_path: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Config {
            web: WebConfig::default(),
            scheduler: SchedulerConfig::default(),
            rss: RssConfig::default(),
            notifications: NotificationConfig::default(),
            activity: ActivityConfig::default(),
            database_path: database_path.into(),
            jwt_secret: jwt_secret.into(),
            allowed_origins: String::new(),
            log_level: "info".to_string(),
            token_expiry_hours: 24,
            expose_error_details: false,
            vapid: None,
        }
    }

    /// Path of the redb store holding posts and revisions.
    pub fn content_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("content").join("content.db")
    }

    /// Path of the SQLite store holding users, categories, feeds and notifications.
    pub fn newsroom_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("newsroom").join("newsroom.db")
    }

    pub fn activity_ttl(&self, severity: Severity) -> chrono::Duration {
        let days = match severity {
            Severity::Info => self.activity.info_ttl_days,
            Severity::Warning => self.activity.warning_ttl_days,
            Severity::Critical => self.activity.critical_ttl_days,
        };
        chrono::Duration::days(days.max(1))
    }
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| {
        config::ConfigError::Message(format!(
            "FATAL: Environment variable '{}' is not set in your .env file.",
            name
        ))
    })
}

pub fn validate_database_path(path: &str) -> Result<(), config::ConfigError> {
    if Path::new(path).is_relative() {
        return Err(config::ConfigError::Message(format!(
            "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
            path
        )));
    }
    Ok(())
}

pub fn validate_jwt_secret(secret: &str) -> Result<(), config::ConfigError> {
    if secret.trim().len() < MIN_JWT_SECRET_LEN {
        return Err(config::ConfigError::Message(format!(
            "FATAL: 'JWT_SECRET' must be at least {} characters long.",
            MIN_JWT_SECRET_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_database_path() {
        assert!(validate_database_path("data/db").is_err());
        assert!(validate_database_path("/var/lib/newsdesk").is_ok());
    }

    #[test]
    fn rejects_short_jwt_secret() {
        assert!(validate_jwt_secret("too-short").is_err());
        assert!(validate_jwt_secret(&"x".repeat(MIN_JWT_SECRET_LEN)).is_ok());
    }

    #[test]
    fn ttl_follows_severity() {
        let config = Config::with_defaults("/tmp/newsdesk", "s".repeat(40));
        assert_eq!(config.activity_ttl(Severity::Info), chrono::Duration::days(30));
        assert_eq!(config.activity_ttl(Severity::Warning), chrono::Duration::days(90));
        assert_eq!(config.activity_ttl(Severity::Critical), chrono::Duration::days(365));
    }

    #[test]
    fn store_paths_live_under_database_path() {
        let config = Config::with_defaults("/srv/news", "s".repeat(40));
        assert_eq!(config.content_db_path(), PathBuf::from("/srv/news/content/content.db"));
        assert_eq!(config.newsroom_db_path(), PathBuf::from("/srv/news/newsroom/newsroom.db"));
    }
}
