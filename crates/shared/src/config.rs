//! Application configuration management.

use std::ops::RangeInclusive;

use serde::Deserialize;

/// Allowed range of a nudge cooldown, in hours.
pub const NUDGE_COOLDOWN_HOURS: RangeInclusive<u32> = 1..=720;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtSettings,
    /// Expense workflow tuning.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration as read from config sources.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for signing tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

/// Expense workflow configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Nudge cooldown applied when a company has not configured its own.
    #[serde(default = "default_nudge_cooldown_hours")]
    pub default_nudge_cooldown_hours: u32,
    /// Capacity of the in-process lifecycle event bus.
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_nudge_cooldown_hours: default_nudge_cooldown_hours(),
            notification_buffer: default_notification_buffer(),
        }
    }
}

fn default_nudge_cooldown_hours() -> u32 {
    24
}

fn default_notification_buffer() -> usize {
    256
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("COFOUND").separator("__"))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.workflow.validate()?;
        Ok(config)
    }
}

impl WorkflowConfig {
    /// Checks the default cooldown lies in `NUDGE_COOLDOWN_HOURS` and the
    /// event buffer is not empty.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError::Message` naming the offending key.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if !NUDGE_COOLDOWN_HOURS.contains(&self.default_nudge_cooldown_hours) {
            return Err(config::ConfigError::Message(format!(
                "workflow.default_nudge_cooldown_hours must be between {} and {}, got {}",
                NUDGE_COOLDOWN_HOURS.start(),
                NUDGE_COOLDOWN_HOURS.end(),
                self.default_nudge_cooldown_hours
            )));
        }
        if self.notification_buffer == 0 {
            return Err(config::ConfigError::Message(
                "workflow.notification_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("COFOUND__DATABASE__URL", Some("postgres://localhost/cofound")),
                ("COFOUND__JWT__SECRET", Some("secret")),
                ("COFOUND__SERVER__PORT", Some("9000")),
                ("RUN_MODE", Some("test-nonexistent")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.database.url, "postgres://localhost/cofound");
                assert_eq!(config.jwt.secret, "secret");
                assert_eq!(config.server.port, 9000);
                assert_eq!(config.server.host, "0.0.0.0");
                assert_eq!(config.database.max_connections, 10);
                assert_eq!(config.jwt.access_token_expiry_secs, 900);
                assert_eq!(config.workflow.default_nudge_cooldown_hours, 24);
                assert_eq!(config.workflow.notification_buffer, 256);
            },
        );
    }

    #[test]
    fn test_workflow_overrides() {
        temp_env::with_vars(
            [
                ("COFOUND__DATABASE__URL", Some("sqlite::memory:")),
                ("COFOUND__JWT__SECRET", Some("secret")),
                ("COFOUND__WORKFLOW__DEFAULT_NUDGE_COOLDOWN_HOURS", Some("6")),
                ("RUN_MODE", Some("test-nonexistent")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.workflow.default_nudge_cooldown_hours, 6);
            },
        );
    }

    #[rstest::rstest]
    #[case("0")]
    #[case("721")]
    #[case("4294967295")]
    fn test_out_of_range_default_cooldown_fails(#[case] hours: &str) {
        temp_env::with_vars(
            [
                ("COFOUND__DATABASE__URL", Some("sqlite::memory:")),
                ("COFOUND__JWT__SECRET", Some("secret")),
                ("COFOUND__WORKFLOW__DEFAULT_NUDGE_COOLDOWN_HOURS", Some(hours)),
                ("RUN_MODE", Some("test-nonexistent")),
            ],
            || {
                let err = AppConfig::load().unwrap_err();
                assert!(err.to_string().contains("default_nudge_cooldown_hours"));
            },
        );
    }

    #[test]
    fn test_workflow_bounds_are_inclusive() {
        let workflow = |hours, buffer| WorkflowConfig {
            default_nudge_cooldown_hours: hours,
            notification_buffer: buffer,
        };
        assert!(workflow(1, 256).validate().is_ok());
        assert!(workflow(720, 256).validate().is_ok());
        assert!(workflow(24, 0).validate().is_err());
    }

    #[test]
    fn test_missing_database_url_fails() {
        temp_env::with_vars(
            [
                ("COFOUND__DATABASE__URL", None::<&str>),
                ("COFOUND__JWT__SECRET", Some("secret")),
                ("RUN_MODE", Some("test-nonexistent")),
            ],
            || {
                assert!(AppConfig::load().is_err());
            },
        );
    }
}
