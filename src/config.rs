use dotenvy::dotenv;
use std::env;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url:           String,
    pub db_max_connections:     u32,

    // Backend
    pub backend_host:           String,
    pub backend_port:           u16,

    // Scheduling
    pub default_lesson_minutes: i32,

    // App
    pub app_env:                String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url:           "sqlite://academy.db?mode=rwc".into(),
            db_max_connections:     5,
            backend_host:           "0.0.0.0".into(),
            backend_port:           8080,
            default_lesson_minutes: 60,
            app_env:                "development".into(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        fn parse_or<T: std::str::FromStr>(key: &str, fallback: T) -> Result<T, ConfigError> {
            match env::var(key) {
                Ok(raw) => raw
                    .trim()
                    .parse::<T>()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw)),
                Err(_) => Ok(fallback),
            }
        }

        let defaults = Self::default();
        let default_lesson_minutes = parse_or("DEFAULT_LESSON_MINUTES", defaults.default_lesson_minutes)?;
        if default_lesson_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_LESSON_MINUTES".into(),
                default_lesson_minutes.to_string(),
            ));
        }

        Ok(Self {
            database_url:       env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,

            backend_host:       env::var("BACKEND_HOST").unwrap_or(defaults.backend_host),
            backend_port:       parse_or("BACKEND_PORT", defaults.backend_port)?,

            default_lesson_minutes,

            app_env:            env::var("APP_ENV").unwrap_or(defaults.app_env),
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
