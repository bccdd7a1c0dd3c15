use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::shared::error::AppError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub external_api: ExternalApiConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// "production" скрывает цепочку причин в ответах с ошибкой
    pub environment: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExternalApiConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub max_redirects: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub poll_interval_ms: u64,
    pub lock_duration_secs: i64,
    pub attempts: u32,
    pub backoff_delay_ms: u64,
    pub remove_on_complete_secs: i64,
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[server]
port = 3000
environment = "development"

[database]
path = "target/db/catalog.db"

[external_api]
url = "https://dummyjson.com/products"
timeout_ms = 5000
max_redirects = 5

[queue]
name = "product-import"
poll_interval_ms = 500
lock_duration_secs = 300
attempts = 3
backoff_delay_ms = 1000
remove_on_complete_secs = 86400
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. Next to the executable (for production)
/// 2. Falls back to embedded default config
///
/// Environment variables `PORT`, `DATABASE_PATH`, `DUMMY_JSON_URL` and
/// `APP_ENV` override the file.
pub fn load_config() -> anyhow::Result<Config> {
    let mut config = load_file_config()?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

fn load_file_config() -> anyhow::Result<Config> {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                return parse_config(&contents);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    tracing::info!("Using default embedded configuration");
    parse_config(DEFAULT_CONFIG)
}

/// Разбирает TOML; отсутствующие секции берутся из встроенного конфига
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
    let overrides: toml::Table = toml::from_str(contents)?;
    for (section, value) in overrides {
        match (merged.get_mut(&section), value) {
            (Some(toml::Value::Table(base)), toml::Value::Table(patch)) => {
                base.extend(patch);
            }
            (_, value) => {
                merged.insert(section, value);
            }
        }
    }
    Ok(toml::Value::Table(merged).try_into()?)
}

fn apply_env_overrides(config: &mut Config, env: impl Fn(&str) -> Option<String>) {
    if let Some(port) = env("PORT").and_then(|p| p.parse().ok()) {
        config.server.port = port;
    }
    if let Some(path) = env("DATABASE_PATH") {
        config.database.path = path;
    }
    if let Some(url) = env("DUMMY_JSON_URL") {
        config.external_api.url = url;
    }
    if let Some(environment) = env("APP_ENV") {
        config.server.environment = environment;
    }
}

/// Проверяет обязательные параметры запуска
pub fn validate(config: &Config) -> Result<(), AppError> {
    if config.external_api.url.trim().is_empty() {
        return Err(AppError::Configuration(
            "external_api.url is not configured".to_string(),
        ));
    }
    if config.queue.attempts == 0 {
        return Err(AppError::Configuration(
            "queue.attempts must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Get the database file path from configuration
/// Resolves relative paths relative to the executable directory
pub fn get_database_path(config: &Config) -> PathBuf {
    let db_path = Path::new(&config.database.path);

    if db_path.is_absolute() {
        return db_path.to_path_buf();
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join(db_path);
        }
    }

    PathBuf::from(&config.database.path)
}
