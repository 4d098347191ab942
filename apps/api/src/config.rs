use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Only `DATABASE_URL` is required; everything else has a default.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Consultant stamped on imports that do not name one.
    pub default_consultant: String,
    pub sheets: SheetsConfig,
    pub sourcing: SourcingConfig,
}

/// Spreadsheet mirror settings.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub sheet_id: String,
    pub sheet_name: String,
    pub gid: String,
    pub account: String,
    pub gog_bin: String,
    pub cli_timeout: Duration,
    pub export_timeout: Duration,
    /// Pause between per-record pushes.
    pub throttle: Duration,
    pub max_attempts: u32,
}

impl SheetsConfig {
    pub fn export_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/export?format=csv&gid={}",
            self.sheet_id, self.gid
        )
    }
}

/// External scraper / scorer settings.
#[derive(Debug, Clone)]
pub struct SourcingConfig {
    pub dir: PathBuf,
    pub python_bin: String,
    pub scraper_timeout: Duration,
    pub scorer_timeout: Duration,
    pub github_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: parse_env("PORT", 3001)?,
            rust_log: env_or("RUST_LOG", "info"),
            default_consultant: env_or("DEFAULT_CONSULTANT", "system"),
            sheets: SheetsConfig {
                sheet_id: env_or("SHEET_ID", ""),
                sheet_name: env_or("SHEET_NAME", "履歷池v2"),
                gid: env_or("SHEET_GID", "0"),
                account: env_or("SHEETS_ACCOUNT", ""),
                gog_bin: env_or("GOG_BIN", "gog"),
                cli_timeout: Duration::from_secs(parse_env("SHEETS_TIMEOUT_SECS", 30)?),
                export_timeout: Duration::from_secs(60),
                throttle: Duration::from_millis(parse_env("SHEETS_THROTTLE_MS", 2000)?),
                max_attempts: parse_env("SYNC_MAX_RETRIES", 3)?,
            },
            sourcing: SourcingConfig {
                dir: PathBuf::from(env_or("TALENT_SOURCING_DIR", "./talent-sourcing")),
                python_bin: env_or("PYTHON_BIN", "python3"),
                scraper_timeout: Duration::from_secs(parse_env("SCRAPER_TIMEOUT_SECS", 600)?),
                scorer_timeout: Duration::from_secs(parse_env("SCORER_TIMEOUT_SECS", 120)?),
                github_token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            },
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Config {
            database_url: "postgres://localhost/headhunter_test".to_string(),
            port: 0,
            rust_log: "debug".to_string(),
            default_consultant: "system".to_string(),
            sheets: SheetsConfig {
                sheet_id: "sheet-123".to_string(),
                sheet_name: "履歷池v2".to_string(),
                gid: "0".to_string(),
                account: "ops@example.com".to_string(),
                gog_bin: "gog".to_string(),
                cli_timeout: Duration::from_secs(30),
                export_timeout: Duration::from_secs(60),
                throttle: Duration::ZERO,
                max_attempts: 3,
            },
            sourcing: SourcingConfig {
                dir: PathBuf::from("/nonexistent/talent-sourcing"),
                python_bin: "python3".to_string(),
                scraper_timeout: Duration::from_secs(600),
                scorer_timeout: Duration::from_secs(120),
                github_token: None,
            },
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
