//! Configuration loader and validator for the curation service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub admin: Admin,
    pub cache: Cache,
    pub scraper: Scraper,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind_addr: String,
}

/// Admin surface settings. Token auth only; password hashing and session
/// issuance live outside this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admin {
    pub token: String,
}

/// Cache tuning for the two in-process caches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cache {
    pub list_ttl_secs: u64,
    pub today_ttl_secs: u64,
    pub capacity: usize,
}

/// External scraper invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scraper {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid(
            "app.bind_addr must be a host:port socket address",
        ));
    }

    if cfg.admin.token.trim().is_empty() {
        return Err(ConfigError::Invalid("admin.token must be non-empty"));
    }

    if cfg.cache.list_ttl_secs == 0 {
        return Err(ConfigError::Invalid("cache.list_ttl_secs must be > 0"));
    }
    if cfg.cache.today_ttl_secs == 0 {
        return Err(ConfigError::Invalid("cache.today_ttl_secs must be > 0"));
    }
    if cfg.cache.capacity == 0 {
        return Err(ConfigError::Invalid("cache.capacity must be > 0"));
    }

    if cfg.scraper.command.trim().is_empty() {
        return Err(ConfigError::Invalid("scraper.command must be non-empty"));
    }

    Ok(())
}

/// Example YAML configuration, kept in sync with the struct schema.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind_addr: "127.0.0.1:8080"

admin:
  token: "CHANGE_ME_ADMIN_TOKEN"

cache:
  list_ttl_secs: 300
  today_ttl_secs: 600
  capacity: 100

scraper:
  command: "python3"
  args:
    - "scrapers/run_scrapers.py"
    - "--emit-json"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_bind_addr() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.bind_addr = "not-an-addr".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("bind_addr")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_admin_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.admin.token = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("admin.token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_cache_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.cache.list_ttl_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.cache.today_ttl_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.cache.capacity = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_scraper_command() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.scraper.command = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("scraper.command")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.cache.capacity, 100);
        assert_eq!(cfg.app.bind_addr, "127.0.0.1:8080");
    }
}
