use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.mangadex.org";
pub const DEFAULT_UPLOADS_BASE_URL: &str = "https://uploads.mangadex.org";

/// Runtime settings, read from `config.toml` with env overrides on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub uploads_base_url: String,
    /// sqlx URL; `None` uses a SQLite file in the user's data directory.
    pub database_url: Option<String>,
    pub translated_language: String,
    pub cache_ttl_secs: i64,
    pub pages_ttl_secs: i64,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_initial_delay_ms: u64,
    /// Overrides terminal detection of a dark background.
    pub prefers_dark: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            uploads_base_url: DEFAULT_UPLOADS_BASE_URL.to_string(),
            database_url: None,
            translated_language: "en".to_string(),
            cache_ttl_secs: 10 * 60,
            pages_ttl_secs: 5 * 60,
            user_agent: format!("mangalimited/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            max_retries: 2,
            retry_initial_delay_ms: 1000,
            prefers_dark: None,
        }
    }
}

impl Config {
    /// Load from an explicit file (must exist) or from the default location (may be absent).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file: {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("MANGALIMITED_DATABASE_URL") {
            if !url.trim().is_empty() { self.database_url = Some(url); }
        }
        if let Ok(url) = std::env::var("MANGALIMITED_API_BASE_URL") {
            if !url.trim().is_empty() { self.api_base_url = url; }
        }
        if let Some(ttl) = std::env::var("MANGALIMITED_CACHE_TTL_SECS").ok().and_then(|s| s.parse().ok()) {
            self.cache_ttl_secs = ttl;
        }
        if let Some(ttl) = std::env::var("MANGALIMITED_PAGES_TTL_SECS").ok().and_then(|s| s.parse().ok()) {
            self.pages_ttl_secs = ttl;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "mangalimited", "mangalimited")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|p| p.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "translated_language = \"es-la\"\nprefers_dark = true\n").unwrap();
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.translated_language, "es-la");
        assert_eq!(cfg.prefers_dark, Some(true));
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cfg.cache_ttl_secs, 600);
        assert_eq!(cfg.max_retries, 2);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("reading config file"));
    }

    #[test]
    fn invalid_toml_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "cache_ttl_secs = \"soon\"").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
