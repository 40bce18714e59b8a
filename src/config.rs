//! Configuration resolution.
//!
//! Priority: CLI flags → `JOBTRACK_*` environment (including `.env`) → `config.toml`
//! in the platform config directory → built-in defaults.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::auth::Identity;
use crate::pipeline::StalenessMode;

const APP_NAME: &str = "jobtrack";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQLite file used as the store for signed-in users.
    pub database: Option<PathBuf>,
    /// JSON file holding the anonymous session's applications.
    pub cache: Option<PathBuf>,
    pub staleness: StalenessMode,
    /// `tracing` filter directive, e.g. `jobtrack=debug`.
    pub log: Option<String>,
    pub identity: Option<Identity>,
}

impl Config {
    /// Load `.env`, then the config file (explicit path or the platform
    /// default), then environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("JOBTRACK_DB") {
            self.database = Some(PathBuf::from(db));
        }
        if let Some(cache) = lookup("JOBTRACK_CACHE") {
            self.cache = Some(PathBuf::from(cache));
        }
        if let Some(mode) = lookup("JOBTRACK_STALENESS") {
            self.staleness = mode.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Some(log) = lookup("JOBTRACK_LOG") {
            self.log = Some(log);
        }

        if let Some(user_id) = lookup("JOBTRACK_USER_ID") {
            let previous = self.identity.take();
            self.identity = Some(Identity {
                user_id,
                display_name: previous.as_ref().map(|i| i.display_name.clone()).unwrap_or_default(),
                email: previous.map(|i| i.email).unwrap_or_default(),
            });
        }
        if let Some(identity) = self.identity.as_mut() {
            if let Some(name) = lookup("JOBTRACK_USER_NAME") {
                identity.display_name = name;
            }
            if let Some(email) = lookup("JOBTRACK_USER_EMAIL") {
                identity.email = email;
            }
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| data_dir().join("jobtrack.db"))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .clone()
            .unwrap_or_else(|| data_dir().join("local-session.json"))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

fn data_dir() -> PathBuf {
    // Use XDG data directory or fall back to the current directory
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
