use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::MAX_TRAVERSAL_LIMIT;

pub const DEFAULT_STORAGE_ROOT: &str = "/lsif-storage";
pub const DEFAULT_BUNDLE_MANAGER_URL: &str = "http://localhost:3187";
pub const DEFAULT_PORT: u16 = 3186;

pub const STORAGE_ROOT_ENV: &str = "XREPO_STORAGE_ROOT";
pub const BUNDLE_MANAGER_URL_ENV: &str = "XREPO_BUNDLE_MANAGER_URL";

/// Subdirectories of the storage root owned by the ingestion side
pub const STORAGE_SUBDIRS: [&str; 2] = ["uploads", "dbs"];

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct XrepoConfig {
    pub storage_root: Option<String>,
    pub database: Option<String>,
    pub bundle_manager_url: Option<String>,
    pub port: Option<u16>,
    pub traversal_limit: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

impl XrepoConfig {
    /// Apply `XREPO_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(STORAGE_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.storage_root = Some(root);
        }
        if let Some(url) = lookup(BUNDLE_MANAGER_URL_ENV).filter(|v| !v.is_empty()) {
            self.bundle_manager_url = Some(url);
        }
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(self.storage_root.as_deref().unwrap_or(DEFAULT_STORAGE_ROOT))
    }

    /// Explicit database path, or `xrepo.db` under the storage root
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(db) => PathBuf::from(db),
            None => default_database_path_in(&self.storage_root()),
        }
    }

    pub fn bundle_manager_url(&self) -> &str {
        self.bundle_manager_url
            .as_deref()
            .unwrap_or(DEFAULT_BUNDLE_MANAGER_URL)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn traversal_limit(&self) -> usize {
        self.traversal_limit.unwrap_or(MAX_TRAVERSAL_LIMIT)
    }

    /// Per-request deadline; `None` or zero means unbounded
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("xrepo.toml")
}

pub fn default_database_path_in(storage_root: &Path) -> PathBuf {
    storage_root.join("xrepo.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<XrepoConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: XrepoConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

/// Create the storage root and the directories that live under it
pub fn ensure_storage_dirs(storage_root: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(storage_root).map_err(|e| {
        anyhow::anyhow!("failed to create storage root {}: {}", storage_root.display(), e)
    })?;
    for dir in STORAGE_SUBDIRS {
        std::fs::create_dir_all(storage_root.join(dir))?;
    }
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
