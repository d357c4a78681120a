// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::{EcoError, Result};
use std::path::{Path, PathBuf};

pub const SCHOOLS_FILE: &str = "seoul-schools.json";
pub const ENERGY_FILE: &str = "seoul-schools-with-energy.json";
pub const DEFAULT_DATA_DIR: &str = "public/data";
pub const SCHOOLINFO_BASE_URL: &str = "https://www.schoolinfo.go.kr/openApi.do";

/// Process-level settings shared by the server and the CLI. Both binaries fill
/// it from clap arguments (which read the same environment variables).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub api_key: Option<String>,
    /// Informational only; never sent upstream.
    pub account: Option<String>,
    pub base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            api_key: None,
            account: None,
            base_url: SCHOOLINFO_BASE_URL.to_string(),
        }
    }
}

impl AppConfig {
    pub fn new(data_dir: impl AsRef<Path>, api_key: Option<String>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            ..Self::default()
        }
    }

    pub fn with_account(mut self, account: Option<String>) -> Self {
        self.account = account.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn schools_path(&self) -> PathBuf {
        self.data_dir.join(SCHOOLS_FILE)
    }

    pub fn energy_path(&self) -> PathBuf {
        self.data_dir.join(ENERGY_FILE)
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            EcoError::Configuration(
                "SCHOOLINFO_API_KEY is not set; add it to the environment".to_string(),
            )
        })
    }

    /// Default location of the authoritative upstream response cache.
    pub fn default_cache_dir() -> PathBuf {
        crate::get_config_root().join("cache").join("schoolinfo")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_blank_api_key_is_missing() {
        let config = AppConfig::new("data", Some("  ".to_string()));
        let err = config.require_api_key().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_dataset_paths() {
        let config = AppConfig::new("/srv/data", Some("k".into()));
        assert_eq!(config.require_api_key().unwrap(), "k");
        assert_eq!(
            config.schools_path(),
            PathBuf::from("/srv/data/seoul-schools.json")
        );
        assert_eq!(
            config.energy_path(),
            PathBuf::from("/srv/data/seoul-schools-with-energy.json")
        );
    }
}
