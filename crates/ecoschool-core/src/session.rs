// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::form::Step1Form;
use crate::practices::PracticeSelection;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const STEP1_KEY: &str = "carbonapp.step1";
pub const STEP2_KEY: &str = "carbonapp.step2";

/// Key/value form as kept in browser session storage.
pub type StorageMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub step1: Option<Step1Form>,
    pub step2: PracticeSelection,
}

fn parse_blob<T: DeserializeOwned>(map: &StorageMap, key: &str) -> Option<T> {
    let raw = map.get(key)?;
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Discarding unreadable session entry — key={} error={}", key, e);
            None
        }
    }
}

impl SessionSnapshot {
    /// Step 1 is omitted until the form has been saved once.
    pub fn to_storage(&self) -> serde_json::Result<StorageMap> {
        let mut map = StorageMap::new();
        if let Some(step1) = &self.step1 {
            map.insert(STEP1_KEY.to_string(), serde_json::to_string(step1)?);
        }
        map.insert(STEP2_KEY.to_string(), serde_json::to_string(&self.step2)?);
        Ok(map)
    }

    /// Missing or malformed entries fall back to their defaults.
    pub fn from_storage(map: &StorageMap) -> Self {
        Self {
            step1: parse_blob(map, STEP1_KEY),
            step2: parse_blob(map, STEP2_KEY).unwrap_or_default(),
        }
    }
}

/// File-backed session for the CLI, stored in the same key/value shape the
/// browser uses so it can be posted to `/api/report` as is.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_config_root() -> Self {
        Self::new(crate::get_config_root().join("session").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SessionSnapshot> {
        Ok(SessionSnapshot::from_storage(&self.load_storage()?))
    }

    pub fn load_storage(&self) -> Result<StorageMap> {
        if !self.path.exists() {
            return Ok(StorageMap::new());
        }
        let content = fs::read_to_string(&self.path).context("Failed to read session.json")?;
        serde_json::from_str(&content).context("Failed to parse session.json")
    }

    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).context("Failed to create session directory")?;
            }
        }
        let map = snapshot
            .to_storage()
            .context("Failed to serialize session")?;
        let content = serde_json::to_string_pretty(&map).context("Failed to serialize session")?;
        fs::write(&self.path, content).context("Failed to write session.json")?;
        debug!("Session saved — path={}", self.path.display());
        Ok(())
    }

    /// Developer reset.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to remove session.json")?;
        }
        Ok(())
    }
}
