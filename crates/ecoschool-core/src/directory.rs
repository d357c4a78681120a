// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::school_key::Keyed;
use crate::{EcoError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::Path;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub name: String,
    pub level: String,
    pub region: String,
    #[serde(default)]
    pub office: String,
}

impl Keyed for SchoolRecord {
    fn key_name(&self) -> &str {
        &self.name
    }
    fn key_level(&self) -> &str {
        &self.level
    }
    fn key_region(&self) -> &str {
        &self.region
    }
}

/// In-memory school list used for type-ahead suggestions.
#[derive(Debug, Clone, Default)]
pub struct SchoolDirectory {
    records: Vec<SchoolRecord>,
}

impl SchoolDirectory {
    pub fn from_records(records: Vec<SchoolRecord>) -> Self {
        Self { records }
    }

    /// Reads `seoul-schools.json`. A bad file fails here, never per query.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let records: Vec<SchoolRecord> = serde_json::from_str(&content)?;
        info!(
            "School directory loaded — path={} records={}",
            path.display(),
            records.len()
        );
        Ok(Self { records })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string(&self.records)?)?;
        Ok(())
    }

    /// Converts the education office CSV export
    /// (`학교명,학교급,지역,교육지원청`, first line is a header).
    pub fn import_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        for row in rdr.records() {
            let row = row?;
            let field = |i: usize| row.get(i).unwrap_or("").trim().to_string();
            let name = field(0);
            if name.is_empty() {
                continue;
            }
            records.push(SchoolRecord {
                name,
                level: field(1),
                region: field(2),
                office: field(3),
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[SchoolRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Case-insensitive name search: prefix matches first, then the remaining
    /// substring matches, both in dataset order. A blank query yields nothing.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<SchoolRecord> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let limit = clamp_limit(limit);

        let mut starts = Vec::new();
        let mut contains = Vec::new();
        for record in &self.records {
            let hay = record.name.to_lowercase();
            if hay.starts_with(&needle) {
                starts.push(record);
            } else if hay.contains(&needle) {
                contains.push(record);
            }
        }

        let results: Vec<SchoolRecord> = starts
            .into_iter()
            .chain(contains)
            .take(limit)
            .cloned()
            .collect();
        debug!(
            "Directory search — query={} limit={} results={}",
            query.trim(),
            limit,
            results.len()
        );
        results
    }
}

/// Missing or zero limit falls back to the default; the cap is 30.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    match limit {
        Some(0) | None => DEFAULT_SEARCH_LIMIT,
        Some(n) => n.min(MAX_SEARCH_LIMIT),
    }
}

impl TryFrom<&str> for SchoolRecord {
    type Error = EcoError;

    /// `name|level|region|office` shorthand used by the CLI.
    fn try_from(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split('|').map(str::trim).collect();
        match parts.as_slice() {
            [name, level, region, rest @ ..] if !name.is_empty() => Ok(SchoolRecord {
                name: name.to_string(),
                level: level.to_string(),
                region: region.to_string(),
                office: rest.first().map(|s| s.to_string()).unwrap_or_default(),
            }),
            _ => Err(EcoError::Validation(format!(
                "expected name|level|region[|office], got '{}'",
                value
            ))),
        }
    }
}
