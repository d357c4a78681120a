// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::normalize::{normalize_number, value_text};
use crate::school_key::{KeyMatcher, KeyQuery, Keyed};
use crate::{parse_year, EcoError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const ELECTRICITY_KEY: &str = "전기사용량합계";
pub const WATER_KEY: &str = "물사용량합계";
pub const GAS_KEY: &str = "가스사용량";
pub const RENEWABLE_KEY: &str = "신재생에너지사용량";

/// Years tried after the preferred one.
pub const YEAR_FALLBACKS: i32 = 3;

/// One year of metered usage. Values arrive as numbers or formatted strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyYear {
    #[serde(rename = "기준일자", default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<Value>,
    #[serde(rename = "전기사용량합계", default)]
    pub electricity: Option<Value>,
    #[serde(rename = "물사용량합계", default)]
    pub water: Option<Value>,
    #[serde(rename = "가스사용량", default)]
    pub gas: Option<Value>,
    #[serde(rename = "신재생에너지사용량", default)]
    pub renewable: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyRecord {
    pub name: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub office: String,
    /// Keyed by four-digit year.
    #[serde(rename = "에너지사용량", default)]
    pub usage: BTreeMap<String, EnergyYear>,
}

impl Keyed for EnergyRecord {
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

impl EnergyRecord {
    pub fn year(&self, year: i32) -> Option<&EnergyYear> {
        self.usage.get(&year.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnergyRequest {
    pub name: String,
    pub region: Option<String>,
    pub level: Option<String>,
    /// Raw year parameter; only a four-digit value is honored.
    pub year: Option<String>,
}

impl EnergyRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn region(mut self, region: Option<&str>) -> Self {
        self.region = region.map(|s| s.trim().to_string());
        self
    }

    pub fn level(mut self, level: Option<&str>) -> Self {
        self.level = level.map(|s| s.trim().to_string());
        self
    }

    pub fn year(mut self, year: Option<&str>) -> Self {
        self.year = year.map(|s| s.trim().to_string());
        self
    }

    /// Requested year if it is four digits, else last year.
    pub fn preferred_year(&self, current_year: i32) -> i32 {
        self.year
            .as_deref()
            .and_then(parse_year)
            .unwrap_or(current_year - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolRef {
    pub name: String,
    pub region: String,
    pub level: String,
    pub office: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyValues {
    pub electricity_kwh: String,
    pub water_m3: String,
    pub gas_m3: String,
    pub renewable_kwh: String,
}

impl EnergyValues {
    pub fn from_year(row: &EnergyYear) -> Self {
        let clean = |v: &Option<Value>| normalize_number(&value_text(v.as_ref()));
        Self {
            electricity_kwh: clean(&row.electricity),
            water_m3: clean(&row.water),
            gas_m3: clean(&row.gas),
            renewable_kwh: clean(&row.renewable),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnergyKeys {
    pub electricity: &'static str,
    pub water: &'static str,
    pub gas: &'static str,
    pub renewable: &'static str,
}

impl Default for EnergyKeys {
    fn default() -> Self {
        Self {
            electricity: ELECTRICITY_KEY,
            water: WATER_KEY,
            gas: GAS_KEY,
            renewable: RENEWABLE_KEY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyLookup {
    pub year_used: i32,
    pub school: SchoolRef,
    pub values: EnergyValues,
    pub keys: EnergyKeys,
    pub match_confidence: f32,
    /// Another candidate scored the same as the one picked.
    pub ambiguous: bool,
}

/// `[preferred, preferred-1, .., preferred-3]`.
pub fn energy_years(preferred: i32) -> Vec<i32> {
    (0..=YEAR_FALLBACKS).map(|offset| preferred - offset).collect()
}

/// The pre-built usage dataset, loaded once and queried read-only.
#[derive(Debug, Clone, Default)]
pub struct EnergyDataset {
    records: Vec<EnergyRecord>,
}

impl EnergyDataset {
    pub fn from_records(records: Vec<EnergyRecord>) -> Self {
        Self { records }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let records: Vec<EnergyRecord> = serde_json::from_str(&content)?;
        info!(
            "Energy dataset loaded — path={} records={}",
            path.display(),
            records.len()
        );
        Ok(Self { records })
    }

    pub fn records(&self) -> &[EnergyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Best record for a name, narrowed by region and level when given.
    pub fn find(&self, query: &KeyQuery) -> Option<(&EnergyRecord, f32, bool)> {
        let ranked = KeyMatcher::rank(&self.records, query);
        let ambiguous = KeyMatcher::is_ambiguous(&ranked);
        ranked
            .first()
            .map(|top| (&self.records[top.index], top.confidence, ambiguous))
    }

    pub fn lookup(&self, request: &EnergyRequest, current_year: i32) -> Result<EnergyLookup> {
        if request.name.is_empty() {
            return Err(EcoError::Validation("name (school name) is required".into()));
        }
        let query = KeyQuery::new(&request.name)
            .region(request.region.as_deref())
            .level(request.level.as_deref());

        let (record, confidence, ambiguous) = self.find(&query).ok_or_else(|| {
            EcoError::NotFound("school not found in the energy dataset".into())
        })?;

        let preferred = request.preferred_year(current_year);
        let (year_used, row) = energy_years(preferred)
            .into_iter()
            .find_map(|year| record.year(year).map(|row| (year, row)))
            .ok_or_else(|| {
                EcoError::NotFound(format!(
                    "no usable year in the energy dataset for {} ({}..={})",
                    record.name,
                    preferred - YEAR_FALLBACKS,
                    preferred
                ))
            })?;

        debug!(
            "Energy lookup — name={} picked={} yearUsed={} confidence={:.1} ambiguous={}",
            request.name, record.name, year_used, confidence, ambiguous
        );

        Ok(EnergyLookup {
            year_used,
            school: SchoolRef {
                name: record.name.clone(),
                region: record.region.clone(),
                level: record.level.clone(),
                office: record.office.clone(),
            },
            values: EnergyValues::from_year(row),
            keys: EnergyKeys::default(),
            match_confidence: confidence,
            ambiguous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    fn dataset() -> EnergyDataset {
        let raw = json!([
            {
                "name": "대치초등학교", "level": "초등", "region": "강남구", "office": "강남서초",
                "에너지사용량": {
                    "2021": {"전기사용량합계": "1,234,567", "물사용량합계": 5400, "가스사용량": "32,000.5"},
                    "2023": {"전기사용량합계": 999}
                }
            },
            {
                "name": "대치중학교", "level": "중등", "region": "강남구", "office": "강남서초",
                "에너지사용량": {}
            },
            {
                "name": "은광여자고등학교", "level": "고등", "region": "강남구", "office": "강남서초",
                "에너지사용량": {
                    "2020": {"전기사용량합계": 700},
                    "2021": {"전기사용량합계": "1,234,567", "물사용량합계": 5400, "가스사용량": "32,000.5"}
                }
            }
        ]);
        EnergyDataset::from_records(serde_json::from_value(raw).unwrap())
    }

    #[test]
    fn test_preferred_year_defaults_to_last_year() {
        assert_eq!(EnergyRequest::new("x").preferred_year(2025), 2024);
        assert_eq!(
            EnergyRequest::new("x").year(Some("2022")).preferred_year(2025),
            2022
        );
        assert_eq!(
            EnergyRequest::new("x").year(Some("22")).preferred_year(2025),
            2024
        );
    }

    #[test]
    fn test_falls_back_three_years() {
        let ds = dataset();
        let lookup = ds
            .lookup(&EnergyRequest::new("은광여자고등학교").year(Some("2024")), 2025)
            .unwrap();
        assert_eq!(lookup.year_used, 2021);
        assert_eq!(lookup.values.electricity_kwh, "1234567");
        assert_eq!(lookup.values.water_m3, "5400");
        assert_eq!(lookup.values.gas_m3, "32000.5");
        assert_eq!(lookup.values.renewable_kwh, "");

        // 2021 is four years back from 2025, outside the window
        let err = ds
            .lookup(&EnergyRequest::new("은광여자고등학교").year(Some("2025")), 2026)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_newest_present_year_wins() {
        let lookup = dataset()
            .lookup(&EnergyRequest::new("대치초등학교"), 2024)
            .unwrap();
        assert_eq!(lookup.year_used, 2023);
        assert_eq!(lookup.values.electricity_kwh, "999");
    }

    #[test]
    fn test_no_usable_year_is_distinct_not_found() {
        let err = dataset()
            .lookup(&EnergyRequest::new("대치중학교"), 2025)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("no usable year"));

        let err = dataset()
            .lookup(&EnergyRequest::new("없는학교"), 2025)
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_level_narrows_substring_candidates() {
        let lookup = dataset()
            .lookup(
                &EnergyRequest::new("대치").level(Some("중등")).year(Some("2023")),
                2025,
            )
            .map(|l| l.school.name);
        // 대치중학교 has no usage rows at all
        assert!(lookup.is_err());

        let ds = dataset();
        let picked = ds.find(&KeyQuery::new("대치").level(Some("중등"))).unwrap();
        assert_eq!(picked.0.name, "대치중학교");
        assert!(!picked.2);
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let err = dataset().lookup(&EnergyRequest::new("  "), 2025).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
