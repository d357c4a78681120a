// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Offline CSV export of every Seoul school: statistics pulled group by group
//! (district x level) through the file cache, energy from the local dataset.

use crate::codes::{SchoolLevel, SEOUL_DISTRICTS};
use crate::config::AppConfig;
use crate::directory::SchoolDirectory;
use crate::energy::{energy_years, EnergyDataset, EnergyRecord, EnergyValues};
use crate::normalize::{normalize_area, normalize_count};
use crate::schoolinfo::reconcile::{count_keys, format_number, staff_sum, AREA_KEY};
use crate::schoolinfo::{
    candidate_years, row_name, row_text, ApiType, CachedSource, ListQuery, Row, SchoolInfoSource,
};
use crate::school_key::{Keyed, SchoolKey};
use crate::{EcoError, Result};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const OUTPUT_FILE: &str = "seoul-schools-export.csv";
pub const CSV_HEADER: [&str; 9] = [
    "학교명",
    "학교급",
    "지역구",
    "학생수",
    "교직원수",
    "학교 면적",
    "전기 사용량",
    "가스 사용량",
    "물 사용량",
];

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub output: PathBuf,
    pub concurrency: usize,
    /// Newest announcement year queried; two older years follow.
    pub year: i32,
    /// Produce an energy-only export when no API key is available.
    pub allow_empty_basic: bool,
    pub cache_dir: PathBuf,
    pub schools_path: PathBuf,
    pub energy_path: PathBuf,
}

impl BatchConfig {
    pub fn from_app(app: &AppConfig, year: i32) -> Self {
        Self {
            output: app.data_dir.join(OUTPUT_FILE),
            concurrency: DEFAULT_CONCURRENCY,
            year,
            allow_empty_basic: false,
            cache_dir: AppConfig::default_cache_dir(),
            schools_path: app.schools_path(),
            energy_path: app.energy_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub rows: usize,
    pub groups: usize,
    pub output: PathBuf,
}

/// One output line, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportRow {
    pub name: String,
    pub level: String,
    pub region: String,
    pub student_count: String,
    pub staff_count: String,
    pub school_area_m2: String,
    pub electricity_kwh: String,
    pub gas_m3: String,
    pub water_m3: String,
}

impl ExportRow {
    fn fields(&self) -> [&str; 9] {
        [
            self.name.as_str(),
            self.level.as_str(),
            self.region.as_str(),
            self.student_count.as_str(),
            self.staff_count.as_str(),
            self.school_area_m2.as_str(),
            self.electricity_kwh.as_str(),
            self.gas_m3.as_str(),
            self.water_m3.as_str(),
        ]
    }
}

/// Statistics collected for one (district, level) group. Keys never repeat
/// across groups, so merging is a plain extend.
#[derive(Debug, Default)]
struct GroupStats {
    students: HashMap<SchoolKey, String>,
    areas: HashMap<SchoolKey, String>,
    staff: HashMap<SchoolKey, String>,
}

impl GroupStats {
    fn merge(&mut self, other: GroupStats) {
        self.students.extend(other.students);
        self.areas.extend(other.areas);
        self.staff.extend(other.staff);
    }
}

#[derive(Debug, Clone, Copy)]
struct Group {
    region: &'static str,
    sgg_code: &'static str,
    level: SchoolLevel,
}

impl Group {
    fn key(&self, name: &str) -> SchoolKey {
        SchoolKey::new(name, self.level.label(), self.region)
    }

    fn query(&self, api_type: ApiType, year: i32) -> ListQuery {
        ListQuery::new(api_type, year, self.sgg_code, self.level.kind_code())
    }
}

fn all_groups() -> Vec<Group> {
    SEOUL_DISTRICTS
        .iter()
        .flat_map(|&(region, sgg_code)| {
            SchoolLevel::ALL.into_iter().map(move |level| Group {
                region,
                sgg_code,
                level,
            })
        })
        .collect()
}

fn named_rows(rows: &[Row]) -> impl Iterator<Item = (String, &Row)> {
    rows.iter().filter_map(|row| {
        let name = row_name(row);
        (!name.is_empty()).then_some((name, row))
    })
}

fn collect_group<S: SchoolInfoSource>(source: &S, group: Group, years: &[i32]) -> GroupStats {
    let mut stats = GroupStats::default();
    let (_, student_key) = count_keys(group.level);

    for &year in years {
        let students = source.fetch_list(&group.query(ApiType::StudentClass, year));
        for (name, row) in named_rows(students.rows()) {
            let count = normalize_count(&row_text(row, student_key));
            if !count.is_empty() {
                stats.students.entry(group.key(&name)).or_insert(count);
            }
        }

        let areas = source.fetch_list(&group.query(ApiType::Area, year));
        for (name, row) in named_rows(areas.rows()) {
            let area = normalize_area(&row_text(row, AREA_KEY));
            // text-only placeholders such as "미공시" stay out of the CSV
            if area.starts_with(|c: char| c.is_ascii_digit()) {
                stats.areas.entry(group.key(&name)).or_insert(area);
            }
        }

        let totals = source.fetch_list(&group.query(ApiType::StaffTotal, year));
        let parts = source.fetch_list(&group.query(ApiType::StaffParts, year));
        // last row per name wins within one table
        let totals: BTreeMap<String, &Row> = named_rows(totals.rows()).collect();
        let parts: BTreeMap<String, &Row> = named_rows(parts.rows()).collect();

        for name in totals.keys().chain(parts.keys()) {
            let key = group.key(name);
            if stats.staff.contains_key(&key) {
                continue;
            }
            let sum = staff_sum(totals.get(name).copied(), parts.get(name).copied());
            if sum > 0.0 {
                stats.staff.insert(key, format_number(sum));
            }
        }
    }

    debug!(
        "Group collected — region={} level={} students={} areas={} staff={}",
        group.region,
        group.level,
        stats.students.len(),
        stats.areas.len(),
        stats.staff.len()
    );
    stats
}

/// Usage values from the newest year in `[now-1 .. now-4]`; blanks if none.
pub fn pick_energy_values(record: Option<&EnergyRecord>, current_year: i32) -> EnergyValues {
    record
        .and_then(|r| {
            energy_years(current_year - 1)
                .into_iter()
                .find_map(|year| r.year(year))
        })
        .map(EnergyValues::from_year)
        .unwrap_or_default()
}

pub fn write_csv<W: Write>(rows: &[ExportRow], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for row in rows {
        wtr.write_record(row.fields())?;
    }
    wtr.flush()?;
    Ok(())
}

pub struct BatchExporter<S> {
    config: BatchConfig,
    source: Option<S>,
}

impl<S: SchoolInfoSource> BatchExporter<S> {
    /// `source` is `None` when no API key is configured.
    pub fn new(config: BatchConfig, source: Option<S>) -> Result<Self> {
        if source.is_none() && !config.allow_empty_basic {
            return Err(EcoError::Configuration(
                "SCHOOLINFO_API_KEY is not set; run with ALLOW_EMPTY_BASIC=1 for an energy-only export"
                    .to_string(),
            ));
        }
        Ok(Self { config, source })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    fn collect_stats(&self, source: &S, groups: &[Group]) -> Result<GroupStats> {
        let cached = CachedSource::new(source, &self.config.cache_dir)?;
        let years = candidate_years(self.config.year, 3);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency.max(1))
            .build()
            .map_err(|e| EcoError::Configuration(format!("failed to start worker pool: {}", e)))?;

        let per_group: Vec<GroupStats> = pool.install(|| {
            groups
                .par_iter()
                .map(|group| collect_group(&cached, *group, &years))
                .collect()
        });

        let mut merged = GroupStats::default();
        for stats in per_group {
            merged.merge(stats);
        }
        Ok(merged)
    }

    /// Builds the export rows without writing anything.
    pub fn build_rows(&self, current_year: i32) -> Result<(Vec<ExportRow>, usize)> {
        let directory = SchoolDirectory::load(&self.config.schools_path)?;
        let energy = EnergyDataset::load(&self.config.energy_path)?;
        let groups = all_groups();

        let stats = match &self.source {
            Some(source) => self.collect_stats(source, &groups)?,
            None => {
                warn!("No API key; exporting energy columns only");
                GroupStats::default()
            }
        };

        let energy_by_key: HashMap<SchoolKey, &EnergyRecord> = energy
            .records()
            .iter()
            .map(|r| (r.school_key(), r))
            .collect();

        let rows = directory
            .records()
            .iter()
            .filter_map(|record| {
                let key = record.school_key();
                if !key.is_complete() {
                    return None;
                }
                let values = pick_energy_values(energy_by_key.get(&key).copied(), current_year);
                Some(ExportRow {
                    student_count: stats.students.get(&key).cloned().unwrap_or_default(),
                    staff_count: stats.staff.get(&key).cloned().unwrap_or_default(),
                    school_area_m2: stats.areas.get(&key).cloned().unwrap_or_default(),
                    electricity_kwh: values.electricity_kwh,
                    gas_m3: values.gas_m3,
                    water_m3: values.water_m3,
                    name: key.name,
                    level: key.level,
                    region: key.region,
                })
            })
            .collect();

        Ok((rows, groups.len()))
    }

    pub fn run(&self, current_year: i32) -> Result<BatchReport> {
        let (rows, groups) = self.build_rows(current_year)?;

        if let Some(parent) = self.config.output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(&self.config.output)?;
        write_csv(&rows, file)?;

        info!(
            "CSV generated — output={} rows={} groups={}",
            self.config.output.display(),
            rows.len(),
            groups
        );
        Ok(BatchReport {
            rows: rows.len(),
            groups,
            output: self.config.output.clone(),
        })
    }
}
