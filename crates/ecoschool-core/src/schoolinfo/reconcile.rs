// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Assembles one school's basic statistics from several upstream tables,
//! walking back through announcement years until data shows up.

use super::{
    candidate_years, find_row_by_name, find_row_exact, row_name, row_text, ApiType, FetchOutcome,
    ListQuery, Row, SchoolInfoSource,
};
use crate::codes::{district_code, SchoolLevel};
use crate::normalize::{normalize_area, normalize_count, number_loose};
use crate::{EcoError, Result};
use log::{debug, info, warn};
use serde::Serialize;

pub const YEAR_WINDOW: usize = 3;
pub const AREA_KEY: &str = "COL_3";
pub const STAFF_TOTAL_KEY: &str = "COL_S";
pub const STAFF_PART_KEYS: [&str; 3] = ["SUM_1", "SUM_2", "SUM_3"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicInfoRequest {
    pub name: String,
    pub region: String,
    pub level: String,
    /// Overrides the current year as the newest year tried.
    pub pban_yr: Option<i32>,
}

impl BasicInfoRequest {
    pub fn new(name: &str, region: &str, level: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            region: region.trim().to_string(),
            level: level.trim().to_string(),
            pban_yr: None,
        }
    }

    pub fn with_year(mut self, pban_yr: Option<i32>) -> Self {
        self.pban_yr = pban_yr;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AttemptOutcome {
    Matched,
    NoMatch,
    Empty,
    Failed { cause: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearAttempt {
    pub year: i32,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Per-year record of a fallback walk.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FallbackTrace {
    pub attempts: Vec<YearAttempt>,
}

impl FallbackTrace {
    fn push(&mut self, year: i32, outcome: AttemptOutcome) {
        self.attempts.push(YearAttempt { year, outcome });
    }

    pub fn years_tried(&self) -> usize {
        self.attempts.len()
    }

    pub fn failed_years(&self) -> Vec<i32> {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, AttemptOutcome::Failed { .. }))
            .map(|a| a.year)
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        !self.attempts.is_empty() && self.failed_years().len() == self.attempts.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub api_type: String,
    pub pban_yr: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiTypeRef {
    #[serde(rename = "apiType")]
    pub api_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffSource {
    pub pban_yr: i32,
    pub total: ApiTypeRef,
    pub parts: ApiTypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffKeys {
    pub total: &'static str,
    pub parts: [&'static str; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub class_key: &'static str,
    pub student_key: &'static str,
    pub class_count: String,
    pub student_count: String,
    pub area_key: &'static str,
    pub school_area_m2: String,
    pub area_source: Option<SourceRef>,
    pub staff_count: String,
    pub staff_keys: StaffKeys,
    pub staff_source: Option<StaffSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    /// The matched student/class row, keys as upstream sent them.
    pub row: Row,
    pub pban_yr: i32,
    pub counts: Counts,
    pub school_name: String,
    pub school_code: String,
    pub office_name: String,
    pub tel: String,
    pub address: String,
    pub region: String,
    pub level: String,
    pub trace: FallbackTrace,
}

/// Column names for class and student totals depend on the school level.
pub fn count_keys(level: SchoolLevel) -> (&'static str, &'static str) {
    if level.uses_grand_total_columns() {
        ("COL_SUM_4", "COL_SUM_FGR4")
    } else {
        ("COL_SUM", "COL_FGR_SUM")
    }
}

/// `1234.0` -> `"1234"`, `12.5` -> `"12.5"`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Staff headcount: total plus the three breakdown columns.
pub fn staff_sum(total_row: Option<&Row>, parts_row: Option<&Row>) -> f64 {
    let total = total_row
        .map(|r| number_loose(&row_text(r, STAFF_TOTAL_KEY)))
        .unwrap_or(0.0);
    let parts: f64 = parts_row
        .map(|r| {
            STAFF_PART_KEYS
                .iter()
                .map(|key| number_loose(&row_text(r, key)))
                .sum()
        })
        .unwrap_or(0.0);
    total + parts
}

pub struct Reconciler<S> {
    source: S,
}

struct Target<'a> {
    name: &'a str,
    sgg_code: &'static str,
    level: SchoolLevel,
}

impl<'a> Target<'a> {
    fn query(&self, api_type: ApiType, year: i32) -> ListQuery {
        ListQuery::new(api_type, year, self.sgg_code, self.level.kind_code())
    }
}

impl<S: SchoolInfoSource> Reconciler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Looks the school up as of `current_year` unless the request names a year.
    pub fn basic_info(&self, request: &BasicInfoRequest, current_year: i32) -> Result<BasicInfo> {
        if request.name.is_empty() {
            return Err(EcoError::Validation("name (school name) is required".into()));
        }
        if request.region.is_empty() {
            return Err(EcoError::Validation("region (district) is required".into()));
        }
        if request.level.is_empty() {
            return Err(EcoError::Validation("level (school level) is required".into()));
        }
        let sgg_code = district_code(&request.region).ok_or_else(|| {
            EcoError::Validation(format!(
                "unsupported region: {} (only the 25 Seoul districts are supported)",
                request.region
            ))
        })?;
        let level: SchoolLevel = request
            .level
            .parse()
            .map_err(|e: crate::codes::UnknownLevel| EcoError::Validation(e.to_string()))?;

        let target = Target {
            name: &request.name,
            sgg_code,
            level,
        };
        let start_year = request.pban_yr.unwrap_or(current_year);

        let (matched_year, matched, trace) = self.find_student_row(&target, start_year)?;

        let (class_key, student_key) = count_keys(level);
        let (school_area_m2, area_source) = self.find_area(&target, matched_year, &matched);
        let (staff_count, staff_source) = self.find_staff(&target, matched_year);

        info!(
            "schoolinfo reconciled — name={} region={} level={} pbanYr={} area={} staff={}",
            target.name,
            request.region,
            level,
            matched_year,
            school_area_m2,
            staff_count
        );

        Ok(BasicInfo {
            pban_yr: matched_year,
            counts: Counts {
                class_key,
                student_key,
                class_count: normalize_count(&row_text(&matched, class_key)),
                student_count: normalize_count(&row_text(&matched, student_key)),
                area_key: AREA_KEY,
                school_area_m2,
                area_source,
                staff_count,
                staff_keys: StaffKeys {
                    total: STAFF_TOTAL_KEY,
                    parts: STAFF_PART_KEYS,
                },
                staff_source,
            },
            school_name: row_name(&matched),
            school_code: row_text(&matched, "SCHUL_CODE"),
            office_name: row_text(&matched, "ATPT_OFCDC_ORG_NM"),
            tel: row_text(&matched, "USER_TELNO"),
            address: row_text(&matched, "SCHUL_RDNDA"),
            region: request.region.clone(),
            level: level.label().to_string(),
            trace,
            row: matched,
        })
    }

    fn find_student_row(
        &self,
        target: &Target<'_>,
        start_year: i32,
    ) -> Result<(i32, Row, FallbackTrace)> {
        let mut trace = FallbackTrace::default();

        for year in candidate_years(start_year, YEAR_WINDOW) {
            match self
                .source
                .fetch_list(&target.query(ApiType::StudentClass, year))
            {
                FetchOutcome::Rows(rows) => match find_row_by_name(&rows, target.name) {
                    Some(row) => {
                        trace.push(year, AttemptOutcome::Matched);
                        return Ok((year, row.clone(), trace));
                    }
                    None => trace.push(year, AttemptOutcome::NoMatch),
                },
                FetchOutcome::Empty => trace.push(year, AttemptOutcome::Empty),
                FetchOutcome::UpstreamFailed { cause, .. } => {
                    warn!(
                        "Student/class lookup failed for a year; trying older — name={} pbanYr={} cause={}",
                        target.name, year, cause
                    );
                    trace.push(year, AttemptOutcome::Failed { cause });
                }
            }
        }

        if trace.all_failed() {
            return Err(EcoError::Upstream(format!(
                "schoolinfo OpenAPI unreachable for all {} candidate years",
                trace.years_tried()
            )));
        }
        let failed = trace.failed_years();
        let mut message = format!(
            "school not found in schoolinfo OpenAPI results (searched the last {} years)",
            trace.years_tried()
        );
        if !failed.is_empty() {
            message.push_str(&format!("; upstream failed for {:?}", failed));
        }
        Err(EcoError::NotFound(message))
    }

    fn find_area(
        &self,
        target: &Target<'_>,
        matched_year: i32,
        matched: &Row,
    ) -> (String, Option<SourceRef>) {
        for year in candidate_years(matched_year, YEAR_WINDOW) {
            let outcome = self.source.fetch_list(&target.query(ApiType::Area, year));
            let Some(row) = find_row_by_name(outcome.rows(), target.name) else {
                continue;
            };
            let area = normalize_area(&row_text(row, AREA_KEY));
            if !area.is_empty() {
                return (
                    area,
                    Some(SourceRef {
                        api_type: ApiType::Area.code().to_string(),
                        pban_yr: year,
                    }),
                );
            }
        }

        let fallback = normalize_area(&row_text(matched, AREA_KEY));
        if fallback.is_empty() {
            debug!("No school area found — name={}", target.name);
            return (String::new(), None);
        }
        (
            fallback,
            Some(SourceRef {
                api_type: ApiType::StudentClass.code().to_string(),
                pban_yr: matched_year,
            }),
        )
    }

    fn find_staff(&self, target: &Target<'_>, matched_year: i32) -> (String, Option<StaffSource>) {
        for year in candidate_years(matched_year, YEAR_WINDOW) {
            let totals = self
                .source
                .fetch_list(&target.query(ApiType::StaffTotal, year));
            let parts = self
                .source
                .fetch_list(&target.query(ApiType::StaffParts, year));

            let sum = staff_sum(
                find_row_exact(totals.rows(), target.name),
                find_row_exact(parts.rows(), target.name),
            );
            if sum > 0.0 {
                return (
                    format_number(sum),
                    Some(StaffSource {
                        pban_yr: year,
                        total: ApiTypeRef {
                            api_type: ApiType::StaffTotal.code().to_string(),
                        },
                        parts: ApiTypeRef {
                            api_type: ApiType::StaffParts.code().to_string(),
                        },
                    }),
                );
            }
        }
        debug!("No staff count found — name={}", target.name);
        (String::new(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schoolinfo::testing::{named, FakeSource};
    use crate::ErrorKind;
    use serde_json::json;

    const NOW: i32 = 2025;

    fn request() -> BasicInfoRequest {
        BasicInfoRequest::new("대치초등학교", "강남구", "초등")
    }

    fn failed() -> FetchOutcome {
        FetchOutcome::UpstreamFailed {
            status: None,
            cause: "timeout".into(),
        }
    }

    #[test]
    fn test_unknown_region_fails_before_any_call() {
        let fake = FakeSource::default();
        let reconciler = Reconciler::new(&fake);
        let err = reconciler
            .basic_info(&BasicInfoRequest::new("대치초등학교", "수원시", "초등"), NOW)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = reconciler
            .basic_info(&BasicInfoRequest::new("대치초등학교", "강남구", "대학"), NOW)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(fake.call_count(), 0);
    }

    #[test]
    fn test_oldest_year_match_is_reported() {
        let fake = FakeSource::default().with(
            ApiType::StudentClass,
            2023,
            FetchOutcome::Rows(vec![named(
                "대치초등학교",
                json!({"COL_SUM": "40", "COL_FGR_SUM": "1,020(3)", "SCHUL_CODE": "B000012345"}),
            )]),
        );
        let info = Reconciler::new(&fake).basic_info(&request(), NOW).unwrap();

        assert_eq!(info.pban_yr, 2023);
        assert_eq!(info.counts.class_count, "40");
        assert_eq!(info.counts.student_count, "1023");
        assert_eq!(info.school_code, "B000012345");
        assert_eq!(info.trace.years_tried(), 3);
        assert_eq!(info.trace.attempts[0].outcome, AttemptOutcome::Empty);
    }

    #[test]
    fn test_special_schools_use_grand_total_columns() {
        let fake = FakeSource::default().with(
            ApiType::StudentClass,
            NOW,
            FetchOutcome::Rows(vec![named(
                "서울맹학교",
                json!({"COL_SUM": "1", "COL_SUM_4": "12", "COL_SUM_FGR4": "80"}),
            )]),
        );
        let info = Reconciler::new(&fake)
            .basic_info(&BasicInfoRequest::new("서울맹학교", "종로구", "특수"), NOW)
            .unwrap();
        assert_eq!(info.counts.class_key, "COL_SUM_4");
        assert_eq!(info.counts.class_count, "12");
        assert_eq!(info.counts.student_count, "80");
    }

    #[test]
    fn test_not_found_reports_years_tried() {
        let fake = FakeSource::default().with(
            ApiType::StudentClass,
            NOW,
            FetchOutcome::Rows(vec![named("도곡초등학교", json!({}))]),
        );
        let err = Reconciler::new(&fake)
            .basic_info(&request(), NOW)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("3 years"), "{}", err);
    }

    #[test]
    fn test_all_failed_years_surface_as_upstream_error() {
        let fake = FakeSource::default()
            .with(ApiType::StudentClass, 2025, failed())
            .with(ApiType::StudentClass, 2024, failed())
            .with(ApiType::StudentClass, 2023, failed());
        let err = Reconciler::new(&fake)
            .basic_info(&request(), NOW)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_partial_failure_is_still_not_found() {
        let fake = FakeSource::default().with(ApiType::StudentClass, 2024, failed());
        let err = Reconciler::new(&fake)
            .basic_info(&request(), NOW)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("2024"));
    }

    #[test]
    fn test_area_falls_back_to_student_row() {
        let fake = FakeSource::default().with(
            ApiType::StudentClass,
            NOW,
            FetchOutcome::Rows(vec![named("대치초등학교", json!({"COL_3": "12,400.5"}))]),
        );
        let info = Reconciler::new(&fake).basic_info(&request(), NOW).unwrap();
        assert_eq!(info.counts.school_area_m2, "12400.5");
        assert_eq!(
            info.counts.area_source,
            Some(SourceRef {
                api_type: "62".into(),
                pban_yr: NOW
            })
        );
    }

    #[test]
    fn test_area_is_not_summed_like_counts() {
        let fake = FakeSource::default().with(
            ApiType::StudentClass,
            NOW,
            FetchOutcome::Rows(vec![named("대치초등학교", json!({"COL_3": "1,200(30)"}))]),
        );
        let info = Reconciler::new(&fake).basic_info(&request(), NOW).unwrap();
        assert_eq!(info.counts.school_area_m2, "1200");
    }

    #[test]
    fn test_area_and_staff_from_dedicated_tables() {
        let fake = FakeSource::default()
            .with(
                ApiType::StudentClass,
                NOW,
                FetchOutcome::Rows(vec![named("대치초등학교", json!({"COL_3": "1"}))]),
            )
            .with(
                ApiType::Area,
                2024,
                FetchOutcome::Rows(vec![named("대치초등학교", json!({"COL_3": "15,000"}))]),
            )
            .with(
                ApiType::StaffTotal,
                2024,
                FetchOutcome::Rows(vec![named("대치초등학교", json!({"COL_S": "50"}))]),
            )
            .with(
                ApiType::StaffParts,
                2024,
                FetchOutcome::Rows(vec![named(
                    "대치초등학교",
                    json!({"SUM_1": "3", "SUM_2": "2(1)", "SUM_3": null}),
                )]),
            );
        let info = Reconciler::new(&fake).basic_info(&request(), NOW).unwrap();

        assert_eq!(info.counts.school_area_m2, "15000");
        assert_eq!(info.counts.area_source.as_ref().unwrap().pban_yr, 2024);
        assert_eq!(info.counts.staff_count, "56");
        assert_eq!(info.counts.staff_source.as_ref().unwrap().pban_yr, 2024);
    }

    #[test]
    fn test_staff_requires_exact_name() {
        let fake = FakeSource::default()
            .with(
                ApiType::StudentClass,
                NOW,
                FetchOutcome::Rows(vec![named("대치초등학교", json!({}))]),
            )
            .with(
                ApiType::StaffTotal,
                NOW,
                FetchOutcome::Rows(vec![named("서울대치초등학교", json!({"COL_S": "50"}))]),
            );
        let info = Reconciler::new(&fake).basic_info(&request(), NOW).unwrap();
        assert_eq!(info.counts.staff_count, "");
        assert!(info.counts.staff_source.is_none());
    }

    #[test]
    fn test_year_override_moves_window() {
        let fake = FakeSource::default().with(
            ApiType::StudentClass,
            2019,
            FetchOutcome::Rows(vec![named("대치초등학교", json!({}))]),
        );
        let info = Reconciler::new(&fake)
            .basic_info(&request().with_year(Some(2020)), NOW)
            .unwrap();
        assert_eq!(info.pban_yr, 2019);
    }

    #[test]
    fn test_basic_info_serializes_camel_case() {
        let fake = FakeSource::default().with(
            ApiType::StudentClass,
            NOW,
            FetchOutcome::Rows(vec![named("대치초등학교", json!({}))]),
        );
        let info = Reconciler::new(&fake).basic_info(&request(), NOW).unwrap();
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["pbanYr"], json!(NOW));
        assert_eq!(value["counts"]["areaKey"], json!("COL_3"));
        assert_eq!(value["counts"]["staffKeys"]["parts"][2], json!("SUM_3"));
        assert_eq!(value["schoolName"], json!("대치초등학교"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(56.0), "56");
        assert_eq!(format_number(12.5), "12.5");
    }
}
