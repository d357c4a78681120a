// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! schoolinfo.go.kr OpenAPI: list queries per (apiType, year, district,
//! level), a blocking HTTP client, a file cache and the reconciler that turns
//! several tables into one school's basic statistics.

pub mod cache;
pub mod client;
pub mod reconcile;

pub use cache::CachedSource;
pub use client::SchoolInfoClient;
pub use reconcile::{BasicInfo, BasicInfoRequest, Reconciler};

use crate::codes::SIDO_CODE_SEOUL;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// One upstream table row, keys exactly as the API sends them.
pub type Row = Map<String, Value>;

pub const NAME_FIELD: &str = "SCHUL_NM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ApiType {
    /// Class and student counts.
    StudentClass,
    /// School site area (`COL_3`).
    Area,
    /// Staff total (`COL_S`).
    StaffTotal,
    /// Staff breakdown (`SUM_1`..`SUM_3`).
    StaffParts,
}

impl ApiType {
    pub fn code(self) -> &'static str {
        match self {
            Self::StudentClass => "62",
            Self::Area => "16",
            Self::StaffTotal => "22",
            Self::StaffParts => "68",
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListQuery {
    pub api_type: ApiType,
    pub pban_yr: i32,
    pub sgg_code: String,
    pub kind_code: String,
}

impl ListQuery {
    pub fn new(api_type: ApiType, pban_yr: i32, sgg_code: &str, kind_code: &str) -> Self {
        Self {
            api_type,
            pban_yr,
            sgg_code: sgg_code.to_string(),
            kind_code: kind_code.to_string(),
        }
    }

    pub fn sido_code(&self) -> &'static str {
        SIDO_CODE_SEOUL
    }

    /// Cache identity: `{apiType}__{year}__{sggCode}__{kindCode}.json`.
    pub fn cache_file_name(&self) -> String {
        format!(
            "{}__{}__{}__{}.json",
            self.api_type.code(),
            self.pban_yr,
            self.sgg_code,
            self.kind_code
        )
    }
}

/// Result of one upstream list call. Failures stay distinguishable from
/// genuinely empty years so fallback loops can report them.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Rows(Vec<Row>),
    Empty,
    UpstreamFailed {
        /// HTTP status when the upstream answered at all.
        status: Option<u16>,
        cause: String,
    },
}

impl FetchOutcome {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        if rows.is_empty() {
            Self::Empty
        } else {
            Self::Rows(rows)
        }
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Rows(rows) => rows,
            _ => &[],
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::UpstreamFailed { .. })
    }
}

pub trait SchoolInfoSource: Send + Sync {
    fn fetch_list(&self, query: &ListQuery) -> FetchOutcome;
}

impl<T: SchoolInfoSource + ?Sized> SchoolInfoSource for Box<T> {
    fn fetch_list(&self, query: &ListQuery) -> FetchOutcome {
        (**self).fetch_list(query)
    }
}

impl<T: SchoolInfoSource + ?Sized> SchoolInfoSource for Arc<T> {
    fn fetch_list(&self, query: &ListQuery) -> FetchOutcome {
        (**self).fetch_list(query)
    }
}

impl<T: SchoolInfoSource + ?Sized> SchoolInfoSource for &T {
    fn fetch_list(&self, query: &ListQuery) -> FetchOutcome {
        (**self).fetch_list(query)
    }
}

pub fn row_name(row: &Row) -> String {
    crate::normalize::value_text(row.get(NAME_FIELD))
}

pub fn row_text(row: &Row, key: &str) -> String {
    crate::normalize::value_text(row.get(key))
}

/// Exact name first, then the first row containing the name.
pub fn find_row_by_name<'a>(rows: &'a [Row], name: &str) -> Option<&'a Row> {
    rows.iter()
        .find(|r| row_name(r) == name)
        .or_else(|| rows.iter().find(|r| row_name(r).contains(name)))
}

pub fn find_row_exact<'a>(rows: &'a [Row], name: &str) -> Option<&'a Row> {
    rows.iter().find(|r| row_name(r) == name)
}

/// Candidate fallback years, newest first: `[start, start-1, ...]`.
pub fn candidate_years(start: i32, count: usize) -> Vec<i32> {
    (0..count as i32).map(|offset| start - offset).collect()
}


#[cfg(test)]
mod tests {
    use super::testing::named;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_file_name() {
        let q = ListQuery::new(ApiType::StudentClass, 2025, "11680", "02");
        assert_eq!(q.cache_file_name(), "62__2025__11680__02.json");
        assert_eq!(q.sido_code(), "11");
    }

    #[test]
    fn test_find_row_prefers_exact_name() {
        let rows = vec![
            named("서울대치초등학교", json!({})),
            named("대치초등학교", json!({"COL_SUM": "20"})),
        ];
        let row = find_row_by_name(&rows, "대치초등학교").unwrap();
        assert_eq!(row_text(row, "COL_SUM"), "20");

        let partial = find_row_by_name(&rows, "서울대치").unwrap();
        assert_eq!(row_name(partial), "서울대치초등학교");
        assert!(find_row_exact(&rows, "서울대치").is_none());
    }

    #[test]
    fn test_candidate_years() {
        assert_eq!(candidate_years(2025, 3), vec![2025, 2024, 2023]);
    }

    #[test]
    fn test_outcome_from_rows() {
        assert_eq!(FetchOutcome::from_rows(Vec::new()), FetchOutcome::Empty);
        assert!(FetchOutcome::UpstreamFailed {
            status: None,
            cause: "timeout".into()
        }
        .is_failure());
    }
}
