// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Report export: the summary document rendered directly to PDF, and the
//! headless-browser capture of the overview page.

pub mod capture;
pub mod chrome;
pub mod pdf;

pub use capture::{CaptureError, CaptureFormat, CaptureRequest, CaptureSettings, Capturer};
pub use chrome::ChromeLauncher;
pub use pdf::{png_to_pdf, render_report_pdf};

use crate::carbon::{calculate, Emission};
use crate::practices::CategoryProgress;
use crate::session::SessionSnapshot;
use crate::{EcoError, Result};
use chrono::NaiveDate;
use serde::Serialize;

pub const REPORT_TITLE: &str = "탄소중립 실천현황";

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub school_name: String,
    pub student_count: String,
    pub staff_count: String,
    pub school_area_m2: String,
    pub emission: Emission,
    pub progress: Vec<CategoryProgress>,
}

impl ReportSummary {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Result<Self> {
        let step1 = snapshot.step1.as_ref().ok_or_else(|| {
            EcoError::Validation(
                "no school information; complete step 1 before exporting".to_string(),
            )
        })?;
        let basic = &step1.basic;
        Ok(Self {
            school_name: basic.school_name.resolved().to_string(),
            student_count: basic.student_count.resolved().to_string(),
            staff_count: basic.staff_count.resolved().to_string(),
            school_area_m2: basic.school_area_m2.resolved().to_string(),
            emission: calculate(&step1.emission_input()),
            progress: snapshot.step2.category_progress(),
        })
    }

    /// Total rounded to whole kilograms; `None` when nothing was entered.
    pub fn total_rounded(&self) -> Option<i64> {
        self.emission.total_kg().map(|t| t.round() as i64)
    }
}

/// Summary shape returned by the emissions endpoint and `calc` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionView {
    pub empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electric_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pine_forest_fields: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trees_saved_by_setpoint: Option<i64>,
}

impl From<&Emission> for EmissionView {
    fn from(emission: &Emission) -> Self {
        match emission.breakdown() {
            None => Self {
                empty: true,
                electric_kg: None,
                gas_kg: None,
                water_kg: None,
                total_kg: None,
                pine_forest_fields: None,
                trees_saved_by_setpoint: None,
            },
            Some(b) => Self {
                empty: false,
                electric_kg: Some(b.electric_kg),
                gas_kg: Some(b.gas_kg),
                water_kg: Some(b.water_kg),
                total_kg: Some(b.total_kg),
                pine_forest_fields: Some(b.pine_forest_fields()),
                trees_saved_by_setpoint: Some(b.trees_saved_by_setpoint()),
            },
        }
    }
}

/// `탄소중립_실천현황_{school}_{YYYY-MM-DD}.pdf` with path-hostile characters
/// replaced.
pub fn report_file_name(school: &str, date: NaiveDate) -> String {
    let school = school.trim();
    let school = if school.is_empty() { "학교" } else { school };
    let safe: String = school
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();
    format!("탄소중립_실천현황_{}_{}.pdf", safe, date.format("%Y-%m-%d"))
}

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{FieldValue, Step1Form};

    #[test]
    fn test_file_name_is_sanitized() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(
            report_file_name("대치/초등:학교?", date),
            "탄소중립_실천현황_대치_초등_학교__2025-03-09.pdf"
        );
        assert_eq!(
            report_file_name("  ", date),
            "탄소중립_실천현황_학교_2025-03-09.pdf"
        );
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(-1234567), "-1,234,567");
    }

    #[test]
    fn test_summary_requires_step1() {
        let err = ReportSummary::from_snapshot(&SessionSnapshot::default()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn test_summary_uses_resolved_values() {
        let mut form = Step1Form::default();
        form.basic.school_name = FieldValue::entered("대치초등학교");
        form.basic.staff_count.set_hint("56");
        form.emissions.electricity_kwh = FieldValue::entered("1000");
        let mut snapshot = SessionSnapshot {
            step1: Some(form),
            ..SessionSnapshot::default()
        };
        snapshot.step2.set("env-01", true).unwrap();

        let summary = ReportSummary::from_snapshot(&snapshot).unwrap();
        assert_eq!(summary.staff_count, "56");
        assert_eq!(summary.total_rounded(), Some(478));
        assert_eq!(summary.progress[2].selected, 1);
    }

    #[test]
    fn test_emission_view() {
        let view = EmissionView::from(&Emission::Empty);
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            serde_json::json!({"empty": true})
        );
    }
}
