// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Step 1 form state, auto-fill hints and the four-step wizard gate.

use crate::carbon::EmissionInput;
use crate::energy::EnergyLookup;
use crate::schoolinfo::BasicInfo;
use crate::session::SessionSnapshot;
use crate::{EcoError, Result};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A user-entered value plus an auto-filled suggestion shown as placeholder.
/// Stored as a bare string while there is no hint, so browser-written
/// sessions load unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredField", into = "StoredField")]
pub struct FieldValue {
    pub entered: String,
    pub hint: String,
}

impl FieldValue {
    pub fn entered(value: &str) -> Self {
        Self {
            entered: value.to_string(),
            hint: String::new(),
        }
    }

    /// Entered text wins whenever it is non-blank.
    pub fn resolved(&self) -> &str {
        if self.entered.trim().is_empty() {
            self.hint.trim()
        } else {
            self.entered.trim()
        }
    }

    pub fn is_blank(&self) -> bool {
        self.resolved().is_empty()
    }

    pub fn set_hint(&mut self, hint: &str) {
        self.hint = hint.trim().to_string();
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredField {
    Plain(String),
    Split {
        #[serde(default)]
        value: String,
        #[serde(default)]
        hint: String,
    },
}

impl From<StoredField> for FieldValue {
    fn from(stored: StoredField) -> Self {
        match stored {
            StoredField::Plain(entered) => Self {
                entered,
                hint: String::new(),
            },
            StoredField::Split { value, hint } => Self {
                entered: value,
                hint,
            },
        }
    }
}

impl From<FieldValue> for StoredField {
    fn from(field: FieldValue) -> Self {
        if field.hint.is_empty() {
            StoredField::Plain(field.entered)
        } else {
            StoredField::Split {
                value: field.entered,
                hint: field.hint,
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasicForm {
    pub school_name: FieldValue,
    pub class_count: FieldValue,
    pub student_count: FieldValue,
    pub staff_count: FieldValue,
    pub school_area_m2: FieldValue,
    pub cooling_temp_c: FieldValue,
    pub heating_temp_c: FieldValue,
    pub solar_annual_kwh: FieldValue,
}

/// Older sessions stored these under `*Won` names; the values were always
/// meter readings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmissionsForm {
    #[serde(alias = "electricWon")]
    pub electricity_kwh: FieldValue,
    #[serde(alias = "gasWon")]
    pub gas_m3: FieldValue,
    #[serde(alias = "waterWon")]
    pub water_m3: FieldValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step1Form {
    pub basic: BasicForm,
    pub emissions: EmissionsForm,
}

impl Step1Form {
    pub fn apply_basic_hints(&mut self, info: &BasicInfo) {
        let basic = &mut self.basic;
        basic.school_name.set_hint(&info.school_name);
        basic.class_count.set_hint(&info.counts.class_count);
        basic.student_count.set_hint(&info.counts.student_count);
        basic.staff_count.set_hint(&info.counts.staff_count);
        basic.school_area_m2.set_hint(&info.counts.school_area_m2);
    }

    /// Drops every auto-filled suggestion; entered values stay.
    pub fn clear_hints(&mut self) {
        let basic = &mut self.basic;
        for field in [
            &mut basic.school_name,
            &mut basic.class_count,
            &mut basic.student_count,
            &mut basic.staff_count,
            &mut basic.school_area_m2,
            &mut basic.cooling_temp_c,
            &mut basic.heating_temp_c,
            &mut basic.solar_annual_kwh,
            &mut self.emissions.electricity_kwh,
            &mut self.emissions.gas_m3,
            &mut self.emissions.water_m3,
        ] {
            field.hint.clear();
        }
    }

    pub fn apply_energy_hints(&mut self, energy: &EnergyLookup) {
        let values = &energy.values;
        self.emissions.electricity_kwh.set_hint(&values.electricity_kwh);
        self.emissions.gas_m3.set_hint(&values.gas_m3);
        self.emissions.water_m3.set_hint(&values.water_m3);
        self.basic.solar_annual_kwh.set_hint(&values.renewable_kwh);
    }

    fn required(&self) -> [(&'static str, &FieldValue); 8] {
        [
            ("학교명", &self.basic.school_name),
            ("학급 수", &self.basic.class_count),
            ("학생 수", &self.basic.student_count),
            ("교직원 수", &self.basic.staff_count),
            ("학교 면적", &self.basic.school_area_m2),
            ("전기 사용량", &self.emissions.electricity_kwh),
            ("가스 사용량", &self.emissions.gas_m3),
            ("물 사용량", &self.emissions.water_m3),
        ]
    }

    /// Labels of required fields that resolve to blank, in form order.
    pub fn missing_fields(&self) -> Vec<String> {
        self.required()
            .into_iter()
            .filter(|(_, field)| field.is_blank())
            .map(|(label, _)| label.to_string())
            .collect()
    }

    pub fn emission_input(&self) -> EmissionInput {
        EmissionInput::new(
            self.emissions.electricity_kwh.resolved(),
            self.emissions.gas_m3.resolved(),
            self.emissions.water_m3.resolved(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WizardStep {
    /// School information and utility usage.
    SchoolInfo = 1,
    Practices = 2,
    Overview = 3,
    Download = 4,
}

fn step_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(\d+)(/|$)").unwrap())
}

impl WizardStep {
    pub const COUNT: u8 = 4;

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::SchoolInfo),
            2 => Some(Self::Practices),
            3 => Some(Self::Overview),
            4 => Some(Self::Download),
            _ => None,
        }
    }

    /// `/3` or `/3/...` selects step 3; `/` and anything unrecognized is step 1.
    pub fn from_path(path: &str) -> Self {
        step_path_re()
            .captures(path)
            .and_then(|caps| caps[1].parse::<u8>().ok())
            .and_then(Self::from_number)
            .unwrap_or(Self::SchoolInfo)
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn path(self) -> String {
        format!("/{}", self.number())
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Width of the stepper bar: step n of N fills n/N, the last step 100.
    pub fn progress_percent(self) -> f64 {
        let n = Self::COUNT as f64;
        if self.is_terminal() {
            100.0
        } else {
            self.number() as f64 / n * 100.0
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wizard {
    step: WizardStep,
}

impl Default for Wizard {
    fn default() -> Self {
        Self {
            step: WizardStep::SchoolInfo,
        }
    }
}

impl Wizard {
    pub fn at(step: WizardStep) -> Self {
        Self { step }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    /// Moves forward one step. Leaving step 1 requires every required field;
    /// the last step stays put.
    pub fn advance(&mut self, snapshot: &SessionSnapshot) -> Result<WizardStep> {
        if self.step == WizardStep::SchoolInfo {
            let missing = match &snapshot.step1 {
                Some(form) => form.missing_fields(),
                None => Step1Form::default().missing_fields(),
            };
            if !missing.is_empty() {
                debug!("Step 1 incomplete — missing={}", missing.join(","));
                return Err(EcoError::IncompleteStep { missing });
            }
        }
        if let Some(next) = self.step.next() {
            self.step = next;
        }
        Ok(self.step)
    }

    /// Direct navigation (stepper click). No gating, as in the page header.
    pub fn jump(&mut self, step: WizardStep) {
        self.step = step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_form() -> Step1Form {
        let mut form = Step1Form::default();
        let b = &mut form.basic;
        b.school_name = FieldValue::entered("대치초등학교");
        b.class_count = FieldValue::entered("40");
        b.student_count = FieldValue::entered("1023");
        b.staff_count = FieldValue::entered("80");
        b.school_area_m2 = FieldValue::entered("15000");
        form.emissions.electricity_kwh = FieldValue::entered("1000");
        form.emissions.gas_m3 = FieldValue::entered("100");
        form.emissions.water_m3 = FieldValue::entered("0");
        form
    }

    #[test]
    fn test_entered_value_wins_over_hint() {
        let mut field = FieldValue::entered(" 12 ");
        field.set_hint("40");
        assert_eq!(field.resolved(), "12");
        field.entered.clear();
        assert_eq!(field.resolved(), "40");
    }

    #[test]
    fn test_hints_survive_reload_and_stay_replaceable() {
        let mut form = Step1Form::default();
        form.basic.student_count.set_hint("500");
        form.basic.class_count = FieldValue::entered("21");

        let json = serde_json::to_string(&form).unwrap();
        let mut reloaded: Step1Form = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded.basic.student_count.entered, "");
        assert_eq!(reloaded.basic.student_count.hint, "500");
        assert_eq!(reloaded.basic.class_count, FieldValue::entered("21"));

        // picking another school replaces the suggestion
        reloaded.basic.student_count.set_hint("900");
        assert_eq!(reloaded.basic.student_count.resolved(), "900");

        reloaded.clear_hints();
        assert!(reloaded.basic.student_count.is_blank());
        assert_eq!(reloaded.basic.class_count.resolved(), "21");
    }

    #[test]
    fn test_missing_fields_in_form_order() {
        let mut form = complete_form();
        form.basic.student_count = FieldValue::default();
        form.emissions.gas_m3 = FieldValue::entered("  ");
        assert_eq!(form.missing_fields(), vec!["학생 수", "가스 사용량"]);
    }

    #[test]
    fn test_hints_fill_missing_fields() {
        let mut form = complete_form();
        form.basic.staff_count = FieldValue::default();
        form.basic.staff_count.set_hint("56");
        assert!(form.missing_fields().is_empty());
    }

    #[test]
    fn test_from_path() {
        assert_eq!(WizardStep::from_path("/"), WizardStep::SchoolInfo);
        assert_eq!(WizardStep::from_path("/3"), WizardStep::Overview);
        assert_eq!(WizardStep::from_path("/2/extra"), WizardStep::Practices);
        assert_eq!(WizardStep::from_path("/9"), WizardStep::SchoolInfo);
        assert_eq!(WizardStep::from_path("/login"), WizardStep::SchoolInfo);
        assert_eq!(WizardStep::from_path("/34"), WizardStep::SchoolInfo);
    }

    #[test]
    fn test_advance_gates_step_one() {
        let mut wizard = Wizard::default();
        let err = wizard.advance(&SessionSnapshot::default()).unwrap_err();
        match err {
            EcoError::IncompleteStep { missing } => assert_eq!(missing.len(), 8),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(wizard.step(), WizardStep::SchoolInfo);

        let snapshot = SessionSnapshot {
            step1: Some(complete_form()),
            ..SessionSnapshot::default()
        };
        assert_eq!(wizard.advance(&snapshot).unwrap(), WizardStep::Practices);
        assert_eq!(
            wizard.advance(&SessionSnapshot::default()).unwrap(),
            WizardStep::Overview
        );
    }

    #[test]
    fn test_last_step_is_terminal() {
        let mut wizard = Wizard::at(WizardStep::Download);
        assert_eq!(
            wizard.advance(&SessionSnapshot::default()).unwrap(),
            WizardStep::Download
        );
        assert_eq!(WizardStep::Download.progress_percent(), 100.0);
        assert_eq!(WizardStep::Practices.progress_percent(), 50.0);
    }

    #[test]
    fn test_legacy_emission_keys_are_accepted() {
        let form: Step1Form = serde_json::from_str(
            r#"{"basic": {"schoolName": "대치초등학교"}, "emissions": {"electricWon": "1,000"}}"#,
        )
        .unwrap();
        assert_eq!(form.emissions.electricity_kwh.resolved(), "1,000");
        assert_eq!(form.emission_input().electricity_kwh, "1,000");
    }
}
