// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use ecoschool_core::carbon::{calculate, Emission, EmissionInput};
use ecoschool_core::export::{render_report_pdf, ReportSummary};
use ecoschool_core::form::{FieldValue, Step1Form, Wizard, WizardStep};
use ecoschool_core::normalize::{normalize_count, normalize_number};
use ecoschool_core::practices::{PracticeSelection, CATALOG};
use ecoschool_core::session::{SessionSnapshot, SessionStore, STEP1_KEY, STEP2_KEY};
use ecoschool_core::{EcoError, ErrorKind};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn test_number_normalization_rules() {
    assert_eq!(normalize_number("14(1)"), "15");
    assert_eq!(normalize_number("1,234명"), "1234");
    assert_eq!(normalize_number("약 3,200.5"), "3200.5");
    assert_eq!(normalize_number("없음"), "");
    assert_eq!(normalize_number("   "), "");
    assert_eq!(normalize_count("없음"), "없음");
}

#[test]
fn test_calculator_reference_values() {
    assert_eq!(calculate(&EmissionInput::default()), Emission::Empty);

    let electric = calculate(&EmissionInput::new("1000", "", ""));
    assert!(close(electric.total_kg().unwrap(), 478.1));

    let gas = calculate(&EmissionInput::new("", "100", ""));
    assert!(close(gas.total_kg().unwrap(), 217.6));

    // zero typed in is an estimate, not "nothing entered"
    let zero = calculate(&EmissionInput::new("0", "", ""));
    assert_eq!(zero.total_kg(), Some(0.0));
}

#[test]
fn test_toggle_round_trip_through_session_file() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let store = SessionStore::new(temp.path().join("session").join("session.json"));

    let mut snapshot = store.load()?;
    assert_eq!(snapshot, SessionSnapshot::default());

    snapshot.step2.set("culture-02", true)?;
    store.save(&snapshot)?;
    let before = store.load()?;

    let mut toggled = before.clone();
    toggled.step2.toggle("env-05")?;
    store.save(&toggled)?;
    toggled = store.load()?;
    assert!(toggled.step2.is_adopted("env-05"));

    toggled.step2.toggle("env-05")?;
    store.save(&toggled)?;
    assert_eq!(store.load()?, before);

    store.clear()?;
    assert!(!store.path().exists());
    Ok(())
}

#[test]
fn test_every_catalog_item_toggles() {
    let mut selection = PracticeSelection::new();
    for practice in CATALOG.iter() {
        assert!(selection.toggle(practice.id).unwrap());
    }
    let progress = selection.category_progress();
    assert!(progress.iter().all(|p| p.percent == 100));
    assert_eq!(selection.total_selected(), CATALOG.len());
}

#[test]
fn test_wizard_gates_on_step_one() {
    let mut wizard = Wizard::default();
    let mut snapshot = SessionSnapshot::default();

    match wizard.advance(&snapshot) {
        Err(EcoError::IncompleteStep { missing }) => {
            assert_eq!(missing.len(), 8);
            assert_eq!(missing[0], "학교명");
        }
        other => panic!("expected incomplete step, got {:?}", other),
    }

    let mut form = Step1Form::default();
    for field in [
        &mut form.basic.school_name,
        &mut form.basic.class_count,
        &mut form.basic.student_count,
        &mut form.basic.staff_count,
        &mut form.basic.school_area_m2,
        &mut form.emissions.electricity_kwh,
        &mut form.emissions.gas_m3,
    ] {
        *field = FieldValue::entered("1");
    }
    // a hint counts as filled
    form.emissions.water_m3.set_hint("9876");
    snapshot.step1 = Some(form);

    assert_eq!(wizard.advance(&snapshot).unwrap(), WizardStep::Practices);
    assert_eq!(wizard.advance(&snapshot).unwrap(), WizardStep::Overview);
    assert_eq!(wizard.advance(&snapshot).unwrap(), WizardStep::Download);
    assert_eq!(wizard.advance(&snapshot).unwrap(), WizardStep::Download);
}

#[test]
fn test_report_from_browser_storage() {
    let mut storage = ecoschool_core::session::StorageMap::new();
    storage.insert(
        STEP1_KEY.to_string(),
        r#"{"basic": {"schoolName": "대치초등학교", "studentCount": "1023"},
            "emissions": {"electricWon": "1000", "gasWon": "100"}}"#
            .to_string(),
    );
    storage.insert(STEP2_KEY.to_string(), r#"{"daily-01": true}"#.to_string());

    let snapshot = SessionSnapshot::from_storage(&storage);
    let summary = ReportSummary::from_snapshot(&snapshot).unwrap();
    assert_eq!(summary.school_name, "대치초등학교");
    assert_eq!(summary.total_rounded(), Some(696));
    assert_eq!(summary.progress[0].selected, 1);

    let pdf = render_report_pdf(&summary, None).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[test]
fn test_report_needs_school_information() {
    let err = ReportSummary::from_snapshot(&SessionSnapshot::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
