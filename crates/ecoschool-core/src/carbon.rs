// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Carbon footprint estimate from utility usage with fixed emission factors.

use crate::normalize::parse_user_number;
use serde::{Deserialize, Serialize};

/// kgCO2eq per kWh of grid electricity.
pub const ELECTRICITY_FACTOR: f64 = 0.4781;
/// kgCO2eq per m³ of city gas.
pub const GAS_FACTOR: f64 = 2.176;
/// kgCO2eq per m³ of water.
pub const WATER_FACTOR: f64 = 0.237;

/// kgCO2eq one pine-forest field absorbs per year.
const PINE_FIELD_KG: f64 = 3000.0;
const SETPOINT_SAVING_RATIO: f64 = 0.30 * 0.07;
const KG_PER_TREE: f64 = 6.6;

/// Raw strings as typed into the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionInput {
    #[serde(default)]
    pub electricity_kwh: String,
    #[serde(default)]
    pub gas_m3: String,
    #[serde(default)]
    pub water_m3: String,
}

impl EmissionInput {
    pub fn new(electricity_kwh: &str, gas_m3: &str, water_m3: &str) -> Self {
        Self {
            electricity_kwh: electricity_kwh.to_string(),
            gas_m3: gas_m3.to_string(),
            water_m3: water_m3.to_string(),
        }
    }

    fn is_blank(&self) -> bool {
        [&self.electricity_kwh, &self.gas_m3, &self.water_m3]
            .iter()
            .all(|s| s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionBreakdown {
    pub electric_kg: f64,
    pub gas_kg: f64,
    pub water_kg: f64,
    pub total_kg: f64,
}

impl EmissionBreakdown {
    pub fn pine_forest_fields(&self) -> f64 {
        self.total_kg / PINE_FIELD_KG
    }

    /// Trees' worth of CO2 saved by moving the cooling setpoint.
    pub fn trees_saved_by_setpoint(&self) -> i64 {
        (self.electric_kg * SETPOINT_SAVING_RATIO / KG_PER_TREE).round() as i64
    }
}

/// Nothing entered is distinct from a zero footprint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Emission {
    Empty,
    Estimate(EmissionBreakdown),
}

impl Emission {
    pub fn breakdown(&self) -> Option<&EmissionBreakdown> {
        match self {
            Self::Empty => None,
            Self::Estimate(b) => Some(b),
        }
    }

    pub fn total_kg(&self) -> Option<f64> {
        self.breakdown().map(|b| b.total_kg)
    }
}

pub fn calculate(input: &EmissionInput) -> Emission {
    if input.is_blank() {
        return Emission::Empty;
    }
    let parse = |s: &str| parse_user_number(s).unwrap_or(0.0);
    let electric_kg = parse(&input.electricity_kwh) * ELECTRICITY_FACTOR;
    let gas_kg = parse(&input.gas_m3) * GAS_FACTOR;
    let water_kg = parse(&input.water_m3) * WATER_FACTOR;

    Emission::Estimate(EmissionBreakdown {
        electric_kg,
        gas_kg,
        water_kg,
        total_kg: electric_kg + gas_kg + water_kg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_blank_input_is_empty_not_zero() {
        assert_eq!(calculate(&EmissionInput::default()), Emission::Empty);
        assert_eq!(calculate(&EmissionInput::new(" ", "", "\t")), Emission::Empty);
    }

    #[test]
    fn test_electricity_only() {
        let emission = calculate(&EmissionInput::new("1000", "", ""));
        let b = emission.breakdown().unwrap();
        assert!(close(b.total_kg, 478.1));
        assert!(close(b.gas_kg, 0.0));
    }

    #[test]
    fn test_gas_only() {
        let b = *calculate(&EmissionInput::new("", "100", "")).breakdown().unwrap();
        assert!(close(b.total_kg, 217.6));
    }

    #[test]
    fn test_separators_and_garbage() {
        let b = *calculate(&EmissionInput::new("1,000", "abc", " 1 000 "))
            .breakdown()
            .unwrap();
        assert!(close(b.electric_kg, 478.1));
        assert!(close(b.gas_kg, 0.0));
        assert!(close(b.water_kg, 237.0));
    }

    #[test]
    fn test_display_metrics() {
        let b = *calculate(&EmissionInput::new("100000", "", ""))
            .breakdown()
            .unwrap();
        assert!(close(b.pine_forest_fields(), 47810.0 / 3000.0));
        // 47810 * 0.021 / 6.6 = 152.1
        assert_eq!(b.trees_saved_by_setpoint(), 152);
    }
}
