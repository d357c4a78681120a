// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Cleanup of the loosely formatted numbers found in upstream rows and the
//! energy dataset ("14(1)", "1,234", "14명", "약 3,200.5").

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn paren_sum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d[\d,]*)\s*\(\s*(\d[\d,]*)\s*\)").unwrap())
}

fn first_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").unwrap())
}

fn first_integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,]*").unwrap())
}

/// `N(M)` means a primary count plus an additional count in parentheses.
fn paren_sum(s: &str) -> Option<u64> {
    let caps = paren_sum_re().captures(s)?;
    let a: u64 = caps[1].replace(',', "").parse().ok()?;
    let b: u64 = caps[2].replace(',', "").parse().ok()?;
    a.checked_add(b)
}

/// `"14(1)"` -> `"15"`, `"1,234명"` -> `"1234"`, no digits -> `""`.
pub fn normalize_number(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if let Some(sum) = paren_sum(s) {
        return sum.to_string();
    }
    first_number_re()
        .find(s)
        .map(|m| m.as_str().replace(',', ""))
        .unwrap_or_default()
}

/// Head counts: `N(M)` summed, otherwise the first unsigned integer run
/// (`"14.5명"` -> `"14"`). A value without any digits is passed through
/// trimmed so the caller can still show what upstream sent.
pub fn normalize_count(raw: &str) -> String {
    let s = raw.trim();
    if let Some(sum) = paren_sum(s) {
        return sum.to_string();
    }
    match first_integer_re().find(s) {
        Some(m) => {
            let digits = m.as_str().replace(',', "");
            digits
                .parse::<u64>()
                .map(|n| n.to_string())
                .unwrap_or(digits)
        }
        None => s.to_string(),
    }
}

/// Site area in m²: the first decimal number, never summed. No digits
/// passes the text through like [`normalize_count`].
pub fn normalize_area(raw: &str) -> String {
    let s = raw.trim();
    first_number_re()
        .find(s)
        .map(|m| m.as_str().replace(',', ""))
        .unwrap_or_else(|| s.to_string())
}

/// Numeric value of [`normalize_number`]; anything unusable counts as zero.
pub fn number_loose(raw: &str) -> f64 {
    normalize_number(raw).parse::<f64>().unwrap_or(0.0)
}

/// Renders a JSON scalar the way upstream meant it: numbers and strings
/// become text, `null`/missing becomes empty.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Parses user input: whitespace and thousands separators are ignored.
pub fn parse_user_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}
