// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Fixed code tables of the schoolinfo OpenAPI: Seoul districts (`sggCode`)
//! and school levels (`schulKndCode`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Only Seoul is covered by the datasets.
pub const SIDO_CODE_SEOUL: &str = "11";

/// District name to `sggCode`, in the upstream's canonical order.
pub const SEOUL_DISTRICTS: [(&str, &str); 25] = [
    ("종로구", "11110"),
    ("중구", "11140"),
    ("용산구", "11170"),
    ("성동구", "11200"),
    ("광진구", "11215"),
    ("동대문구", "11230"),
    ("중랑구", "11260"),
    ("성북구", "11290"),
    ("강북구", "11305"),
    ("도봉구", "11320"),
    ("노원구", "11350"),
    ("은평구", "11380"),
    ("서대문구", "11410"),
    ("마포구", "11440"),
    ("양천구", "11470"),
    ("강서구", "11500"),
    ("구로구", "11530"),
    ("금천구", "11545"),
    ("영등포구", "11560"),
    ("동작구", "11590"),
    ("관악구", "11620"),
    ("서초구", "11650"),
    ("강남구", "11680"),
    ("송파구", "11710"),
    ("강동구", "11740"),
];

pub fn district_code(region: &str) -> Option<&'static str> {
    let region = region.trim();
    SEOUL_DISTRICTS
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, code)| *code)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SchoolLevel {
    #[serde(rename = "초등")]
    Elementary,
    #[serde(rename = "중등")]
    Middle,
    #[serde(rename = "고등")]
    High,
    #[serde(rename = "특수")]
    Special,
    #[serde(rename = "그외")]
    Other,
    #[serde(rename = "각종")]
    Miscellaneous,
}

impl SchoolLevel {
    pub const ALL: [SchoolLevel; 6] = [
        SchoolLevel::Elementary,
        SchoolLevel::Middle,
        SchoolLevel::High,
        SchoolLevel::Special,
        SchoolLevel::Other,
        SchoolLevel::Miscellaneous,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Elementary => "초등",
            Self::Middle => "중등",
            Self::High => "고등",
            Self::Special => "특수",
            Self::Other => "그외",
            Self::Miscellaneous => "각종",
        }
    }

    /// `schulKndCode` from the OpenAPI developer guide.
    pub fn kind_code(self) -> &'static str {
        match self {
            Self::Elementary => "02",
            Self::Middle => "03",
            Self::High => "04",
            Self::Special => "05",
            Self::Other => "06",
            Self::Miscellaneous => "07",
        }
    }

    /// Special and miscellaneous schools report totals in the `*_4` columns.
    pub fn uses_grand_total_columns(self) -> bool {
        matches!(self, Self::Special | Self::Miscellaneous)
    }
}

impl fmt::Display for SchoolLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported school level: {}", self.0)
    }
}

impl FromStr for SchoolLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        SchoolLevel::ALL
            .into_iter()
            .find(|level| level.label() == s)
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}
