// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Best-effort joins across independently sourced school datasets.
//!
//! Names are not unique and the datasets disagree on spelling, so a join is a
//! ranked candidate list rather than a silent first match.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchoolKey {
    pub name: String,
    pub level: String,
    pub region: String,
}

impl SchoolKey {
    pub fn new(name: &str, level: &str, region: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            level: level.trim().to_string(),
            region: region.trim().to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.level.is_empty() && !self.region.is_empty()
    }
}

impl fmt::Display for SchoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}||{}||{}", self.name, self.level, self.region)
    }
}

/// Anything that carries the three key fields.
pub trait Keyed {
    fn key_name(&self) -> &str;
    fn key_level(&self) -> &str;
    fn key_region(&self) -> &str;

    fn school_key(&self) -> SchoolKey {
        SchoolKey::new(self.key_name(), self.key_level(), self.key_region())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NameMatch {
    Exact,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMatch {
    /// Position in the candidate slice handed to [`KeyMatcher::rank`].
    pub index: usize,
    pub confidence: f32,
    pub name_match: NameMatch,
    /// How many of the query's region and level the candidate shares.
    pub agreeing: u8,
}

#[derive(Debug, Clone, Default)]
pub struct KeyQuery {
    pub name: String,
    pub level: Option<String>,
    pub region: Option<String>,
}

impl KeyQuery {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn level(mut self, level: Option<&str>) -> Self {
        self.level = level.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        self
    }

    pub fn region(mut self, region: Option<&str>) -> Self {
        self.region = region.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        self
    }
}

// One agreeing field always outweighs the name match kind.
const EXACT_NAME: f32 = 0.4;
const SUBSTRING_NAME: f32 = 0.2;
const FIELD_AGREES: f32 = 0.3;

pub struct KeyMatcher;

impl KeyMatcher {
    /// Scores every candidate whose name equals or contains the query name.
    /// Region and level agreement rank first, then exact over substring
    /// names. Ties keep dataset order.
    pub fn rank<T: Keyed>(candidates: &[T], query: &KeyQuery) -> Vec<KeyMatch> {
        if query.name.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<KeyMatch> = candidates
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                let name = candidate.key_name().trim();
                let name_match = if name == query.name {
                    NameMatch::Exact
                } else if name.contains(query.name.as_str()) {
                    NameMatch::Substring
                } else {
                    return None;
                };

                let region_agrees = query
                    .region
                    .as_deref()
                    .is_some_and(|region| candidate.key_region().trim() == region);
                let level_agrees = query
                    .level
                    .as_deref()
                    .is_some_and(|level| candidate.key_level().trim() == level);
                let agreeing = u8::from(region_agrees) + u8::from(level_agrees);

                let name_score = match name_match {
                    NameMatch::Exact => EXACT_NAME,
                    NameMatch::Substring => SUBSTRING_NAME,
                };
                Some(KeyMatch {
                    index,
                    confidence: name_score + FIELD_AGREES * f32::from(agreeing),
                    name_match,
                    agreeing,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.agreeing
                .cmp(&a.agreeing)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });
        matches
    }

    /// More than one candidate shares the top score.
    pub fn is_ambiguous(matches: &[KeyMatch]) -> bool {
        match matches {
            [first, second, ..] => (first.confidence - second.confidence).abs() < f32::EPSILON,
            _ => false,
        }
    }
}
