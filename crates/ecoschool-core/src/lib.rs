// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

pub mod batch;
pub mod carbon;
pub mod codes;
pub mod config;
pub mod directory;
pub mod energy;
pub mod export;
pub mod form;
pub mod normalize;
pub mod picker;
pub mod practices;
pub mod school_key;
pub mod schoolinfo;
pub mod session;

use std::path::PathBuf;
use thiserror::Error;

/// Broad failure buckets surfaced to callers (HTTP status, CLI exit message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    NotFound,
    Upstream,
    Internal,
}

#[derive(Error, Debug)]
pub enum EcoError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("required fields missing: {}", missing.join(", "))]
    IncompleteStep { missing: Vec<String> },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("PDF error: {0}")]
    Pdf(String),
}

impl EcoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation(_) | Self::IncompleteStep { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Io(_) | Self::Json(_) | Self::Csv(_) | Self::Pdf(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, EcoError>;

/// Per-user configuration directory (session file, upstream cache).
pub fn get_config_root() -> PathBuf {
    directories::ProjectDirs::from("org", "ecoschool", "EcoSchool")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".ecoschool"))
}

/// Current calendar year in local time; anchors every year fallback window.
pub fn current_year() -> i32 {
    use chrono::Datelike;
    chrono::Local::now().year()
}

/// Accepts only a four-digit year; anything else means "use the default".
pub fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_digit()) {
        raw.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EcoError::Configuration("key".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            EcoError::IncompleteStep {
                missing: vec!["학교명".into()]
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(EcoError::Pdf("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_incomplete_step_message_lists_fields() {
        let err = EcoError::IncompleteStep {
            missing: vec!["학교명".into(), "학생 수".into()],
        };
        assert_eq!(err.to_string(), "required fields missing: 학교명, 학생 수");
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("2024"), Some(2024));
        assert_eq!(parse_year(" 2023 "), Some(2023));
        assert_eq!(parse_year("24"), None);
        assert_eq!(parse_year("20x4"), None);
        assert_eq!(parse_year(""), None);
    }
}
