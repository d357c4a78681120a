// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ecoschool_core::export::capture::CaptureCategory;
use ecoschool_core::export::CaptureError;
use ecoschool_core::{EcoError, ErrorKind};
use log::{error, warn};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] EcoError),
    #[error("{error}")]
    Capture {
        error: CaptureError,
        production: bool,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Core(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
                ErrorKind::Configuration | ErrorKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Capture { error, .. } => match error.category() {
                CaptureCategory::InvalidUrl => StatusCode::BAD_REQUEST,
                CaptureCategory::Forbidden => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Core(e) => ErrorBody {
                error: e.to_string(),
                details: None,
            },
            Self::Capture { error, production } => ErrorBody {
                error: error.user_message().to_string(),
                details: error.details(*production),
            },
            Self::Internal(_) => ErrorBody {
                error: "internal server error".to_string(),
                details: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed — status={} error={}", status.as_u16(), self);
        } else {
            warn!("Request rejected — status={} error={}", status.as_u16(), self);
        }
        (status, Json(self.body())).into_response()
    }
}
