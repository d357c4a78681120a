// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! HTTP surface of the self-assessment app: school suggestions, upstream
//! statistics, energy hints, the emission estimate and report export.

pub mod error;

pub use error::ApiError;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ecoschool_core::carbon::{calculate, EmissionInput};
use ecoschool_core::directory::SchoolDirectory;
use ecoschool_core::energy::{EnergyDataset, EnergyRequest};
use ecoschool_core::export::capture::BrowserLauncher;
use ecoschool_core::export::{
    render_report_pdf, report_file_name, CaptureError, CaptureRequest, Capturer, EmissionView,
    ReportSummary,
};
use ecoschool_core::schoolinfo::{BasicInfoRequest, Reconciler, SchoolInfoSource};
use ecoschool_core::session::{SessionSnapshot, StorageMap};
use ecoschool_core::{current_year, parse_year, EcoError};
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

pub type DynReconciler = Reconciler<Box<dyn SchoolInfoSource>>;

/// Everything the handlers read, built once at startup.
pub struct AppState {
    pub directory: SchoolDirectory,
    pub energy: EnergyDataset,
    /// `None` when no API key is configured.
    pub reconciler: Option<DynReconciler>,
    pub capturer: Capturer<Arc<dyn BrowserLauncher>>,
    /// TTF with Hangul glyphs for the report PDF.
    pub report_font: Option<PathBuf>,
    /// Pins the year windows; tests use it to stay date independent.
    pub fixed_year: Option<i32>,
}

impl AppState {
    fn year(&self) -> i32 {
        self.fixed_year.unwrap_or_else(current_year)
    }

    fn production(&self) -> bool {
        self.capturer.settings().production
    }
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/seoul-schools", get(search_schools))
        .route("/api/schoolinfo/basic", get(basic_info))
        .route("/api/seoul-school-energy", get(school_energy))
        .route("/api/emissions", post(emissions))
        .route("/api/report", post(report))
        .route("/api/capture", post(capture))
        .with_state(state)
}

/// Runs blocking core work off the async executor.
async fn blocking<T, F>(state: &SharedState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, EcoError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| ApiError::Internal(format!("worker failed: {}", e)))?
        .map_err(ApiError::from)
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

async fn search_schools(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Json<serde_json::Value> {
    let q = params.q.unwrap_or_default();
    let limit = params.limit.and_then(|l| l.trim().parse::<usize>().ok());
    let items = state.directory.search(&q, limit);
    Json(json!({ "items": items }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BasicParams {
    #[serde(default)]
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    level: String,
    #[serde(default)]
    pban_yr: Option<String>,
}

async fn basic_info(
    State(state): State<SharedState>,
    Query(params): Query<BasicParams>,
) -> Result<Response, ApiError> {
    let info = blocking(&state, move |state| {
        let reconciler = state.reconciler.as_ref().ok_or_else(|| {
            EcoError::Configuration("SCHOOLINFO_API_KEY is not set".to_string())
        })?;
        let request = BasicInfoRequest::new(&params.name, &params.region, &params.level)
            .with_year(params.pban_yr.as_deref().and_then(parse_year));
        reconciler.basic_info(&request, state.year())
    })
    .await?;
    Ok(Json(info).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct EnergyParams {
    #[serde(default)]
    name: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    year: Option<String>,
}

async fn school_energy(
    State(state): State<SharedState>,
    Query(params): Query<EnergyParams>,
) -> Result<Response, ApiError> {
    let request = EnergyRequest::new(&params.name)
        .region(params.region.as_deref())
        .level(params.level.as_deref())
        .year(params.year.as_deref());
    let lookup = state.energy.lookup(&request, state.year())?;
    Ok(Json(lookup).into_response())
}

async fn emissions(Json(input): Json<EmissionInput>) -> Json<EmissionView> {
    Json(EmissionView::from(&calculate(&input)))
}

/// Body is the browser's session storage map.
async fn report(
    State(state): State<SharedState>,
    Json(storage): Json<StorageMap>,
) -> Result<Response, ApiError> {
    let (file_name, bytes) = blocking(&state, move |state| {
        let snapshot = SessionSnapshot::from_storage(&storage);
        let summary = ReportSummary::from_snapshot(&snapshot)?;
        let file_name = report_file_name(&summary.school_name, chrono::Local::now().date_naive());
        let bytes = render_report_pdf(&summary, state.report_font.as_deref())?;
        Ok((file_name, bytes))
    })
    .await?;

    info!("Report exported — file={} bytes={}", file_name, bytes.len());
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
        ],
        bytes,
    )
        .into_response())
}

/// ASCII fallback plus the RFC 5987 UTF-8 name.
fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && c != '"' { c } else { '_' })
        .collect();
    let encoded: String = file_name
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii, encoded
    )
}

async fn capture(
    State(state): State<SharedState>,
    Json(request): Json<CaptureRequest>,
) -> Result<Response, ApiError> {
    let production = state.production();
    let budget = state.capturer.settings().request_budget;
    debug!("Capture requested — url={}", request.url);

    let worker = Arc::clone(&state);
    let task = tokio::task::spawn_blocking(move || worker.capturer.capture(&request));
    let output = match tokio::time::timeout(budget, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(CaptureError::Generic(format!("worker failed: {}", e))),
        Err(_) => Err(CaptureError::Timeout(format!(
            "request exceeded {}s",
            budget.as_secs()
        ))),
    }
    .map_err(|error| ApiError::Capture { error, production })?;

    Ok((
        [
            (header::CONTENT_TYPE, output.content_type),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        output.bytes,
    )
        .into_response())
}
