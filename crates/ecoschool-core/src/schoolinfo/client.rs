use super::{FetchOutcome, ListQuery, Row, SchoolInfoSource};
use crate::config::AppConfig;
use crate::{EcoError, Result};
use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Raw upstream answer before the `list` array is pulled out. Only the
/// outcome built from it is cached, as a `{"list": rows}` envelope.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Option<Value>,
}

pub struct SchoolInfoClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl SchoolInfoClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EcoError::Configuration(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Fails with a configuration error when no API key is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let key = config.require_api_key()?;
        Self::new(&config.base_url, key)
    }

    /// Performs the HTTP call. `Err` means the upstream never answered.
    pub fn fetch_raw(&self, query: &ListQuery) -> std::result::Result<UpstreamResponse, String> {
        let year = query.pban_yr.to_string();
        let params = [
            ("apiKey", self.api_key.as_str()),
            ("apiType", query.api_type.code()),
            ("pbanYr", year.as_str()),
            ("sidoCode", query.sido_code()),
            ("sggCode", query.sgg_code.as_str()),
            ("schulKndCode", query.kind_code.as_str()),
        ];

        debug!(
            "schoolinfo request — apiType={} pbanYr={} sggCode={} schulKndCode={}",
            query.api_type, query.pban_yr, query.sgg_code, query.kind_code
        );

        let url = url::Url::parse_with_params(&self.base_url, &params)
            .map_err(|e| format!("invalid base URL {}: {}", self.base_url, e))?;

        let response = self
            .http
            .get(url)
            .header("accept", "application/json")
            .send()
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let text = response.text().map_err(|e| e.to_string())?;
        let body = serde_json::from_str::<Value>(&text).ok();
        Ok(UpstreamResponse { status, body })
    }
}

/// Interprets a raw answer: non-2xx and unparseable bodies are failures, a
/// missing or non-array `list` is an empty year.
pub fn outcome_from_response(response: &UpstreamResponse) -> FetchOutcome {
    if !(200..300).contains(&response.status) {
        return FetchOutcome::UpstreamFailed {
            status: Some(response.status),
            cause: format!("HTTP {}", response.status),
        };
    }
    let Some(body) = &response.body else {
        return FetchOutcome::UpstreamFailed {
            status: Some(response.status),
            cause: "response body is not valid JSON".to_string(),
        };
    };
    let rows: Vec<Row> = body
        .get("list")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|item| item.as_object().cloned())
                .collect()
        })
        .unwrap_or_default();
    FetchOutcome::from_rows(rows)
}

impl SchoolInfoSource for SchoolInfoClient {
    fn fetch_list(&self, query: &ListQuery) -> FetchOutcome {
        match self.fetch_raw(query) {
            Ok(response) => {
                let outcome = outcome_from_response(&response);
                if let FetchOutcome::UpstreamFailed { cause, .. } = &outcome {
                    warn!(
                        "schoolinfo call failed — apiType={} pbanYr={} cause={}",
                        query.api_type, query.pban_yr, cause
                    );
                }
                outcome
            }
            Err(cause) => {
                warn!(
                    "schoolinfo unreachable — apiType={} pbanYr={} cause={}",
                    query.api_type, query.pban_yr, cause
                );
                FetchOutcome::UpstreamFailed {
                    status: None,
                    cause,
                }
            }
        }
    }
}
