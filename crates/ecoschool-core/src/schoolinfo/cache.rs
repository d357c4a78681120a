use super::{FetchOutcome, ListQuery, Row, SchoolInfoSource};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// On-disk form of one upstream answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default)]
    pub data: Value,
}

impl CacheEnvelope {
    /// Transport failures have no envelope so they are retried next run.
    pub fn from_outcome(outcome: &FetchOutcome) -> Option<Self> {
        match outcome {
            FetchOutcome::Rows(rows) => Some(Self {
                ok: true,
                status: None,
                data: json!({ "list": rows }),
            }),
            FetchOutcome::Empty => Some(Self {
                ok: true,
                status: None,
                data: json!({ "list": [] }),
            }),
            FetchOutcome::UpstreamFailed {
                status: Some(status),
                cause,
            } => Some(Self {
                ok: false,
                status: Some(*status),
                data: json!({ "error": cause }),
            }),
            FetchOutcome::UpstreamFailed { status: None, .. } => None,
        }
    }

    pub fn into_outcome(self) -> FetchOutcome {
        if !self.ok {
            let cause = self
                .data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("cached upstream failure")
                .to_string();
            return FetchOutcome::UpstreamFailed {
                status: self.status,
                cause,
            };
        }
        let rows: Vec<Row> = self
            .data
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
}

/// Wraps a source with a file cache keyed by (apiType, year, district,
/// level). A present cache file is authoritative: it is never refetched.
pub struct CachedSource<S> {
    inner: S,
    cache_dir: PathBuf,
}

impl<S: SchoolInfoSource> CachedSource<S> {
    pub fn new<P: AsRef<Path>>(inner: S, cache_dir: P) -> std::io::Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { inner, cache_dir })
    }

    pub fn cache_path(&self, query: &ListQuery) -> PathBuf {
        self.cache_dir.join(query.cache_file_name())
    }

    fn load(&self, path: &Path) -> Option<CacheEnvelope> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<CacheEnvelope>(&content) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!(
                    "Ignoring unreadable cache entry — path={} error={}",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    fn store(&self, path: &Path, envelope: &CacheEnvelope) {
        let result = serde_json::to_string(envelope)
            .map_err(std::io::Error::other)
            .and_then(|content| std::fs::write(path, content));
        if let Err(e) = result {
            warn!(
                "Failed to write cache entry — path={} error={}",
                path.display(),
                e
            );
        }
    }
}

impl<S: SchoolInfoSource> SchoolInfoSource for CachedSource<S> {
    fn fetch_list(&self, query: &ListQuery) -> FetchOutcome {
        let path = self.cache_path(query);
        if let Some(envelope) = self.load(&path) {
            debug!("schoolinfo cache hit — path={}", path.display());
            return envelope.into_outcome();
        }

        let outcome = self.inner.fetch_list(query);
        if let Some(envelope) = CacheEnvelope::from_outcome(&outcome) {
            self.store(&path, &envelope);
        }
        outcome
    }
}
