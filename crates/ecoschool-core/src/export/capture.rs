// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Screenshot capture of an allow-listed page through a headless browser.
//!
//! The browser side sits behind [`BrowserLauncher`] / [`PageDriver`] so the
//! capture flow (session injection, selector polling, full-page fallback,
//! cleanup) is testable without Chrome.

use super::pdf::png_to_pdf;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

pub const DEFAULT_WIDTH: u32 = 1900;
pub const DEFAULT_HEIGHT: u32 = 1200;
pub const MAX_VIEWPORT: (u32, u32) = (1920, 1080);
pub const DEFAULT_ALLOWED_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];
pub const SCREENSHOT_TITLE: &str = "우리학교 실천 현황 확인";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Png,
    Pdf,
}

impl CaptureFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
        }
    }
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Session storage entries to seed before rendering.
    #[serde(default)]
    pub session_data: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub format: CaptureFormat,
}

impl CaptureRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            selector: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            session_data: None,
            format: CaptureFormat::Png,
        }
    }

    pub fn viewport(&self) -> (u32, u32) {
        (
            self.width.clamp(1, MAX_VIEWPORT.0),
            self.height.clamp(1, MAX_VIEWPORT.1),
        )
    }

    fn selector(&self) -> Option<&str> {
        self.selector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCategory {
    InvalidUrl,
    Forbidden,
    Timeout,
    BrowserInit,
    PageLoad,
    Generic,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("host not allowed: {0}")]
    ForbiddenHost(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("browser initialization failed: {0}")]
    BrowserInit(String),
    #[error("page changed while loading: {0}")]
    PageLoad(String),
    #[error("capture failed: {0}")]
    Generic(String),
}

impl CaptureError {
    /// Buckets a raw browser error message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout(message)
        } else if lower.contains("chrome")
            || lower.contains("chromium")
            || lower.contains("executable")
            || lower.contains("launch")
        {
            Self::BrowserInit(message)
        } else if lower.contains("execution context was destroyed") {
            Self::PageLoad(message)
        } else {
            Self::Generic(message)
        }
    }

    pub fn category(&self) -> CaptureCategory {
        match self {
            Self::InvalidUrl(_) => CaptureCategory::InvalidUrl,
            Self::ForbiddenHost(_) => CaptureCategory::Forbidden,
            Self::Timeout(_) => CaptureCategory::Timeout,
            Self::BrowserInit(_) => CaptureCategory::BrowserInit,
            Self::PageLoad(_) => CaptureCategory::PageLoad,
            Self::Generic(_) => CaptureCategory::Generic,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self.category() {
            CaptureCategory::InvalidUrl => "유효하지 않은 URL입니다.",
            CaptureCategory::Forbidden => "허용되지 않은 도메인입니다.",
            CaptureCategory::Timeout => "요청 시간이 초과되었습니다. 다시 시도해주세요.",
            CaptureCategory::BrowserInit => {
                "브라우저를 초기화할 수 없습니다. 잠시 후 다시 시도해주세요."
            }
            CaptureCategory::PageLoad => "페이지 로딩 중 오류가 발생했습니다. 다시 시도해주세요.",
            CaptureCategory::Generic => "스크린샷 생성 중 오류가 발생했습니다.",
        }
    }

    /// Raw cause for the response body; hidden in production.
    pub fn details(&self, production: bool) -> Option<String> {
        if production {
            None
        } else {
            Some(self.to_string())
        }
    }
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Host names admitted besides their subdomains.
    pub allowed_hosts: Vec<String>,
    pub production: bool,
    /// Whole request, enforced by the caller around [`Capturer::capture`].
    pub request_budget: Duration,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub poll_interval: Duration,
    /// Pause after navigation before looking for the selector.
    pub settle: Duration,
    /// Pause after the title is inserted, before the element shot.
    pub title_settle: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
            production: false,
            request_budget: Duration::from_secs(28),
            navigation_timeout: Duration::from_secs(25),
            selector_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
            settle: Duration::from_secs(1),
            title_settle: Duration::from_millis(300),
        }
    }
}

impl CaptureSettings {
    /// Adds hosts from a comma separated list; schemes and ports are stripped.
    pub fn with_extra_hosts(mut self, list: &str) -> Self {
        for host in list.split(',') {
            let host = host.trim();
            let host = host
                .strip_prefix("https://")
                .or_else(|| host.strip_prefix("http://"))
                .unwrap_or(host);
            let host = host.split(['/', ':']).next().unwrap_or("").to_lowercase();
            if !host.is_empty() && !self.allowed_hosts.contains(&host) {
                self.allowed_hosts.push(host);
            }
        }
        self
    }
}

/// Exact host or any subdomain of an allowed host.
pub fn is_allowed_host(host: &str, allowed: &[String]) -> bool {
    let host = host.to_lowercase();
    allowed.iter().any(|a| {
        let a = a.to_lowercase();
        !a.is_empty() && (host == a || host.ends_with(&format!(".{}", a)))
    })
}

pub fn check_url(raw: &str, allowed: &[String]) -> CaptureResult<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CaptureError::InvalidUrl("url is required".to_string()));
    }
    let url = Url::parse(raw).map_err(|e| CaptureError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CaptureError::InvalidUrl(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    let host = url.host_str().unwrap_or_default();
    if !is_allowed_host(host, allowed) {
        return Err(CaptureError::ForbiddenHost(host.to_string()));
    }
    Ok(url)
}

pub fn is_allowed_url(raw: &str, allowed: &[String]) -> bool {
    check_url(raw, allowed).is_ok()
}

/// What the page looked like when the selector could not be found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDebugInfo {
    pub url: String,
    pub title: String,
    pub ready_state: String,
    pub selector_exists: bool,
    pub selector_visible: bool,
    pub body_text: String,
}

/// One open browser page.
pub trait PageDriver {
    fn navigate(&mut self, url: &str) -> CaptureResult<()>;
    fn reload(&mut self) -> CaptureResult<()>;
    /// Writes entries into `sessionStorage` of the current document.
    fn inject_session(&mut self, data: &BTreeMap<String, String>) -> CaptureResult<()>;
    /// Present, displayed, opaque and with a non-zero box.
    fn selector_visible(&mut self, selector: &str) -> CaptureResult<bool>;
    /// Waits for web fonts and two animation frames.
    fn settle_frames(&mut self) -> CaptureResult<()>;
    fn selector_present(&mut self, selector: &str) -> CaptureResult<bool>;
    fn prepend_title(&mut self, selector: &str, title: &str) -> CaptureResult<()>;
    /// `None` when the element is gone or has no box.
    fn element_screenshot(&mut self, selector: &str) -> CaptureResult<Option<Vec<u8>>>;
    fn page_screenshot(&mut self, full_page: bool) -> CaptureResult<Vec<u8>>;
    fn debug_info(&mut self, selector: &str) -> CaptureResult<PageDebugInfo>;
    fn close(self: Box<Self>) -> CaptureResult<()>;
}

pub trait BrowserLauncher: Send + Sync {
    fn launch(
        &self,
        viewport: (u32, u32),
        settings: &CaptureSettings,
    ) -> CaptureResult<Box<dyn PageDriver>>;
}

impl<L: BrowserLauncher + ?Sized> BrowserLauncher for std::sync::Arc<L> {
    fn launch(
        &self,
        viewport: (u32, u32),
        settings: &CaptureSettings,
    ) -> CaptureResult<Box<dyn PageDriver>> {
        (**self).launch(viewport, settings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutput {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// False when the selector was requested but a full page was shot instead.
    pub element_found: bool,
}

pub struct Capturer<L> {
    launcher: L,
    settings: CaptureSettings,
}

impl<L: BrowserLauncher> Capturer<L> {
    pub fn new(launcher: L, settings: CaptureSettings) -> Self {
        Self { launcher, settings }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn capture(&self, request: &CaptureRequest) -> CaptureResult<CaptureOutput> {
        let url = check_url(&request.url, &self.settings.allowed_hosts).map_err(|e| {
            if let CaptureError::ForbiddenHost(host) = &e {
                error!("Capture rejected for disallowed host — host={}", host);
            }
            e
        })?;

        let started = Instant::now();
        let mut page = self.launcher.launch(request.viewport(), &self.settings)?;
        let result = self.run(page.as_mut(), url.as_str(), request);
        if let Err(e) = page.close() {
            warn!("Failed to close browser — error={}", e);
        }

        let (png, element_found) = match result {
            Ok(shot) => shot,
            Err(e) => {
                error!(
                    "Screenshot failed — url={} category={:?} error={}",
                    url,
                    e.category(),
                    e
                );
                return Err(e);
            }
        };

        let bytes = match request.format {
            CaptureFormat::Png => png,
            CaptureFormat::Pdf => {
                png_to_pdf(&png).map_err(|e| CaptureError::Generic(e.to_string()))?
            }
        };
        info!(
            "Screenshot captured — url={} bytes={} element={} elapsed_ms={}",
            url,
            bytes.len(),
            element_found,
            started.elapsed().as_millis()
        );
        Ok(CaptureOutput {
            bytes,
            content_type: request.format.content_type(),
            element_found,
        })
    }

    fn run(
        &self,
        page: &mut dyn PageDriver,
        url: &str,
        request: &CaptureRequest,
    ) -> CaptureResult<(Vec<u8>, bool)> {
        page.navigate(url)?;
        if let Some(data) = request.session_data.as_ref().filter(|d| !d.is_empty()) {
            // storage is per origin, so it can only be written once on the page
            page.inject_session(data)?;
            page.reload()?;
            page.inject_session(data)?;
        }
        thread::sleep(self.settings.settle);

        let Some(selector) = request.selector() else {
            return Ok((page.page_screenshot(false)?, false));
        };

        debug!("Waiting for selector — selector={}", selector);
        if self.wait_for_selector(page, selector) {
            page.prepend_title(selector, SCREENSHOT_TITLE)?;
            thread::sleep(self.settings.title_settle);
            if let Some(shot) = page.element_screenshot(selector)? {
                return Ok((shot, true));
            }
            warn!(
                "Selector matched but element has no box; using full page — selector={}",
                selector
            );
        } else {
            match page.debug_info(selector) {
                Ok(info) => error!(
                    "Selector not found — selector={} url={} title={} readyState={} exists={} visible={} body={}",
                    selector,
                    info.url,
                    info.title,
                    info.ready_state,
                    info.selector_exists,
                    info.selector_visible,
                    info.body_text
                ),
                Err(e) => error!("Page debug info unavailable — error={}", e),
            }
            warn!("Falling back to full page screenshot — selector={}", selector);
        }
        Ok((page.page_screenshot(true)?, false))
    }

    /// Polls until the selector is visible and survives a settle pass.
    /// Polling errors are retried until the timeout.
    fn wait_for_selector(&self, page: &mut dyn PageDriver, selector: &str) -> bool {
        let deadline = Instant::now() + self.settings.selector_timeout;
        loop {
            let attempt = page.selector_visible(selector).and_then(|visible| {
                if !visible {
                    return Ok(false);
                }
                page.settle_frames()?;
                page.selector_present(selector)
            });
            match attempt {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!("Selector polling error — selector={} error={}", selector, e),
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.settings.poll_interval);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{fast_settings, FakeBrowser};
    use super::*;

    fn hosts() -> Vec<String> {
        CaptureSettings::default()
            .with_extra_hosts("https://ecoschool.example.org:443, vercel.app")
            .allowed_hosts
    }

    #[test]
    fn test_allow_list_matches_host_and_subdomains() {
        let allowed = hosts();
        assert!(is_allowed_url("http://localhost:3000/3", &allowed));
        assert!(is_allowed_url("https://ecoschool.example.org/3", &allowed));
        assert!(is_allowed_url("https://preview-1.vercel.app/", &allowed));
        assert!(!is_allowed_url("https://evil.com/?localhost", &allowed));
        assert!(!is_allowed_url("https://notlocalhost/", &allowed));
    }

    #[test]
    fn test_url_errors_are_categorized() {
        let allowed = hosts();
        assert_eq!(
            check_url("not a url", &allowed).unwrap_err().category(),
            CaptureCategory::InvalidUrl
        );
        assert_eq!(
            check_url("file:///etc/passwd", &allowed).unwrap_err().category(),
            CaptureCategory::InvalidUrl
        );
        assert_eq!(
            check_url("http://169.254.169.254/", &allowed)
                .unwrap_err()
                .category(),
            CaptureCategory::Forbidden
        );
    }

    #[test]
    fn test_viewport_is_clamped() {
        let mut request = CaptureRequest::new("http://localhost/");
        assert_eq!(request.viewport(), (1900, 1080));
        request.width = 4000;
        assert_eq!(request.viewport(), (1920, 1080));
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: CaptureRequest = serde_json::from_str(
            r##"{"url": "http://localhost:3000/3", "selector": "#overview", "sessionData": {"carbonapp.step2": "{}"}}"##,
        )
        .unwrap();
        assert_eq!(request.width, 1900);
        assert_eq!(request.height, 1200);
        assert_eq!(request.format, CaptureFormat::Png);
        assert_eq!(request.session_data.unwrap().len(), 1);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            CaptureError::classify("Navigation Timeout Exceeded").category(),
            CaptureCategory::Timeout
        );
        assert_eq!(
            CaptureError::classify("Could not auto detect a chrome executable").category(),
            CaptureCategory::BrowserInit
        );
        assert_eq!(
            CaptureError::classify("Execution context was destroyed, most likely because of a navigation").category(),
            CaptureCategory::PageLoad
        );
        assert_eq!(
            CaptureError::classify("Node is detached from document").category(),
            CaptureCategory::Generic
        );
    }

    #[test]
    fn test_details_hidden_in_production() {
        let e = CaptureError::Generic("boom".into());
        assert!(e.details(true).is_none());
        assert_eq!(e.details(false).as_deref(), Some("capture failed: boom"));
    }

    #[test]
    fn test_element_screenshot_when_selector_appears() {
        let browser = FakeBrowser {
            visible_after: Some(2),
            element_has_box: true,
            ..FakeBrowser::default()
        };
        let capturer = Capturer::new(browser.clone(), fast_settings());
        let mut request = CaptureRequest::new("http://localhost:3000/3");
        request.selector = Some("#overview".into());
        request.session_data = Some(BTreeMap::from([(
            "carbonapp.step1".to_string(),
            "{}".to_string(),
        )]));

        let output = capturer.capture(&request).unwrap();
        assert_eq!(output.bytes, b"element");
        assert!(output.element_found);
        assert_eq!(
            browser.calls(),
            vec![
                "launch 1900x1080",
                "navigate http://localhost:3000/3",
                "inject 1",
                "reload",
                "inject 1",
                "title",
                "element",
                "close",
            ]
        );
    }

    #[test]
    fn test_missing_selector_falls_back_to_full_page() {
        let browser = FakeBrowser::default();
        let capturer = Capturer::new(browser.clone(), fast_settings());
        let mut request = CaptureRequest::new("http://localhost/3");
        request.selector = Some("#overview".into());

        let output = capturer.capture(&request).unwrap();
        assert_eq!(output.bytes, b"page");
        assert!(!output.element_found);
        let calls = browser.calls();
        assert!(calls.contains(&"debug".to_string()));
        assert!(calls.contains(&"page full=true".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("close"));
    }

    #[test]
    fn test_no_selector_shoots_viewport() {
        let browser = FakeBrowser::default();
        let capturer = Capturer::new(browser.clone(), fast_settings());
        let output = capturer
            .capture(&CaptureRequest::new("http://127.0.0.1:3000/"))
            .unwrap();
        assert_eq!(output.content_type, "image/png");
        assert!(browser.calls().contains(&"page full=false".to_string()));
    }

    #[test]
    fn test_page_closed_on_error() {
        let browser = FakeBrowser {
            navigate_error: Some(CaptureError::classify("navigation timed out")),
            ..FakeBrowser::default()
        };
        let capturer = Capturer::new(browser.clone(), fast_settings());
        let err = capturer
            .capture(&CaptureRequest::new("http://localhost/"))
            .unwrap_err();
        assert_eq!(err.category(), CaptureCategory::Timeout);
        assert_eq!(browser.calls().last().map(String::as_str), Some("close"));
    }

    #[test]
    fn test_disallowed_host_never_launches() {
        let browser = FakeBrowser::default();
        let capturer = Capturer::new(browser.clone(), fast_settings());
        let err = capturer
            .capture(&CaptureRequest::new("https://example.com/"))
            .unwrap_err();
        assert_eq!(err.category(), CaptureCategory::Forbidden);
        assert!(browser.calls().is_empty());
    }
}
