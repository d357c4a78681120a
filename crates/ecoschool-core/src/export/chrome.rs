use super::capture::{
    BrowserLauncher, CaptureError, CaptureResult, CaptureSettings, PageDebugInfo, PageDriver,
};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

const VISIBLE_JS: &str = r#"(selector) => {
  const el = document.querySelector(selector);
  if (!el) return false;
  const style = window.getComputedStyle(el);
  const rect = el.getBoundingClientRect();
  return style.display !== 'none' && style.visibility !== 'hidden'
    && style.opacity !== '0' && rect.width > 0 && rect.height > 0;
}"#;

const SETTLE_JS: &str = r#"(async () => {
  if (document.fonts && document.fonts.ready) { await document.fonts.ready; }
  await new Promise(r => requestAnimationFrame(() => requestAnimationFrame(r)));
  return true;
})()"#;

const PRESENT_JS: &str = "(selector) => document.querySelector(selector) !== null";

const TITLE_JS: &str = r#"(selector, title) => {
  const el = document.querySelector(selector);
  if (!el || el.querySelector('[data-capture-title]')) return false;
  const h = document.createElement('h2');
  h.setAttribute('data-capture-title', '');
  h.textContent = title;
  h.style.cssText = 'font-size:28px;font-weight:700;margin:0 0 24px 0;text-align:center;';
  el.insertBefore(h, el.firstChild);
  return true;
}"#;

const DEBUG_JS: &str = r#"(selector) => {
  const el = document.querySelector(selector);
  let visible = false;
  if (el) {
    const r = el.getBoundingClientRect();
    visible = r.width > 0 && r.height > 0;
  }
  return JSON.stringify({
    url: location.href,
    title: document.title,
    readyState: document.readyState,
    exists: el !== null,
    visible: visible,
    body: (document.body ? document.body.innerText : '').slice(0, 500),
  });
}"#;

const PAGE_SIZE_JS: &str = "JSON.stringify([document.documentElement.scrollWidth, document.documentElement.scrollHeight])";

/// Applies a function expression to string arguments passed as JSON
/// literals.
fn call_js(function: &str, args: &[&str]) -> String {
    let args: Vec<String> = args
        .iter()
        .map(|arg| Value::String((*arg).to_string()).to_string())
        .collect();
    format!("({})({})", function, args.join(", "))
}

fn cdp_err(e: impl std::fmt::Display) -> CaptureError {
    CaptureError::classify(e.to_string())
}

/// Launches a local Chrome/Chromium. Without an explicit path the
/// executable is auto-detected.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    pub chrome_path: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(
        &self,
        viewport: (u32, u32),
        settings: &CaptureSettings,
    ) -> CaptureResult<Box<dyn PageDriver>> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some(viewport))
            .path(self.chrome_path.clone())
            .idle_browser_timeout(settings.request_budget)
            .build()
            .map_err(|e| CaptureError::BrowserInit(e.to_string()))?;
        let browser = Browser::new(options).map_err(|e| CaptureError::BrowserInit(e.to_string()))?;
        let tab = browser.new_tab().map_err(cdp_err)?;
        tab.set_default_timeout(settings.navigation_timeout);
        debug!("Browser launched — viewport={}x{}", viewport.0, viewport.1);
        Ok(Box::new(ChromePage { browser, tab }))
    }
}

struct ChromePage {
    // dropped after the tab closes; dropping kills the process
    browser: Browser,
    tab: Arc<Tab>,
}

impl ChromePage {
    fn eval(&self, script: &str, await_promise: bool) -> CaptureResult<Option<Value>> {
        let object = self.tab.evaluate(script, await_promise).map_err(cdp_err)?;
        Ok(object.value)
    }

    fn eval_bool(&self, script: &str, await_promise: bool) -> CaptureResult<bool> {
        Ok(matches!(self.eval(script, await_promise)?, Some(Value::Bool(true))))
    }

    fn eval_json(&self, script: &str) -> CaptureResult<Value> {
        match self.eval(script, false)? {
            Some(Value::String(s)) => serde_json::from_str(&s).map_err(cdp_err),
            other => Err(CaptureError::Generic(format!(
                "unexpected script result: {:?}",
                other
            ))),
        }
    }
}

impl PageDriver for ChromePage {
    fn navigate(&mut self, url: &str) -> CaptureResult<()> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(cdp_err)?;
        Ok(())
    }

    fn reload(&mut self) -> CaptureResult<()> {
        self.tab
            .reload(false, None)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(cdp_err)?;
        Ok(())
    }

    fn inject_session(&mut self, data: &BTreeMap<String, String>) -> CaptureResult<()> {
        let entries = serde_json::to_string(data).map_err(cdp_err)?;
        let script = format!(
            "(() => {{ const d = {}; for (const k in d) sessionStorage.setItem(k, d[k]); return true; }})()",
            entries
        );
        self.eval(&script, false)?;
        Ok(())
    }

    fn selector_visible(&mut self, selector: &str) -> CaptureResult<bool> {
        self.eval_bool(&call_js(VISIBLE_JS, &[selector]), false)
    }

    fn settle_frames(&mut self) -> CaptureResult<()> {
        self.eval(SETTLE_JS, true)?;
        Ok(())
    }

    fn selector_present(&mut self, selector: &str) -> CaptureResult<bool> {
        self.eval_bool(&call_js(PRESENT_JS, &[selector]), false)
    }

    fn prepend_title(&mut self, selector: &str, title: &str) -> CaptureResult<()> {
        let script = call_js(TITLE_JS, &[selector, title]);
        self.eval(&script, false)?;
        Ok(())
    }

    fn element_screenshot(&mut self, selector: &str) -> CaptureResult<Option<Vec<u8>>> {
        let Ok(element) = self.tab.find_element(selector) else {
            return Ok(None);
        };
        match element.capture_screenshot(Page::CaptureScreenshotFormatOption::Png) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) => {
                debug!("Element screenshot failed — selector={} error={}", selector, e);
                Ok(None)
            }
        }
    }

    fn page_screenshot(&mut self, full_page: bool) -> CaptureResult<Vec<u8>> {
        let clip = if full_page {
            let size = self.eval_json(PAGE_SIZE_JS)?;
            let width = size.get(0).and_then(Value::as_f64).unwrap_or(0.0);
            let height = size.get(1).and_then(Value::as_f64).unwrap_or(0.0);
            (width > 0.0 && height > 0.0).then_some(Page::Viewport {
                x: 0.0,
                y: 0.0,
                width,
                height,
                scale: 1.0,
            })
        } else {
            None
        };
        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, clip, true)
            .map_err(cdp_err)
    }

    fn debug_info(&mut self, selector: &str) -> CaptureResult<PageDebugInfo> {
        let info = self.eval_json(&call_js(DEBUG_JS, &[selector]))?;
        let text = |key: &str| {
            info.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let flag = |key: &str| info.get(key).and_then(Value::as_bool).unwrap_or(false);
        Ok(PageDebugInfo {
            url: text("url"),
            title: text("title"),
            ready_state: text("readyState"),
            selector_exists: flag("exists"),
            selector_visible: flag("visible"),
            body_text: text("body"),
        })
    }

    fn close(self: Box<Self>) -> CaptureResult<()> {
        let ChromePage { browser, tab } = *self;
        let closed = tab.close(true).map(|_| ()).map_err(cdp_err);
        drop(browser);
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_js_quotes_value() {
        let script = call_js(PRESENT_JS, &["div[data-x=\"a\"]"]);
        assert_eq!(
            script,
            r#"((selector) => document.querySelector(selector) !== null)("div[data-x=\"a\"]")"#
        );
    }

    #[test]
    fn test_arguments_are_never_rewritten() {
        let script = call_js(TITLE_JS, &["#title-TITLE .selector", "우리학교"]);
        assert!(script.ends_with(r##"("#title-TITLE .selector", "우리학교")"##));
        assert_eq!(script.matches("우리학교").count(), 1);
    }
}
