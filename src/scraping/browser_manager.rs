//! Native browser management using `chromiumoxide`.
//!
//! This module owns everything driver-specific:
//! * Finding a usable browser executable (Brave → Chrome → Chromium, cross-platform).
//! * Building the launch configuration (headed/headless, viewport, stealth flags,
//!   ad/tracker host blocking, persistent profile).
//! * [`ChromeSession`], the [`SessionHandle`] implementation over one CDP page.
//! * The network-idle heuristic used after every navigation.
//!
//! Nothing above `scraping::session` imports `chromiumoxide`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::{ScoutConfig, Timeouts};
use crate::core::error::{ScoutError, ScoutResult};
use crate::scraping::session::SessionHandle;

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen Chromium-family desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. PATH scan – finds package-manager installs on all platforms.
/// 2. OS-specific well-known install paths.
///
/// The `CHROME_EXECUTABLE` override is handled by
/// [`ScoutConfig::chrome_executable_override`] before this is consulted.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "brave-browser",
            "brave",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Ad / tracker blocking ────────────────────────────────────────────────────

const AD_BLOCK_HOSTS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googletagmanager.com",
    "googletagservices.com",
    "google-analytics.com",
    "amazon-adsystem.com",
    "adnxs.com",
    "criteo.com",
    "taboola.com",
    "outbrain.com",
    "hotjar.com",
    "mouseflow.com",
    "fullstory.com",
    "nr-data.net",
    "connect.facebook.net",
];

/// `--host-resolver-rules` value that makes ad/tracker hosts (and their
/// subdomains) fail DNS resolution, so they never hold the network open.
pub fn host_resolver_rules() -> String {
    AD_BLOCK_HOSTS
        .iter()
        .flat_map(|h| [format!("MAP {h} ~NOTFOUND"), format!("MAP *.{h} ~NOTFOUND")])
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Stealth ──────────────────────────────────────────────────────────────────

/// Injected before every document load.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', {get: () => undefined});
Object.defineProperty(navigator, 'languages', {get: () => ['en-US', 'en']});
Object.defineProperty(navigator, 'plugins', {get: () => [1, 2, 3, 4, 5]});
if (!window.chrome) { window.chrome = { runtime: {} }; }
const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
    window.navigator.permissions.query = (parameters) =>
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters);
}
"#;

// ── Launch configuration ─────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct LaunchOptions {
    pub executable: Option<String>,
    pub headless: bool,
    pub slow_mo: Duration,
    pub user_data_dir: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub timeouts: Timeouts,
}

impl LaunchOptions {
    pub fn from_config(cfg: &ScoutConfig) -> Self {
        Self {
            executable: cfg.chrome_executable_override(),
            headless: cfg.resolve_headless(),
            slow_mo: cfg.resolve_slow_mo(),
            user_data_dir: cfg.resolve_user_data_dir(),
            width: 1920,
            height: 1080,
            timeouts: cfg.timeouts.resolve(),
        }
    }
}

/// Build a `BrowserConfig` with stealth defaults.
///
/// Flags chosen for:
/// * Compatibility with CI / restricted environments (`--no-sandbox`, `--disable-dev-shm-usage`).
/// * Stealth: `--disable-blink-features=AutomationControlled` hides the
///   `navigator.webdriver` flag; UA is randomly drawn from `DESKTOP_USER_AGENTS`.
/// * Quiet networks: ad/tracker hosts are unresolvable so network-idle settles.
pub fn build_browser_config(exe: &str, opts: &LaunchOptions) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: opts.width,
            height: opts.height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(opts.width, opts.height)
        .request_timeout(opts.timeouts.navigation)
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--ignore-certificate-errors")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua))
        .arg(format!("--host-resolver-rules={}", host_resolver_rules()));

    if !opts.headless {
        builder = builder.with_head();
    }
    if let Some(dir) = &opts.user_data_dir {
        builder = builder.user_data_dir(dir);
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// The running browser process and its CDP event pump.
pub struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserHandle {
    /// Close the browser and stop the event pump.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error (non-fatal): {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Browser wait error (non-fatal): {}", e);
        }
        self.handler_task.abort();
        info!("🛑 Browser shut down");
    }
}

/// Launch a browser, open the single working tab, and wrap it in a
/// [`ChromeSession`].
pub async fn launch(opts: &LaunchOptions) -> Result<(BrowserHandle, ChromeSession)> {
    let exe = opts
        .executable
        .clone()
        .or_else(find_chrome_executable)
        .ok_or_else(|| anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE."))?;

    info!(
        "🚀 Launching browser ({}), headless={}, slow_mo={:?}",
        exe, opts.headless, opts.slow_mo
    );
    let config = build_browser_config(&exe, opts)?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    });

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| anyhow!("Failed to open tab: {}", e))?;

    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
        .await
        .map_err(|e| anyhow!("Failed to inject stealth script: {}", e))?;

    Ok((
        BrowserHandle {
            browser,
            handler_task,
        },
        ChromeSession::new(page, opts.slow_mo, opts.timeouts),
    ))
}

// ── Network idle ─────────────────────────────────────────────────────────────

/// Wait until the page network goes idle: `document.readyState` is complete and
/// no new resource entries appeared for `quiet`. Fails with `NavigationTimeout`
/// when that does not happen within `timeout`.
///
/// Polls `performance.getEntriesByType("resource").length` every 100 ms,
/// a networkidle heuristic that works without CDP Network events.
pub async fn wait_until_stable(
    page: &Page,
    quiet: Duration,
    timeout: Duration,
    action: &str,
) -> ScoutResult<()> {
    let poll = Duration::from_millis(100);
    let start = Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = Instant::now();

    loop {
        if start.elapsed() >= timeout {
            return Err(ScoutError::navigation_timeout(action, timeout));
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready_complete: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready_complete || count != last_count {
            last_count = count;
            stable_since = Instant::now();
        } else if stable_since.elapsed() >= quiet {
            debug!(
                "{}: network idle after {}ms ({} resources)",
                action,
                start.elapsed().as_millis(),
                count
            );
            return Ok(());
        }

        tokio::time::sleep(poll).await;
    }
}

// ── Session handle ───────────────────────────────────────────────────────────

fn browser_err(e: impl std::fmt::Display) -> ScoutError {
    ScoutError::Browser(e.to_string())
}

/// JSON-quote a value for interpolation into an evaluated script.
fn js_str(s: &str) -> String {
    Value::from(s).to_string()
}

/// One CDP page driven as the portal session.
pub struct ChromeSession {
    page: Page,
    slow_mo: Duration,
    timeouts: Timeouts,
}

impl ChromeSession {
    pub fn new(page: Page, slow_mo: Duration, timeouts: Timeouts) -> Self {
        Self {
            page,
            slow_mo,
            timeouts,
        }
    }

    /// Slow-motion delay applied before every input action.
    async fn pace(&self) {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }
    }

    async fn eval_json(&self, script: String) -> ScoutResult<Value> {
        let result = self.page.evaluate(script).await.map_err(browser_err)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl SessionHandle for ChromeSession {
    async fn goto(&self, url: &str) -> ScoutResult<()> {
        let timeout = self.timeouts.navigation;
        let start = Instant::now();
        debug!("goto {}", url);
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(browser_err(e)),
            Err(_) => return Err(ScoutError::navigation_timeout(format!("goto {url}"), timeout)),
        }
        wait_until_stable(
            &self.page,
            self.timeouts.network_idle_quiet,
            timeout.saturating_sub(start.elapsed()),
            &format!("goto {url}"),
        )
        .await
    }

    async fn exists(&self, selector: &str) -> ScoutResult<bool> {
        let script = format!("document.querySelector({}) !== null", js_str(selector));
        Ok(self.eval_json(script).await?.as_bool().unwrap_or(false))
    }

    async fn text_content(&self, selector: &str) -> ScoutResult<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.textContent : null; }})()",
            js_str(selector)
        );
        Ok(self.eval_json(script).await?.as_str().map(str::to_string))
    }

    async fn all_text_content(&self, selector: &str) -> ScoutResult<Vec<String>> {
        let script = format!(
            "Array.from(document.querySelectorAll({}), el => el.textContent || '')",
            js_str(selector)
        );
        serde_json::from_value(self.eval_json(script).await?).map_err(browser_err)
    }

    async fn all_attributes(&self, selector: &str, attr: &str) -> ScoutResult<Vec<Option<String>>> {
        let script = format!(
            "Array.from(document.querySelectorAll({}), el => el.getAttribute({}))",
            js_str(selector),
            js_str(attr)
        );
        serde_json::from_value(self.eval_json(script).await?).map_err(browser_err)
    }

    async fn outer_html(&self, selector: &str) -> ScoutResult<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.outerHTML : null; }})()",
            js_str(selector)
        );
        Ok(self.eval_json(script).await?.as_str().map(str::to_string))
    }

    async fn type_text(&self, selector: &str, text: &str) -> ScoutResult<()> {
        self.pace().await;
        let el = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| ScoutError::element_not_found(selector, Duration::ZERO))?;
        el.click().await.map_err(browser_err)?;
        el.type_str(text).await.map_err(browser_err)?;
        Ok(())
    }

    async fn click_nth(&self, selector: &str, index: usize) -> ScoutResult<()> {
        self.pace().await;
        let elements = self.page.find_elements(selector).await.map_err(browser_err)?;
        let el = elements
            .get(index)
            .ok_or_else(|| ScoutError::element_not_found(format!("{selector} [#{index}]"), Duration::ZERO))?;
        debug!("click {} [#{}]", selector, index);
        el.click().await.map_err(browser_err)?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> ScoutResult<()> {
        self.pace().await;
        let script = format!(
            r#"(() => {{
                const sel = document.querySelector({s});
                if (!sel) return false;
                const opt = Array.from(sel.options || []).find(o => o.value === {v});
                if (!opt) return false;
                sel.value = opt.value;
                sel.dispatchEvent(new Event('input', {{ bubbles: true }}));
                sel.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            s = js_str(selector),
            v = js_str(value)
        );
        if self.eval_json(script).await?.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(ScoutError::element_not_found(
                format!("{selector} option[value=\"{value}\"]"),
                Duration::ZERO,
            ))
        }
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> ScoutResult<()> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(browser_err(e)),
            Err(_) => return Err(ScoutError::navigation_timeout("wait_for_navigation", timeout)),
        }
        wait_until_stable(
            &self.page,
            self.timeouts.network_idle_quiet,
            timeout.saturating_sub(start.elapsed()),
            "wait_for_navigation",
        )
        .await
    }
}
