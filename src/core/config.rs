use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{ScoutError, ScoutResult};
use crate::core::types::{Credentials, Student};
use crate::portal::selectors::PortalSelectors;

// ---------------------------------------------------------------------------
// ScoutConfig: file-based config loader (gradebook-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "GRADEBOOK_SCOUT_CONFIG";
pub const ENV_HEADLESS: &str = "HEADLESS";
pub const ENV_SLOWMO: &str = "SLOWMO";
pub const ENV_USERNAME: &str = "FLVS_USERNAME";
pub const ENV_PASSWORD: &str = "FLVS_PASSWORD";
pub const ENV_STUDENTS: &str = "SCOUT_STUDENTS";
pub const ENV_TIMEZONE: &str = "SCOUT_TIMEZONE";
pub const ENV_LINGER_SECS: &str = "SCOUT_LINGER_SECS";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

pub const DEFAULT_LOGIN_URL: &str = "https://login.flvs.net/";
pub const DEFAULT_DASHBOARD_URL: &str = "https://vsa.flvs.net";

/// Where the portal lives and how its pages are shaped.
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PortalConfig {
    pub login_url: String,
    pub dashboard_url: String,
    pub selectors: PortalSelectors,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
            selectors: PortalSelectors::default(),
        }
    }
}

/// Wait ceilings, in milliseconds as they appear in the JSON file.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct TimeoutConfig {
    /// Selector waits. Default: 30 000.
    pub element_ms: Option<u64>,
    /// Navigation + network-idle settle. Default: 30 000.
    pub navigation_ms: Option<u64>,
    /// Quiet period that counts as network idle. Default: 500.
    pub network_idle_quiet_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub element: Duration,
    pub navigation: Duration,
    pub network_idle_quiet: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element: Duration::from_secs(30),
            navigation: Duration::from_secs(30),
            network_idle_quiet: Duration::from_millis(500),
        }
    }
}

impl TimeoutConfig {
    pub fn resolve(&self) -> Timeouts {
        let d = Timeouts::default();
        Timeouts {
            element: self
                .element_ms
                .map(Duration::from_millis)
                .unwrap_or(d.element),
            navigation: self
                .navigation_ms
                .map(Duration::from_millis)
                .unwrap_or(d.navigation),
            network_idle_quiet: self
                .network_idle_quiet_ms
                .map(Duration::from_millis)
                .unwrap_or(d.network_idle_quiet),
        }
    }
}

/// Retry budget for idempotent transitions.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct RetryConfig {
    pub initial_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    /// Total time spent retrying one transition. `0` disables retries.
    pub max_elapsed_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(1),
            max_elapsed: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.max_elapsed.is_zero()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn resolve(&self) -> RetryPolicy {
        let d = RetryPolicy::default();
        RetryPolicy {
            initial_interval: self
                .initial_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(d.initial_interval),
            max_interval: self
                .max_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(d.max_interval),
            max_elapsed: self
                .max_elapsed_ms
                .map(Duration::from_millis)
                .unwrap_or(d.max_elapsed),
        }
    }
}

/// Top-level config loaded from `gradebook-scout.json`.
///
/// Every field is optional; unset fields fall back to environment variables
/// and then to built-in defaults through the `resolve_*` methods.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct ScoutConfig {
    pub headless: Option<bool>,
    pub slow_mo_ms: Option<u64>,
    /// Never logged.
    pub username: Option<String>,
    /// Never logged.
    pub password: Option<String>,
    pub students: Vec<Student>,
    pub portal: PortalConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    /// IANA zone used for submission dates that carry no offset. Default: UTC.
    pub timezone: Option<String>,
    /// Fail the run on an unparseable submission date instead of sorting it last.
    pub strict_dates: bool,
    /// Seconds to keep the browser open after the report is printed. Default: 60.
    pub linger_secs: Option<u64>,
    pub chrome_executable: Option<String>,
    pub user_data_dir: Option<String>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `1/true/yes/on` → true, `0/false/no/off` → false, anything else → None.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `Name:id,Name:id` into a student list. Whitespace around names and
/// ids is ignored; empty entries are skipped.
pub fn parse_student_list(value: &str) -> ScoutResult<Vec<Student>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, id) = entry.rsplit_once(':').ok_or_else(|| {
                ScoutError::Config(format!("student entry `{entry}` is not `Name:id`"))
            })?;
            let (name, id) = (name.trim(), id.trim());
            if name.is_empty() || id.is_empty() {
                return Err(ScoutError::Config(format!(
                    "student entry `{entry}` has an empty name or id"
                )));
            }
            Ok(Student::new(name, id))
        })
        .collect()
}

impl ScoutConfig {
    /// Headless: JSON field → `HEADLESS` env var → `false` (a visible window,
    /// matching how the report is usually run by hand).
    pub fn resolve_headless(&self) -> bool {
        if let Some(b) = self.headless {
            return b;
        }
        env_nonempty(ENV_HEADLESS)
            .and_then(|v| parse_flag(&v))
            .unwrap_or(false)
    }

    /// Delay inserted before every input action: JSON field → `SLOWMO` → 0.
    pub fn resolve_slow_mo(&self) -> Duration {
        let ms = self
            .slow_mo_ms
            .or_else(|| env_nonempty(ENV_SLOWMO).and_then(|v| v.parse().ok()))
            .unwrap_or(0);
        Duration::from_millis(ms)
    }

    /// Credentials: JSON fields → `FLVS_USERNAME` / `FLVS_PASSWORD`.
    pub fn resolve_credentials(&self) -> ScoutResult<Credentials> {
        let username = self
            .username
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| env_nonempty(ENV_USERNAME))
            .ok_or_else(|| ScoutError::Config(format!("{ENV_USERNAME} is not set")))?;
        let password = self
            .password
            .clone()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var(ENV_PASSWORD).ok().filter(|v| !v.is_empty()))
            .ok_or_else(|| ScoutError::Config(format!("{ENV_PASSWORD} is not set")))?;
        Ok(Credentials { username, password })
    }

    /// Students: JSON `students` array → `SCOUT_STUDENTS` env var. An empty
    /// list is a configuration error.
    pub fn resolve_students(&self) -> ScoutResult<Vec<Student>> {
        let students = if !self.students.is_empty() {
            self.students.clone()
        } else if let Some(raw) = env_nonempty(ENV_STUDENTS) {
            parse_student_list(&raw)?
        } else {
            Vec::new()
        };
        if students.is_empty() {
            return Err(ScoutError::Config(format!(
                "no students configured (set `students` in gradebook-scout.json or {ENV_STUDENTS})"
            )));
        }
        Ok(students)
    }

    /// Timezone: JSON field → `SCOUT_TIMEZONE` → UTC.
    pub fn resolve_timezone(&self) -> ScoutResult<chrono_tz::Tz> {
        let name = self
            .timezone
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| env_nonempty(ENV_TIMEZONE));
        match name {
            Some(n) => n
                .trim()
                .parse::<chrono_tz::Tz>()
                .map_err(|e| ScoutError::Config(format!("unknown timezone `{n}`: {e}"))),
            None => Ok(chrono_tz::UTC),
        }
    }

    /// Linger: JSON field → `SCOUT_LINGER_SECS` → 60 s.
    pub fn resolve_linger(&self) -> Duration {
        let secs = self
            .linger_secs
            .or_else(|| env_nonempty(ENV_LINGER_SECS).and_then(|v| v.parse().ok()))
            .unwrap_or(60);
        Duration::from_secs(secs)
    }

    /// Browser executable override: JSON field → `CHROME_EXECUTABLE`, only when
    /// the path exists. Otherwise auto-discovery applies.
    pub fn chrome_executable_override(&self) -> Option<String> {
        let p = self
            .chrome_executable
            .clone()
            .or_else(|| env_nonempty(ENV_CHROME_EXECUTABLE))?;
        let p = p.trim();
        if !p.is_empty() && Path::new(p).exists() {
            Some(p.to_string())
        } else {
            None
        }
    }

    /// Browser profile directory: JSON field → `~/.gradebook-scout/profile`.
    pub fn resolve_user_data_dir(&self) -> Option<PathBuf> {
        if let Some(d) = self.user_data_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return Some(PathBuf::from(d));
        }
        dirs::home_dir().map(|home| home.join(".gradebook-scout").join("profile"))
    }
}

/// Load `gradebook-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `GRADEBOOK_SCOUT_CONFIG` env var path
/// 2. `explicit` (the `--config` argument)
/// 3. `./gradebook-scout.json`
/// 4. `../gradebook-scout.json`
///
/// Missing file → `ScoutConfig::default()` (all env-var fallbacks apply).
/// Parse error → log a warning, return `ScoutConfig::default()`.
pub fn load_scout_config(explicit: Option<&Path>) -> ScoutConfig {
    let mut candidates: Vec<PathBuf> = vec![
        PathBuf::from("gradebook-scout.json"),
        PathBuf::from("../gradebook-scout.json"),
    ];
    if let Some(p) = explicit {
        candidates.insert(0, p.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match serde_json::from_str::<ScoutConfig>(&contents) {
            Ok(cfg) => {
                tracing::info!("gradebook-scout.json loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "gradebook-scout.json parse error at {}: {} (using defaults)",
                    path.display(),
                    e
                );
                ScoutConfig::default()
            }
        };
    }

    ScoutConfig::default()
}
