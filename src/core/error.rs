use std::time::Duration;
use thiserror::Error;

/// Every way a portal walk can fail.
///
/// Nothing in the engine swallows these: a failure aborts the run unless the
/// retry layer classifies it as transient and a later attempt succeeds.
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("login did not reach the dashboard (post-submit navigation never settled)")]
    AuthenticationFailure,

    #[error("element `{selector}` did not appear within {timeout:?}")]
    ElementNotFound { selector: String, timeout: Duration },

    #[error("navigation for `{action}` did not settle within {timeout:?}")]
    NavigationTimeout { action: String, timeout: Duration },

    #[error("table `{selector}`: row {row} has {found} cells but the header has {expected}")]
    StructuralMismatch {
        selector: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("table `{selector}`: duplicate header `{name}`")]
    DuplicateHeader { selector: String, name: String },

    #[error("course dropdown has {links} links but {labels} labels")]
    DropdownMismatch { links: usize, labels: usize },

    #[error("course dropdown entry `{label}` has no link target")]
    MissingCourseUrl { label: String },

    #[error("could not parse `{raw}` as a submission date")]
    DateParseFailure { raw: String },

    #[error("`{action}` is not valid while the portal is {state}")]
    InvalidState { action: &'static str, state: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ScoutError {
    pub fn element_not_found(selector: impl Into<String>, timeout: Duration) -> Self {
        ScoutError::ElementNotFound {
            selector: selector.into(),
            timeout,
        }
    }

    pub fn navigation_timeout(action: impl Into<String>, timeout: Duration) -> Self {
        ScoutError::NavigationTimeout {
            action: action.into(),
            timeout,
        }
    }

    /// Transient failures may succeed on a second attempt; everything else
    /// means the site no longer matches the expected layout (or a caller bug).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScoutError::NavigationTimeout { .. } | ScoutError::Browser(_)
        )
    }
}

pub type ScoutResult<T> = std::result::Result<T, ScoutError>;
