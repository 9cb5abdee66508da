pub mod core;
pub mod portal;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use crate::core::config::{load_scout_config, ScoutConfig};
pub use crate::core::error::{ScoutError, ScoutResult};
pub use crate::core::types::*;
pub use crate::portal::navigator::{Navigator, PortalState};
pub use crate::scraping::session::SessionHandle;
pub use crate::tools::enrollment::EnrollmentScraper;
pub use crate::tools::submissions::SubmissionScraper;
