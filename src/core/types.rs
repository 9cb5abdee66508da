use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A student the observer account can switch to. `id` is the value of the
/// matching `<option>` in the portal's student selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub name: String,
    pub id: String,
}

impl Student {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// A course discovered from the per-student course dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub name: String,
    pub url: String,
}

/// One (student, course) observation. Field names match the report format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    #[serde(rename = "name")]
    pub student_name: String,
    #[serde(rename = "course")]
    pub course_name: String,
    #[serde(rename = "lastSubmitted")]
    pub last_submitted_raw: String,
    #[serde(rename = "fromNow")]
    pub last_submitted_relative: String,
    /// Seconds since the Unix epoch; `None` when the raw text is not a date.
    #[serde(rename = "ts")]
    pub timestamp: Option<i64>,
}

/// A parsed data row: lower-cased header name → cell HTML, in column order.
pub type TableRow = IndexMap<String, String>;

/// Report-pane enrollment table for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentEnrollment {
    pub name: String,
    pub rows: Vec<TableRow>,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
