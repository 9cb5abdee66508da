//! Result normalizer: submission text → timestamp + relative description,
//! and the final report ordering.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::core::error::{ScoutError, ScoutResult};
use crate::core::types::{Course, Student, SubmissionRecord};

pub const INVALID_DATE: &str = "Invalid date";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%B %d, %Y %I:%M %p",
    "%b %d, %Y %H:%M",
    "%B %d, %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%b %d, %Y", "%B %d, %Y"];

const WEEKDAYS: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "mon", "tue",
    "tues", "wed", "thu", "thur", "thurs", "fri", "sat", "sun",
];

/// Collapse whitespace, drop a leading weekday name and a joining " at ".
fn clean(raw: &str) -> String {
    let mut s = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some((first, rest)) = s.split_once(", ") {
        if WEEKDAYS.contains(&first.to_ascii_lowercase().as_str()) {
            s = rest.to_string();
        }
    }
    s.replace(" at ", " ")
}

/// Parse portal date text. Values with an explicit offset are taken as-is;
/// naive values are read in `tz`.
pub fn parse_submission_date(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let s = clean(raw);
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(&s) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(&s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(&s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    // DST fold: earliest. DST gap: read with the offset in force before the
    // transition, which lands just past the gap.
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => Some(dt.with_timezone(&Utc)),
        None => {
            let before = tz
                .offset_from_utc_datetime(&(naive - Duration::days(1)))
                .fix()
                .local_minus_utc();
            Some(Utc.from_utc_datetime(&(naive - Duration::seconds(i64::from(before)))))
        }
    }
}

/// Human-relative description of `then` as seen from `now`, using the same
/// buckets as moment.js `fromNow()`.
pub fn from_now(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff_ms = (then - now).num_milliseconds();
    let abs_ms = diff_ms.unsigned_abs() as f64;

    let seconds = (abs_ms / 1_000.0).round();
    let minutes = (abs_ms / 60_000.0).round();
    let hours = (abs_ms / 3_600_000.0).round();
    let days_exact = abs_ms / 86_400_000.0;
    let days = days_exact.round();
    let months_exact = days_exact * 4800.0 / 146_097.0;
    let months = months_exact.round();
    let years = (months_exact / 12.0).round();

    let phrase = if seconds <= 44.0 {
        "a few seconds".to_string()
    } else if minutes <= 1.0 {
        "a minute".to_string()
    } else if minutes < 45.0 {
        format!("{minutes} minutes")
    } else if hours <= 1.0 {
        "an hour".to_string()
    } else if hours < 22.0 {
        format!("{hours} hours")
    } else if days <= 1.0 {
        "a day".to_string()
    } else if days < 26.0 {
        format!("{days} days")
    } else if months <= 1.0 {
        "a month".to_string()
    } else if months < 11.0 {
        format!("{months} months")
    } else if years <= 1.0 {
        "a year".to_string()
    } else {
        format!("{years} years")
    };

    if diff_ms > 0 {
        format!("in {phrase}")
    } else {
        format!("{phrase} ago")
    }
}

/// Turns raw gradebook text into [`SubmissionRecord`]s.
#[derive(Clone, Copy, Debug)]
pub struct Normalizer {
    tz: Tz,
    strict: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(chrono_tz::UTC, false)
    }
}

impl Normalizer {
    /// `strict`: fail with `DateParseFailure` instead of emitting a record
    /// without a timestamp.
    pub fn new(tz: Tz, strict: bool) -> Self {
        Self { tz, strict }
    }

    pub fn normalize(
        &self,
        student: &Student,
        course: &Course,
        raw: &str,
        now: DateTime<Utc>,
    ) -> ScoutResult<SubmissionRecord> {
        let parsed = parse_submission_date(raw, self.tz);
        if parsed.is_none() {
            if self.strict {
                return Err(ScoutError::DateParseFailure {
                    raw: raw.to_string(),
                });
            }
            warn!(
                "unparseable submission date {:?} for {} / {}; it will sort last",
                raw, student.name, course.name
            );
        }
        Ok(SubmissionRecord {
            student_name: student.name.clone(),
            course_name: course.name.clone(),
            last_submitted_raw: raw.to_string(),
            last_submitted_relative: parsed
                .map(|dt| from_now(dt, now))
                .unwrap_or_else(|| INVALID_DATE.to_string()),
            timestamp: parsed.map(|dt| dt.timestamp()),
        })
    }
}

/// Ascending by timestamp; records without one go last. Stable, so equal
/// timestamps keep traversal order.
pub fn sort_records(records: &mut [SubmissionRecord]) {
    records.sort_by_key(|r| (r.timestamp.is_none(), r.timestamp));
}
