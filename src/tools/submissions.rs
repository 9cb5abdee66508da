//! Scrape orchestrator: every student × every course they are enrolled in,
//! one gradebook visit each.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::core::error::ScoutResult;
use crate::core::types::{Credentials, Student, SubmissionRecord};
use crate::portal::navigator::Navigator;
use crate::scraping::session::SessionHandle;
use crate::tools::normalize::{sort_records, Normalizer};

pub struct SubmissionScraper<S> {
    navigator: Navigator<S>,
    normalizer: Normalizer,
}

impl<S: SessionHandle> SubmissionScraper<S> {
    pub fn new(navigator: Navigator<S>, normalizer: Normalizer) -> Self {
        Self {
            navigator,
            normalizer,
        }
    }

    /// Log in, walk every student, and return the report sorted by timestamp.
    /// Any unrecovered failure aborts the whole run.
    pub async fn run(
        &mut self,
        credentials: &Credentials,
        students: &[Student],
    ) -> ScoutResult<Vec<SubmissionRecord>> {
        self.navigator.login(credentials).await?;
        self.navigator.goto_dashboard().await?;

        let mut records = self.scrape_students(students).await?;
        sort_records(&mut records);
        info!("📋 {} submission records collected", records.len());
        Ok(records)
    }

    /// Walk students in declaration order, courses in dropdown order. Expects
    /// the navigator to be on the dashboard; returns records in traversal order.
    pub async fn scrape_students(
        &mut self,
        students: &[Student],
    ) -> ScoutResult<Vec<SubmissionRecord>> {
        let mut records = Vec::new();
        let mut seen: HashMap<(String, String), String> = HashMap::new();

        for student in students {
            self.scrape_student(student, &mut seen, &mut records).await?;
            self.navigator.goto_dashboard().await?;
        }
        Ok(records)
    }

    async fn scrape_student(
        &mut self,
        student: &Student,
        seen: &mut HashMap<(String, String), String>,
        records: &mut Vec<SubmissionRecord>,
    ) -> ScoutResult<()> {
        self.navigator.select_student(student).await?;
        self.navigator.select_first_course().await?;
        let courses = self.navigator.enumerate_courses().await?;
        info!("📚 {}: {} courses", student.name, courses.len());

        for course in &courses {
            let key = (student.name.clone(), course.name.clone());
            if let Some(visited) = seen.get(&key) {
                if *visited == course.url {
                    debug!("skipping repeated course {} for {}", course.name, student.name);
                } else {
                    warn!(
                        "skipping {} ({}) for {}: a course with that name was already read from {}",
                        course.name, course.url, student.name, visited
                    );
                }
                continue;
            }

            self.navigator.goto_course(course).await?;
            if !self.navigator.goto_gradebook().await? {
                warn!(
                    "no gradebook link on {} for {}; skipping course",
                    course.name, student.name
                );
                continue;
            }

            let raw = self.navigator.last_submitted().await?;
            let record = self.normalizer.normalize(student, course, &raw, Utc::now())?;
            info!(
                "  {} / {}: {} ({})",
                student.name, course.name, record.last_submitted_raw, record.last_submitted_relative
            );
            seen.insert(key, course.url.clone());
            records.push(record);
        }
        Ok(())
    }
}
