//! Per-student enrollment report, read from the report pane table.

use tracing::info;

use crate::core::error::ScoutResult;
use crate::core::types::{Credentials, Student, StudentEnrollment};
use crate::portal::navigator::Navigator;
use crate::scraping::session::SessionHandle;

pub struct EnrollmentScraper<S> {
    navigator: Navigator<S>,
}

impl<S: SessionHandle> EnrollmentScraper<S> {
    pub fn new(navigator: Navigator<S>) -> Self {
        Self { navigator }
    }

    pub async fn run(
        &mut self,
        credentials: &Credentials,
        students: &[Student],
    ) -> ScoutResult<Vec<StudentEnrollment>> {
        self.navigator.login(credentials).await?;

        let mut report = Vec::with_capacity(students.len());
        for student in students {
            self.navigator.goto_dashboard().await?;
            self.navigator.select_student(student).await?;
            self.navigator.goto_student_report().await?;
            let rows = self.navigator.enrollment_table().await?;
            info!("🗂️ {}: {} enrollment rows", student.name, rows.len());
            report.push(StudentEnrollment {
                name: student.name.clone(),
                rows,
            });
        }
        Ok(report)
    }
}
