//! The portal page-state graph.
//!
//! The portal keeps the observed student and course server-side, so every
//! transition here both moves the browser and changes what later pages show.
//! [`Navigator`] tracks that state explicitly and refuses transitions whose
//! precondition does not hold.

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use std::fmt;
use std::future::Future;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::config::{PortalConfig, RetryPolicy, Timeouts};
use crate::core::error::{ScoutError, ScoutResult};
use crate::core::types::{Course, Credentials, Student, TableRow};
use crate::scraping::extract;
use crate::scraping::session::SessionHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalState {
    LoggedOut,
    Dashboard,
    StudentSelected { student_id: String },
    CourseSelected { url: Option<String> },
    Gradebook { url: Option<String> },
    Report,
}

impl fmt::Display for PortalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalState::LoggedOut => write!(f, "logged out"),
            PortalState::Dashboard => write!(f, "on the dashboard"),
            PortalState::StudentSelected { student_id } => {
                write!(f, "on the dashboard with student {student_id} selected")
            }
            PortalState::CourseSelected { url: Some(u) } => write!(f, "on course {u}"),
            PortalState::CourseSelected { url: None } => write!(f, "on the first course"),
            PortalState::Gradebook { .. } => write!(f, "on a gradebook"),
            PortalState::Report => write!(f, "on the student report"),
        }
    }
}

/// Drives one portal session through its page states.
pub struct Navigator<S> {
    session: S,
    portal: PortalConfig,
    timeouts: Timeouts,
    retry: RetryPolicy,
    state: PortalState,
}

impl<S: SessionHandle> Navigator<S> {
    pub fn new(session: S, portal: PortalConfig, timeouts: Timeouts, retry: RetryPolicy) -> Self {
        Self {
            session,
            portal,
            timeouts,
            retry,
            state: PortalState::LoggedOut,
        }
    }

    pub fn state(&self) -> &PortalState {
        &self.state
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    fn invalid(&self, action: &'static str) -> ScoutError {
        ScoutError::InvalidState {
            action,
            state: self.state.to_string(),
        }
    }

    /// Run an idempotent step under the retry budget. Only transient errors
    /// are retried.
    async fn with_retry<T, F, Fut>(&self, action: &str, op: F) -> ScoutResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ScoutResult<T>>,
    {
        if !self.retry.is_enabled() {
            return op().await;
        }
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry.initial_interval)
            .with_max_interval(self.retry.max_interval)
            .with_max_elapsed_time(Some(self.retry.max_elapsed))
            .build();
        let op = &op;
        retry(policy, move || async move {
            op().await.map_err(|e| {
                if e.is_transient() {
                    warn!("{} failed ({}), retrying", action, e);
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    /// Navigate and settle, as one retriable unit.
    async fn goto_url(&self, url: &str) -> ScoutResult<()> {
        let session = &self.session;
        self.with_retry(&format!("goto {url}"), move || session.goto(url))
            .await
    }

    /// Resolve a dropdown href against the dashboard URL.
    fn resolve_url(&self, href: &str) -> String {
        Url::parse(&self.portal.dashboard_url)
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }

    /// `LoggedOut` → `Dashboard`. A post-submit navigation that never settles
    /// is reported as `AuthenticationFailure`.
    pub async fn login(&mut self, credentials: &Credentials) -> ScoutResult<()> {
        if self.state != PortalState::LoggedOut {
            return Err(self.invalid("login"));
        }
        let sel = self.portal.selectors.clone();
        let t = self.timeouts;

        info!("🔐 Logging in as {}", credentials.username);
        self.goto_url(&self.portal.login_url).await?;

        extract::wait_for_selector(&self.session, &sel.username_field, t.element).await?;
        self.session
            .type_text(&sel.username_field, &credentials.username)
            .await?;
        self.session
            .type_text(&sel.password_field, &credentials.password)
            .await?;
        self.session.click(&sel.login_submit).await?;

        match self.session.wait_for_navigation(t.navigation).await {
            Ok(()) => {}
            Err(ScoutError::NavigationTimeout { .. }) => return Err(ScoutError::AuthenticationFailure),
            Err(e) => return Err(e),
        }
        self.state = PortalState::Dashboard;
        info!("✅ Logged in");
        Ok(())
    }

    /// Any state → `Dashboard`. The server-side student selection survives.
    pub async fn goto_dashboard(&mut self) -> ScoutResult<()> {
        debug!("→ dashboard");
        self.goto_url(&self.portal.dashboard_url).await?;
        self.state = PortalState::Dashboard;
        Ok(())
    }

    /// `Dashboard`/`StudentSelected` → `StudentSelected(student)`.
    ///
    /// When the status indicator already names the student this is a no-op:
    /// no selection is made and no navigation is awaited.
    pub async fn select_student(&mut self, student: &Student) -> ScoutResult<()> {
        if !matches!(
            self.state,
            PortalState::Dashboard | PortalState::StudentSelected { .. }
        ) {
            return Err(self.invalid("select_student"));
        }
        let sel = &self.portal.selectors;
        let t = self.timeouts;
        let session = &self.session;

        self.with_retry(&format!("select student {}", student.name), move || async move {
            if extract::contains_text(session, &sel.status_indicator, &student.name, t.element)
                .await?
            {
                debug!("student {} already selected", student.name);
                return Ok(());
            }
            extract::wait_for_selector(session, &sel.student_select, t.element).await?;
            session.select_option(&sel.student_select, &student.id).await?;
            session.wait_for_navigation(t.navigation).await
        })
        .await?;

        info!("👤 Student selected: {}", student.name);
        self.state = PortalState::StudentSelected {
            student_id: student.id.clone(),
        };
        Ok(())
    }

    /// `StudentSelected` → `CourseSelected(first)`.
    ///
    /// Priming step: the portal renders the per-student course dropdown only
    /// once some course context exists, so this must run before
    /// [`Navigator::enumerate_courses`].
    pub async fn select_first_course(&mut self) -> ScoutResult<()> {
        if !matches!(self.state, PortalState::StudentSelected { .. }) {
            return Err(self.invalid("select_first_course"));
        }
        let sel = &self.portal.selectors;
        let t = self.timeouts;

        extract::wait_for_selector(&self.session, &sel.dashboard, t.element).await?;
        extract::wait_for_selector(&self.session, &sel.course_tile, t.element).await?;
        self.session.click(&sel.course_tile).await?;
        self.session.wait_for_navigation(t.navigation).await?;

        self.state = PortalState::CourseSelected { url: None };
        Ok(())
    }

    /// Read the course dropdown. Links and labels are paired by position and
    /// must agree in number. Leaves the state unchanged.
    pub async fn enumerate_courses(&self) -> ScoutResult<Vec<Course>> {
        if !matches!(self.state, PortalState::CourseSelected { .. }) {
            return Err(self.invalid("enumerate_courses"));
        }
        let sel = &self.portal.selectors;

        extract::wait_for_selector(&self.session, &sel.course_dropdown, self.timeouts.element)
            .await?;
        let links = self
            .session
            .all_attributes(&sel.course_links, "href")
            .await?;
        let labels: Vec<String> = self
            .session
            .all_text_content(&sel.course_labels)
            .await?
            .iter()
            .map(|t| t.trim().lines().next().unwrap_or("").trim().to_string())
            .collect();

        if links.len() != labels.len() {
            return Err(ScoutError::DropdownMismatch {
                links: links.len(),
                labels: labels.len(),
            });
        }

        let courses = links
            .into_iter()
            .zip(labels)
            .map(|(href, name)| match href.filter(|h| !h.trim().is_empty()) {
                Some(h) => Ok(Course {
                    url: self.resolve_url(h.trim()),
                    name,
                }),
                None => Err(ScoutError::MissingCourseUrl { label: name }),
            })
            .collect::<ScoutResult<Vec<_>>>()?;

        debug!("found {} courses", courses.len());
        Ok(courses)
    }

    /// Any state → `CourseSelected(course)`.
    pub async fn goto_course(&mut self, course: &Course) -> ScoutResult<()> {
        debug!("→ course {} ({})", course.name, course.url);
        self.goto_url(&course.url).await?;
        self.state = PortalState::CourseSelected {
            url: Some(course.url.clone()),
        };
        Ok(())
    }

    /// `CourseSelected` → `Gradebook`, via the first top-nav link whose text
    /// contains the gradebook label. Returns `false` (state unchanged) when the
    /// course has no such link.
    pub async fn goto_gradebook(&mut self) -> ScoutResult<bool> {
        let url = match &self.state {
            PortalState::CourseSelected { url } => url.clone(),
            _ => return Err(self.invalid("goto_gradebook")),
        };
        let sel = &self.portal.selectors;
        let t = self.timeouts;

        extract::wait_for_selector(&self.session, &sel.top_nav, t.element).await?;
        let items = self.session.all_text_content(&sel.top_nav_links).await?;
        let Some(index) = items
            .iter()
            .position(|item| item.contains(&sel.gradebook_label))
        else {
            return Ok(false);
        };

        self.session.click_nth(&sel.top_nav_links, index).await?;
        self.session.wait_for_navigation(t.navigation).await?;
        self.state = PortalState::Gradebook { url };
        Ok(true)
    }

    /// `Dashboard`/`StudentSelected` → `Report`, through the status-bar link.
    pub async fn goto_student_report(&mut self) -> ScoutResult<()> {
        if !matches!(
            self.state,
            PortalState::Dashboard | PortalState::StudentSelected { .. }
        ) {
            return Err(self.invalid("goto_student_report"));
        }
        let sel = &self.portal.selectors;
        let t = self.timeouts;

        extract::wait_for_selector(&self.session, &sel.report_link, t.element).await?;
        self.session.click(&sel.report_link).await?;
        self.session.wait_for_navigation(t.navigation).await?;
        self.state = PortalState::Report;
        Ok(())
    }

    /// Parse the report pane's enrollment table.
    pub async fn enrollment_table(&self) -> ScoutResult<Vec<TableRow>> {
        if self.state != PortalState::Report {
            return Err(self.invalid("enrollment_table"));
        }
        extract::parse_table(
            &self.session,
            &self.portal.selectors.enrollment_table,
            self.timeouts.element,
        )
        .await
    }

    /// Trimmed text of the gradebook's last-submitted element.
    pub async fn last_submitted(&self) -> ScoutResult<String> {
        if !matches!(self.state, PortalState::Gradebook { .. }) {
            return Err(self.invalid("last_submitted"));
        }
        let text = extract::read_text(
            &self.session,
            &self.portal.selectors.last_submitted,
            self.timeouts.element,
        )
        .await?;
        Ok(text.trim().to_string())
    }
}
