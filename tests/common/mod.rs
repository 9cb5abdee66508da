//! Scripted in-memory portal used by the integration tests.
//!
//! It models the parts of the live site the navigator depends on: login
//! redirects, the server-side student selection, the course dropdown that
//! only renders on course pages, and navigations that only happen after a
//! click or a selection.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gradebook_scout::core::config::{PortalConfig, RetryPolicy, Timeouts};
use gradebook_scout::portal::selectors::PortalSelectors;
use gradebook_scout::{Credentials, Navigator, ScoutError, ScoutResult, SessionHandle, Student};

pub const BASE: &str = "https://portal.test";
pub const LOGIN_URL: &str = "https://portal.test/login";
pub const DASHBOARD_URL: &str = "https://portal.test/";
pub const USERNAME: &str = "parent@example.com";
pub const PASSWORD: &str = "correct horse";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn credentials() -> Credentials {
    Credentials {
        username: USERNAME.into(),
        password: PASSWORD.into(),
    }
}

pub fn portal_config() -> PortalConfig {
    PortalConfig {
        login_url: LOGIN_URL.into(),
        dashboard_url: DASHBOARD_URL.into(),
        selectors: PortalSelectors::default(),
    }
}

pub fn timeouts() -> Timeouts {
    Timeouts {
        element: Duration::from_millis(300),
        navigation: Duration::from_millis(300),
        network_idle_quiet: Duration::ZERO,
    }
}

pub fn navigator<S: SessionHandle>(session: S) -> Navigator<S> {
    Navigator::new(session, portal_config(), timeouts(), RetryPolicy::disabled())
}

#[derive(Debug, Clone)]
pub struct MockCourse {
    pub name: String,
    pub href: String,
    pub last_submitted: String,
    pub has_gradebook: bool,
    pub link_href: Option<String>,
}

impl MockCourse {
    pub fn new(name: &str, href: &str, last_submitted: &str) -> Self {
        Self {
            name: name.into(),
            href: href.into(),
            last_submitted: last_submitted.into(),
            has_gradebook: true,
            link_href: Some(href.into()),
        }
    }

    pub fn without_gradebook(mut self) -> Self {
        self.has_gradebook = false;
        self
    }

    /// Render the dropdown anchor with this `href` attribute (`None` omits it).
    pub fn with_link_href(mut self, href: Option<&str>) -> Self {
        self.link_href = href.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone)]
pub struct MockStudent {
    pub name: String,
    pub id: String,
    pub courses: Vec<MockCourse>,
    pub enrollment_html: String,
}

impl MockStudent {
    pub fn new(name: &str, id: &str, courses: Vec<MockCourse>) -> Self {
        let rows: String = courses
            .iter()
            .map(|c| format!("<tr><td>{}</td><td>Active</td></tr>", c.name))
            .collect();
        Self {
            name: name.into(),
            id: id.into(),
            courses,
            enrollment_html: format!(
                r#"<table class="flvs-table"><tr><th>Course Name</th><th>Status</th></tr>{rows}</table>"#
            ),
        }
    }

    pub fn student(&self) -> Student {
        Student::new(self.name.clone(), self.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Page {
    Blank,
    Login,
    Dashboard,
    Course(String),
    Gradebook(String),
    Report,
}

#[derive(Debug)]
struct State {
    students: Vec<MockStudent>,
    page: Page,
    logged_in: bool,
    active: Option<usize>,
    typed: HashMap<String, String>,
    pending: Option<Page>,
    navigation_waits: usize,
    gotos: Vec<String>,
    extra_labels: Vec<String>,
}

impl State {
    fn active_student(&self) -> Option<&MockStudent> {
        self.active.map(|i| &self.students[i])
    }

    fn active_courses(&self) -> &[MockCourse] {
        self.active_student()
            .map(|s| s.courses.as_slice())
            .unwrap_or(&[])
    }

    fn course(&self, href: &str) -> Option<&MockCourse> {
        self.active_courses().iter().find(|c| c.href == href)
    }

    fn nav_items(&self, href: &str) -> Vec<String> {
        let mut items = vec!["Home".to_string()];
        if self.course(href).map(|c| c.has_gradebook).unwrap_or(false) {
            items.push(" Gradebook ".to_string());
        }
        items.push("Messages".to_string());
        items
    }

    fn present(&self, sel: &str) -> bool {
        let s = PortalSelectors::default();
        match &self.page {
            Page::Blank => false,
            Page::Login => [&s.username_field, &s.password_field, &s.login_submit]
                .iter()
                .any(|x| x.as_str() == sel),
            Page::Dashboard => {
                [&s.status_indicator, &s.student_select, &s.dashboard, &s.report_link]
                    .iter()
                    .any(|x| x.as_str() == sel)
                    || (sel == s.course_tile && !self.active_courses().is_empty())
            }
            Page::Course(_) | Page::Gradebook(_) => {
                [
                    &s.status_indicator,
                    &s.course_dropdown,
                    &s.course_links,
                    &s.course_labels,
                    &s.top_nav,
                    &s.top_nav_links,
                ]
                .iter()
                .any(|x| x.as_str() == sel)
                    || (matches!(self.page, Page::Gradebook(_)) && sel == s.last_submitted)
            }
            Page::Report => [&s.status_indicator, &s.report_link, &s.enrollment_table]
                .iter()
                .any(|x| x.as_str() == sel),
        }
    }
}

/// Cheap to clone; clones share one portal.
#[derive(Clone)]
pub struct MockPortal {
    state: Arc<Mutex<State>>,
}

impl MockPortal {
    pub fn new(students: Vec<MockStudent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                students,
                page: Page::Blank,
                logged_in: false,
                active: None,
                typed: HashMap::new(),
                pending: None,
                navigation_waits: 0,
                gotos: Vec::new(),
                extra_labels: Vec::new(),
            })),
        }
    }

    /// Append a dropdown label that has no matching link.
    pub fn with_extra_dropdown_label(self, label: &str) -> Self {
        self.state.lock().unwrap().extra_labels.push(label.into());
        self
    }

    /// Make the portal remember `id` as the observed student, as it would
    /// across sessions.
    pub fn with_active_student(self, id: &str) -> Self {
        {
            let mut st = self.state.lock().unwrap();
            st.active = st.students.iter().position(|s| s.id == id);
        }
        self
    }

    pub fn navigation_waits(&self) -> usize {
        self.state.lock().unwrap().navigation_waits
    }

    pub fn gotos(&self) -> Vec<String> {
        self.state.lock().unwrap().gotos.clone()
    }

    pub fn active_student_name(&self) -> Option<String> {
        let st = self.state.lock().unwrap();
        st.active_student().map(|s| s.name.clone())
    }
}

#[async_trait]
impl SessionHandle for MockPortal {
    async fn goto(&self, url: &str) -> ScoutResult<()> {
        let mut st = self.state.lock().unwrap();
        st.gotos.push(url.to_string());
        st.pending = None;
        st.page = if url == LOGIN_URL || !st.logged_in {
            Page::Login
        } else if url == DASHBOARD_URL {
            Page::Dashboard
        } else {
            match url.strip_prefix(BASE) {
                Some(href) if st.course(href).is_some() => Page::Course(href.to_string()),
                _ => Page::Dashboard,
            }
        };
        Ok(())
    }

    async fn exists(&self, selector: &str) -> ScoutResult<bool> {
        Ok(self.state.lock().unwrap().present(selector))
    }

    async fn text_content(&self, selector: &str) -> ScoutResult<Option<String>> {
        let st = self.state.lock().unwrap();
        if !st.present(selector) {
            return Ok(None);
        }
        let s = PortalSelectors::default();
        let text = if selector == s.status_indicator {
            match st.active_student() {
                Some(student) => format!("Observing: {} | Report", student.name),
                None => "Select a student".to_string(),
            }
        } else if selector == s.last_submitted {
            match &st.page {
                Page::Gradebook(href) => st
                    .course(href)
                    .map(|c| format!("\n      {}   \n", c.last_submitted))
                    .unwrap_or_default(),
                _ => String::new(),
            }
        } else {
            String::new()
        };
        Ok(Some(text))
    }

    async fn all_text_content(&self, selector: &str) -> ScoutResult<Vec<String>> {
        let st = self.state.lock().unwrap();
        if !st.present(selector) {
            return Ok(Vec::new());
        }
        let s = PortalSelectors::default();
        if selector == s.top_nav_links {
            return Ok(match &st.page {
                Page::Course(href) | Page::Gradebook(href) => st.nav_items(href),
                _ => Vec::new(),
            });
        }
        if selector == s.course_labels {
            let mut labels: Vec<String> = st
                .active_courses()
                .iter()
                .map(|c| format!("\n    {}\n    Segment 1 · 2023-24\n  ", c.name))
                .collect();
            labels.extend(st.extra_labels.iter().cloned());
            return Ok(labels);
        }
        Ok(Vec::new())
    }

    async fn all_attributes(&self, selector: &str, attr: &str) -> ScoutResult<Vec<Option<String>>> {
        let st = self.state.lock().unwrap();
        let s = PortalSelectors::default();
        if st.present(selector) && selector == s.course_links && attr == "href" {
            return Ok(st
                .active_courses()
                .iter()
                .map(|c| c.link_href.clone())
                .collect());
        }
        Ok(Vec::new())
    }

    async fn outer_html(&self, selector: &str) -> ScoutResult<Option<String>> {
        let st = self.state.lock().unwrap();
        let s = PortalSelectors::default();
        if st.present(selector) && selector == s.enrollment_table {
            return Ok(st.active_student().map(|x| x.enrollment_html.clone()));
        }
        Ok(None)
    }

    async fn type_text(&self, selector: &str, text: &str) -> ScoutResult<()> {
        let mut st = self.state.lock().unwrap();
        if !st.present(selector) {
            return Err(ScoutError::element_not_found(selector, Duration::ZERO));
        }
        st.typed.insert(selector.to_string(), text.to_string());
        Ok(())
    }

    async fn click_nth(&self, selector: &str, index: usize) -> ScoutResult<()> {
        let mut st = self.state.lock().unwrap();
        if !st.present(selector) {
            return Err(ScoutError::element_not_found(selector, Duration::ZERO));
        }
        let s = PortalSelectors::default();
        if selector == s.login_submit {
            let ok = st.typed.get(&s.username_field).map(String::as_str) == Some(USERNAME)
                && st.typed.get(&s.password_field).map(String::as_str) == Some(PASSWORD);
            if ok {
                st.logged_in = true;
                st.pending = Some(Page::Dashboard);
            }
        } else if selector == s.course_tile {
            let first = st.active_courses().first().map(|c| c.href.clone());
            st.pending = first.map(Page::Course);
        } else if selector == s.top_nav_links {
            if let Page::Course(href) | Page::Gradebook(href) = st.page.clone() {
                let items = st.nav_items(&href);
                match items.get(index) {
                    Some(item) if item.contains("Gradebook") => {
                        st.pending = Some(Page::Gradebook(href));
                    }
                    Some(_) => {}
                    None => {
                        return Err(ScoutError::element_not_found(selector, Duration::ZERO));
                    }
                }
            }
        } else if selector == s.report_link {
            st.pending = Some(Page::Report);
        }
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> ScoutResult<()> {
        let mut st = self.state.lock().unwrap();
        let s = PortalSelectors::default();
        if selector != s.student_select || !st.present(selector) {
            return Err(ScoutError::element_not_found(selector, Duration::ZERO));
        }
        match st.students.iter().position(|x| x.id == value) {
            Some(i) => {
                st.active = Some(i);
                st.pending = Some(Page::Dashboard);
                Ok(())
            }
            None => Err(ScoutError::element_not_found(
                format!("{selector} option[value=\"{value}\"]"),
                Duration::ZERO,
            )),
        }
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> ScoutResult<()> {
        let mut st = self.state.lock().unwrap();
        st.navigation_waits += 1;
        match st.pending.take() {
            Some(page) => {
                st.page = page;
                Ok(())
            }
            None => Err(ScoutError::navigation_timeout("wait_for_navigation", timeout)),
        }
    }
}

/// Which session call a [`Flaky`] wrapper fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlakyOp {
    Goto,
    Navigation,
}

/// Wraps a session and fails the next `fail_next(n)` calls of one operation
/// with `error`; every other call is delegated.
pub struct Flaky<S> {
    inner: S,
    op: FlakyOp,
    remaining: AtomicUsize,
    attempts: AtomicUsize,
    error: fn() -> ScoutError,
}

impl<S> Flaky<S> {
    pub fn new(inner: S, op: FlakyOp, error: fn() -> ScoutError) -> Self {
        Self {
            inner,
            op,
            remaining: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            error,
        }
    }

    pub fn fail_next(&self, n: usize) {
        self.remaining.store(n, Ordering::SeqCst);
        self.attempts.store(0, Ordering::SeqCst);
    }

    /// Calls of the wrapped operation since the last `fail_next`.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn trip(&self, op: FlakyOp) -> Option<ScoutError> {
        if op != self.op {
            return None;
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| (self.error)())
    }
}

#[async_trait]
impl<S: SessionHandle> SessionHandle for Flaky<S> {
    async fn goto(&self, url: &str) -> ScoutResult<()> {
        if let Some(e) = self.trip(FlakyOp::Goto) {
            return Err(e);
        }
        self.inner.goto(url).await
    }

    async fn exists(&self, selector: &str) -> ScoutResult<bool> {
        self.inner.exists(selector).await
    }

    async fn text_content(&self, selector: &str) -> ScoutResult<Option<String>> {
        self.inner.text_content(selector).await
    }

    async fn all_text_content(&self, selector: &str) -> ScoutResult<Vec<String>> {
        self.inner.all_text_content(selector).await
    }

    async fn all_attributes(&self, selector: &str, attr: &str) -> ScoutResult<Vec<Option<String>>> {
        self.inner.all_attributes(selector, attr).await
    }

    async fn outer_html(&self, selector: &str) -> ScoutResult<Option<String>> {
        self.inner.outer_html(selector).await
    }

    async fn type_text(&self, selector: &str, text: &str) -> ScoutResult<()> {
        self.inner.type_text(selector, text).await
    }

    async fn click_nth(&self, selector: &str, index: usize) -> ScoutResult<()> {
        self.inner.click_nth(selector, index).await
    }

    async fn select_option(&self, selector: &str, value: &str) -> ScoutResult<()> {
        self.inner.select_option(selector, value).await
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> ScoutResult<()> {
        if let Some(e) = self.trip(FlakyOp::Navigation) {
            return Err(e);
        }
        self.inner.wait_for_navigation(timeout).await
    }
}

/// Alex (id 1) with Algebra, Jane (id 2) with Biology.
pub fn two_student_portal() -> MockPortal {
    MockPortal::new(vec![
        MockStudent::new(
            "Alex",
            "1",
            vec![MockCourse::new("Algebra", "/c/1", "2024-01-10 09:00")],
        ),
        MockStudent::new(
            "Jane",
            "2",
            vec![MockCourse::new("Biology", "/c/2", "2024-01-05 09:00")],
        ),
    ])
}
