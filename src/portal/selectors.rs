//! The portal's page contract: every CSS selector and label the navigator
//! depends on. Defaults match the live observer portal; each can be
//! overridden from the `portal.selectors` section of the config file.

#[derive(serde::Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct PortalSelectors {
    // Login page
    pub username_field: String,
    pub password_field: String,
    pub login_submit: String,

    // Dashboard
    /// Status bar naming the currently observed student.
    pub status_indicator: String,
    pub student_select: String,
    pub dashboard: String,
    pub course_tile: String,
    /// Link inside the status bar that opens the student report pane.
    pub report_link: String,
    pub enrollment_table: String,

    // Course pages
    pub course_dropdown: String,
    pub course_links: String,
    pub course_labels: String,
    pub top_nav: String,
    pub top_nav_links: String,
    /// Substring identifying the gradebook entry of the top navigation.
    pub gradebook_label: String,

    // Gradebook
    pub last_submitted: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            username_field: "#Username".into(),
            password_field: "#Password".into(),
            login_submit: "form input[type=submit]".into(),
            status_indicator: "#idBar".into(),
            student_select: "#Pane6 select".into(),
            dashboard: "#dashboard".into(),
            course_tile: "#dashboard .dashboard__item a".into(),
            report_link: "#idBar a".into(),
            enrollment_table: "#Pane6 .flvs-table".into(),
            course_dropdown: "#observerUl".into(),
            course_links: "#observerUl a".into(),
            course_labels: "#observerUl .dropdown-item".into(),
            top_nav: ".navbar-nav".into(),
            top_nav_links: ".navbar-nav a".into(),
            gradebook_label: "Gradebook".into(),
            last_submitted: ".last-submitted-date".into(),
        }
    }
}
