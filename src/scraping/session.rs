//! The browser-session seam.
//!
//! Everything above this trait (primitives, navigator, orchestrator) talks to
//! one page through it and never to the driver directly. The production
//! implementation is [`crate::scraping::browser_manager::ChromeSession`];
//! tests drive a scripted in-memory portal.

use async_trait::async_trait;
use std::time::Duration;

use crate::core::error::ScoutResult;

#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Navigate to `url` and wait for the network to go idle.
    async fn goto(&self, url: &str) -> ScoutResult<()>;

    /// Single non-blocking probe: does any element match `selector` right now?
    async fn exists(&self, selector: &str) -> ScoutResult<bool>;

    /// `textContent` of the first match, `None` when nothing matches.
    async fn text_content(&self, selector: &str) -> ScoutResult<Option<String>>;

    /// `textContent` of every match, in document order.
    async fn all_text_content(&self, selector: &str) -> ScoutResult<Vec<String>>;

    /// Attribute `attr` of every match, in document order. Elements lacking
    /// the attribute yield `None` so positions stay aligned.
    async fn all_attributes(&self, selector: &str, attr: &str) -> ScoutResult<Vec<Option<String>>>;

    /// `outerHTML` of the first match.
    async fn outer_html(&self, selector: &str) -> ScoutResult<Option<String>>;

    /// Focus the first match and type `text` into it.
    async fn type_text(&self, selector: &str, text: &str) -> ScoutResult<()>;

    /// Click the `index`-th match (0-based).
    async fn click_nth(&self, selector: &str, index: usize) -> ScoutResult<()>;

    /// Choose the option whose value is `value` in the first matching
    /// `<select>` and fire its change event.
    async fn select_option(&self, selector: &str, value: &str) -> ScoutResult<()>;

    /// Wait for the navigation triggered by the previous action to finish
    /// and the network to go idle, failing after `timeout`.
    async fn wait_for_navigation(&self, timeout: Duration) -> ScoutResult<()>;

    async fn click(&self, selector: &str) -> ScoutResult<()> {
        self.click_nth(selector, 0).await
    }
}
