//! Extraction primitives: small stateless reads built on [`SessionHandle`].

use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;

use crate::core::error::{ScoutError, ScoutResult};
use crate::core::types::TableRow;
use crate::scraping::session::SessionHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

async fn poll_until_present<S>(session: &S, selector: &str) -> ScoutResult<()>
where
    S: SessionHandle + ?Sized,
{
    loop {
        if session.exists(selector).await? {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait until `selector` matches an element, failing with `ElementNotFound`
/// once `timeout` has elapsed. The probe itself is raced against the deadline,
/// so a hung driver call cannot extend the wait.
pub async fn wait_for_selector<S>(session: &S, selector: &str, timeout: Duration) -> ScoutResult<()>
where
    S: SessionHandle + ?Sized,
{
    match tokio::time::timeout(timeout, poll_until_present(session, selector)).await {
        Ok(result) => result,
        Err(_) => Err(ScoutError::element_not_found(selector, timeout)),
    }
}

/// Text content of the first element matching `selector`.
pub async fn read_text<S>(session: &S, selector: &str, timeout: Duration) -> ScoutResult<String>
where
    S: SessionHandle + ?Sized,
{
    wait_for_selector(session, selector, timeout).await?;
    session
        .text_content(selector)
        .await?
        .ok_or_else(|| ScoutError::element_not_found(selector, timeout))
}

pub async fn contains_text<S>(
    session: &S,
    selector: &str,
    needle: &str,
    timeout: Duration,
) -> ScoutResult<bool>
where
    S: SessionHandle + ?Sized,
{
    Ok(read_text(session, selector, timeout).await?.contains(needle))
}

/// Wait for the table under `selector` and parse it into header-keyed rows.
pub async fn parse_table<S>(
    session: &S,
    selector: &str,
    timeout: Duration,
) -> ScoutResult<Vec<TableRow>>
where
    S: SessionHandle + ?Sized,
{
    wait_for_selector(session, selector, timeout).await?;
    let html = session
        .outer_html(selector)
        .await?
        .ok_or_else(|| ScoutError::element_not_found(selector, timeout))?;
    let rows = parse_table_html(selector, &html)?;
    debug!("parsed {} rows from table {}", rows.len(), selector);
    Ok(rows)
}

/// Header text → field name: lower-cased with all whitespace removed.
fn header_key(cell: &ElementRef) -> String {
    cell.inner_html()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn child_elements<'a>(
    el: ElementRef<'a>,
    names: &'a [&'a str],
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(move |c| names.contains(&c.value().name()))
}

/// Rows in DOM `table.rows` order: head rows, body rows, then foot rows.
/// Rows of nested tables are not included.
fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut head = Vec::new();
    let mut body = Vec::new();
    let mut foot = Vec::new();
    for section in table.children().filter_map(ElementRef::wrap) {
        match section.value().name() {
            "tr" => body.push(section),
            "thead" => head.extend(child_elements(section, &["tr"])),
            "tbody" => body.extend(child_elements(section, &["tr"])),
            "tfoot" => foot.extend(child_elements(section, &["tr"])),
            _ => {}
        }
    }
    head.into_iter().chain(body).chain(foot).collect()
}

/// Parse table markup: first row is the header, every later row becomes a
/// mapping from header key to the cell's inner HTML. `selector` only labels
/// errors.
pub fn parse_table_html(selector: &str, html: &str) -> ScoutResult<Vec<TableRow>> {
    let fragment = Html::parse_fragment(html);
    let table = Selector::parse("table")
        .ok()
        .and_then(|table_sel| fragment.select(&table_sel).next())
        .ok_or_else(|| ScoutError::element_not_found(format!("{selector} table"), Duration::ZERO))?;

    let rows = table_rows(table);
    let Some((header_row, data_rows)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let headers: Vec<String> = child_elements(*header_row, &["th", "td"])
        .map(|c| header_key(&c))
        .collect();
    for (i, name) in headers.iter().enumerate() {
        if headers[..i].contains(name) {
            return Err(ScoutError::DuplicateHeader {
                selector: selector.to_string(),
                name: name.clone(),
            });
        }
    }

    data_rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cells: Vec<String> = child_elements(*row, &["th", "td"])
                .map(|c| c.inner_html())
                .collect();
            if cells.len() != headers.len() {
                return Err(ScoutError::StructuralMismatch {
                    selector: selector.to_string(),
                    row: i + 1,
                    expected: headers.len(),
                    found: cells.len(),
                });
            }
            Ok(headers.iter().cloned().zip(cells).collect::<TableRow>())
        })
        .collect()
}
