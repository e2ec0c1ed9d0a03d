//! Parsing of row header text and purchase container HTML.

use crate::naming::{parse_german_date, product_label};
use crate::portal::models::{RowSummary, UNKNOWN};
use crate::portal::selectors::container;
use regex_lite::Regex;
use scraper::Html;
use std::sync::LazyLock;
use tracing::trace;

/// `5. Mai 2023`, `17. Okt. 2024`
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}\.\s+[^\s\d]+\.?\s+\d{4})").unwrap());

/// `4,99 €`, `1.099,00€`
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([\d.,]+)\s*€").unwrap());

static ORDER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z0-9]{10,}").unwrap());

/// Extracts order id, date and amount from a row's header text.
pub fn parse_row(text: &str) -> RowSummary {
    let order_id = ORDER_ID.find(text).map(|m| m.as_str().to_string());

    let date = DATE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| parse_german_date(m.as_str()))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let amount = AMOUNT
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| normalize_amount(m.as_str()))
        .unwrap_or_else(|| UNKNOWN.to_string());

    trace!("Parsed row {:?}: {:?} {} {}", text, order_id, date, amount);

    RowSummary { order_id, date, amount }
}

/// Converts a German-formatted amount (`1.099,00`) to `1099.00`.
pub fn normalize_amount(raw: &str) -> String {
    if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else {
        raw.to_string()
    }
}

/// True if the row text carries `year` as a standalone token.
///
/// Digits inside an order id (`MK2023ABCDE`) or an amount (`2.023,00`) do not count.
pub fn mentions_year(text: &str, year: i32) -> bool {
    let token = year.to_string();
    let is_joined = |c: char| c.is_ascii_alphanumeric() || c == '.' || c == ',';

    text.match_indices(&token).any(|(start, m)| {
        let before = text[..start].chars().next_back();
        let after = text[start + m.len()..].chars().next();
        !before.is_some_and(is_joined) && !after.is_some_and(is_joined)
    })
}

/// True if the container's own disclosure button reports itself expanded.
pub fn container_is_expanded(html: &str) -> bool {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&container::TOGGLE)
        .next()
        .and_then(|button| button.value().attr("aria-expanded"))
        .is_some_and(|state| state == "true")
}

/// `aria-label`s of the line-item titles inside a container, in document order.
pub fn container_product_titles(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&container::PRODUCT_TITLE)
        .filter_map(|e| e.value().attr("aria-label"))
        .map(str::to_string)
        .collect()
}

/// Finds the expanded container among `containers` and builds its product label.
///
/// Returns `None` when no container is expanded. Containers are matched by
/// their own toggle state, never by position.
pub fn expanded_product_label<S: AsRef<str>>(containers: &[S]) -> Option<String> {
    let expanded = containers.iter().find(|html| container_is_expanded(html.as_ref()))?;
    let titles = container_product_titles(expanded.as_ref());
    Some(product_label(&titles))
}
