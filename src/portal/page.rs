//! The seam between the scan/retrieve logic and the browser.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Operations on the purchase-history page of one browsing context.
///
/// Every query re-reads the live DOM: the list re-renders after most clicks,
/// so row indices are only meaningful for the call that uses them.
/// Implemented by [`ChromiumPage`](crate::portal::ChromiumPage); the trait
/// exists so the list protocol can be exercised against a scripted page.
#[async_trait]
pub trait PurchasePage: Send + Sync {
    /// Navigates to the purchase list and waits for network quiescence.
    async fn open_list(&self) -> Result<()>;

    /// Waits until at least one row control is rendered.
    async fn wait_for_rows(&self, timeout: Duration) -> Result<()>;

    /// Selects the family-member option labelled `label`.
    ///
    /// Returns `false` when the account has no family-member filter.
    async fn select_family_member(&self, label: &str) -> Result<bool>;

    /// Number of row controls currently rendered.
    async fn row_count(&self) -> Result<usize>;

    /// Header text of every rendered row control, top to bottom.
    async fn row_texts(&self) -> Result<Vec<String>>;

    /// Header text of the row control at `index`, if it still exists.
    async fn row_text(&self, index: usize) -> Result<Option<String>>;

    /// Whether the row control at `index` reports itself expanded.
    async fn row_expanded(&self, index: usize) -> Result<bool>;

    /// Clicks the row control at `index`.
    async fn toggle_row(&self, index: usize) -> Result<()>;

    /// Whether a "no invoice" marker is rendered anywhere on the page.
    async fn has_no_invoice_marker(&self) -> Result<bool>;

    /// Outer HTML of every top-level purchase container, top to bottom.
    async fn purchase_containers(&self) -> Result<Vec<String>>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    async fn scroll_to_top(&self) -> Result<()>;

    /// Clicks the receipt control of the expanded row.
    ///
    /// Returns `false` without clicking when the control is absent.
    async fn open_receipt(&self) -> Result<bool>;

    /// Waits until no network activity is observed, failing after `timeout`.
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Renders the current view to a PDF file at `path`.
    async fn save_pdf(&self, path: &Path) -> Result<()>;

    /// Writes the browsing context's authentication state to `path`.
    async fn save_session(&self, path: &Path) -> Result<()>;
}

/// Waits `ms` milliseconds; zero returns immediately.
pub async fn settle(ms: u64) {
    if ms == 0 {
        return;
    }
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
