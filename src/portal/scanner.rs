//! Scan pass: load the infinite list and collect every order with an invoice.

use crate::config::{Config, Delays};
use crate::portal::models::{PurchaseRecord, UNKNOWN};
use crate::portal::page::{settle, PurchasePage};
use crate::portal::parser::{expanded_product_label, mentions_year, parse_row};
use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use tracing::{debug, info, warn};

/// How the scroll-loading loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A row from the cutoff year is rendered.
    ReachedYear(usize),
    /// Scrolling stopped adding rows.
    EndOfList(usize),
    /// The scroll bound ran out first.
    Exhausted(usize),
}

impl LoadOutcome {
    /// Rows rendered when loading stopped.
    pub fn rows(&self) -> usize {
        match *self {
            LoadOutcome::ReachedYear(n) | LoadOutcome::EndOfList(n) | LoadOutcome::Exhausted(n) => n,
        }
    }
}

/// Walks the purchase list top to bottom and extracts one record per row.
pub struct ListScanner {
    cutoff_year: i32,
    max_scrolls: u32,
    delays: Delays,
}

impl ListScanner {
    /// Creates a scanner that loads rows down to last calendar year.
    pub fn new(config: &Config) -> Self {
        Self {
            cutoff_year: Local::now().year() - 1,
            max_scrolls: config.max_scan_scrolls,
            delays: config.delays.clone(),
        }
    }

    /// Overrides the year whose first row stops the scroll loop.
    pub fn with_cutoff_year(mut self, year: i32) -> Self {
        self.cutoff_year = year;
        self
    }

    pub fn cutoff_year(&self) -> i32 {
        self.cutoff_year
    }

    /// Loads the list and returns the orders that have an invoice, in list order.
    pub async fn scan(&self, page: &impl PurchasePage) -> Result<Vec<PurchaseRecord>> {
        let outcome = self.load_rows(page).await?;
        debug!("Loading stopped: {:?}", outcome);

        page.scroll_to_top().await?;
        settle(self.delays.top_ms).await;

        let total = page.row_count().await?;
        let mut records = Vec::new();

        for index in 0..total {
            match self.extract_row(page, index).await {
                Ok(Some(record)) if record.has_invoice => {
                    info!(
                        "✓ {} - {}€ - {} - {}",
                        record.date, record.amount, record.product_name, record.order_id
                    );
                    records.push(record);
                }
                Ok(Some(record)) => {
                    info!("⊘ {} - {}€ - {} (no invoice)", record.date, record.amount, record.order_id);
                }
                Ok(None) => debug!("Row {} has no order id, skipping", index + 1),
                Err(e) => warn!("Failed to read order {}: {:#}", index + 1, e),
            }
        }

        info!("{} orders with invoices found", records.len());
        Ok(records)
    }

    /// Scrolls until a row from the cutoff year shows up or the list stops growing.
    pub async fn load_rows(&self, page: &impl PurchasePage) -> Result<LoadOutcome> {
        info!("Scrolling until entries from {} are visible...", self.cutoff_year);

        let mut previous = 0;
        let mut current = 0;
        let mut attempts = 0;

        while attempts < self.max_scrolls {
            current = page.row_count().await?;

            let texts = page.row_texts().await?;
            if texts.iter().any(|t| mentions_year(t, self.cutoff_year)) {
                info!("Entries from {} found ({} purchases loaded)", self.cutoff_year, current);
                return Ok(LoadOutcome::ReachedYear(current));
            }

            page.scroll_to_bottom().await?;
            settle(self.delays.scroll_ms).await;

            if current == previous {
                info!("End of list reached ({} purchases, none from {})", current, self.cutoff_year);
                return Ok(LoadOutcome::EndOfList(current));
            }

            debug!("{} purchases loaded...", current);
            previous = current;
            attempts += 1;
        }

        warn!("Scroll limit of {} reached ({} purchases loaded)", self.max_scrolls, current);
        Ok(LoadOutcome::Exhausted(current))
    }

    /// Reads one row by position, expanding it to check for an invoice.
    ///
    /// Returns `None` for rows without an order id.
    async fn extract_row(
        &self,
        page: &impl PurchasePage,
        index: usize,
    ) -> Result<Option<PurchaseRecord>> {
        let text = page
            .row_text(index)
            .await?
            .with_context(|| format!("Row {} disappeared from the list", index + 1))?;

        let summary = parse_row(&text);
        if summary.order_id.is_none() {
            return Ok(None);
        }

        // Expansion has to start from a collapsed row, or a stale detail pane is read.
        if page.row_expanded(index).await? {
            page.toggle_row(index).await?;
            settle(self.delays.collapse_ms).await;
        }

        page.toggle_row(index).await?;
        settle(self.delays.expand_ms).await;

        let has_invoice = !page.has_no_invoice_marker().await?;

        let product_name = if has_invoice {
            settle(self.delays.products_ms).await;
            match self.expanded_product(page).await {
                Ok(Some(name)) => name,
                Ok(None) => {
                    warn!("No expanded purchase found for row {}", index + 1);
                    UNKNOWN.to_string()
                }
                Err(e) => {
                    warn!("Could not read product name: {:#}", e);
                    UNKNOWN.to_string()
                }
            }
        } else {
            UNKNOWN.to_string()
        };

        page.toggle_row(index).await?;
        settle(self.delays.collapse_ms).await;

        Ok(summary.into_record(product_name, has_invoice))
    }

    async fn expanded_product(&self, page: &impl PurchasePage) -> Result<Option<String>> {
        let containers = page.purchase_containers().await?;
        Ok(expanded_product_label(&containers))
    }
}
