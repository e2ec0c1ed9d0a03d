//! Retrieval pass: find one order again and save its receipt as PDF.

use crate::config::{Config, Delays};
use crate::naming::invoice_filename;
use crate::portal::models::PurchaseRecord;
use crate::portal::page::{settle, PurchasePage};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a single order produced no usable PDF.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("order {order_id} not found in the purchase list")]
    NotFound { order_id: String },

    #[error("receipt button not found")]
    ReceiptUnavailable,

    #[error("PDF export failed: {0:#}")]
    ExportFailed(anyhow::Error),

    #[error("PDF file was not created: {}", path.display())]
    FileMissing { path: PathBuf },

    #[error("PDF looks blank ({size} bytes, expected at least {min}): {}", path.display())]
    FileTooSmall { path: PathBuf, size: u64, min: u64 },

    #[error(transparent)]
    Page(#[from] anyhow::Error),
}

/// A receipt that was saved and passed the size check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedInvoice {
    pub path: PathBuf,
    pub size: u64,
}

/// Re-locates orders in a freshly loaded list and exports their receipts.
pub struct ItemRetriever {
    output_dir: PathBuf,
    family_member_label: String,
    max_scrolls: u32,
    min_pdf_bytes: u64,
    network_idle: Duration,
    delays: Delays,
}

impl ItemRetriever {
    pub fn new(config: &Config, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            family_member_label: config.family_member_label.clone(),
            max_scrolls: config.max_locate_scrolls,
            min_pdf_bytes: config.min_pdf_bytes,
            network_idle: config.network_idle(),
            delays: config.delays.clone(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Saves the receipt of `record` into the output directory.
    pub async fn retrieve(
        &self,
        page: &impl PurchasePage,
        record: &PurchaseRecord,
    ) -> Result<SavedInvoice, RetrievalError> {
        // A fresh load resets scroll position and any expanded rows.
        page.open_list().await?;

        match page.select_family_member(&self.family_member_label).await {
            Ok(true) => settle(self.delays.family_reload_ms).await,
            Ok(false) => {}
            Err(e) => debug!("Family member filter not applied: {:#}", e),
        }

        info!("🔍 Looking for {}...", record.order_id);
        let index = self
            .locate(page, &record.order_id)
            .await?
            .ok_or_else(|| RetrievalError::NotFound { order_id: record.order_id.clone() })?;

        info!("📂 Opening details...");
        page.toggle_row(index).await?;
        settle(self.delays.expand_ms).await;

        info!("📄 Opening receipt ({})...", record.product_name);
        if !page.open_receipt().await? {
            return Err(RetrievalError::ReceiptUnavailable);
        }

        page.wait_for_network_idle(self.network_idle).await?;
        settle(self.delays.receipt_ms).await;

        let url = page.current_url().await?;
        debug!("Receipt URL: {}", url);

        let path = self.output_dir.join(invoice_filename(record));
        info!("💾 Saving {}", path.display());
        page.save_pdf(&path).await.map_err(RetrievalError::ExportFailed)?;

        self.verify(path).await
    }

    /// Scrolls the list until a row mentioning `order_id` is rendered.
    pub async fn locate(
        &self,
        page: &impl PurchasePage,
        order_id: &str,
    ) -> anyhow::Result<Option<usize>> {
        let mut attempts = 0;

        while attempts < self.max_scrolls {
            let texts = page.row_texts().await?;
            if let Some(index) = texts.iter().position(|t| t.contains(order_id)) {
                return Ok(Some(index));
            }

            page.scroll_to_bottom().await?;
            settle(self.delays.locate_scroll_ms).await;

            if page.row_count().await? == texts.len() {
                warn!("End of list reached without finding {}", order_id);
                return Ok(None);
            }

            attempts += 1;
        }

        warn!("Scroll limit of {} reached looking for {}", self.max_scrolls, order_id);
        Ok(None)
    }

    /// Checks that the export exists and is not suspiciously small.
    ///
    /// Small files stay on disk for inspection.
    async fn verify(&self, path: PathBuf) -> Result<SavedInvoice, RetrievalError> {
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => return Err(RetrievalError::FileMissing { path }),
        };

        if size < self.min_pdf_bytes {
            return Err(RetrievalError::FileTooSmall { path, size, min: self.min_pdf_bytes });
        }

        Ok(SavedInvoice { path, size })
    }
}
