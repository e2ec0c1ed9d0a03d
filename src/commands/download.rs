//! Download command: scan the purchase list, then save every receipt.

use crate::config::Config;
use crate::portal::page::settle;
use crate::portal::{ChromiumPage, ItemRetriever, ListScanner, PurchasePage, PurchaseRecord};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const RULE: &str = "═══════════════════════════════════════";

/// Outcome counters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub success: usize,
    pub errors: usize,
    pub output_dir: PathBuf,
}

impl Summary {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { success: 0, errors: 0, output_dir: output_dir.into() }
    }

    /// Number of orders a download was attempted for.
    pub fn attempted(&self) -> usize {
        self.success + self.errors
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "📊 SUMMARY")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "✅ Successful: {}", self.success)?;
        writeln!(f, "❌ Errors:     {}", self.errors)?;
        writeln!(f, "📁 Saved to:   {}", self.output_dir.display())?;
        write!(f, "{RULE}")
    }
}

/// Drops repeated order ids, keeping the first occurrence and the list order.
pub fn dedupe_by_order_id(records: Vec<PurchaseRecord>) -> Vec<PurchaseRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            let first = seen.insert(r.order_id.clone());
            if !first {
                debug!("Dropping duplicate order {}", r.order_id);
            }
            first
        })
        .collect()
}

/// Runs the whole procedure: session, scan pass, retrieval pass.
pub struct DownloadCommand {
    config: Config,
}

impl DownloadCommand {
    /// Creates a new download command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Launches Chrome, runs the download and always closes the browser.
    pub async fn execute(&self) -> Result<Summary> {
        let has_session = self.config.session_file.exists();
        let page = ChromiumPage::launch(&self.config).await?;

        let result = self.run(&page, has_session).await;

        if let Err(e) = page.close().await {
            warn!("Failed to close browser: {:#}", e);
        }
        result
    }

    /// Runs the download against a provided page (for testing).
    pub async fn execute_with_page(&self, page: &impl PurchasePage) -> Result<Summary> {
        let has_session = self.config.session_file.exists();
        self.run(page, has_session).await
    }

    async fn run(&self, page: &impl PurchasePage, has_session: bool) -> Result<Summary> {
        info!("🌐 Opening {}...", self.config.portal_url);
        page.open_list().await.context("Failed to open the purchase history")?;

        info!("⏳ Waiting for purchase history (log in if needed)...");
        page.wait_for_rows(self.config.list_wait())
            .await
            .context("Purchase history did not load")?;

        if has_session {
            info!("✅ Purchase history loaded");
        } else {
            page.save_session(&self.config.session_file)
                .await
                .context("Failed to save session")?;
            info!("✅ Session saved to {}", self.config.session_file.display());
        }

        self.show_all_members(page).await;

        info!("📋 Collecting orders...");
        let scanner = ListScanner::new(&self.config);
        let records = dedupe_by_order_id(scanner.scan(page).await?);

        let output_dir = self.config.resolved_download_dir();
        let mut summary = Summary::new(&output_dir);

        if records.is_empty() {
            warn!("No orders to download");
            return Ok(summary);
        }

        prepare_output_dir(&output_dir)?;

        info!("{RULE}");
        info!("📥 STARTING DOWNLOAD");
        info!("{RULE}");

        let retriever = ItemRetriever::new(&self.config, &output_dir);
        let total = records.len();

        for (i, record) in records.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, total, record.order_id);

            match retriever.retrieve(page, record).await {
                Ok(saved) => {
                    info!(
                        "✅ Saved {} ({}kb)",
                        saved.path.file_name().unwrap_or_default().to_string_lossy(),
                        (saved.size as f64 / 1024.0).round()
                    );
                    summary.success += 1;
                }
                Err(e) => {
                    error!("❌ {}: {}", record.order_id, e);
                    summary.errors += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Switches a family-sharing account to show every member's purchases.
    async fn show_all_members(&self, page: &impl PurchasePage) {
        let label = &self.config.family_member_label;

        match page.select_family_member(label).await {
            Ok(true) => {
                info!("Family account found, switched to \"{}\"", label);
                settle(self.config.delays.family_ms).await;
                if let Err(e) = page.wait_for_rows(self.config.timeout()).await {
                    debug!("List did not reappear after switching members: {:#}", e);
                }
            }
            Ok(false) => info!("Single account (no family sharing)"),
            Err(e) => {
                debug!("Family member filter unavailable: {:#}", e);
                info!("Single account (no family sharing)");
            }
        }
    }
}

fn prepare_output_dir(dir: &Path) -> Result<()> {
    info!("📁 Download folder: {}", dir.display());

    if dir.exists() {
        info!("   Folder exists");
    } else {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create download folder: {}", dir.display()))?;
        info!("   Folder created");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(order_id: &str, product: &str) -> PurchaseRecord {
        PurchaseRecord {
            order_id: order_id.to_string(),
            date: "2024-01-01".to_string(),
            amount: "0.99".to_string(),
            product_name: product.to_string(),
            has_invoice: true,
        }
    }

    #[test]
    fn test_dedupe_keeps_first_and_order() {
        let records = vec![
            record("MA00000000A", "first"),
            record("MB00000000B", "second"),
            record("MA00000000A", "duplicate"),
            record("MC00000000C", "third"),
        ];

        let deduped = dedupe_by_order_id(records);
        let ids: Vec<_> = deduped.iter().map(|r| r.order_id.as_str()).collect();
        assert_eq!(ids, vec!["MA00000000A", "MB00000000B", "MC00000000C"]);
        assert_eq!(deduped[0].product_name, "first");
    }

    #[test]
    fn test_summary_display() {
        let summary = Summary { success: 2, errors: 1, output_dir: PathBuf::from("/tmp/out") };
        let text = summary.to_string();
        assert!(text.contains("Successful: 2"));
        assert!(text.contains("Errors:     1"));
        assert!(text.contains("/tmp/out"));
        assert_eq!(summary.attempted(), 3);
    }

    #[test]
    fn test_prepare_output_dir_creates_nested() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        prepare_output_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // existing directory is fine too
        prepare_output_dir(&nested).unwrap();
    }
}
