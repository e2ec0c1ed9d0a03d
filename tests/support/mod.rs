//! Scripted purchase list for exercising the scan and retrieval passes.

#![allow(dead_code)]

use anyhow::Result;
use apple_invoices::config::{Config, Delays};
use apple_invoices::PurchasePage;
use async_trait::async_trait;
use chrono::{Datelike, Local};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const TOGGLE_ID: &str = "RAP2.PurchaseList.PurchaseHeader.Button.ToggleDisclosure";

pub fn this_year() -> i32 {
    Local::now().year()
}

pub fn last_year() -> i32 {
    this_year() - 1
}

/// Config with every wait removed and files placed under `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.session_file = dir.join("apple-session.json");
    config.download_dir = dir.join("downloads");
    config.slow_mo_ms = 0;
    config.startup_delay_ms = 0;
    config.delays = Delays::none();
    config
}

/// One purchase in the scripted list.
#[derive(Debug, Clone)]
pub struct MockRow {
    pub text: String,
    pub order_id: Option<String>,
    pub has_invoice: bool,
    pub products: Vec<String>,
    pub receipt: bool,
    /// Bytes written on export; `None` writes nothing
    pub pdf_size: Option<usize>,
    pub pdf_fails: bool,
    /// Clicking the row fails
    pub broken: bool,
}

impl MockRow {
    /// A row with an invoice, dated `day. Mai year`.
    pub fn new(order_id: &str, day: u32, year: i32, amount: &str, product: &str) -> Self {
        Self {
            text: format!("{day}. Mai {year} {product} {amount} € {order_id}"),
            order_id: Some(order_id.to_string()),
            has_invoice: true,
            products: vec![product.to_string()],
            receipt: true,
            pdf_size: Some(20_000),
            pdf_fails: false,
            broken: false,
        }
    }

    /// A row whose header carries no order id.
    pub fn without_order_id(text: &str) -> Self {
        Self {
            text: text.to_string(),
            order_id: None,
            has_invoice: false,
            products: Vec::new(),
            receipt: false,
            pdf_size: None,
            pdf_fails: false,
            broken: false,
        }
    }

    pub fn without_invoice(mut self) -> Self {
        self.has_invoice = false;
        self.receipt = false;
        self
    }

    pub fn without_receipt(mut self) -> Self {
        self.receipt = false;
        self
    }

    pub fn with_products(mut self, products: &[&str]) -> Self {
        self.products = products.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_pdf_size(mut self, size: Option<usize>) -> Self {
        self.pdf_size = size;
        self
    }

    pub fn failing_pdf(mut self) -> Self {
        self.pdf_fails = true;
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

/// Everything the code under test did to the page.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub opens: usize,
    pub scrolls: usize,
    pub toggles: usize,
    pub family_selects: usize,
    pub receipts_opened: Vec<String>,
    pub pdfs: Vec<PathBuf>,
    pub sessions: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct State {
    rows: Vec<MockRow>,
    loaded: usize,
    expanded: Vec<bool>,
    receipt_for: Option<usize>,
    calls: Calls,
}

/// In-memory purchase list that loads `page_size` rows per scroll.
pub struct MockPortal {
    state: Mutex<State>,
    page_size: usize,
    list_loads: bool,
    family: bool,
    group_headers: bool,
    start_expanded: Option<usize>,
    vanishing: HashSet<String>,
}

impl MockPortal {
    pub fn new(rows: Vec<MockRow>) -> Self {
        Self {
            state: Mutex::new(State { rows, ..Default::default() }),
            page_size: 100,
            list_loads: true,
            family: false,
            group_headers: false,
            start_expanded: None,
            vanishing: HashSet::new(),
        }
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// The list never renders (stale session, login not completed).
    pub fn never_loads(mut self) -> Self {
        self.list_loads = false;
        self
    }

    pub fn family_account(mut self) -> Self {
        self.family = true;
        self
    }

    /// Interleaves month headers between purchase containers.
    pub fn group_headers(mut self) -> Self {
        self.group_headers = true;
        self
    }

    /// Renders row `index` expanded on every load.
    pub fn start_expanded(mut self, index: usize) -> Self {
        self.start_expanded = Some(index);
        self
    }

    /// Removes the order from the list on every load after the first.
    pub fn vanishing(mut self, order_id: &str) -> Self {
        self.vanishing.insert(order_id.to_string());
        self
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn expanded_rows(&self) -> usize {
        self.state.lock().unwrap().expanded.iter().filter(|e| **e).count()
    }

    fn container_html(row: &MockRow, expanded: bool) -> String {
        let items: String = if expanded {
            row.products
                .iter()
                .map(|p| {
                    format!(r#"<li class="pli"><div class="pli-title"><div aria-label="{p}">{p}</div></div></li>"#)
                })
                .collect()
        } else {
            String::new()
        };

        format!(
            r#"<div class="purchase"><button data-auto-test-id="{TOGGLE_ID}" aria-expanded="{expanded}">{}</button><ul class="pli-list">{items}</ul></div>"#,
            row.text
        )
    }
}

#[async_trait]
impl PurchasePage for MockPortal {
    async fn open_list(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.opens += 1;

        if state.calls.opens > 1 && !self.vanishing.is_empty() {
            let vanishing = &self.vanishing;
            state.rows.retain(|r| r.order_id.as_ref().map_or(true, |id| !vanishing.contains(id)));
        }

        state.loaded = self.page_size.min(state.rows.len());
        state.expanded = vec![false; state.rows.len()];
        if let Some(index) = self.start_expanded {
            if index < state.expanded.len() {
                state.expanded[index] = true;
            }
        }
        state.receipt_for = None;
        Ok(())
    }

    async fn wait_for_rows(&self, timeout: Duration) -> Result<()> {
        if !self.list_loads || self.state.lock().unwrap().loaded == 0 {
            anyhow::bail!("Timed out after {:?} waiting for the purchase list", timeout);
        }
        Ok(())
    }

    async fn select_family_member(&self, _label: &str) -> Result<bool> {
        if !self.family {
            return Ok(false);
        }
        self.state.lock().unwrap().calls.family_selects += 1;
        Ok(true)
    }

    async fn row_count(&self) -> Result<usize> {
        Ok(self.state.lock().unwrap().loaded)
    }

    async fn row_texts(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state.rows[..state.loaded].iter().map(|r| r.text.clone()).collect())
    }

    async fn row_text(&self, index: usize) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok((index < state.loaded).then(|| state.rows[index].text.clone()))
    }

    async fn row_expanded(&self, index: usize) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(index < state.loaded && state.expanded[index])
    }

    async fn toggle_row(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if index >= state.loaded {
            anyhow::bail!("Row {} is no longer rendered", index);
        }
        if state.rows[index].broken {
            anyhow::bail!("Element is not clickable");
        }
        state.expanded[index] = !state.expanded[index];
        state.calls.toggles += 1;
        Ok(())
    }

    async fn has_no_invoice_marker(&self) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok((0..state.loaded).any(|i| state.expanded[i] && !state.rows[i].has_invoice))
    }

    async fn purchase_containers(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut containers = Vec::new();
        for i in 0..state.loaded {
            if self.group_headers && i % 2 == 0 {
                containers.push(format!(r#"<div class="purchase"><h3>Gruppe {i}</h3></div>"#));
            }
            containers.push(Self::container_html(&state.rows[i], state.expanded[i]));
        }
        Ok(containers)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.scrolls += 1;
        state.loaded = (state.loaded + self.page_size).min(state.rows.len());
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<()> {
        Ok(())
    }

    async fn open_receipt(&self) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let Some(index) = (0..state.loaded).find(|i| state.expanded[*i]) else {
            return Ok(false);
        };
        if !state.rows[index].receipt {
            return Ok(false);
        }

        let order_id = state.rows[index].order_id.clone().unwrap_or_default();
        state.calls.receipts_opened.push(order_id);
        state.receipt_for = Some(index);
        Ok(true)
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        let order = state
            .receipt_for
            .and_then(|i| state.rows[i].order_id.clone())
            .unwrap_or_default();
        Ok(format!("https://reportaproblem.apple.com/receipt/{order}"))
    }

    async fn save_pdf(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.pdfs.push(path.to_path_buf());

        let Some(index) = state.receipt_for else {
            anyhow::bail!("No receipt is open");
        };
        let row = &state.rows[index];
        if row.pdf_fails {
            anyhow::bail!("Printing is not available");
        }
        if let Some(size) = row.pdf_size {
            std::fs::write(path, vec![b'%'; size])?;
        }
        Ok(())
    }

    async fn save_session(&self, path: &Path) -> Result<()> {
        self.state.lock().unwrap().calls.sessions.push(path.to_path_buf());
        std::fs::write(path, r#"{"cookies":[]}"#)?;
        Ok(())
    }
}
