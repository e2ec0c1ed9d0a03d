//! apple-invoices - Download Apple purchase-history receipts as PDF files
//!
//! Drives the "Report a Problem" purchase list in a real browser, collects
//! every order that has an invoice and saves each receipt with a sortable name.

pub mod commands;
pub mod config;
pub mod naming;
pub mod portal;

pub use config::Config;
pub use portal::models::{PurchaseRecord, RowSummary};
pub use portal::page::PurchasePage;
