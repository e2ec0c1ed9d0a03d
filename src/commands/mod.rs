//! CLI command implementations.

pub mod download;

pub use download::{DownloadCommand, Summary};
