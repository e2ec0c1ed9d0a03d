//! apple-invoices - Download Apple purchase-history receipts as PDF files
//!
//! Collects all order ids first, then loads each order on its own, so a
//! re-rendering list never mixes up two receipts.

use anyhow::Result;
use apple_invoices::commands::DownloadCommand;
use apple_invoices::config::Config;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "apple-invoices",
    disable_version_flag = true,
    about = "Download Apple purchase-history receipts as PDF files",
    long_about = "Opens reportaproblem.apple.com in Chrome, collects every order with an \
                  invoice down to last year's purchases, then saves each receipt as \
                  `{date}_Apple_{amount}EUR_{product}_{order}.pdf`.\n\n\
                  The first run waits for you to log in and stores the session in \
                  apple-session.json. Settings come from config.toml or \
                  APPLE_INVOICES_* environment variables."
)]
struct Cli {
    /// Extra arguments are accepted and ignored.
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    _rest: Vec<String>,
}

#[tokio::main]
async fn main() {
    let _cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Failures are reported, not turned into an exit code.
    if let Err(e) = run().await {
        error!("❌ Critical error: {:#}", e);
    }
}

async fn run() -> Result<()> {
    let config = Config::load_from_env()?.with_env();

    info!("🍎 Apple Invoice Downloader");
    info!("Starting in {} seconds...", config.startup_delay().as_secs_f32());
    tokio::time::sleep(config.startup_delay()).await;

    let summary = DownloadCommand::new(config).execute().await?;
    println!("{}", summary);

    Ok(())
}
