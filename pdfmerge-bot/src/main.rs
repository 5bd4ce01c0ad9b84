//! Pdfmerge Bot - Main entry point.

use anyhow::Result;
use pdfmerge_bot::run;
use pdfmerge_common::config::Config;
use pdfmerge_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Pdfmerge Bot v{}", env!("CARGO_PKG_VERSION"));

    run(config).await
}
