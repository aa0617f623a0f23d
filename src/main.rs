mod cli;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use tracing::info;
use vidscribe::config::Config;
use vidscribe::media::clean_old_files;
use vidscribe::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let mut config = Config::load_with(args.config)?;
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            vidscribe::api::run(config).await?;
        }
        Commands::Clean(args) => {
            let config = Config::load_with(args.config)?;
            let days = args.max_age_days.unwrap_or(config.retention.max_age_days);
            let max_age = Duration::from_secs(u64::from(days) * 24 * 60 * 60);

            let stats = clean_old_files(&config.server.records_dir, max_age).await?;
            info!(
                scanned = stats.scanned,
                removed = stats.removed,
                failed = stats.failed,
                "Cleanup finished"
            );
        }
    }

    Ok(())
}
