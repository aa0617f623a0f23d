use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vidscribe")]
#[command(about = "Video download and transcription service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Delete old videos from the records directory
    Clean(CleanArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to, overriding `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Configuration file, overriding `VIDSCRIBE_CONFIG`
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct CleanArgs {
    /// Remove files older than this many days, overriding `retention.max_age_days`
    #[arg(long)]
    pub max_age_days: Option<u32>,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::parse_from(["vidscribe", "serve", "--address", "127.0.0.1:9000"]);
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.address, Some("127.0.0.1:9000".parse().unwrap()));
                assert!(args.config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_clean() {
        let cli = Cli::parse_from(["vidscribe", "clean", "--max-age-days", "3"]);
        assert!(matches!(
            cli.command,
            Commands::Clean(CleanArgs {
                max_age_days: Some(3),
                ..
            })
        ));
    }
}
