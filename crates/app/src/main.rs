use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Find the gross total on a scanned receipt")]
struct Cli {
    /// Config file (defaults to the platform config dir's config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full scan pipeline over a recognizer fragment dump (JSON)
    Scan {
        fragments: PathBuf,

        /// Print the reconstructed lines before the result
        #[arg(long)]
        show_lines: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the lines reconstructed from a recognizer fragment dump (JSON)
    Lines { fragments: PathBuf },

    /// Extract the gross total from plain text, one receipt line per line
    Extract { text: PathBuf },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Scan { fragments, show_lines, json } => {
            commands::scan(&config, &fragments, show_lines, json).await?;
        }
        Command::Lines { fragments } => commands::lines(&config, &fragments)?,
        Command::Extract { text } => commands::extract(&config, &text)?,
        Command::Config => print!("{}", config.to_toml()?),
    }
    Ok(())
}
