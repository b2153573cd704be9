//! Trellis - build and diff Merkle skip-lists from the command line

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trellis_cli::{build, diff_entries, read_entries, CliConfig};

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Build and compare content-addressed Merkle skip-lists")]
#[command(version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true, env = "TRELLIS_DEBUG")]
    debug: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "TRELLIS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a tree from a JSON object of entries and print its root
    Build {
        /// JSON file mapping keys to values
        entries: PathBuf,

        /// Print every level, not just the root
        #[arg(short, long)]
        levels: bool,
    },
    /// Print the changes that turn one entry set into another
    Diff {
        /// JSON file with the source entries
        source: PathBuf,

        /// JSON file with the target entries
        target: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logs go to stderr so stdout stays valid JSON
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("trellis_cli={0},trellis_core={0},trellis_store={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CliConfig::load(args.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    let output = match args.command {
        Command::Build { entries, levels } => {
            let entries = read_entries(&entries, config.encoding)?;
            serde_json::to_string_pretty(&build(entries, &config, levels).await?)?
        }
        Command::Diff { source, target } => {
            let source = read_entries(&source, config.encoding)?;
            let target = read_entries(&target, config.encoding)?;
            serde_json::to_string_pretty(&diff_entries(source, target, &config).await?)?
        }
    };

    println!("{}", output);
    Ok(())
}
