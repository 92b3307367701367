//! CLI entry and dispatch.

use anyhow::Result;
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "deckgen")]
#[command(version = "0.1")]
#[command(about = "Prompt-to-presentation generation service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Path to the config file (default: deckgen.toml)
        #[arg(long, value_name = "PATH")]
        config: Option<String>,

        /// Override the listen host from config
        #[arg(long)]
        host: Option<String>,

        /// Override the listen port from config
        #[arg(long)]
        port: Option<u16>,

        /// Override the filesystem storage directory from config
        #[arg(long = "storage-dir", value_name = "PATH")]
        storage_dir: Option<String>,
    },

    /// Split an outline file into slide blocks and print them
    Segment {
        /// Path to the outline file
        #[arg(value_name = "FILE")]
        file: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            storage_dir,
        } => commands::serve::run(&commands::serve::ServeOptions {
            config_path: config.as_deref(),
            host: host.as_deref(),
            port,
            storage_dir: storage_dir.as_deref(),
        }),
        Commands::Segment { file } => commands::segment::run(&file),
    }
}

/// One-time subscriber setup: `RUST_LOG`-driven filter, stderr output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
