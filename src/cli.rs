use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "krakentop")]
#[command(about = "Kraken top-10 volume snapshot service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the periodic snapshot worker
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
    /// Run the snapshot pipeline once and exit
    Save,
    /// Show database and export statistics
    Status,
    /// Bulk-load export artifacts into the database
    Import {
        /// Directory to import from (defaults to the export directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await,
        Commands::Save => commands::save::run().await,
        Commands::Status => commands::status::run().await,
        Commands::Import { dir } => commands::import::run(dir).await,
    }
}
