mod commands;
mod config;
mod display;
mod error;
mod models;
mod processing;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::processing::organize::Mode;

#[derive(Parser, Debug)]
#[command(name = "media_scraper")]
#[command(about = "Download channel media, track what was fetched, and sort it into topic folders", long_about = None)]
struct Cli {
    /// Config file (defaults to ./media_scraper.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download media that is not in the tracker yet
    Download {
        /// Channel id, overrides `channel_id` from the config
        #[arg(long)]
        channel: Option<u64>,

        /// Directory the channel folder is created in
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect or edit the download tracker
    Tracker {
        /// Channel folder; discovered under the output directory when omitted
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// Runs the interactive menu when omitted
        #[command(subcommand)]
        action: Option<TrackerAction>,
    },

    /// Search downloads and sort them into categories by message text
    Categorize {
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },

    /// Sort every file of a directory into category folders by filename
    Organize {
        #[arg(long)]
        source: PathBuf,

        #[arg(long)]
        target: PathBuf,

        /// Asked interactively when omitted
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Do not ask for confirmation
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },

    /// Copy message text and sizes from the metadata file into the tracker
    Sync {
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },

    /// Check that every tracker entry has `message_text` and `file_size`
    Verify {
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },

    /// Show whether a download is running
    Status {
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// Remove leftover lock files
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TrackerAction {
    /// Show download statistics
    Stats,
    /// List tracked files, newest first
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Search filenames and message text
    Search { term: String },
    /// Forget a file by unique id or filename
    Remove { term: String },
    /// Forget every file; everything is downloaded again next run
    Reset {
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let root = config.output_dir.clone();

    match cli.command {
        Commands::Download { channel, output } => commands::download(&config, channel, output).await,
        Commands::Tracker { folder, action } => commands::tracker(&root, folder, action),
        Commands::Categorize { folder } => commands::categorize(&root, folder, &config),
        Commands::Organize { source, target, mode, yes } => {
            commands::organize(&source, &target, mode, yes, &config)
        }
        Commands::Sync { folder } => commands::sync(&root, folder),
        Commands::Verify { folder } => commands::verify(&root, folder),
        Commands::Status { folder, clear } => commands::status(&root, folder, clear),
    }
}
