//! Tunemark CLI - audio fingerprinting front end
//!
//! Features:
//! - Fingerprint a local audio file and dump its hash table
//! - Index a file into a catalog
//! - Identify a recording against the catalog
//! - Stream-ingest a track from a child process with early duplicate detection

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod settings;

use commands::{CatalogArgs, SongArgs};

/// Tunemark - landmark audio fingerprinting
#[derive(Parser)]
#[command(name = "tunemark")]
#[command(version)]
#[command(about = "Audio fingerprinting and song identification", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON settings file (fingerprint, stream and identify sections)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    catalog: CatalogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint an audio file and print stage counts
    Fingerprint {
        /// Input audio file
        input: PathBuf,

        /// Print the hash table as JSON
        #[arg(long)]
        json: bool,

        /// Write the hash table to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fingerprint an audio file and add it to the catalog
    Index {
        /// Input audio file
        input: PathBuf,

        #[command(flatten)]
        song: SongArgs,
    },

    /// Identify a recording against the catalog
    Identify {
        /// Input audio file
        input: PathBuf,

        /// Reject matches scoring below this
        #[arg(long, conflicts_with = "no_threshold")]
        min_score: Option<f64>,

        /// Report the best candidates whatever their score
        #[arg(long)]
        no_threshold: bool,

        /// Number of candidates to show
        #[arg(short = 'n', long)]
        top: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stream s16le mono PCM from a program's stdout and index it
    ///
    /// Example: tunemark ingest --title "Song" -- ffmpeg -i in.mp3 -f s16le -ac 1 -ar 44100 -
    Ingest {
        #[command(flatten)]
        song: SongArgs,

        /// Program and arguments producing PCM on stdout
        #[arg(last = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tunemark_core::init();

    if let Err(err) = run(cli).await {
        eprintln!("{}", output::error_line(&err));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = settings::Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Fingerprint { input, json, output } => {
            commands::fingerprint(&input, json, output, &settings).await?;
        }
        Commands::Index { input, song } => {
            commands::index(&input, song, &cli.catalog, &settings).await?;
        }
        Commands::Identify {
            input,
            min_score,
            no_threshold,
            top,
            json,
        } => {
            let policy = settings.identify_policy(min_score, no_threshold, top);
            commands::identify(&input, &policy, json, &cli.catalog, &settings).await?;
        }
        Commands::Ingest { song, command } => {
            commands::ingest(song, &command, &cli.catalog, &settings).await?;
        }
    }

    Ok(())
}
