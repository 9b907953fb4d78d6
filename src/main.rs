use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use courtside::{cli, config, server};

#[derive(Parser)]
#[command(name = "courtside", version, about = "Lineup recommendations from retrieved game history")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Embed and store a JSON file of game-log rows
    Ingest {
        /// JSON array of rows, or an object with a `rows` array
        file: PathBuf,
        #[arg(long)]
        team: String,
        #[arg(long)]
        season: String,
        /// Most recent games kept per player
        #[arg(long)]
        last: Option<usize>,
    },
    /// Similarity search over stored game logs
    Search {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// Metadata filter as key=value (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Return nothing when the filters match nothing
        #[arg(long)]
        strict: bool,
    },
    /// Recommend a lineup against an opponent
    Recommend {
        /// Opponent abbreviation, e.g. NYK
        opponent: String,
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        season: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Show corpus statistics
    Stats,
    /// Check model files and persisted corpus
    Doctor,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.courtside/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::CourtsideConfig::load()?;

    // stdout is reserved for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Ingest {
            file,
            team,
            season,
            last,
        } => cli::ingest::ingest(&config, &file, &team, &season, last).await?,
        Command::Search {
            query,
            k,
            filters,
            strict,
        } => cli::search::search(&config, &query, k, &filters, strict).await?,
        Command::Recommend {
            opponent,
            team,
            season,
            limit,
            json,
        } => cli::recommend::recommend(&config, &opponent, team, season, limit, json).await?,
        Command::Stats => cli::stats::stats(&config).await?,
        Command::Doctor => cli::doctor::doctor(&config).await?,
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
    }

    Ok(())
}
