use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::config::CourtsideConfig;
use crate::ingest::{build_records, GameLogRow};

/// Either a bare array of rows or an object with a `rows` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum GameLogFile {
    Rows(Vec<GameLogRow>),
    Wrapped { rows: Vec<GameLogRow> },
}

impl GameLogFile {
    fn into_rows(self) -> Vec<GameLogRow> {
        match self {
            GameLogFile::Rows(rows) | GameLogFile::Wrapped { rows } => rows,
        }
    }
}

/// Read game-log rows from a JSON file.
pub fn read_rows(path: &Path) -> Result<Vec<GameLogRow>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: GameLogFile = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse game logs in {}", path.display()))?;
    Ok(file.into_rows())
}

/// Embed and append a game-log file for one team and season.
pub async fn ingest(
    config: &CourtsideConfig,
    file: &Path,
    team: &str,
    season: &str,
    last: Option<usize>,
) -> Result<()> {
    let rows = read_rows(file)?;
    let last = last.unwrap_or(config.recommend.last_games);
    let records = build_records(team, season, &rows, last);

    if records.is_empty() {
        println!("No usable rows in {} ({} read).", file.display(), rows.len());
        return Ok(());
    }

    let store = crate::server::open_store(config).await?;
    let result = store.add_documents(records).await?;

    println!(
        "Ingested {} game(s) for {team} {season} ({} rows read, last {last} per player).",
        result.added,
        rows.len()
    );
    println!("Corpus now holds {} record(s).", result.total);
    Ok(())
}
