//! Game-log rows → embeddable [`Record`]s.
//!
//! Each game becomes one sentence (what gets embedded) plus metadata carrying
//! player identity, team, season, opponent, and the box-score numbers the
//! ranking pipeline averages.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::types::{metadata, MetaValue, Record};

/// One player's line in one game, as exported by the stats provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameLogRow {
    pub player_id: i64,
    pub player: String,
    #[serde(default)]
    pub position: String,
    pub game_date: String,
    /// Provider matchup string, e.g. `"BOS vs. NYK"` or `"BOS @ NYK"`.
    #[serde(default)]
    pub matchup: Option<String>,
    /// Opponent abbreviation; derived from `matchup` when absent.
    #[serde(default)]
    pub opponent: Option<String>,
    #[serde(alias = "min")]
    pub minutes: f64,
    pub pts: f64,
    pub reb: f64,
    pub ast: f64,
    #[serde(default)]
    pub stl: f64,
    #[serde(default)]
    pub blk: f64,
    #[serde(default)]
    pub fgm: f64,
    #[serde(default)]
    pub fga: f64,
    #[serde(default)]
    pub fg3m: f64,
    #[serde(default)]
    pub fg3a: f64,
    #[serde(default)]
    pub ftm: f64,
    #[serde(default)]
    pub fta: f64,
}

impl GameLogRow {
    /// Opponent abbreviation from the explicit field or the matchup string.
    pub fn opponent(&self) -> Option<String> {
        self.opponent
            .clone()
            .or_else(|| self.matchup.as_deref().and_then(opponent_from_matchup))
    }
}

/// Last token of a matchup string: `"BOS vs. NYK"` and `"BOS @ NYK"` both give `"NYK"`.
pub fn opponent_from_matchup(matchup: &str) -> Option<String> {
    matchup.split_whitespace().last().map(str::to_string)
}

/// Normalize a game date to `YYYY-MM-DD`.
///
/// Accepts ISO dates and the provider's `"APR 10, 2024"` form.
pub fn normalize_game_date(raw: &str) -> Result<String> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d", "%b %d, %Y", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date.format("%Y-%m-%d").to_string());
        }
    }
    bail!("unrecognized game date: {raw:?}")
}

/// One compact sentence per game, the text that gets embedded.
///
/// Stat values are written at full precision.
pub fn format_game_sentence(row: &GameLogRow, game_date: &str, opponent: &str) -> String {
    format!(
        "{game_date} vs {opponent}: {} MIN, {} PTS on {}/{} FG, {} REB, \
         {} AST, {} STL, {} BLK; 3P {}/{}, FT {}/{}",
        row.minutes,
        row.pts,
        row.fgm,
        row.fga,
        row.reb,
        row.ast,
        row.stl,
        row.blk,
        row.fg3m,
        row.fg3a,
        row.ftm,
        row.fta,
    )
}

/// Build records for `team`/`season`, keeping each player's `last_n` most recent games.
///
/// Rows with an unparseable date or no opponent are skipped with a warning.
pub fn build_records(team: &str, season: &str, rows: &[GameLogRow], last_n: usize) -> Vec<Record> {
    let mut by_player: BTreeMap<i64, Vec<(String, String, &GameLogRow)>> = BTreeMap::new();
    let mut first_seen: Vec<i64> = Vec::new();

    for row in rows {
        let date = match normalize_game_date(&row.game_date) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(player = %row.player, error = %e, "skipping row");
                continue;
            }
        };
        let Some(opponent) = row.opponent() else {
            tracing::warn!(player = %row.player, date = %date, "skipping row without opponent");
            continue;
        };
        if !by_player.contains_key(&row.player_id) {
            first_seen.push(row.player_id);
        }
        by_player.entry(row.player_id).or_default().push((date, opponent, row));
    }

    let mut records = Vec::new();
    for player_id in first_seen {
        let Some(mut games) = by_player.remove(&player_id) else {
            continue;
        };
        // ISO dates sort lexically; stable sort keeps input order within a day.
        games.sort_by(|a, b| b.0.cmp(&a.0));
        games.truncate(last_n);

        for (date, opponent, row) in games {
            let meta = metadata([
                ("player_id", MetaValue::from(row.player_id)),
                ("player", row.player.as_str().into()),
                ("team", team.into()),
                ("season", season.into()),
                ("position", row.position.as_str().into()),
                ("opponent", opponent.as_str().into()),
                ("game_date", date.as_str().into()),
                ("context_type", "game_log".into()),
                ("minutes", row.minutes.into()),
                ("pts", row.pts.into()),
                ("reb", row.reb.into()),
                ("ast", row.ast.into()),
            ]);
            records.push(Record::new(format_game_sentence(row, &date, &opponent), meta));
        }
    }
    records
}
