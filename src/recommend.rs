//! Lineup recommendation: team averages, opponent-history boost, ranking, and
//! an optional narrative.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

use crate::config::RecommendConfig;
use crate::lineup::{aggregate, rank, AggregateEntry, RankedEntity, ENTITY_FIELD, STAT_FIELDS};
use crate::narrative::NarrativeGenerator;
use crate::store::types::{Filters, MetaValue, RankedHit};
use crate::store::{StoreError, VectorStore};

pub const NARRATOR_MISSING: &str = "narrative generator not configured";

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("store is empty; ingest game logs first")]
    EmptyStore,

    #[error("no records for team {team} in season {season}; ingest them first")]
    NoTeamData { team: String, season: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Omitted fields fall back to the `[recommend]` config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendRequest {
    pub opponent: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineupSlot {
    pub player: String,
    pub avg_minutes: f64,
    pub avg_pts: f64,
    pub avg_reb: f64,
    pub avg_ast: f64,
    pub games: usize,
    pub opponent_history: bool,
}

impl From<&RankedEntity> for LineupSlot {
    fn from(r: &RankedEntity) -> Self {
        Self {
            player: r.entity_key.clone(),
            avg_minutes: r.stat("minutes"),
            avg_pts: r.stat("pts"),
            avg_reb: r.stat("reb"),
            avg_ast: r.stat("ast"),
            games: r.sample_count,
            opponent_history: r.boosted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendResponse {
    pub team: String,
    pub season: String,
    pub opponent: String,
    pub suggested_lineup: Vec<LineupSlot>,
    pub player_stats: BTreeMap<String, BTreeMap<String, f64>>,
    pub hits: Vec<RankedHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_error: Option<String>,
}

pub struct Recommender {
    store: Arc<VectorStore>,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
    defaults: RecommendConfig,
}

impl Recommender {
    pub fn new(
        store: Arc<VectorStore>,
        narrator: Option<Arc<dyn NarrativeGenerator>>,
        defaults: RecommendConfig,
    ) -> Self {
        Self {
            store,
            narrator,
            defaults,
        }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub async fn recommend(&self, request: RecommendRequest) -> Result<RecommendResponse, RecommendError> {
        let opponent = request.opponent.trim().to_string();
        if opponent.is_empty() {
            return Err(StoreError::InvalidArgument("opponent must not be empty".into()).into());
        }
        let team = request.team.unwrap_or_else(|| self.defaults.default_team.clone());
        let season = request.season.unwrap_or_else(|| self.defaults.default_season.clone());
        let limit = request
            .limit
            .unwrap_or(i64::try_from(self.defaults.default_limit).unwrap_or(i64::MAX));
        if limit < 1 {
            return Err(StoreError::InvalidArgument(format!("limit must be at least 1, got {limit}")).into());
        }

        if self.store.is_empty().await {
            return Err(RecommendError::EmptyStore);
        }

        let team_filter: Filters = BTreeMap::from([
            ("team".to_string(), MetaValue::from(team.as_str())),
            ("season".to_string(), MetaValue::from(season.as_str())),
        ]);
        let team_docs = self.store.metadata_where(&team_filter).await;
        if team_docs.is_empty() {
            return Err(RecommendError::NoTeamData { team, season });
        }

        let aggregates = aggregate(&team_docs, ENTITY_FIELD, &STAT_FIELDS);

        let history_filter: Filters = BTreeMap::from([
            ("team".to_string(), MetaValue::from(team.as_str())),
            ("opponent".to_string(), MetaValue::from(opponent.as_str())),
        ]);
        let k = usize::try_from(limit).unwrap_or(usize::MAX).saturating_mul(3);
        let hits = self
            .store
            .search(&format!("rotation vs {opponent}"), k, &history_filter)
            .await?;

        let boost: HashSet<String> = hits
            .iter()
            .filter_map(|h| h.metadata.get(ENTITY_FIELD).and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect();
        let ranked = rank(&aggregates, &boost, limit);

        tracing::info!(
            %team,
            %season,
            %opponent,
            players = aggregates.len(),
            hits = hits.len(),
            boosted = boost.len(),
            "lineup ranked"
        );

        let (narrative, narrative_error) = match &self.narrator {
            None => (None, Some(NARRATOR_MISSING.to_string())),
            Some(narrator) => {
                let prompt = build_prompt(&team, &season, &opponent, &aggregates, &hits);
                let narrator = Arc::clone(narrator);
                match tokio::task::spawn_blocking(move || narrator.generate(&prompt)).await {
                    Ok(Ok(text)) => (Some(text), None),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %format!("{e:#}"), "narrative generation failed");
                        (None, Some(format!("{e:#}")))
                    }
                    Err(join) => {
                        tracing::warn!(error = %join, "narrative task failed");
                        (None, Some(join.to_string()))
                    }
                }
            }
        };

        Ok(RecommendResponse {
            team,
            season,
            opponent,
            suggested_lineup: ranked.iter().map(LineupSlot::from).collect(),
            player_stats: aggregates
                .into_iter()
                .map(|a| (a.entity_key, a.averages))
                .collect(),
            hits,
            narrative,
            narrative_error,
        })
    }
}

/// Coaching prompt: recent form per player, then opponent-history samples.
pub fn build_prompt(
    team: &str,
    season: &str,
    opponent: &str,
    aggregates: &[AggregateEntry],
    hits: &[RankedHit],
) -> String {
    let mut prompt = format!(
        "You are an NBA assistant coach. Build a recommended starting 5 and rotation \
         for {team} vs {opponent} in season {season}.\n\
         Use only the provided stats; be concise.\n\
         Players listed under opponent history have prior games vs this opponent.\n\
         Return JSON with keys: lineup (array of 5 player names), bench (array of 3-5 names), \
         reasons (array of strings).\n\
         \nPlayer recent form:\n"
    );
    for a in aggregates {
        let _ = writeln!(
            prompt,
            "- {}: min {}, pts {}, reb {}, ast {}",
            a.entity_key,
            a.stat("minutes"),
            a.stat("pts"),
            a.stat("reb"),
            a.stat("ast"),
        );
    }

    if !hits.is_empty() {
        prompt.push_str("\nOpponent history samples:\n");
        for hit in hits {
            let field = |key: &str| {
                hit.metadata
                    .get(key)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "?".into())
            };
            let _ = writeln!(
                prompt,
                "- {} vs {} on {}: {} MIN, {} PTS",
                field("player"),
                field("opponent"),
                field("game_date"),
                field("minutes"),
                field("pts"),
            );
        }
    }
    prompt
}
