use anyhow::Result;

use crate::config::CourtsideConfig;
use crate::recommend::RecommendRequest;

/// Print a lineup recommendation against `opponent`.
pub async fn recommend(
    config: &CourtsideConfig,
    opponent: &str,
    team: Option<String>,
    season: Option<String>,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let recommender = crate::server::build_recommender(config).await?;
    let response = recommender
        .recommend(RecommendRequest {
            opponent: opponent.to_string(),
            team,
            season,
            limit,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!(
        "Suggested lineup: {} vs {} ({})",
        response.team, response.opponent, response.season
    );
    println!("{}", "=".repeat(60));
    println!(
        "  {:<3} {:<24} {:>6} {:>6} {:>6} {:>6}  {}",
        "#", "Player", "MIN", "PTS", "REB", "AST", "History"
    );
    for (i, slot) in response.suggested_lineup.iter().enumerate() {
        println!(
            "  {:<3} {:<24} {:>6.1} {:>6.1} {:>6.1} {:>6.1}  {}",
            i + 1,
            slot.player,
            slot.avg_minutes,
            slot.avg_pts,
            slot.avg_reb,
            slot.avg_ast,
            if slot.opponent_history { "yes" } else { "-" }
        );
    }
    println!();
    println!("Opponent history samples: {}", response.hits.len());

    match (&response.narrative, &response.narrative_error) {
        (Some(text), _) => {
            println!();
            println!("{text}");
        }
        (None, Some(err)) => println!("Narrative unavailable: {err}"),
        (None, None) => {}
    }
    Ok(())
}
