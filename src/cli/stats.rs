use anyhow::Result;

use crate::config::CourtsideConfig;

/// Display corpus statistics in the terminal.
///
/// Reads the persisted corpus directly; no embedding model is needed.
pub async fn stats(config: &CourtsideConfig) -> Result<()> {
    let medium = crate::server::open_medium(config)?;
    let stats =
        crate::store::persisted_stats(medium, config.retrieval.persist_timeout()).await?;

    println!("Corpus Statistics");
    println!("{}", "=".repeat(40));
    println!("  Records:             {}", stats.records);
    println!(
        "  Dimension:           {}",
        stats.dimension.map_or_else(|| "(empty)".to_string(), |d| d.to_string())
    );
    println!("  Distinct players:    {}", stats.players);
    println!();

    println!("By Team:");
    for (team, count) in &stats.by_team {
        println!("  {:<12} {}", team, count);
    }
    println!();

    println!("By Season:");
    for (season, count) in &stats.by_season {
        println!("  {:<12} {}", season, count);
    }

    Ok(())
}
