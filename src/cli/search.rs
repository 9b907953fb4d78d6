use anyhow::Result;

use crate::config::CourtsideConfig;
use crate::store::types::Metadata;
use crate::store::SearchOptions;

/// Run a search from the terminal.
pub async fn search(
    config: &CourtsideConfig,
    query: &str,
    k: Option<usize>,
    filters: &[String],
    strict: bool,
) -> Result<()> {
    let filters = super::parse_filters(filters)?;
    let store = crate::server::open_store(config).await?;

    let options = SearchOptions {
        strict: strict || config.retrieval.strict_filters,
    };
    let k = k.unwrap_or(config.retrieval.default_k);
    let hits = store.search_with(query, k, &filters, options).await?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!("  {}. {} (score: {:.4})", i + 1, headline(&hit.metadata), hit.score);
        println!("     {}", summary(&hit.metadata));
        println!();
    }
    Ok(())
}

fn headline(meta: &Metadata) -> String {
    let get = |k: &str| meta.get(k).map(|v| v.to_string()).unwrap_or_default();
    format!("{} [{} {}] vs {}", get("player"), get("team"), get("season"), get("opponent"))
}

fn summary(meta: &Metadata) -> String {
    meta.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
