//! CLI `doctor` command: check model files and persisted corpus, print a report.

use anyhow::Result;

use crate::config::{CourtsideConfig, StorageBackend};
use crate::db::{self, SqliteMedium};

/// Run diagnostics and print a health report.
pub async fn doctor(config: &CourtsideConfig) -> Result<()> {
    let data_dir = config.resolved_data_dir();
    let cache_dir = crate::config::expand_tilde(&config.embedding.cache_dir);

    println!("Courtside Health Report");
    println!("=======================");
    println!();
    println!("Data dir:          {}", data_dir.display());
    println!("Backend:           {:?}", config.storage.backend);
    println!();

    println!("Embedding model:   {}", config.embedding.model);
    let mut model_ok = true;
    for name in ["model.onnx", "tokenizer.json"] {
        let path = cache_dir.join(name);
        match std::fs::metadata(&path) {
            Ok(m) => println!("  {:<16} {} ({})", name, path.display(), format_bytes(m.len())),
            Err(_) => {
                model_ok = false;
                println!("  {:<16} MISSING at {}", name, path.display());
            }
        }
    }
    if !model_ok {
        println!("  Run `courtside model download` to fetch it.");
    }
    println!();

    if config.storage.backend == StorageBackend::Sqlite {
        let db_path = data_dir.join(db::DB_FILE_NAME);
        if !db_path.exists() {
            println!("Database: not found at {}", db_path.display());
            println!("Run `courtside ingest` to create it.");
            return Ok(());
        }
        let report = SqliteMedium::open(&data_dir)?.health()?;
        println!("Schema version:    {}", report.schema_version);
        println!(
            "Stored model:      {}",
            report.embedding_model.as_deref().unwrap_or("(not set)")
        );
        if let Some(ref stored) = report.embedding_model {
            if stored != &config.embedding.model {
                println!("  WARNING: model mismatch! Re-ingest to rebuild vectors.");
            }
        }
        for stream in &report.streams {
            println!(
                "  {:<16} {} (updated {})",
                stream.key,
                format_bytes(stream.bytes),
                stream.updated_at.as_deref().unwrap_or("unknown")
            );
        }
        if report.integrity_ok {
            println!("Integrity check:   PASSED");
        } else {
            println!("Integrity check:   FAILED ({})", report.integrity_details);
        }
        println!();
    }

    let medium = crate::server::open_medium(config)?;
    match crate::store::persisted_stats(medium, config.retrieval.persist_timeout()).await {
        Ok(stats) => {
            println!("Corpus:            OK");
            println!("  Records:         {}", stats.records);
            if let Some(dim) = stats.dimension {
                println!("  Dimension:       {dim}");
            }
        }
        Err(e) => {
            println!("Corpus:            UNREADABLE ({e})");
            println!();
            println!("Recovery steps:");
            println!("  1. Move the data dir aside: mv {0} {0}.bak", data_dir.display());
            println!("  2. Re-run `courtside ingest` for each team and season.");
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
