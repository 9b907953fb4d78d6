//! Lineup recommendations from retrieved game history.
//!
//! Courtside embeds per-game box-score sentences, keeps them in an in-process
//! vector store, and answers "who should start against this opponent?" with a
//! deterministic ranking, optionally narrated by a hosted language model.
//!
//! # Architecture
//!
//! - **Storage**: a dense, row-normalized `ndarray` matrix plus parallel
//!   metadata, persisted as two streams through a [`store::medium::PersistenceMedium`]
//!   (plain files or SQLite)
//! - **Embeddings**: local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Search**: exact cosine similarity over the filtered candidate set
//! - **Ranking**: per-player averages, boosted by opponent history
//! - **Transport**: HTTP (axum) and a CLI
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML and environment variables
//! - [`store`]: the vector store, its persisted format, and media
//! - [`db`]: the SQLite medium, schema, and migrations
//! - [`embedding`]: text-to-vector providers
//! - [`ingest`]: game-log rows to records
//! - [`lineup`]: aggregation and ranking
//! - [`narrative`]: optional prose from a hosted model
//! - [`recommend`]: the end-to-end recommendation
//! - [`server`]: HTTP routes and shared setup

pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod lineup;
pub mod narrative;
pub mod recommend;
pub mod server;
pub mod store;
