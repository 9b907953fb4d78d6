//! Deterministic lineup ranking: per-player averages ([`aggregate`]) ordered by
//! opponent history, minutes, and points ([`rank`]).

pub mod aggregate;
pub mod rank;

pub use aggregate::{aggregate, AggregateEntry};
pub use rank::{rank, RankedEntity};

/// Metadata key that identifies a player.
pub const ENTITY_FIELD: &str = "player";

/// Stats averaged for every recommendation.
pub const STAT_FIELDS: [&str; 4] = ["pts", "reb", "ast", "minutes"];
