//! Errors raised by the simulation core.
//!
//! Very little here ever escapes a tick: erase overflow is logged and the
//! request dropped. These types exist so the lower-level pieces (the erase
//! queue, config loading) can report what happened to whoever calls them
//! directly.

use crate::entity::EntityId;

/// Errors produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Both the primary and fallback erase queues refused a request.
    #[error("erase queue overflow, dropped erase request for {entity}")]
    QueueOverflow { entity: EntityId },

    /// Configuration text could not be parsed.
    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration parsed, but holds values the core cannot run with.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Shorthand result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
