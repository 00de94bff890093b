//! Rich diagnostic error types for mindloop.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes and help text. [`MindError`] aggregates
//! them so callers can use a single `?` chain.

use miette::Diagnostic;
use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::memory::MemoryError;
use crate::paths::PathError;
use crate::persist::PersistError;
use crate::term::TermError;
use crate::tool::ToolError;

/// Top-level error type.
#[derive(Debug, Error, Diagnostic)]
pub enum MindError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Term(#[from] TermError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bootstrap(#[from] BootstrapError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("{store}: id \"{id}\" already exists")]
    #[diagnostic(
        code(mindloop::store::duplicate_id),
        help("Identifiers are unique per store. Use `update` to replace an existing entry.")
    )]
    DuplicateId { store: &'static str, id: String },

    #[error("{store}: no entry with id \"{id}\"")]
    #[diagnostic(
        code(mindloop::store::not_found),
        help("The entry may have been deleted. List entries to find a valid id.")
    )]
    NotFound { store: &'static str, id: String },

    #[error("{store}: prefix \"{prefix}\" is too short (minimum {min} characters)")]
    #[diagnostic(
        code(mindloop::store::prefix_too_short),
        help("Type more of the id, or the full id.")
    )]
    PrefixTooShort {
        store: &'static str,
        prefix: String,
        min: usize,
    },

    #[error("{store}: prefix \"{prefix}\" matches {matches} entries")]
    #[diagnostic(
        code(mindloop::store::ambiguous_prefix),
        help("Type more characters of the id until only one entry matches.")
    )]
    AmbiguousPrefix {
        store: &'static str,
        prefix: String,
        matches: usize,
    },

    #[error("{store}: nothing matches prefix \"{prefix}\"")]
    #[diagnostic(
        code(mindloop::store::no_match),
        help("Check the id. Deleted entries cannot be resolved.")
    )]
    NoMatch { store: &'static str, prefix: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(mindloop::store::serde),
        help(
            "Failed to serialize or deserialize store state. \
             The state file may be from an incompatible version or corrupted."
        )
    )]
    Serialization { message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid rule {id}: {message}")]
    #[diagnostic(
        code(mindloop::engine::invalid_rule),
        help("A rule action must be a structure whose functor names a registered tool, e.g. `llm(expand, GOAL)`.")
    )]
    InvalidRule { id: String, message: String },

    #[error("invalid engine configuration: {message}")]
    #[diagnostic(
        code(mindloop::engine::invalid_config),
        help("Check the [engine] section of the configuration file.")
    )]
    InvalidConfig { message: String },

    #[error("no thought is waiting for request \"{request_id}\"")]
    #[diagnostic(
        code(mindloop::engine::no_waiting_thought),
        help(
            "The request may already have been answered, or the waiting thought was deleted. \
             List WAITING thoughts to see open requests."
        )
    )]
    NoWaitingThought { request_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result type for the crate-wide error.
pub type MindResult<T> = std::result::Result<T, MindError>;
