use thiserror::Error;

/// Errors the CLI and stdio server branch on directly.
///
/// Everything else (parse errors, filesystem errors crossing a boundary)
/// flows through `anyhow::Result` instead — this enum only exists for the
/// handful of cases where a caller needs to distinguish failure kinds.
#[derive(Debug, Error)]
pub enum HermesError {
    #[error("failed to initialize store: {statement}: {source}")]
    Init {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, HermesError>;
