use thiserror::Error;

/// Errors surfaced by the crossing simulator.
///
/// Agent decisions never produce errors; these cover startup, the learning
/// policy's input validation and the outer run loop.
#[derive(Error, Debug)]
pub enum CrossingError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Policy input has {got} features, expected {expected}")]
    PolicyShape { expected: usize, got: usize },

    #[error("Policy input contains a non-finite value at index {0}")]
    PolicyNonFinite(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Viewer error: {0}")]
    Viewer(String),
}

pub type Result<T> = std::result::Result<T, CrossingError>;
