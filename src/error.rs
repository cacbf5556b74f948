// Error types for Emotion Coach

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoachError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("terminal error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("Model file not found in any of the expected locations: {}", display_paths(.0))]
    ModelNotFound(Vec<PathBuf>),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("generator error: {0}")]
    Generator(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no user is logged in")]
    NotIdentified,

    #[error("conversation {0} not found")]
    ConversationNotFound(i64),
}

pub type Result<T> = std::result::Result<T, CoachError>;

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
