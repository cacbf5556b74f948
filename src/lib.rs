pub mod classifier;
pub mod cli;
pub mod coach;
pub mod config;
pub mod db;
pub mod emotion;
pub mod error;
pub mod generator;
pub mod logging;
pub mod mood;
pub mod prompts;
pub mod repl;
pub mod session;

pub use classifier::{Classification, EmotionClassifier, PredictionOutput};
pub use cli::run;
pub use coach::{Coach, TurnOutcome};
pub use db::Database;
pub use error::{CoachError, Result};
pub use generator::{GeneratedResponse, Reply, ReplyKind, ResponseGenerator, TextGenerator};
pub use session::SessionContext;
