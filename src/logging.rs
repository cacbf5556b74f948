//! Structured logging for Emotion Coach
//!
//! Events go to stderr and to a daily file under the log directory, tagged
//! with one of these categories:
//! - CONVERSATION: Session lifecycle (login, new session, turns)
//! - CLASSIFIER: Emotion detection
//! - GENERATOR: Reply generation and crisis routing
//! - STORE: Persistence events
//! - ERROR: Errors and failed external calls
//!
//! stdout is never written to, so `predict` output stays machine-readable.

use chrono::{Local, Utc};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Conversation,
    Classifier,
    Generator,
    Store,
    Error,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Conversation => "CONVERSATION",
            LogCategory::Classifier => "CLASSIFIER",
            LogCategory::Generator => "GENERATOR",
            LogCategory::Store => "STORE",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Default log directory: `<data_local_dir>/emotion-coach/logs`
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("emotion-coach")
        .join("logs")
}

fn log_file_path(log_dir: &Path) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    log_dir.join(format!("emotion-coach-{}.log", today))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: stderr plus today's log file.
pub fn init_logging(log_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(log_dir)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(log_dir))?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()?;

    log_conversation(None, "Emotion Coach logging initialized");
    Ok(())
}

/// Stderr-only subscriber, used by `predict`.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Log a message with category and optional conversation context
pub fn log(category: LogCategory, conversation_id: Option<i64>, message: &str) {
    let category = category.as_str();
    match (category, conversation_id) {
        ("ERROR", Some(id)) => tracing::error!(category, conversation = id, "{}", message),
        ("ERROR", None) => tracing::error!(category, "{}", message),
        (_, Some(id)) => tracing::info!(category, conversation = id, "{}", message),
        (_, None) => tracing::info!(category, "{}", message),
    }
}

pub fn log_conversation(conversation_id: Option<i64>, message: &str) {
    log(LogCategory::Conversation, conversation_id, message);
}

pub fn log_classifier(message: &str) {
    log(LogCategory::Classifier, None, message);
}

pub fn log_generator(conversation_id: Option<i64>, message: &str) {
    log(LogCategory::Generator, conversation_id, message);
}

pub fn log_store(conversation_id: Option<i64>, message: &str) {
    log(LogCategory::Store, conversation_id, message);
}

pub fn log_error(conversation_id: Option<i64>, message: &str) {
    log(LogCategory::Error, conversation_id, message);
}

/// Remove log files older than a week. Returns how many were deleted.
pub fn cleanup_old_logs(log_dir: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(LOG_RETENTION_DAYS);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified_time: chrono::DateTime<Utc> = modified.into();
            if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                deleted += 1;
            }
        }
    }

    Ok(deleted)
}
