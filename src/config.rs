use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::db::DEFAULT_DB_PATH;
use crate::error::{CoachError, Result};
use crate::logging;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierBackend {
    /// Linear model artifact on disk
    Local,
    /// Hugging Face Inference API
    Hosted,
}

impl FromStr for ClassifierBackend {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ClassifierBackend::Local),
            "hosted" => Ok(ClassifierBackend::Hosted),
            other => Err(CoachError::Config(format!(
                "EMOTION_CLASSIFIER must be 'local' or 'hosted', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: String,
    pub gemini_model: String,
    pub database_path: PathBuf,
    pub classifier: ClassifierBackend,
    pub model_path: Option<PathBuf>,
    pub hf_api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub log_dir: PathBuf,
}

impl Config {
    /// Read configuration from the environment (after `.env` is loaded).
    /// A missing `GOOGLE_API_KEY` is fatal.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let google_api_key = lookup("GOOGLE_API_KEY")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                CoachError::Config(
                    "GOOGLE_API_KEY not found. Add it to your .env or environment variables.".into(),
                )
            })?;

        let classifier = match lookup("EMOTION_CLASSIFIER") {
            Some(value) => value.parse()?,
            None => ClassifierBackend::Local,
        };

        let request_timeout_secs = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(value) => value.trim().parse().map_err(|_| {
                CoachError::Config(format!("REQUEST_TIMEOUT_SECS must be a number, got '{}'", value))
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            google_api_key,
            gemini_model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
            database_path: lookup("EMOTION_COACH_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            classifier,
            model_path: lookup("EMOTION_MODEL_PATH")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            hf_api_token: lookup("HF_API_TOKEN").filter(|s| !s.is_empty()),
            request_timeout_secs,
            log_dir: lookup("EMOTION_COACH_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(logging::default_log_dir),
        })
    }
}
