use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::classifier::{
    default_model_paths, predict_emotion, EmotionClassifier, HostedClassifier,
    LinearModelClassifier, PredictionOutput,
};
use crate::coach::Coach;
use crate::config::{ClassifierBackend, Config};
use crate::db::Database;
use crate::error::Result;
use crate::generator::{GeminiClient, ResponseGenerator};
use crate::logging;
use crate::repl::ChatRepl;

#[derive(Parser)]
#[command(name = "emotion-coach", version)]
#[command(about = "Emotion-aware mental health coach")]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify TEXT with the local model and print one JSON object
    Predict {
        /// Text to classify. Only the first value is used, so unquoted
        /// words and leading hyphens are accepted
        #[arg(allow_hyphen_values = true, trailing_var_arg = true, num_args = 0..)]
        text: Vec<String>,

        /// Model artifact, tried before the default locations
        #[arg(long, env = "EMOTION_MODEL_PATH")]
        model: Option<PathBuf>,
    },
    /// Start an interactive coaching session
    Chat {
        /// Log in as NAME instead of being asked
        #[arg(long)]
        name: Option<String>,

        /// Database file
        #[arg(long, env = "EMOTION_COACH_DB")]
        database: Option<PathBuf>,

        /// Emotion classifier backend: local or hosted
        #[arg(long, env = "EMOTION_CLASSIFIER")]
        classifier: Option<String>,
    },
}

pub async fn run() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    match args.command {
        Command::Predict { text, model } => {
            logging::init_stderr_logging();
            print_prediction(&prediction_for(text.first().map(String::as_str), model));
            ExitCode::SUCCESS
        }
        Command::Chat { name, database, classifier } => {
            match run_chat(name, database, classifier).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    logging::log_error(None, &e.to_string());
                    eprintln!("❌ {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// A missing argument is an error; an empty one is still classified.
fn prediction_for(text: Option<&str>, model: Option<PathBuf>) -> PredictionOutput {
    match text {
        Some(text) => predict_emotion(text, &default_model_paths(model)),
        None => PredictionOutput::error("No text provided"),
    }
}

fn print_prediction(output: &PredictionOutput) {
    match serde_json::to_string(output) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let fallback = PredictionOutput::error(format!("Error serializing prediction: {}", e));
            println!(
                "{}",
                serde_json::to_string(&fallback).unwrap_or_else(|_| {
                    r#"{"prediction":"error","probability":{}}"#.to_string()
                })
            );
        }
    }
}

fn build_classifier(config: &Config) -> Result<Box<dyn EmotionClassifier>> {
    if config.classifier == ClassifierBackend::Local {
        match LinearModelClassifier::load_first(&default_model_paths(config.model_path.clone())) {
            Ok(model) => {
                logging::log_classifier(&format!("Loaded local model from {}", model.source().display()));
                return Ok(Box::new(model));
            }
            Err(e) => {
                logging::log_error(None, &format!("{}; using hosted emotion model", e));
            }
        }
    }

    Ok(Box::new(HostedClassifier::new(
        config.hf_api_token.clone(),
        config.request_timeout_secs,
    )?))
}

async fn run_chat(
    name: Option<String>,
    database: Option<PathBuf>,
    classifier: Option<String>,
) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(database) = database {
        config.database_path = database;
    }
    if let Some(classifier) = classifier {
        config.classifier = classifier.parse()?;
    }

    if let Err(e) = logging::init_logging(&config.log_dir) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    let _ = logging::cleanup_old_logs(&config.log_dir);

    let db = Database::open(&config.database_path)?;
    logging::log_store(None, &format!("Opened database at {}", db.path().display()));

    let classifier = build_classifier(&config)?;
    let gemini = GeminiClient::new(&config.google_api_key, &config.gemini_model, config.request_timeout_secs)?;
    let coach = Coach::new(db, classifier, ResponseGenerator::new(Box::new(gemini)));

    let mut repl = ChatRepl::new(coach)?;
    repl.run(name).await
}
