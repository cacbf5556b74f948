//! Emotion classification
//!
//! Two interchangeable backends sit behind [`EmotionClassifier`]:
//! - [`LinearModelClassifier`]: a count-vectorised multinomial logistic
//!   regression exported to JSON. Gives a full probability distribution.
//! - [`HostedClassifier`]: a transformer model served by the Hugging Face
//!   Inference API. Its label vocabulary differs from the local model's.
//!
//! [`detect_emotion`] is what the chat flow uses; it never fails.
//! [`predict_emotion`] backs the `predict` command and reports failures as
//! a structured error object.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::emotion::{capitalize_label, Emotion};
use crate::error::{CoachError, Result};
use crate::logging;

pub const MODEL_FILE_NAME: &str = "emotion_classifier_pipe_lr.json";
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;

const HF_INFERENCE_URL: &str =
    "https://api-inference.huggingface.co/models/j-hartmann/emotion-english-distilroberta-base";

// Same token pattern as scikit-learn's CountVectorizer default
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
    /// Empty when the backend only reports the winning label.
    pub probabilities: BTreeMap<String, f64>,
}

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification>;

    fn name(&self) -> &'static str;
}

// ============ Local Linear Model ============

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinearModelArtifact {
    pub classes: Vec<String>,
    pub vocabulary: HashMap<String, usize>,
    /// One row per class, one column per vocabulary index
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
}

fn default_lowercase() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct LinearModelClassifier {
    model: LinearModelArtifact,
    source: PathBuf,
}

/// Candidate artifact locations, in lookup order.
pub fn default_model_paths(configured: Option<PathBuf>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = configured.into_iter().collect();
    paths.push(PathBuf::from(MODEL_FILE_NAME));
    paths.push(Path::new(".").join("models").join(MODEL_FILE_NAME));
    paths
}

impl LinearModelClassifier {
    pub fn from_artifact(model: LinearModelArtifact, source: PathBuf) -> Result<Self> {
        let n_classes = model.classes.len();
        if n_classes == 0 {
            return Err(CoachError::Classifier("model has no classes".into()));
        }
        if model.coef.len() != n_classes || model.intercept.len() != n_classes {
            return Err(CoachError::Classifier(format!(
                "model shape mismatch: {} classes, {} coef rows, {} intercepts",
                n_classes,
                model.coef.len(),
                model.intercept.len()
            )));
        }
        let n_features = model.coef[0].len();
        if model.coef.iter().any(|row| row.len() != n_features) {
            return Err(CoachError::Classifier("coef rows have unequal lengths".into()));
        }
        if let Some((term, idx)) = model.vocabulary.iter().find(|(_, idx)| **idx >= n_features) {
            return Err(CoachError::Classifier(format!(
                "vocabulary term '{}' maps to column {} but the model has {} features",
                term, idx, n_features
            )));
        }

        Ok(Self { model, source })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let model: LinearModelArtifact = serde_json::from_str(&raw)?;
        Self::from_artifact(model, path.to_path_buf())
    }

    /// Load from the first candidate path that exists.
    pub fn load_first(candidates: &[PathBuf]) -> Result<Self> {
        let path = candidates
            .iter()
            .find(|p| p.is_file())
            .ok_or_else(|| CoachError::ModelNotFound(candidates.to_vec()))?;

        logging::log_classifier(&format!("Loading model from: {}", path.display()));
        Self::load(path)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn classes(&self) -> &[String] {
        &self.model.classes
    }

    fn term_counts(&self, text: &str) -> HashMap<usize, f64> {
        let text = if self.model.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        let mut counts = HashMap::new();
        for token in TOKEN_PATTERN.find_iter(&text) {
            if let Some(&idx) = self.model.vocabulary.get(token.as_str()) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        counts
    }

    /// Class probabilities, in the order of `classes()`.
    pub fn predict_proba(&self, text: &str) -> Vec<f64> {
        let counts = self.term_counts(text);

        let scores: Vec<f64> = self
            .model
            .coef
            .iter()
            .zip(&self.model.intercept)
            .map(|(row, bias)| bias + counts.iter().map(|(idx, n)| row[*idx] * n).sum::<f64>())
            .collect();

        softmax(&scores)
    }

    pub fn predict(&self, text: &str) -> Classification {
        let probs = self.predict_proba(text);

        // Ties resolve to the first class, like numpy's argmax
        let (best, confidence) = probs
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, p)| if *p > acc.1 { (i, *p) } else { acc });

        Classification {
            label: self.model.classes[best].clone(),
            confidence,
            probabilities: self.model.classes.iter().cloned().zip(probs).collect(),
        }
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

#[async_trait]
impl EmotionClassifier for LinearModelClassifier {
    async fn classify(&self, text: &str) -> Result<Classification> {
        Ok(self.predict(text))
    }

    fn name(&self) -> &'static str {
        "local-linear"
    }
}

// ============ Hosted Model ============

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize, Clone)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

#[derive(Debug, Deserialize)]
struct InferenceError {
    error: String,
}

pub struct HostedClassifier {
    client: Client,
    api_token: Option<String>,
}

impl HostedClassifier {
    pub fn new(api_token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, api_token })
    }
}

fn classification_from_scores(scores: Vec<LabelScore>) -> Result<Classification> {
    let best = scores
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .cloned()
        .ok_or_else(|| CoachError::Classifier("hosted model returned no labels".into()))?;

    Ok(Classification {
        label: capitalize_label(&best.label),
        confidence: best.score,
        probabilities: scores
            .into_iter()
            .map(|s| (capitalize_label(&s.label), s.score))
            .collect(),
    })
}

#[async_trait]
impl EmotionClassifier for HostedClassifier {
    async fn classify(&self, text: &str) -> Result<Classification> {
        let mut request = self
            .client
            .post(HF_INFERENCE_URL)
            .header("Content-Type", "application/json")
            .json(&InferenceRequest { inputs: text });

        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            if let Ok(parsed) = serde_json::from_str::<InferenceError>(&error_text) {
                return Err(CoachError::Classifier(format!(
                    "Inference API error ({}): {}",
                    status, parsed.error
                )));
            }
            return Err(CoachError::Classifier(format!(
                "Inference API error ({}): {}",
                status, error_text
            )));
        }

        let scores = match response.json::<InferenceResponse>().await? {
            InferenceResponse::Nested(mut batches) => {
                if batches.is_empty() {
                    Vec::new()
                } else {
                    batches.swap_remove(0)
                }
            }
            InferenceResponse::Flat(scores) => scores,
        };

        classification_from_scores(scores)
    }

    fn name(&self) -> &'static str {
        "hosted-transformer"
    }
}

// ============ Chat Adapter ============

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: Option<f64>,
    /// Diagnostic for the user; never blocks the turn
    pub notice: Option<String>,
}

/// Classify for the chat flow. Any failure degrades to Neutral.
pub async fn detect_emotion(classifier: &dyn EmotionClassifier, text: &str) -> Detection {
    match classifier.classify(text).await {
        Ok(result) => {
            let label = capitalize_label(&result.label);
            logging::log_classifier(&format!(
                "{} -> {} ({:.2})",
                classifier.name(),
                label,
                result.confidence
            ));

            let notice = (result.confidence < LOW_CONFIDENCE_THRESHOLD).then(|| {
                format!(
                    "Low confidence emotion detection: {} ({:.2})",
                    label, result.confidence
                )
            });

            Detection {
                label,
                confidence: Some(result.confidence),
                notice,
            }
        }
        Err(e) => {
            logging::log_error(None, &format!("Emotion detection failed: {}", e));
            Detection {
                label: Emotion::Neutral.as_str().to_string(),
                confidence: None,
                notice: Some(format!("Emotion detection failed: {}", e)),
            }
        }
    }
}

// ============ Command-line Prediction ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutput {
    pub prediction: String,
    pub probability: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionOutput {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            prediction: "error".to_string(),
            probability: BTreeMap::new(),
            error: Some(message.into()),
        }
    }
}

/// Predict with the local model. Never fails: errors become an
/// `"error"` prediction with an empty probability map.
pub fn predict_emotion(text: &str, candidates: &[PathBuf]) -> PredictionOutput {
    match LinearModelClassifier::load_first(candidates) {
        Ok(model) => {
            let result = model.predict(text);
            PredictionOutput {
                prediction: result.label,
                probability: result.probabilities,
                error: None,
            }
        }
        Err(e) => PredictionOutput::error(format!("Error in predict_emotion: {}", e)),
    }
}
