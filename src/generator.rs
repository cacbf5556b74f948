use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{CoachError, Result};
use crate::logging;
use crate::prompts;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ============ Response Shapes ============

/// The shapes a generation service may hand back. Each variant has one
/// extraction rule; anything else is `Unrecognized` and yields no text.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedResponse {
    DirectText { text: String },
    Candidates(Vec<Candidate>),
    Unrecognized(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Candidate {
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub output: Option<Vec<OutputItem>>,
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub content: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CandidateContent {
    /// Gemini REST: `{"parts": [{"text": ...}], "role": "model"}`
    Parts { parts: Vec<TextPart> },
    /// Flat list: `[{"text": ...}]`
    Items(Vec<TextPart>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextPart {
    #[serde(default)]
    pub text: Option<String>,
}

fn non_empty(text: Option<&String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty()).cloned()
}

impl GeneratedResponse {
    pub fn from_value(value: Value) -> Self {
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return GeneratedResponse::DirectText { text: text.to_string() };
            }
        }

        if let Some(candidates) = value.get("candidates").filter(|c| c.is_array()) {
            if let Ok(candidates) = serde_json::from_value::<Vec<Candidate>>(candidates.clone()) {
                return GeneratedResponse::Candidates(candidates);
            }
        }

        GeneratedResponse::Unrecognized(value)
    }

    /// `None` means no usable text.
    pub fn text(&self) -> Option<String> {
        match self {
            GeneratedResponse::DirectText { text } => non_empty(Some(text)),
            GeneratedResponse::Candidates(candidates) => candidates.first().and_then(Candidate::text),
            GeneratedResponse::Unrecognized(_) => None,
        }
    }
}

impl Candidate {
    /// output_text, then output[0].content[0].text, then content parts.
    fn text(&self) -> Option<String> {
        if let Some(text) = non_empty(self.output_text.as_ref()) {
            return Some(text);
        }

        if let Some(text) = self
            .output
            .as_ref()
            .and_then(|items| items.first())
            .and_then(|item| item.content.first())
            .and_then(|part| non_empty(part.text.as_ref()))
        {
            return Some(text);
        }

        match &self.content {
            Some(CandidateContent::Parts { parts }) => {
                let joined: String = parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("");
                non_empty(Some(&joined))
            }
            Some(CandidateContent::Items(items)) => {
                items.first().and_then(|part| non_empty(part.text.as_ref()))
            }
            None => None,
        }
    }
}

// ============ Generation Service ============

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedResponse>;
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetails,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetails {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_BASE, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedResponse> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![RequestPart { text: prompt.to_string() }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;

            if let Ok(parsed) = serde_json::from_str::<GeminiError>(&error_text) {
                return Err(CoachError::Generator(format!(
                    "Gemini API error ({}): {} - {}",
                    status,
                    parsed.error.status.unwrap_or_default(),
                    parsed.error.message
                )));
            }
            return Err(CoachError::Generator(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await?;
        Ok(GeneratedResponse::from_value(body))
    }
}

// ============ Reply Generation ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    Crisis,
    Generated,
    Apology,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

// Every non-crisis reply ends with an exercise, apologies included
fn with_practice(reply: &str, emotion: &str, user_name: &str) -> String {
    format!(
        "{}\n\n**Personalized Practice:** {}",
        reply,
        prompts::personalized_exercise(emotion, user_name)
    )
}

pub struct ResponseGenerator {
    generator: Box<dyn TextGenerator>,
}

impl ResponseGenerator {
    pub fn new(generator: Box<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Crisis language short-circuits before any external call.
    pub async fn respond(
        &self,
        user_text: &str,
        emotion: &str,
        user_name: &str,
        conversation_id: Option<i64>,
    ) -> Reply {
        if prompts::contains_crisis_language(user_text) {
            logging::log_generator(conversation_id, "Crisis language detected, sending crisis resources");
            return Reply {
                kind: ReplyKind::Crisis,
                text: prompts::crisis_reply(user_name),
            };
        }

        let prompt = prompts::build_coach_prompt(user_text, emotion, user_name);

        match self.generator.generate(&prompt).await {
            Ok(response) => match response.text() {
                Some(text) => {
                    logging::log_generator(conversation_id, &format!("Generated {} chars", text.len()));
                    Reply {
                        kind: ReplyKind::Generated,
                        text: with_practice(&text, emotion, user_name),
                    }
                }
                None => {
                    logging::log_error(conversation_id, "Generator returned no extractable text");
                    Reply {
                        kind: ReplyKind::Apology,
                        text: with_practice(&prompts::no_text_reply(user_name), emotion, user_name),
                    }
                }
            },
            Err(e) => {
                logging::log_error(conversation_id, &format!("Generation failed: {}", e));
                Reply {
                    kind: ReplyKind::Apology,
                    text: with_practice(
                        &prompts::failure_reply(user_name, &e.to_string()),
                        emotion,
                        user_name,
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted generator that counts how often it is called.
    pub(crate) struct FakeGenerator {
        pub calls: Arc<AtomicUsize>,
        pub response: Option<Value>,
    }

    impl FakeGenerator {
        pub(crate) fn replying(text: &str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fake = Self {
                calls: Arc::clone(&calls),
                response: Some(json!({ "text": text })),
            };
            (fake, calls)
        }

        pub(crate) fn failing() -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fake = Self {
                calls: Arc::clone(&calls),
                response: None,
            };
            (fake, calls)
        }
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate(&self, _prompt: &str) -> Result<GeneratedResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Some(value) => Ok(GeneratedResponse::from_value(value.clone())),
                None => Err(CoachError::Generator("service unavailable".into())),
            }
        }
    }

    #[test]
    fn test_direct_text_shape() {
        let response = GeneratedResponse::from_value(json!({ "text": "Hello there" }));
        assert_eq!(response, GeneratedResponse::DirectText { text: "Hello there".into() });
        assert_eq!(response.text().as_deref(), Some("Hello there"));
    }

    #[test]
    fn test_gemini_rest_shape_joins_parts() {
        let response = GeneratedResponse::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Part one. " }, { "text": "Part two." }] },
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(response.text().as_deref(), Some("Part one. Part two."));
    }

    #[test]
    fn test_output_text_wins_over_content() {
        let response = GeneratedResponse::from_value(json!({
            "candidates": [{
                "output_text": "from output_text",
                "content": { "parts": [{ "text": "from parts" }] }
            }]
        }));
        assert_eq!(response.text().as_deref(), Some("from output_text"));
    }

    #[test]
    fn test_nested_output_shape() {
        let response = GeneratedResponse::from_value(json!({
            "candidates": [{ "output": [{ "content": [{ "text": "nested" }] }] }]
        }));
        assert_eq!(response.text().as_deref(), Some("nested"));
    }

    #[test]
    fn test_content_item_list_shape() {
        let response = GeneratedResponse::from_value(json!({
            "candidates": [{ "content": [{ "text": "listed" }] }]
        }));
        assert_eq!(response.text().as_deref(), Some("listed"));
    }

    #[test]
    fn test_unrecognized_shapes_have_no_text() {
        let blocked = GeneratedResponse::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }));
        assert!(matches!(blocked, GeneratedResponse::Unrecognized(_)));
        assert_eq!(blocked.text(), None);

        let empty = GeneratedResponse::from_value(json!({ "candidates": [] }));
        assert_eq!(empty.text(), None);

        let blank = GeneratedResponse::from_value(json!({ "text": "   " }));
        assert_eq!(blank.text(), None);
    }

    #[tokio::test]
    async fn test_crisis_bypasses_generator() {
        let (fake, calls) = FakeGenerator::replying("should not be used");
        let generator = ResponseGenerator::new(Box::new(fake));

        let reply = generator.respond("I've been thinking about SUICIDE", "Sadness", "Ada", None).await;

        assert_eq!(reply.kind, ReplyKind::Crisis);
        assert_eq!(reply.text, prompts::crisis_reply("Ada"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generated_reply_appends_practice() {
        let (fake, calls) = FakeGenerator::replying("You sound stretched thin.");
        let generator = ResponseGenerator::new(Box::new(fake));

        let reply = generator.respond("Work is a lot", "Fear", "Ada", Some(1)).await;

        assert_eq!(reply.kind, ReplyKind::Generated);
        assert!(reply.text.starts_with("You sound stretched thin."));
        assert!(reply.text.contains("**Personalized Practice:**"));
        assert!(reply.text.contains("fear setting"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_becomes_apology() {
        let (fake, calls) = FakeGenerator::failing();
        let generator = ResponseGenerator::new(Box::new(fake));

        let reply = generator.respond("Long day", "Sadness", "Ada", None).await;

        assert_eq!(reply.kind, ReplyKind::Apology);
        assert!(reply.text.starts_with("⚠️ Sorry Ada, I couldn't generate a response:"));
        assert!(reply.text.contains("service unavailable"));
        assert!(reply.text.ends_with(&format!(
            "\n\n**Personalized Practice:** {}",
            prompts::personalized_exercise("Sadness", "Ada")
        )));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_text_becomes_apology() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fake = FakeGenerator {
            calls: Arc::clone(&calls),
            response: Some(json!({ "candidates": [{ "finishReason": "SAFETY" }] })),
        };
        let generator = ResponseGenerator::new(Box::new(fake));

        let reply = generator.respond("Long day", "Neutral", "Ada", None).await;

        assert_eq!(reply.kind, ReplyKind::Apology);
        assert_eq!(
            reply.text,
            format!(
                "{}\n\n**Personalized Practice:** {}",
                prompts::no_text_reply("Ada"),
                prompts::personalized_exercise("Neutral", "Ada")
            )
        );
    }
}
