//! AI writing assistant.
//!
//! A thin prompt-templating layer over any OpenAI-compatible
//! chat-completions endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackit_common::{AiConfig, AppError, AppResult, Metrics, get_metrics};

const MAX_TOKENS: u32 = 1024;

const CHAT_SYSTEM_PROMPT: &str = "You are an expert software developer and coding assistant for StackIt, a Q&A platform for developers. Your role is to: 1. Provide clear, accurate, and helpful answers to coding questions 2. Explain complex concepts in an understandable way 3. Give practical code examples when relevant 4. Suggest best practices and alternatives 5. Be encouraging and supportive to developers of all skill levels 6. Format your responses with proper markdown when including code 7. Ask clarifying questions if the problem isn't clear\n\nKeep responses concise but comprehensive. Always aim to help the developer learn and understand the solution.";

/// Failure talking to the text provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("provider returned no choices")]
    Empty,
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        Self::UpstreamUnavailable(err.to_string())
    }
}

/// Something that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt`, optionally under a system prompt.
    async fn complete(&self, system: Option<&str>, prompt: &str) -> AppResult<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiCompatibleGenerator {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleGenerator {
    /// Build a client from configuration.
    pub fn new(config: &AiConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build AI HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn request(&self, system: Option<&str>, prompt: &str) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: MAX_TOKENS,
        };

        let mut request = self.http_client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or(ProviderError::Empty)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> AppResult<String> {
        Ok(self.request(system, prompt).await?)
    }
}

/// Rewrite styles offered by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhanceKind {
    Enhance,
    Grammar,
    Expand,
    Summarize,
    Professional,
    Casual,
}

impl EnhanceKind {
    const fn instruction(self) -> &'static str {
        match self {
            Self::Enhance => {
                "Enhance the following text to make it clearer, more engaging, and better structured while maintaining its original meaning and tone."
            }
            Self::Grammar => {
                "Fix any grammatical errors, spelling mistakes, and improve sentence structure in the following text while preserving the original meaning and tone."
            }
            Self::Expand => {
                "Expand the following text with more details, examples, and explanations while maintaining the same topic and tone."
            }
            Self::Summarize => {
                "Summarize the following text while keeping the key points and main ideas."
            }
            Self::Professional => {
                "Rewrite the following text in a more professional and formal tone suitable for business or academic contexts."
            }
            Self::Casual => "Rewrite the following text in a more casual and friendly tone.",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Enhance => "Enhanced text",
            Self::Grammar => "Corrected text",
            Self::Expand => "Expanded text",
            Self::Summarize => "Summary",
            Self::Professional => "Professional version",
            Self::Casual => "Casual version",
        }
    }

    /// Prompt for rewriting `text`.
    #[must_use]
    pub fn prompt(self, text: &str, context: Option<&str>) -> String {
        let mut prompt = format!(
            "{} Keep the same format (HTML if applicable):\n\nOriginal text: {text}\n\n{}:",
            self.instruction(),
            self.label()
        );
        if let Some(context) = context {
            prompt.push_str("\n\nContext: ");
            prompt.push_str(context);
        }
        prompt
    }
}

/// Prompt for free-form generation.
#[must_use]
pub fn generation_prompt(prompt: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("Context: {context}\n\nRequest: {prompt}\n\nResponse:"),
        None => prompt.to_string(),
    }
}

/// A chat reply.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// AI service for business logic.
#[derive(Clone)]
pub struct AiService {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl AiService {
    /// Create the service from configuration. Disabled config yields a service
    /// that refuses every request.
    pub fn new(config: &AiConfig) -> AppResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let generator = OpenAiCompatibleGenerator::new(config)?;
        Ok(Self::with_generator(Arc::new(generator)))
    }

    /// A service backed by `generator`.
    #[must_use]
    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// A service with no provider.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { generator: None }
    }

    /// Whether a provider is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Rewrite `text` in the given style.
    pub async fn enhance(
        &self,
        kind: EnhanceKind,
        text: &str,
        context: Option<&str>,
    ) -> AppResult<String> {
        let text = required("text", text)?;
        let context = context.map(str::trim).filter(|c| !c.is_empty());
        self.run(None, &kind.prompt(text, context)).await
    }

    /// Generate text for `prompt`.
    pub async fn generate(&self, prompt: &str, context: Option<&str>) -> AppResult<String> {
        let prompt = required("prompt", prompt)?;
        let context = context.map(str::trim).filter(|c| !c.is_empty());
        self.run(None, &generation_prompt(prompt, context)).await
    }

    /// Ask the coding assistant.
    pub async fn chat(&self, message: &str) -> AppResult<ChatReply> {
        let message = required("message", message)?;
        let response = self.run(Some(CHAT_SYSTEM_PROMPT), message).await?;
        Ok(ChatReply {
            response,
            timestamp: Utc::now(),
        })
    }

    async fn run(&self, system: Option<&str>, prompt: &str) -> AppResult<String> {
        let generator = self.generator.as_ref().ok_or_else(|| {
            AppError::UpstreamUnavailable("AI assistant is not configured".to_string())
        })?;

        match generator.complete(system, prompt).await {
            Ok(text) => Ok(text),
            Err(e) => {
                Metrics::incr(&get_metrics().ai_failures);
                tracing::warn!(error = %e, "AI provider request failed");
                Err(e)
            }
        }
    }
}

fn required<'a>(field: &str, value: &'a str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidArgument(format!("{field} is required")));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(Option<String>, String)>>,
    }

    #[async_trait]
    impl TextGenerator for Recorder {
        async fn complete(&self, system: Option<&str>, prompt: &str) -> AppResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((system.map(ToString::to_string), prompt.to_string()));
            Ok("done".to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn complete(&self, _system: Option<&str>, _prompt: &str) -> AppResult<String> {
            Err(ProviderError::Empty.into())
        }
    }

    #[test]
    fn test_enhance_prompt_template() {
        let prompt = EnhanceKind::Grammar.prompt("teh code", None);
        assert!(prompt.starts_with("Fix any grammatical errors"));
        assert!(prompt.contains("Keep the same format (HTML if applicable)"));
        assert!(prompt.contains("Original text: teh code"));
        assert!(prompt.ends_with("Corrected text:"));

        let prompt = EnhanceKind::Summarize.prompt("long text", Some("a rust question"));
        assert!(prompt.ends_with("Summary:\n\nContext: a rust question"));
    }

    #[test]
    fn test_enhance_kind_parses_lowercase() {
        let kind: EnhanceKind = serde_json::from_str("\"professional\"").unwrap();
        assert_eq!(kind, EnhanceKind::Professional);
        assert!(serde_json::from_str::<EnhanceKind>("\"shout\"").is_err());
    }

    #[test]
    fn test_generation_prompt() {
        assert_eq!(generation_prompt("write a title", None), "write a title");
        assert_eq!(
            generation_prompt("write a title", Some("tokio question")),
            "Context: tokio question\n\nRequest: write a title\n\nResponse:"
        );
    }

    #[tokio::test]
    async fn test_chat_uses_system_prompt() {
        let recorder = Arc::new(Recorder::default());
        let service = AiService::with_generator(recorder.clone());

        let reply = service.chat("  why is my future not Send?  ").await.unwrap();
        assert_eq!(reply.response, "done");

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.as_deref().unwrap().contains("StackIt"));
        assert_eq!(calls[0].1, "why is my future not Send?");
    }

    #[tokio::test]
    async fn test_blank_input_is_invalid_argument() {
        let service = AiService::with_generator(Arc::new(Recorder::default()));

        assert!(matches!(
            service.enhance(EnhanceKind::Enhance, "   ", None).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.generate("", Some("ctx")).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_and_failing_providers_are_upstream_errors() {
        assert!(matches!(
            AiService::disabled().chat("hi").await,
            Err(AppError::UpstreamUnavailable(_))
        ));
        assert!(matches!(
            AiService::with_generator(Arc::new(Failing)).chat("hi").await,
            Err(AppError::UpstreamUnavailable(_))
        ));
    }
}
