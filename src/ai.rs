use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

// --- Provider trait ---

pub trait AIProvider: Send + Sync {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Like `complete`, but hints the expected JSON shape to providers that
    /// can enforce one. The rest rely on the prompt alone.
    fn complete_json(&self, prompt: &str, max_tokens: u32, _schema: &Value) -> Result<String> {
        self.complete(prompt, max_tokens)
    }

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Anthropic,
    OpenAI,
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
    pub short_name: String,
}

pub const DEFAULT_MODEL: &str = "gemini-flash";

/// Short names accepted by `resolve_model`, in display order.
pub const MODEL_NAMES: &[&str] = &[
    "gemini-flash",
    "gemini-pro",
    "claude-sonnet",
    "claude-haiku",
    "gpt-5.2",
    "gpt-4o",
];

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    let (provider, model_id, short_name) = match name {
        "gemini-flash" | "gemini" | "flash" => {
            (ProviderKind::Gemini, "gemini-3-flash-preview", "gemini-flash")
        }
        "gemini-pro" => (ProviderKind::Gemini, "gemini-2.5-pro", "gemini-pro"),
        "claude-sonnet" | "sonnet" => (
            ProviderKind::Anthropic,
            "claude-sonnet-4-5-20250929",
            "claude-sonnet",
        ),
        "claude-haiku" | "haiku" => (
            ProviderKind::Anthropic,
            "claude-haiku-4-5-20251001",
            "claude-haiku",
        ),
        "gpt-5.2" | "gpt5" => (ProviderKind::OpenAI, "gpt-5.2", "gpt-5.2"),
        "gpt-4o" => (ProviderKind::OpenAI, "gpt-4o", "gpt-4o"),
        _ => {
            return Err(anyhow!(
                "Unknown model '{}'. Available: {}",
                name,
                MODEL_NAMES.join(", ")
            ));
        }
    };

    Ok(ModelSpec {
        provider,
        model_id: model_id.to_string(),
        short_name: short_name.to_string(),
    })
}

pub fn create_provider(spec: &ModelSpec, timeout: Duration) -> Result<Box<dyn AIProvider>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let model_id = spec.model_id.clone();
    let key = env::var(key_var(spec.provider)).ok();
    if key.is_none() {
        // Reported per search so the browser can still come up
        warn!(var = key_var(spec.provider), "API key not set");
    }

    let provider: Box<dyn AIProvider> = match spec.provider {
        ProviderKind::Gemini => Box::new(GeminiProvider::new(model_id, client, key)),
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(model_id, client, key)),
        ProviderKind::OpenAI => Box::new(OpenAIProvider::new(model_id, client, key)),
    };
    Ok(provider)
}

fn key_var(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "GEMINI_API_KEY",
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        ProviderKind::OpenAI => "OPENAI_API_KEY",
    }
}

fn require_key(key: &Option<String>, kind: ProviderKind) -> Result<&str> {
    key.as_deref().ok_or_else(|| {
        let var = key_var(kind);
        anyhow!("{var} environment variable not set. Set it with: export {var}=your-key-here")
    })
}

fn ensure_success(
    response: reqwest::blocking::Response,
    api: &str,
) -> Result<reqwest::blocking::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().unwrap_or_default();
    Err(anyhow!(
        "{} API request failed with status {}: {}",
        api,
        status,
        error_text
    ))
}

// --- Gemini provider ---

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug)]
pub struct GeminiProvider {
    api_key: Option<String>,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl GeminiProvider {
    pub fn new(
        model_id: String,
        client: reqwest::blocking::Client,
        api_key: Option<String>,
    ) -> Self {
        Self {
            api_key,
            model_id,
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_BASE, self.model_id)
    }

    fn request(&self, prompt: &str, max_tokens: u32, schema: Option<&Value>) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: max_tokens,
                response_mime_type: "application/json".to_string(),
                response_schema: schema.cloned(),
            },
        }
    }

    fn generate(&self, request: &GeminiRequest) -> Result<String> {
        let api_key = require_key(&self.api_key, ProviderKind::Gemini)?;

        debug!(model = %self.model_id, "sending Gemini request");
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .context("Failed to send request to Gemini API")?;

        let api_response: GeminiResponse = ensure_success(response, "Gemini")?
            .json()
            .context("Failed to parse Gemini API response")?;

        let text: String = api_response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|p| p.text).collect())
            .ok_or_else(|| anyhow!("No candidates in Gemini API response"))?;

        if text.trim().is_empty() {
            return Err(anyhow!("Empty text in Gemini API response"));
        }
        Ok(text)
    }
}

impl AIProvider for GeminiProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        self.generate(&self.request(prompt, max_tokens, None))
    }

    fn complete_json(&self, prompt: &str, max_tokens: u32, schema: &Value) -> Result<String> {
        self.generate(&self.request(prompt, max_tokens, Some(schema)))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

const JSON_ONLY_SYSTEM: &str =
    "You return machine-readable JSON only. Never wrap the output in prose.";

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: Option<String>,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(
        model_id: String,
        client: reqwest::blocking::Client,
        api_key: Option<String>,
    ) -> Self {
        Self {
            api_key,
            model_id,
            client,
        }
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let api_key = require_key(&self.api_key, ProviderKind::Anthropic)?;
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens,
            system: JSON_ONLY_SYSTEM.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        debug!(model = %self.model_id, "sending Anthropic request");
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .context("Failed to send request to Anthropic API")?;

        let api_response: AnthropicResponse = ensure_success(response, "Anthropic")?
            .json()
            .context("Failed to parse Anthropic API response")?;

        api_response
            .content
            .into_iter()
            .find(|block| block.content_type == "text")
            .map(|block| block.text)
            .ok_or_else(|| anyhow!("No text content in Anthropic API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_completion_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: Option<String>,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(
        model_id: String,
        client: reqwest::blocking::Client,
        api_key: Option<String>,
    ) -> Self {
        Self {
            api_key,
            model_id,
            client,
        }
    }
}

impl AIProvider for OpenAIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let api_key = require_key(&self.api_key, ProviderKind::OpenAI)?;
        let request = OpenAIRequest {
            model: self.model_id.clone(),
            max_completion_tokens: max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: JSON_ONLY_SYSTEM.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        };

        debug!(model = %self.model_id, "sending OpenAI request");
        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .context("Failed to send request to OpenAI API")?;

        let api_response: OpenAIResponse = ensure_success(response, "OpenAI")?
            .json()
            .context("Failed to parse OpenAI API response")?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No choices in OpenAI API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
