//! Minimal Google Gemini API client.
//!
//! This crate provides a focused client for the `generateContent` endpoint with:
//! - Single-prompt and multi-turn (role-tagged history) requests
//! - Optional system instruction and JSON output contract (mime type + schema)
//! - Rotation across several API keys on credential or quota failures

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const JSON_MIME_TYPE: &str = "application/json";

/// Errors that can occur when using the Gemini client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Model returned no text: {0}")]
    EmptyResponse(String),

    #[error("All {attempts} API keys failed, last error: {last}")]
    AllKeysFailed { attempts: usize, last: String },
}

impl Error {
    /// Whether a different API key might succeed where this one failed.
    ///
    /// Invalid keys, permission failures and quota exhaustion (HTTP 429) all
    /// count. Everything else is returned to the caller without rotating.
    pub fn is_credential_error(&self) -> bool {
        match self {
            Error::Api { status, message } => {
                if *status == 429 || *status == 403 {
                    return true;
                }
                let message = message.to_lowercase();
                message.contains("api key not valid") || message.contains("permission denied")
            }
            Error::AllKeysFailed { .. } => true,
            _ => false,
        }
    }
}

/// Gemini API client.
pub struct Gemini {
    client: reqwest::Client,
    keys: Vec<String>,
    /// Index of the key that last succeeded; rotation starts here.
    cursor: AtomicUsize,
    model: String,
    base_url: String,
}

impl Gemini {
    /// Create a new client with a single API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_keys(vec![api_key.into()])
    }

    /// Create a new client that rotates across the given API keys.
    ///
    /// Blank keys are dropped.
    pub fn with_keys(keys: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            keys: keys
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            cursor: AtomicUsize::new(0),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Create a client from the environment.
    ///
    /// Reads `GEMINI_API_KEYS` (comma-separated) first, then `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self, Error> {
        let raw = std::env::var("GEMINI_API_KEYS")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| Error::NoApiKey)?;

        let client = Self::with_keys(raw.split(',').map(str::to_string).collect());
        if client.keys.is_empty() {
            return Err(Error::NoApiKey);
        }
        Ok(client)
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The default model used when a request does not name one.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of configured API keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Send a completion request and return the full response.
    ///
    /// Keys are tried in turn starting from the last one that worked. Only
    /// credential-class failures move on to the next key.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        if self.keys.is_empty() {
            return Err(Error::NoApiKey);
        }

        let api_request = build_api_request(&request);
        let model = request.model.as_deref().unwrap_or(&self.model);
        let url = format!("{}/models/{model}:generateContent", self.base_url);

        let start = self.cursor.load(Ordering::Relaxed);
        let mut last_error = None;

        for index in rotation_order(start, self.keys.len()) {
            match self.send(&url, &self.keys[index], &api_request).await {
                Ok(response) => {
                    self.cursor.store(index, Ordering::Relaxed);
                    return Ok(response);
                }
                Err(e) if e.is_credential_error() => {
                    warn!("Gemini key #{index} rejected, rotating: {e}");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::AllKeysFailed {
            attempts: self.keys.len(),
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    async fn send(&self, url: &str, key: &str, api_request: &ApiRequest) -> Result<Response, Error> {
        let headers = build_headers(key)?;

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        let parsed = parse_response(api_response)?;
        debug!(
            "Gemini response: {} chars, {} tokens",
            parsed.text.len(),
            parsed.total_tokens().unwrap_or(0)
        );
        Ok(parsed)
    }
}

/// Key indices to try, starting at `start` and wrapping once around.
fn rotation_order(start: usize, len: usize) -> impl Iterator<Item = usize> {
    (0..len).map(move |offset| (start + offset) % len)
}

fn build_headers(key: &str) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MIME_TYPE));
    headers.insert(
        "x-goog-api-key",
        HeaderValue::from_str(key).map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
    );
    Ok(headers)
}

fn build_api_request(request: &Request) -> ApiRequest {
    let contents = request
        .contents
        .iter()
        .map(|c| ApiContent {
            role: Some(c.role.as_str().to_string()),
            parts: vec![ApiPart {
                text: Some(c.text.clone()),
            }],
        })
        .collect();

    let system_instruction = request.system_instruction.as_ref().map(|text| ApiContent {
        role: None,
        parts: vec![ApiPart {
            text: Some(text.clone()),
        }],
    });

    let generation_config = ApiGenerationConfig {
        temperature: request.temperature,
        max_output_tokens: request.max_output_tokens,
        response_mime_type: request.output.as_ref().map(|o| o.mime_type.clone()),
        response_schema: request.output.as_ref().and_then(|o| o.schema.clone()),
    };

    ApiRequest {
        contents,
        system_instruction,
        generation_config: (!generation_config.is_empty()).then_some(generation_config),
    }
}

fn parse_response(api_response: ApiResponse) -> Result<Response, Error> {
    let candidate = api_response.candidates.into_iter().next();

    let text: String = candidate
        .as_ref()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let reason = api_response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .or_else(|| candidate.and_then(|c| c.finish_reason))
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(Error::EmptyResponse(reason));
    }

    Ok(Response {
        text,
        usage: api_response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            candidates_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }),
        model_version: api_response.model_version,
    })
}

// ============================================================================
// Public types
// ============================================================================

/// A completion request to send to Gemini.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub contents: Vec<Content>,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub output: Option<OutputFormat>,
}

impl Request {
    /// Create a new request with the given conversation turns.
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            model: None,
            contents,
            system_instruction: None,
            temperature: None,
            max_output_tokens: None,
            output: None,
        }
    }

    /// Create a request consisting of a single user prompt.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::new(vec![Content::user(text)])
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Constrain the model to emit JSON matching `schema`.
    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.output = Some(OutputFormat::json(schema));
        self
    }

    /// The text of the final user turn, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.contents
            .iter()
            .rev()
            .find(|c| c.role == Role::User)
            .map(|c| c.text.as_str())
    }
}

/// Output contract for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFormat {
    pub mime_type: String,
    pub schema: Option<serde_json::Value>,
}

impl OutputFormat {
    /// JSON output validated against a schema.
    pub fn json(schema: serde_json::Value) -> Self {
        Self {
            mime_type: JSON_MIME_TYPE.to_string(),
            schema: Some(schema),
        }
    }

    pub fn is_json(&self) -> bool {
        self.mime_type == JSON_MIME_TYPE
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub text: String,
}

impl Content {
    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Create a model turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// A completion response from Gemini.
#[derive(Debug, Clone)]
pub struct Response {
    pub text: String,
    pub usage: Option<Usage>,
    pub model_version: Option<String>,
}

impl Response {
    /// A response carrying only text (no usage metadata).
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
            model_version: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Total tokens billed for the call, when reported.
    pub fn total_tokens(&self) -> Option<u32> {
        self.usage.as_ref().map(|u| u.total_tokens)
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub candidates_tokens: u32,
    pub total_tokens: u32,
}

// ============================================================================
// API types (internal)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

impl ApiGenerationConfig {
    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.max_output_tokens.is_none()
            && self.response_mime_type.is_none()
            && self.response_schema.is_none()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    usage_metadata: Option<ApiUsage>,
    model_version: Option<String>,
    prompt_feedback: Option<ApiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    content: Option<ApiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let client = Gemini::new("test-key");
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.key_count(), 1);
    }

    #[test]
    fn test_client_with_model() {
        let client = Gemini::new("test-key").with_model("gemini-2.5-pro");
        assert_eq!(client.model(), "gemini-2.5-pro");
    }

    #[test]
    fn test_blank_keys_dropped() {
        let client = Gemini::with_keys(vec!["a".into(), "  ".into(), " b ".into()]);
        assert_eq!(client.keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_complete_without_keys() {
        let client = Gemini::with_keys(Vec::new());
        let result = client.complete(Request::prompt("hi")).await;
        assert!(matches!(result, Err(Error::NoApiKey)));
    }

    #[test]
    fn test_rotation_order_wraps() {
        let order: Vec<usize> = rotation_order(2, 4).collect();
        assert_eq!(order, vec![2, 3, 0, 1]);

        let single: Vec<usize> = rotation_order(0, 1).collect();
        assert_eq!(single, vec![0]);
    }

    #[test]
    fn test_credential_error_classification() {
        let quota = Error::Api {
            status: 429,
            message: "Resource has been exhausted".into(),
        };
        assert!(quota.is_credential_error());

        let bad_key = Error::Api {
            status: 400,
            message: "API key not valid. Please pass a valid API key.".into(),
        };
        assert!(bad_key.is_credential_error());

        let server = Error::Api {
            status: 500,
            message: "internal".into(),
        };
        assert!(!server.is_credential_error());
        assert!(!Error::Network("reset".into()).is_credential_error());
    }

    #[test]
    fn test_request_builder() {
        let request = Request::prompt("Hello")
            .with_system("You are a narrator")
            .with_temperature(0.7)
            .with_json_schema(json!({"type": "OBJECT"}));

        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.temperature, Some(0.7));
        assert!(request.output.as_ref().is_some_and(|o| o.is_json()));
        assert_eq!(request.last_user_text(), Some("Hello"));
    }

    #[test]
    fn test_api_request_shape() {
        let request = Request::new(vec![Content::user("look"), Content::model("{}")])
            .with_system("sys")
            .with_json_schema(json!({"type": "OBJECT"}));

        let body = serde_json::to_value(build_api_request(&request)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "{}");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_api_request_omits_empty_generation_config() {
        let body = serde_json::to_value(build_api_request(&Request::prompt("hi"))).unwrap();
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_parse_response() {
        let api: ApiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "world"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15},
            "modelVersion": "gemini-2.5-flash"
        }))
        .unwrap();

        let response = parse_response(api).unwrap();
        assert_eq!(response.text, "Hello world");
        assert_eq!(response.total_tokens(), Some(15));
        assert_eq!(response.model_version.as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn test_parse_blocked_response() {
        let api: ApiResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();

        match parse_response(api) {
            Err(Error::EmptyResponse(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected EmptyResponse, got {other:?}"),
        }
    }
}
