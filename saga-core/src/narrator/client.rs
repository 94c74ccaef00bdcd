//! The seam between the engine and the completion service.

use async_trait::async_trait;
use gemini::{Gemini, Request, Response};
use serde_json::{json, Value};
use std::sync::Arc;

/// Anything that can answer a completion request.
///
/// The session only ever talks to the model through this trait, so tests
/// can swap in a scripted client.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: Request) -> Result<Response, gemini::Error>;
}

#[async_trait]
impl ModelClient for Gemini {
    async fn complete(&self, request: Request) -> Result<Response, gemini::Error> {
        Gemini::complete(self, request).await
    }
}

#[async_trait]
impl<C: ModelClient + ?Sized> ModelClient for Arc<C> {
    async fn complete(&self, request: Request) -> Result<Response, gemini::Error> {
        (**self).complete(request).await
    }
}

/// Output contract for a normal turn: `{story, choices}`, both required.
pub fn turn_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "story": {
                "type": "STRING",
                "description": "The narrative text of the story, including formatting and the hidden command tags."
            },
            "choices": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Four or five choices for the player."
            }
        },
        "required": ["story", "choices"]
    })
}

/// Extract JSON from a response that might be wrapped in a markdown fence.
///
/// Text that already parses is returned as is, so fences inside string
/// values are left alone.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();
    if serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok() {
        return text;
    }

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}
