use async_trait::async_trait;
use reqwest::Client;

use super::models::*;
use crate::providers::traits::AiProvider;
use crate::providers::types::{ChatMessage, ChatRequest, ChatResponse, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const SAFETY_FINISH_REASON: &str = "SAFETY";

pub struct GeminiProvider {
    client: Client,
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn base_url(custom: Option<&str>) -> &str {
        custom.unwrap_or(DEFAULT_BASE_URL)
    }

    /// Pull the human-readable message out of Gemini's JSON error format.
    fn parse_error_message(body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
            if let Some(msg) = parsed["error"]["message"].as_str() {
                return msg.to_string();
            }
        }
        "Request failed".to_string()
    }

    fn build_contents(messages: &[ChatMessage]) -> Vec<GeminiContent> {
        messages
            .iter()
            .map(|msg| GeminiContent {
                role: msg.role.as_str().to_string(),
                parts: vec![GeminiPart {
                    text: Some(msg.text.clone()),
                }],
            })
            .collect()
    }

    fn build_request(request: &ChatRequest) -> GeminiRequest {
        let system_instruction =
            request
                .system_prompt
                .as_ref()
                .map(|prompt| GeminiSystemInstruction {
                    parts: vec![GeminiPart {
                        text: Some(prompt.clone()),
                    }],
                });

        GeminiRequest {
            contents: Self::build_contents(&request.messages),
            system_instruction,
        }
    }

    /// Classify a well-formed 2xx body: reply text, a safety block carrying
    /// the rated categories, or neither (unusable).
    fn interpret_response(response: GeminiResponse) -> Result<ChatResponse, ProviderError> {
        if let Some(error) = response.error {
            return Err(ProviderError::InvalidResponse(
                error.message.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        let candidate = response
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("No candidates in response".to_string())
            })?;

        let text = candidate
            .content
            .and_then(|c| c.parts.into_iter().filter_map(|p| p.text).find(|t| !t.is_empty()));

        if let Some(text) = text {
            return Ok(ChatResponse::Message(text));
        }

        if candidate.finish_reason.as_deref() == Some(SAFETY_FINISH_REASON) {
            let categories = candidate
                .safety_ratings
                .unwrap_or_default()
                .into_iter()
                .map(|r| r.category)
                .collect();
            return Ok(ChatResponse::Blocked { categories });
        }

        Err(ProviderError::InvalidResponse(
            "No content in response".to_string(),
        ))
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let base = Self::base_url(request.base_url.as_deref());
        let url = format!("{}/models/{}:generateContent", base, request.model);

        let body = Self::build_request(&request);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status,
                message: Self::parse_error_message(&body),
            });
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Self::interpret_response(gemini_response)
    }
}
