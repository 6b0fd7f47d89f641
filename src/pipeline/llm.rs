//! The inference boundary: schema in, JSON out.
//!
//! [`StructuredInference`] is the only thing the analyzer knows about the
//! model. [`LlmInference`] implements it over any `edgequake-llm` provider;
//! tests implement it with canned replies.
//!
//! No retries: a failed or malformed reply ends the run.

use crate::error::StatementError;
use crate::model::{PageImage, Stage};
use crate::prompts::structured_output_instructions;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One structured request.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub stage: Stage,
    /// Stage instructions, without the schema.
    pub system: String,
    /// Text content sent before the images. May be empty.
    pub text: String,
    /// Page images in physical order.
    pub images: Vec<PageImage>,
    /// JSON Schema the reply must follow.
    pub schema: Value,
}

/// A service that answers [`InferenceRequest`]s with a JSON value.
///
/// Implementations return the parsed JSON; checking it against the schema's
/// typed counterpart is the caller's job (see [`crate::schema`]).
#[async_trait]
pub trait StructuredInference: Send + Sync {
    async fn infer(&self, request: InferenceRequest) -> Result<Value, StatementError>;
}

/// [`StructuredInference`] over an `edgequake-llm` vision provider.
pub struct LlmInference {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmInference {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        temperature: f32,
        max_tokens: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
            timeout,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl StructuredInference for LlmInference {
    /// Message layout:
    /// 1. **System** — stage prompt + JSON Schema trailer
    /// 2. **User** — request text plus every page image, in page order
    async fn infer(&self, request: InferenceRequest) -> Result<Value, StatementError> {
        let stage = request.stage;
        let system = format!(
            "{}{}",
            request.system,
            structured_output_instructions(stage.as_str(), &request.schema)
        );
        let images: Vec<ImageData> = request.images.iter().map(PageImage::to_image_data).collect();
        let user_text = if request.text.is_empty() {
            "Images:".to_string()
        } else {
            request.text.clone()
        };

        let messages = vec![
            ChatMessage::system(system.as_str()),
            ChatMessage::user_with_images(user_text.as_str(), images),
        ];
        let options = self.options();

        let start = Instant::now();
        info!("{}: sending {} page images", stage, request.images.len());

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| StatementError::ApiTimeout {
                stage,
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| StatementError::LlmApiError {
                stage,
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            stage,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        parse_reply(stage, &response.content)
    }
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*?)\n?```$").unwrap());

/// Parse a model reply into a JSON object.
///
/// Tolerates an outer ```json fence and prose around the object; anything
/// that still is not a JSON object is a schema failure.
pub fn parse_reply(stage: Stage, content: &str) -> Result<Value, StatementError> {
    let trimmed = content.trim();
    let body = match RE_JSON_FENCE.captures(trimmed) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => trimmed,
    };

    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(first_err) => match (body.find('{'), body.rfind('}')) {
            (Some(open), Some(close)) if open < close => serde_json::from_str(&body[open..=close])
                .map_err(|e| StatementError::schema(stage, format!("reply is not JSON: {e}")))?,
            _ => {
                return Err(StatementError::schema(
                    stage,
                    format!("reply is not JSON: {first_err}"),
                ))
            }
        },
    };

    if !value.is_object() {
        return Err(StatementError::schema(stage, "reply is not a JSON object"));
    }
    Ok(value)
}
