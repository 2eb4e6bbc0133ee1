//! HTTP client for the external vision chat-completion API.

use std::time::Duration;

use base64::Engine;
use reqwest::Client;
use tracing::{debug, info, warn};

use pillbox_core::{defaults, Error, Result};

use crate::sse::assemble_sse_reply;
use crate::types::*;

/// Fixed instruction sent ahead of the images.
///
/// Asks for every label field as JSON with `YYYY-MM-DD` dates and explicit
/// nulls. Written in the package's source locale; the model frequently
/// answers with localized keys anyway, which the extractor maps back.
const ANALYSIS_PROMPT: &str = "请识别这些药品图片中的所有文字信息，这些图片是同一个药品的不同角度或不同面。\
请综合分析所有图片，提取以下信息并以JSON格式返回：\n\
{\"name\": \"药品名称\", \"brand\": \"品牌\", \"manufacturer\": \"生产厂家\", \
\"production_date\": \"生产日期\", \"expiry_date\": \"有效期\", \"batch_number\": \"批号\", \
\"dosage_form\": \"剂型\", \"strength\": \"规格\"}\n\n\
如果没有则对应字段返回null。请确保日期格式为YYYY-MM-DD。";

/// Configuration for the vision client.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Full chat-completions endpoint URL.
    pub base_url: String,
    /// Bearer token (optional for local endpoints).
    pub api_key: Option<String>,
    /// Vision model identifier.
    pub model: String,
    /// Timeout in seconds for a single-image request.
    pub timeout_seconds: u64,
    /// Maximum tokens requested from the model.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::VISION_BASE_URL.to_string(),
            api_key: None,
            model: defaults::VISION_MODEL.to_string(),
            timeout_seconds: defaults::VISION_TIMEOUT_SECS,
            max_tokens: defaults::VISION_MAX_TOKENS,
            temperature: defaults::VISION_TEMPERATURE,
        }
    }
}

/// Client for the external vision chat-completion endpoint.
pub struct VisionClient {
    client: Client,
    config: VisionConfig,
}

impl VisionClient {
    /// Create a new client with the given configuration.
    pub fn new(config: VisionConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "vision",
            component = "client",
            url = %config.base_url,
            model = %config.model,
            "Initializing vision client"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        let config = VisionConfig {
            base_url: std::env::var(defaults::ENV_VISION_BASE_URL)
                .unwrap_or_else(|_| defaults::VISION_BASE_URL.to_string()),
            api_key: std::env::var(defaults::ENV_VISION_API_KEY).ok(),
            model: std::env::var(defaults::ENV_VISION_MODEL)
                .unwrap_or_else(|_| defaults::VISION_MODEL.to_string()),
            timeout_seconds: std::env::var(defaults::ENV_VISION_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::VISION_TIMEOUT_SECS),
            max_tokens: defaults::VISION_MAX_TOKENS,
            temperature: defaults::VISION_TEMPERATURE,
        };

        Self::new(config)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Get the model name being used.
    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    /// Request timeout for the given payload size. Multi-image payloads
    /// get double the single-image budget.
    fn request_timeout(&self, image_count: usize) -> Duration {
        let secs = if image_count > 1 {
            self.config.timeout_seconds * 2
        } else {
            self.config.timeout_seconds
        };
        Duration::from_secs(secs)
    }

    /// Send all images with the fixed instruction and return the raw reply
    /// text, reassembled into one string if the upstream streamed it.
    pub async fn analyze(&self, images: &[Vec<u8>]) -> Result<String> {
        if images.is_empty() {
            return Err(Error::InvalidInput("no images to analyze".to_string()));
        }

        debug!(
            subsystem = "vision",
            component = "client",
            op = "analyze",
            image_count = images.len(),
            model = %self.config.model,
            "Sending analysis request"
        );

        let mut content = vec![ContentPart::Text {
            text: ANALYSIS_PROMPT.to_string(),
        }];
        for image in images {
            let encoded = base64::engine::general_purpose::STANDARD.encode(image);
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/jpeg;base64,{}", encoded),
                },
            });
        }

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            stream: false,
        };

        let mut builder = self
            .client
            .post(&self.config.base_url)
            .timeout(self.request_timeout(images.len()))
            .header("Content-Type", "application/json");
        if let Some(ref api_key) = self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder.json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = excerpt(&response.text().await.unwrap_or_default());
            return Err(match status.as_u16() {
                401 => Error::Auth(format!(
                    "check {} and {}: {}",
                    defaults::ENV_VISION_API_KEY,
                    defaults::ENV_VISION_MODEL,
                    body
                )),
                404 => Error::Endpoint(format!(
                    "check {} and {}: {}",
                    defaults::ENV_VISION_BASE_URL,
                    defaults::ENV_VISION_MODEL,
                    body
                )),
                code => Error::Upstream { status: code, body },
            });
        }

        // The upstream may answer as one JSON object or as an event stream.
        let is_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("event-stream"))
            .unwrap_or(false);

        let reply = if is_stream {
            let body = response.text().await?;
            assemble_sse_reply(&body)
        } else {
            let result: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|e| Error::Serialization(format!("Failed to parse vision reply: {}", e)))?;

            let choice = result
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| Error::Serialization("vision reply has no choices".to_string()))?;

            choice
                .message
                .and_then(|m| m.content)
                .or_else(|| choice.delta.and_then(|d| d.content))
                .ok_or_else(|| Error::Serialization("vision reply has no content".to_string()))?
        };

        debug!(
            subsystem = "vision",
            component = "client",
            op = "analyze",
            response_len = reply.len(),
            "Received reply"
        );
        Ok(reply)
    }

    /// Check if the upstream is reachable.
    ///
    /// Probes the sibling `/models` endpoint of the configured
    /// chat-completions URL; any transport error reads as unhealthy.
    pub async fn health_check(&self) -> bool {
        let url = self
            .config
            .base_url
            .trim_end_matches('/')
            .trim_end_matches("/chat/completions")
            .to_string()
            + "/models";

        let mut builder = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5));
        if let Some(ref api_key) = self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        match builder.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(
                    subsystem = "vision",
                    component = "client",
                    error = %e,
                    "Vision health check failed"
                );
                false
            }
        }
    }
}

/// Truncate an upstream error body for inclusion in error messages.
fn excerpt(body: &str) -> String {
    if body.is_empty() {
        return "no response body".to_string();
    }
    body.chars()
        .take(defaults::UPSTREAM_BODY_EXCERPT_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VisionConfig::default();
        assert_eq!(config.base_url, defaults::VISION_BASE_URL);
        assert_eq!(config.model, defaults::VISION_MODEL);
        assert_eq!(config.timeout_seconds, defaults::VISION_TIMEOUT_SECS);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_client_creation() {
        let client = VisionClient::new(VisionConfig::default());
        assert!(client.is_ok());
        assert_eq!(client.unwrap().model_name(), defaults::VISION_MODEL);
    }

    #[test]
    fn test_multi_image_timeout_doubles() {
        let client = VisionClient::new(VisionConfig::default()).unwrap();
        let single = client.request_timeout(1);
        let multi = client.request_timeout(3);
        assert_eq!(multi, single * 2);
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(2000);
        assert_eq!(excerpt(&long).chars().count(), defaults::UPSTREAM_BODY_EXCERPT_CHARS);
    }

    #[test]
    fn test_excerpt_empty_body() {
        assert_eq!(excerpt(""), "no response body");
    }

    #[test]
    fn test_prompt_requests_iso_dates() {
        assert!(ANALYSIS_PROMPT.contains("YYYY-MM-DD"));
        assert!(ANALYSIS_PROMPT.contains("null"));
    }
}
