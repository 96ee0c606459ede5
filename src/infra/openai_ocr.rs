use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::app::ports::{ImageInput, OcrPort, OcrResponse};
use crate::config::OcrConfig;
use crate::error::{ExtractionError, PorterError, Result};
use crate::infra::prompt::{
    repair_prompt, EXTRACTION_SYSTEM_PROMPT, EXTRACTION_USER_PROMPT, REPAIR_SYSTEM_PROMPT,
};
use crate::pipeline::ingestion::rate_limiter::RateLimiter;
use crate::pipeline::ingestion::retry::retry_async;

const EXTRACTION_MAX_TOKENS: u32 = 2048;
const REPAIR_MAX_TOKENS: u32 = 1024;
const ERROR_BODY_LIMIT: usize = 512;

/// OCR through an OpenAI-compatible chat-completions endpoint
pub struct OpenAiOcr {
    client: reqwest::Client,
    api_key: String,
    config: OcrConfig,
    limiter: RateLimiter,
}

impl OpenAiOcr {
    pub fn new(config: OcrConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let limiter = RateLimiter::new(config.limits());
        Ok(Self {
            client,
            api_key,
            config,
            limiter,
        })
    }

    /// Build with the API key taken from the configured environment variable.
    /// A missing key is fatal for the whole run.
    pub fn from_env(config: OcrConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PorterError::Config(format!("{} is not set", config.api_key_env)))?;
        Self::new(config, api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, messages: Value, max_tokens: u32) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": self.config.temperature,
            "response_format": {"type": "json_object"},
        });
        if let Some(top_p) = self.config.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(seed) = self.config.seed {
            body["seed"] = json!(seed);
        }
        body
    }

    fn extraction_body(&self, image: &ImageInput) -> Value {
        let data_url = format!(
            "data:{};base64,{}",
            image.media_type(),
            STANDARD.encode(image.bytes.as_slice())
        );
        self.request_body(
            json!([
                {"role": "system", "content": EXTRACTION_SYSTEM_PROMPT},
                {"role": "user", "content": [
                    {"type": "text", "text": EXTRACTION_USER_PROMPT},
                    {"type": "image_url", "image_url": {"url": data_url}}
                ]}
            ]),
            EXTRACTION_MAX_TOKENS,
        )
    }

    fn repair_body(&self, broken: &str) -> Value {
        self.request_body(
            json!([
                {"role": "system", "content": REPAIR_SYSTEM_PROMPT},
                {"role": "user", "content": repair_prompt(broken)}
            ]),
            REPAIR_MAX_TOKENS,
        )
    }

    /// One request, returning the fence-stripped message text
    async fn send(&self, body: &Value, payload_bytes: u64, requests: &AtomicU32) -> std::result::Result<String, ExtractionError> {
        let _permit = self.limiter.acquire(payload_bytes).await;
        requests.fetch_add(1, Ordering::Relaxed);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ExtractionError::Status {
                code: status.as_u16(),
                body: text.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        message_content(&text)
    }

    /// Extraction request plus, when the reply is not a JSON object, one
    /// repair request
    async fn extract_once(&self, image: &ImageInput, requests: &AtomicU32) -> std::result::Result<(Value, String), ExtractionError> {
        let text = self
            .send(&self.extraction_body(image), image_payload_bytes(image), requests)
            .await?;

        if let Some(data) = parse_object(&text) {
            return Ok((data, text));
        }

        warn!("Model output for {} was not valid JSON, requesting repair", image.display_name());
        let repaired = self
            .send(&self.repair_body(&text), text.len() as u64, requests)
            .await?;
        match parse_object(&repaired) {
            Some(data) => Ok((data, repaired)),
            None => Err(ExtractionError::Malformed { raw: text }),
        }
    }
}

#[async_trait]
impl OcrPort for OpenAiOcr {
    #[instrument(skip(self, image), fields(image = %image.display_name(), model = %self.config.model))]
    async fn extract(&self, image: &ImageInput) -> std::result::Result<OcrResponse, ExtractionError> {
        let requests = AtomicU32::new(0);
        let outcome = retry_async(&self.config.retry, ExtractionError::is_transient, |_| {
            self.extract_once(image, &requests)
        })
        .await;

        let attempts = requests.load(Ordering::Relaxed);
        debug!(
            "OCR finished after {} requests in {}ms",
            attempts,
            outcome.total_duration.as_millis()
        );
        let (data, raw_text) = outcome.into_result()?;
        Ok(OcrResponse {
            data,
            raw_text,
            attempts,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Bytes an extraction request charges against the byte budget
fn image_payload_bytes(image: &ImageInput) -> u64 {
    image.bytes.len() as u64
}

/// Pull `choices[0].message.content` out of a chat-completions response
fn message_content(body: &str) -> std::result::Result<String, ExtractionError> {
    let envelope: Value = serde_json::from_str(body)
        .map_err(|e| ExtractionError::Transport(format!("unreadable response envelope: {e}")))?;
    let content = envelope
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(strip_markdown_fences)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }
    Ok(content.to_string())
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text).ok().filter(Value::is_object)
}

/// Remove a leading ``` or ```json fence line and a trailing ``` fence
pub fn strip_markdown_fences(text: &str) -> &str {
    let mut text = text.trim();
    if text.starts_with("```") {
        if let Some(newline) = text.find('\n') {
            text = text[newline + 1..].trim();
        }
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped.trim();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ocr(config: OcrConfig) -> OpenAiOcr {
        OpenAiOcr::new(config, "test-key".to_string()).unwrap()
    }

    #[test]
    fn test_strip_markdown_fences() {
        assert_eq!(strip_markdown_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_markdown_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_markdown_fences("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_markdown_fences("{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn test_message_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"```json\n{\"name\":\"Jinx\"}\n```"}}]}"#;
        assert_eq!(message_content(body).unwrap(), "{\"name\":\"Jinx\"}");

        let empty = r#"{"choices":[{"message":{"content":""}}]}"#;
        assert!(matches!(message_content(empty), Err(ExtractionError::EmptyResponse)));
        assert!(matches!(message_content("<html>"), Err(ExtractionError::Transport(_))));
    }

    #[test]
    fn test_parse_object_rejects_non_objects() {
        assert!(parse_object("{\"name\": \"Jinx\"}").is_some());
        assert!(parse_object("[1, 2]").is_none());
        assert!(parse_object("{\"name\": \"Jinx\",}").is_none());
    }

    #[test]
    fn test_extraction_body_shape() {
        let config = OcrConfig {
            seed: Some(42),
            ..OcrConfig::default()
        };
        let image = ImageInput::new(PathBuf::from("jinx.webp"), vec![1, 2, 3]);
        let body = ocr(config).extraction_body(&image);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["seed"], 42);
        assert!(body.get("top_p").is_none());
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/webp;base64,AQID"
        );
    }

    #[test]
    fn test_repair_body_shape() {
        let body = ocr(OcrConfig::default()).repair_body("{oops");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["content"], REPAIR_SYSTEM_PROMPT);
        assert!(body["messages"][1]["content"].as_str().unwrap().ends_with("{oops"));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let config = OcrConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..OcrConfig::default()
        };
        assert_eq!(ocr(config).endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_byte_budget_is_charged_per_image() {
        // 60_000 bytes per minute refills 1000 bytes a second
        let config = OcrConfig {
            bytes_per_min: Some(60_000),
            ..OcrConfig::default()
        };
        let ocr = ocr(config);
        let image = ImageInput::new(PathBuf::from("jinx.png"), vec![0; 100]);
        assert_eq!(image_payload_bytes(&image), 100);

        let started = std::time::Instant::now();
        let _permit = ocr.limiter.acquire(image_payload_bytes(&image)).await;
        assert!(started.elapsed() < Duration::from_millis(50));

        ocr.limiter.drain().await;
        let started = std::time::Instant::now();
        let _permit = ocr.limiter.acquire(image_payload_bytes(&image)).await;
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = OcrConfig {
            api_key_env: "CARD_PORTER_TEST_UNSET_KEY".to_string(),
            ..OcrConfig::default()
        };
        assert!(matches!(OpenAiOcr::from_env(config), Err(PorterError::Config(_))));
    }
}
