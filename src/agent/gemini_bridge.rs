// Lyric Director Gemini Bridge
// Copyright (c) 2026 Xing_The_Creator | Lyric Director
//
// REST client for the Gemini `generateContent` endpoint plus the
// `GenerativeBackend` seam the rest of the pipeline talks to.
// A safety refusal surfaces as exactly one thing: `GenAiError::Blocked`.

use crate::agent::supervisor::RetryHint;
use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT_SECS: u64 = 180;

/// Finish reasons that mean the candidate was withheld by a content filter.
const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
];

#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("blocked by content filter: {reason}")]
    Blocked { reason: String },

    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("request rejected {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("response contained no {0}")]
    Empty(&'static str),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GenAiError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, GenAiError::Blocked { .. })
    }
}

impl RetryHint for GenAiError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            GenAiError::RateLimited { .. } | GenAiError::Server { .. } | GenAiError::Network(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            GenAiError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GenAiError {
    fn from(e: reqwest::Error) -> Self {
        GenAiError::Network(e.to_string())
    }
}

/// A text-generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    /// Ask for `application/json` output.
    pub json: bool,
}

impl TextRequest {
    pub fn new(model: &str, prompt: String, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            prompt,
            temperature,
            json: false,
        }
    }

    pub fn expect_json(mut self) -> Self {
        self.json = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Everything useful in a successful `generateContent` reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeminiReply {
    pub text: String,
    pub images: Vec<InlineImage>,
}

/// The generative service as the pipeline sees it.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate_text(&self, request: &TextRequest) -> Result<String, GenAiError>;

    /// Generate one still image; returns the encoded image bytes.
    async fn generate_image(&self, prompt: &str) -> Result<InlineImage, GenAiError>;
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

fn retry_delay_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""retryDelay"\s*:\s*"(\d+)(\.\d+)?s""#).ok())
        .as_ref()
}

/// Extract the server-suggested wait from a 429 body.
pub fn parse_retry_delay(body: &str) -> Option<Duration> {
    let caps = retry_delay_regex()?.captures(body)?;
    let whole: f64 = caps.get(1)?.as_str().parse().ok()?;
    let frac: f64 = caps
        .get(2)
        .and_then(|m| format!("0{}", m.as_str()).parse().ok())
        .unwrap_or(0.0);
    Duration::try_from_secs_f64(whole + frac).ok()
}

fn short(body: &str) -> String {
    body.chars().take(300).collect()
}

/// Classify an HTTP status + body into a reply or a typed error.
pub fn interpret_response(status: u16, body: &str) -> Result<GeminiReply, GenAiError> {
    match status {
        200..=299 => {}
        429 => {
            return Err(GenAiError::RateLimited {
                retry_after: parse_retry_delay(body),
                message: short(body),
            })
        }
        500..=599 => {
            return Err(GenAiError::Server {
                status,
                message: short(body),
            })
        }
        _ => {
            return Err(GenAiError::Rejected {
                status,
                message: short(body),
            })
        }
    }

    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| GenAiError::Malformed(e.to_string()))?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenAiError::Blocked { reason });
    }

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        return Err(GenAiError::Empty("candidates"));
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if SAFETY_FINISH_REASONS.contains(&reason) {
            return Err(GenAiError::Blocked {
                reason: reason.to_string(),
            });
        }
    }

    let mut reply = GeminiReply::default();
    let mut texts = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = part.text {
            texts.push(text);
        }
        if let Some(inline) = part.inline_data {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(inline.data.trim())
                .map_err(|e| GenAiError::Malformed(format!("inline image: {}", e)))?;
            reply.images.push(InlineImage {
                mime_type: inline.mime_type.unwrap_or_else(|| "image/png".to_string()),
                bytes,
            });
        }
    }
    reply.text = texts.join("");
    Ok(reply)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, api_base: &str, image_model: &str) -> Result<Self, GenAiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            image_model: image_model.to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> Result<Url, GenAiError> {
        let model = model.trim_start_matches("models/");
        let raw = format!("{}/v1beta/models/{}:generateContent", self.api_base, model);
        let mut url = Url::parse(&raw).map_err(|e| GenAiError::Malformed(format!("{}: {}", raw, e)))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        generation_config: serde_json::Value,
    ) -> Result<GeminiReply, GenAiError> {
        let body = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{"text": prompt}]
                }
            ],
            "generationConfig": generation_config
        });

        debug!("[GEMINI] → {} ({} prompt chars)", model, prompt.len());
        let resp = self
            .client
            .post(self.endpoint(model)?)
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;

        let result = interpret_response(status, &text);
        match &result {
            Ok(_) => debug!("[GEMINI] ← {} OK", model),
            Err(e) if e.is_blocked() => warn!("[GEMINI] 🛡️ {} refused: {}", model, e),
            Err(e) => warn!("[GEMINI] {} failed: {}", model, e),
        }
        result
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate_text(&self, request: &TextRequest) -> Result<String, GenAiError> {
        let mut config = json!({ "temperature": request.temperature });
        if request.json {
            config["responseMimeType"] = json!("application/json");
        }
        let reply = self.generate(&request.model, &request.prompt, config).await?;
        let text = reply.text.trim().to_string();
        if text.is_empty() {
            return Err(GenAiError::Empty("text"));
        }
        Ok(text)
    }

    async fn generate_image(&self, prompt: &str) -> Result<InlineImage, GenAiError> {
        let config = json!({
            "temperature": 1.0,
            "responseModalities": ["TEXT", "IMAGE"]
        });
        let reply = self.generate(&self.image_model, prompt, config).await?;
        let image = reply
            .images
            .into_iter()
            .next()
            .ok_or(GenAiError::Empty("image"))?;
        info!(
            "[GEMINI] 🖼️ Received {} ({} bytes)",
            image.mime_type,
            image.bytes.len()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_reply_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]},"finishReason":"STOP"}]}"#;
        let reply = interpret_response(200, body).unwrap();
        assert_eq!(reply.text, "Hello world");
        assert!(reply.images.is_empty());
    }

    #[test]
    fn test_inline_image_is_decoded() {
        let data = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3, 4]);
        let body = format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"inlineData":{{"mimeType":"image/png","data":"{}"}}}}]}}}}]}}"#,
            data
        );
        let reply = interpret_response(200, &body).unwrap();
        assert_eq!(reply.images[0].bytes, vec![1, 2, 3, 4]);
        assert_eq!(reply.images[0].mime_type, "image/png");
    }

    #[test]
    fn test_prompt_feedback_block() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = interpret_response(200, body).unwrap_err();
        assert!(err.is_blocked());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_finish_reason_block() {
        let body = r#"{"candidates":[{"finishReason":"IMAGE_SAFETY"}]}"#;
        assert!(interpret_response(200, body).unwrap_err().is_blocked());
    }

    #[test]
    fn test_rate_limit_carries_retry_delay() {
        let body = r#"{"error":{"code":429,"details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"12.5s"}]}}"#;
        let err = interpret_response(429, body).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs_f64(12.5)));
    }

    #[test]
    fn test_status_classification() {
        assert!(interpret_response(503, "unavailable").unwrap_err().is_transient());
        assert!(!interpret_response(400, "bad").unwrap_err().is_transient());
        assert!(matches!(
            interpret_response(200, "{not json"),
            Err(GenAiError::Malformed(_))
        ));
        assert!(matches!(
            interpret_response(200, "{}"),
            Err(GenAiError::Empty("candidates"))
        ));
    }

    #[test]
    fn test_parse_retry_delay_whole_seconds() {
        assert_eq!(
            parse_retry_delay(r#"{"retryDelay": "7s"}"#),
            Some(Duration::from_secs(7))
        );
        assert_eq!(parse_retry_delay("no hint"), None);
    }

    #[test]
    fn test_oversized_retry_delay_is_dropped() {
        let body = r#"{"error":{"code":429,"details":[{"retryDelay":"99999999999999999999s"}]}}"#;
        assert_eq!(parse_retry_delay(body), None);
        let huge = format!(r#"{{"retryDelay":"{}s"}}"#, "9".repeat(400));
        assert_eq!(parse_retry_delay(&huge), None);
        assert!(matches!(
            interpret_response(429, body),
            Err(GenAiError::RateLimited { retry_after: None, .. })
        ));
    }
}
