//! Hosted multimodal model adapters used by the proxy
//!
//! Each adapter sends one image plus the roast prompt, pulls the reply text
//! out of the provider's envelope, strips Markdown fences and parses the
//! report JSON. No retries, no streaming.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::types::{AnalysisResult, ConfigError, EncodedImage, UpstreamError};

/// DashScope multimodal generation endpoint
pub const DASHSCOPE_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation";
pub const DASHSCOPE_MODEL: &str = "qwen-vl-max";

/// Gemini API base; the model path is appended
pub const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Instructions sent alongside every image
pub const ROAST_PROMPT: &str = r#"你是一台来自未来、说话刻薄的"人类质量检测仪"。
请观察这张自拍，从眼神、表情、穿搭、背景或五官中随机挑一个重点，写一份简短的检测报告。
要求：中文，简短好笑，毒舌但不带脏字；必须用一个新鲜具体的比喻；不要总拿发际线开刀。
只返回 JSON，不要 Markdown 代码块：
{
  "title": "四字短语，例如：五行缺智、长得潦草",
  "roast": "2-3 句点评",
  "dangerLevel": 60 到 100 之间的整数,
  "score": 0 到 100 之间的整数（人类得分，越低越好笑）,
  "luckyItem": "一个荒谬的幸运物品",
  "animalMatch": "一种匹配的生物"
}"#;

lazy_static! {
    static ref RE_CODE_FENCE: Regex = Regex::new(r"```(?:json)?\s*|\s*```").unwrap();
}

/// A hosted model that can read a selfie and answer with a report
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Provider name, for logs and health output
    fn name(&self) -> &str;

    async fn analyze(&self, image: &EncodedImage) -> Result<AnalysisResult, UpstreamError>;
}

/// Which provider the proxy talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Alibaba DashScope (Qwen-VL)
    Dashscope,
    /// Google Gemini
    Gemini,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Dashscope => DASHSCOPE_MODEL,
            Provider::Gemini => GEMINI_MODEL,
        }
    }

    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::Dashscope => DASHSCOPE_URL,
            Provider::Gemini => GEMINI_URL,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Dashscope => write!(f, "dashscope"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Credentials and addressing for one provider
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ModelConfig {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: provider.default_model().to_string(),
            base_url: provider.default_url().to_string(),
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECS),
        }
    }
}

fn build_http(timeout: Duration) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

/// Build the adapter for the configured provider
pub fn build_model(config: ModelConfig) -> Result<Box<dyn VisionModel>, ConfigError> {
    if config.api_key.trim().is_empty() {
        return Err(ConfigError::MissingCredential(format!("{} API key", config.provider)));
    }
    let http = build_http(config.timeout)?;
    Ok(match config.provider {
        Provider::Dashscope => Box::new(DashScopeModel { http, config }),
        Provider::Gemini => Box::new(GeminiModel { http, config }),
    })
}

/// Strip Markdown fences and parse the report JSON
pub fn parse_reply(text: &str) -> Result<AnalysisResult, UpstreamError> {
    let cleaned = RE_CODE_FENCE.replace_all(text, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(UpstreamError::EmptyReply);
    }

    let result: AnalysisResult = serde_json::from_str(cleaned).map_err(|e| {
        error!(reply = %cleaned, "model reply is not a report");
        UpstreamError::InvalidJson(e.to_string())
    })?;
    result.validate().map_err(UpstreamError::InvalidJson)?;
    Ok(result)
}

async fn post_json(
    http: &Client,
    url: &str,
    headers: &[(&str, String)],
    body: &Value,
) -> Result<Value, UpstreamError> {
    let mut request = http.post(url).json(body);
    for (name, value) in headers {
        request = request.header(*name, value);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json::<Value>().await?)
}

// =============================================================================
// DASHSCOPE
// =============================================================================

/// DashScope multimodal generation (Qwen-VL)
pub struct DashScopeModel {
    http: Client,
    config: ModelConfig,
}

impl DashScopeModel {
    fn request_body(&self, image: &EncodedImage) -> Value {
        json!({
            "model": self.config.model,
            "input": {
                "messages": [{
                    "role": "user",
                    "content": [
                        { "image": image.to_data_uri() },
                        { "text": ROAST_PROMPT }
                    ]
                }]
            },
            "parameters": { "result_format": "message" }
        })
    }
}

/// Reply text at `output.choices[0].message.content[*].text`
pub fn dashscope_reply_text(data: &Value) -> Option<&str> {
    data.pointer("/output/choices/0/message/content")?
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(Value::as_str))
}

#[async_trait]
impl VisionModel for DashScopeModel {
    fn name(&self) -> &str {
        "dashscope"
    }

    async fn analyze(&self, image: &EncodedImage) -> Result<AnalysisResult, UpstreamError> {
        debug!(model = %self.config.model, "calling DashScope");
        let headers = [("Authorization", format!("Bearer {}", self.config.api_key))];
        let data = post_json(&self.http, &self.config.base_url, &headers, &self.request_body(image)).await?;
        let text = dashscope_reply_text(&data).ok_or(UpstreamError::EmptyReply)?;
        parse_reply(text)
    }
}

// =============================================================================
// GEMINI
// =============================================================================

/// Gemini `generateContent` with an inline image
pub struct GeminiModel {
    http: Client,
    config: ModelConfig,
}

impl GeminiModel {
    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request_body(&self, image: &EncodedImage) -> Value {
        json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": image.mime(), "data": image.payload() } },
                    { "text": ROAST_PROMPT }
                ]
            }],
            "generationConfig": { "responseMimeType": "application/json" }
        })
    }
}

/// Concatenated reply text of the first candidate
pub fn gemini_reply_text(data: &Value) -> Option<String> {
    let parts = data.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl VisionModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn analyze(&self, image: &EncodedImage) -> Result<AnalysisResult, UpstreamError> {
        debug!(model = %self.config.model, "calling Gemini");
        let headers = [("x-goog-api-key", self.config.api_key.clone())];
        let data = post_json(&self.http, &self.url(), &headers, &self.request_body(image)).await?;
        let text = gemini_reply_text(&data).ok_or(UpstreamError::EmptyReply)?;
        parse_reply(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_json() {
        let result = parse_reply(r#"{"title":"注定搬砖","roast":"r","dangerLevel":77}"#).unwrap();
        assert_eq!(result.title, "注定搬砖");
        assert_eq!(result.danger_level, 77);
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "```json\n{\"title\":\"t\",\"roast\":\"r\",\"dangerLevel\":\"88\",\"score\":\"5\"}\n```";
        let result = parse_reply(reply).unwrap();
        assert_eq!(result.danger_level, 88);
        assert_eq!(result.score(), Some(5));
    }

    #[test]
    fn test_parse_bare_fence() {
        let reply = "```\n{\"title\":\"t\",\"roast\":\"r\",\"dangerLevel\":61}\n```";
        assert_eq!(parse_reply(reply).unwrap().danger_level, 61);
    }

    #[test]
    fn test_parse_prose_rejected() {
        assert!(matches!(
            parse_reply("Sorry, I can't help with that."),
            Err(UpstreamError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_empty_rejected() {
        assert!(matches!(parse_reply("```json\n```"), Err(UpstreamError::EmptyReply)));
    }

    #[test]
    fn test_dashscope_reply_text() {
        let data = json!({
            "output": { "choices": [{ "message": { "content": [
                { "image": "ignored" },
                { "text": "{\"title\":\"t\"}" }
            ]}}]}
        });
        assert_eq!(dashscope_reply_text(&data), Some("{\"title\":\"t\"}"));
        assert_eq!(dashscope_reply_text(&json!({"output": {}})), None);
    }

    #[test]
    fn test_gemini_reply_text() {
        let data = json!({
            "candidates": [{ "content": { "parts": [ { "text": "{\"a\":" }, { "text": "1}" } ] } }]
        });
        assert_eq!(gemini_reply_text(&data).as_deref(), Some("{\"a\":1}"));
        assert_eq!(gemini_reply_text(&json!({"candidates": []})), None);
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = build_model(ModelConfig::new(Provider::Dashscope, "  ")).err().unwrap();
        assert!(matches!(err, ConfigError::MissingCredential(_)));
    }

    #[test]
    fn test_dashscope_body_carries_data_uri() {
        let model = DashScopeModel {
            http: Client::new(),
            config: ModelConfig::new(Provider::Dashscope, "k"),
        };
        let image = EncodedImage::from_bytes("image/jpeg", b"x");
        let body = model.request_body(&image);
        assert_eq!(
            body.pointer("/input/messages/0/content/0/image").and_then(Value::as_str),
            Some(image.to_data_uri().as_str())
        );
        assert_eq!(body["model"], "qwen-vl-max");
    }

    #[test]
    fn test_gemini_body_carries_bare_payload() {
        let model = GeminiModel {
            http: Client::new(),
            config: ModelConfig::new(Provider::Gemini, "k"),
        };
        let image = EncodedImage::from_bytes("image/jpeg", b"x");
        let body = model.request_body(&image);
        assert_eq!(
            body.pointer("/contents/0/parts/0/inlineData/data").and_then(Value::as_str),
            Some(image.payload())
        );
        assert!(model.url().ends_with("/gemini-2.5-flash:generateContent"));
    }
}
