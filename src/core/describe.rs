//! Object descriptions from a vision/language chat API
//!
//! A prompt is assembled from the cleaned `t` columns of an object's
//! catalogue row and sent together with a few of its images. Rate limiting
//! (HTTP 429) and transient failures are retried with exponential backoff.

use base64::Engine as _;
use log::{info, warn};
use rand::Rng;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::config::DescribeConfig;
use crate::core::sheets::{metadata_columns, MetadataRecord};

const PROMPT_HEADER: &str = "Du bist Museums-Kurator:in.
Erstelle eine präzise, wissenschaftlich klingende **Objektbeschreibung auf Deutsch**.
Vermeide Phrasen wie „Dieses Bild zeigt…“. Beziehe dich auf sichtbare Merkmale:
Materialien, Konstruktion, Maße (falls erkennbar), Funktion/Nutzung, ggf. historischer Kontext.

Nutze ausschließlich die folgenden Excel-Metadaten (korrekter Name + alter Spaltenname) \
als Kontext, ohne sie wörtlich zu wiederholen:
";

const EMPTY_METADATA: &str = "- (keine Metadaten gefunden)";

/// Errors from the description service
#[derive(Debug, Error)]
pub enum DescribeError {
    #[error("giving up after {0} attempts (rate limited or network errors)")]
    RetriesExhausted(u32),

    #[error("unexpected API response: {0}")]
    InvalidResponse(String),
}

/// Something that turns a prompt and images into a description
pub trait Describer {
    fn describe(&self, prompt: &str, images: &[PathBuf]) -> Result<String, DescribeError>;
}

/// Build the curator prompt for one object
///
/// One line per non-empty `t` column in `t1`..`t14` order, labelled from
/// `labels` and falling back to the upper-cased column name.
pub fn build_prompt(meta: &MetadataRecord, labels: &BTreeMap<String, String>) -> String {
    let lines: Vec<String> = metadata_columns()
        .filter_map(|column| {
            let value = meta.get(&column)?.trim();
            if value.is_empty() {
                return None;
            }
            let tag = column.to_uppercase();
            let label = labels.get(&column).cloned().unwrap_or_else(|| tag.clone());
            Some(format!("- {} [{}]: {}", label, tag, value))
        })
        .collect();

    let block = if lines.is_empty() {
        EMPTY_METADATA.to_string()
    } else {
        lines.join("\n")
    };

    format!("{}\n{}\n", PROMPT_HEADER, block)
}

/// Attempts and backoff for API calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before retrying after `attempt` (zero-based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(16);
        self.base_backoff
            .checked_mul(multiplier)
            .unwrap_or(Duration::from_secs(3600))
    }

    /// Backoff plus up to half a second of random jitter
    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let jitter = rand::rng().random_range(0.0..0.5);
        self.backoff(attempt)
            .saturating_add(Duration::from_secs_f64(jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            base_backoff: Duration::from_secs(2),
        }
    }
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Encode an image file as a `data:` URL
pub fn image_data_url(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime_type(path), encoded))
}

/// Pull the generated text out of a chat-completions response
pub fn extract_content(response: &Value) -> Result<String, DescribeError> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            DescribeError::InvalidResponse("missing choices[0].message.content".to_string())
        })
}

/// Blocking client for an OpenAI-compatible chat-completions endpoint
pub struct ChatClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_images: usize,
    retry: RetryPolicy,
}

impl ChatClient {
    pub fn new(config: &DescribeConfig, api_key: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build();
        let defaults = RetryPolicy::default();

        Self {
            agent,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),
            api_key,
            model: config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
            max_tokens: config.max_tokens.unwrap_or(700),
            max_images: config.max_images_per_call.unwrap_or(3),
            retry: RetryPolicy {
                max_retries: config.max_retries.unwrap_or(defaults.max_retries),
                base_backoff: config
                    .base_backoff_secs
                    .and_then(|s| Duration::try_from_secs_f64(s).ok())
                    .unwrap_or(defaults.base_backoff),
            },
        }
    }

    /// Request body for one object
    ///
    /// Only the first `max_images` images are sent; unreadable ones are
    /// skipped.
    pub fn build_payload(&self, prompt: &str, images: &[PathBuf]) -> Value {
        build_payload(&self.model, self.max_tokens, self.max_images, prompt, images)
    }

    fn post_with_retries(&self, payload: &Value) -> Result<Value, DescribeError> {
        let auth = format!("Bearer {}", self.api_key);

        for attempt in 0..self.retry.max_retries {
            let result = self
                .agent
                .post(&self.endpoint)
                .set("Authorization", &auth)
                .send_json(payload);

            match result {
                Ok(resp) => {
                    return resp
                        .into_json::<Value>()
                        .map_err(|e| DescribeError::InvalidResponse(e.to_string()));
                }
                Err(ureq::Error::Status(429, resp)) => {
                    let wait = resp
                        .header("Retry-After")
                        .and_then(parse_retry_after)
                        .unwrap_or_else(|| self.retry.backoff_with_jitter(attempt));
                    info!(
                        "429 Too Many Requests, waiting {:.1}s (attempt {}/{})",
                        wait.as_secs_f64(),
                        attempt + 1,
                        self.retry.max_retries
                    );
                    std::thread::sleep(wait);
                }
                Err(e) => {
                    let wait = self.retry.backoff_with_jitter(attempt);
                    warn!(
                        "API error ({}), backing off {:.1}s (attempt {}/{})",
                        e,
                        wait.as_secs_f64(),
                        attempt + 1,
                        self.retry.max_retries
                    );
                    std::thread::sleep(wait);
                }
            }
        }

        Err(DescribeError::RetriesExhausted(self.retry.max_retries))
    }
}

impl Describer for ChatClient {
    fn describe(&self, prompt: &str, images: &[PathBuf]) -> Result<String, DescribeError> {
        let payload = self.build_payload(prompt, images);
        let response = self.post_with_retries(&payload)?;
        extract_content(&response)
    }
}

fn build_payload(
    model: &str,
    max_tokens: u32,
    max_images: usize,
    prompt: &str,
    images: &[PathBuf],
) -> Value {
    let mut content = vec![json!({ "type": "text", "text": prompt })];
    for path in images.iter().take(max_images) {
        match image_data_url(path) {
            Ok(url) => content.push(json!({
                "type": "image_url",
                "image_url": { "url": url }
            })),
            Err(e) => warn!("cannot read image {}: {}", path.display(), e),
        }
    }

    json!({
        "model": model,
        "messages": [{ "role": "user", "content": content }],
        "max_tokens": max_tokens,
    })
}
