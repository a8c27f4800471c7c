//! Text recognition over an OCR proxy endpoint.
//!
//! The endpoint accepts a base64-encoded image and answers either a list of
//! recognized lines or a vendor error code. A small set of vendor codes is
//! transient (rate limits, temporary unavailability) and worth retrying.

use crate::config::OcrConfig;
use crate::error::{Result, SpeakError};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Vendor codes that indicate a transient condition: unknown error, service
/// temporarily unavailable, rate limit, QPS limit.
const TRANSIENT_CODES: &[i64] = &[1, 2, 4, 18];

/// Pause before retrying after a transport-level failure.
const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Recognizes the text in an image.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize `image` (raw encoded bytes, e.g. PNG or JPEG) and return
    /// the recognized lines joined by `\n`. An image with no recognizable
    /// text yields an empty string.
    async fn recognize(&self, image: &[u8]) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(default)]
    words_result: Option<Vec<WordsItem>>,
}

#[derive(Debug, Deserialize)]
struct WordsItem {
    words: String,
}

/// OCR client backed by an HTTP proxy endpoint.
pub struct HttpTextRecognizer {
    http: reqwest::Client,
    api_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl HttpTextRecognizer {
    /// Create a recognizer from the OCR configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SpeakError::Config`] if no API URL is configured.
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let api_url = config
            .api_url
            .clone()
            .ok_or_else(|| SpeakError::Config("ocr.api_url is not configured".into()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_url,
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
        })
    }

    async fn request_once(&self, image_base64: &str) -> Result<OcrResponse> {
        let response = self
            .http
            .post(&self.api_url)
            .json(&serde_json::json!({ "image": image_base64 }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SpeakError::transport(format!("ocr request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeakError::Transport {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        response
            .json::<OcrResponse>()
            .await
            .map_err(|e| SpeakError::Decode(format!("invalid ocr response: {e}")))
    }
}

#[async_trait]
impl TextRecognizer for HttpTextRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<String> {
        let image_base64 = BASE64.encode(image);
        let mut retries_left = self.max_retries;

        loop {
            match self.request_once(&image_base64).await {
                Ok(body) => {
                    if let Some(code) = body.error_code {
                        let message = body.error_msg.unwrap_or_else(|| "unknown error".into());
                        if TRANSIENT_CODES.contains(&code) && retries_left > 0 {
                            retries_left -= 1;
                            warn!(code, retries_left, "transient ocr error, retrying");
                            continue;
                        }
                        return Err(SpeakError::Ocr { code, message });
                    }
                    let text = join_words(body.words_result.unwrap_or_default());
                    debug!(chars = text.chars().count(), "ocr recognized text");
                    return Ok(text);
                }
                Err(e) if retries_left > 0 => {
                    retries_left -= 1;
                    warn!(retries_left, "ocr request failed, retrying: {e}");
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Join recognized lines top-to-bottom with newlines, matching the line
/// order the service reports.
fn join_words(items: Vec<WordsItem>) -> String {
    items
        .iter()
        .map(|item| item.words.as_str())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
