use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Text-extraction model pinned to a known-good version.
pub const DEFAULT_OCR_MODEL: &str =
    "abiruyt/text-extract-ocr:a524caeaa23495bc9edc805ab08ab5fe943afd3febed884a4f3747aa32e9cd61";

pub const DEFAULT_PREDICTIONS_ENDPOINT: &str = "https://api.replicate.com/v1/predictions";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 10;

/// Configuration for the asynchronous OCR job API.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Provider credential. Submission fails with [`OcrError::Init`] when
    /// unset; there is no degraded OCR mode.
    pub api_token: Option<String>,
    pub model_version: String,
    pub endpoint: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
}

impl OcrConfig {
    pub fn new(api_token: Option<String>) -> Self {
        Self {
            api_token,
            model_version: DEFAULT_OCR_MODEL.to_string(),
            endpoint: DEFAULT_PREDICTIONS_ENDPOINT.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// Turns a stored image URL into label text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(
        &self,
        image_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, OcrError>;
}

/// Client for the Replicate predictions API: submit one job, then poll its
/// status URL at a fixed cadence until text appears or the attempt budget
/// runs out.
pub struct ReplicateOcr {
    http: Client,
    config: OcrConfig,
}

impl ReplicateOcr {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    image: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PredictionResponse {
    #[serde(default)]
    urls: Option<PredictionUrls>,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

/// Terminal decision for one poll response.
#[derive(Debug, PartialEq)]
pub(crate) enum PollStep {
    Continue,
    Done(String),
    Failed(String),
}

/// Pure per-poll decision: a reported error wins over any output; non-empty
/// output (a string, or an array of string chunks) completes the job;
/// anything else keeps polling.
pub(crate) fn evaluate_poll(resp: &PredictionResponse) -> PollStep {
    if let Some(err) = resp.error.as_ref().and_then(error_text) {
        return PollStep::Failed(err);
    }
    if let Some(text) = resp.output.as_ref().and_then(output_text) {
        return PollStep::Done(text);
    }
    PollStep::Continue
}

fn error_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn output_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(chunks) => chunks
            .iter()
            .filter_map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl TextExtractor for ReplicateOcr {
    async fn extract_text(
        &self,
        image_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, OcrError> {
        let token = self
            .config
            .api_token
            .as_deref()
            .ok_or_else(|| OcrError::Init("OCR credential not configured".to_string()))?;

        let body = PredictionRequest {
            version: &self.config.model_version,
            input: PredictionInput { image: image_url },
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .header(AUTHORIZATION, format!("Token {token}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| OcrError::Init(e.to_string()))?;

        let prediction: PredictionResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Init(e.to_string()))?;

        let poll_url = prediction
            .urls
            .and_then(|u| u.get)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| OcrError::Init("prediction response missing poll URL".to_string()))?;

        for attempt in 1..=self.config.max_poll_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::warn!(attempt, "OCR poll loop cancelled");
                    return Err(OcrError::Timeout);
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            let response = self
                .http
                .get(&poll_url)
                .header(AUTHORIZATION, format!("Token {token}"))
                .send()
                .await
                .map_err(|e| OcrError::Poll(e.to_string()))?;

            let status: PredictionResponse = response
                .json()
                .await
                .map_err(|e| OcrError::Poll(e.to_string()))?;

            match evaluate_poll(&status) {
                PollStep::Done(text) => {
                    tracing::debug!(attempt, chars = text.len(), "OCR output ready");
                    return Ok(text);
                }
                PollStep::Failed(err) => return Err(OcrError::Job(err)),
                PollStep::Continue => {
                    tracing::trace!(attempt, "OCR output not ready");
                }
            }
        }

        Err(OcrError::Timeout)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OcrError {
    #[error("OCR submission failed: {0}")]
    Init(String),

    #[error("OCR poll failed: {0}")]
    Poll(String),

    #[error("OCR job failed: {0}")]
    Job(String),

    #[error("OCR polling timed out")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(body: serde_json::Value) -> PredictionResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_empty_response_continues() {
        assert_eq!(
            evaluate_poll(&response(json!({"status": "processing"}))),
            PollStep::Continue
        );
        assert_eq!(evaluate_poll(&PredictionResponse::default()), PollStep::Continue);
    }

    #[test]
    fn test_string_output_completes() {
        let resp = response(json!({"status": "succeeded", "output": "NUTRITION\nEnergy 232 kcal"}));
        assert_eq!(
            evaluate_poll(&resp),
            PollStep::Done("NUTRITION\nEnergy 232 kcal".to_string())
        );
    }

    #[test]
    fn test_chunked_output_is_joined() {
        let resp = response(json!({"output": ["NUTRI", "TION"]}));
        assert_eq!(evaluate_poll(&resp), PollStep::Done("NUTRITION".to_string()));
    }

    #[test]
    fn test_empty_output_continues() {
        assert_eq!(evaluate_poll(&response(json!({"output": ""}))), PollStep::Continue);
        assert_eq!(evaluate_poll(&response(json!({"output": []}))), PollStep::Continue);
        assert_eq!(evaluate_poll(&response(json!({"output": null}))), PollStep::Continue);
    }

    #[test]
    fn test_error_wins_over_output() {
        let resp = response(json!({"error": "CUDA out of memory", "output": "partial"}));
        assert_eq!(
            evaluate_poll(&resp),
            PollStep::Failed("CUDA out of memory".to_string())
        );
    }

    #[test]
    fn test_null_or_empty_error_is_ignored() {
        assert_eq!(
            evaluate_poll(&response(json!({"error": null, "output": "text"}))),
            PollStep::Done("text".to_string())
        );
        assert_eq!(
            evaluate_poll(&response(json!({"error": ""}))),
            PollStep::Continue
        );
    }

    #[test]
    fn test_structured_error_is_stringified() {
        let resp = response(json!({"error": {"code": 42}}));
        assert!(matches!(evaluate_poll(&resp), PollStep::Failed(msg) if msg.contains("42")));
    }
}
