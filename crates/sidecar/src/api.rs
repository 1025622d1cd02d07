//! Typed pass-through surface for the engine's HTTP API.
//!
//! The engine's computation is a black box; this module only shapes requests
//! and responses. All calls go through [`ResilientClient`], so transient
//! unavailability during warm-up is retried, while application-level errors
//! from a reachable engine surface unchanged as [`ApiError::Engine`].

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::{CallError, ResilientClient};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Call(#[from] CallError),

    /// The engine answered with a non-success status. The FastAPI `detail`
    /// string is carried through untouched.
    #[error("engine returned {status}: {detail}")]
    Engine { status: StatusCode, detail: String },

    #[error("failed to decode engine response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// `GET /` — system status, also used by the health probe.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl SystemStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// `GET /health` — richer diagnostics than the root status.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthDetail {
    pub status: String,
    #[serde(default)]
    pub system: serde_json::Value,
    #[serde(default)]
    pub features: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguageInfo {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub can_translate_to: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LanguagesResponse {
    languages: Vec<LanguageInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslationOutcome {
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchTranslationOutcome {
    pub total: usize,
    pub results: Vec<BatchTranslationItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchTranslationItem {
    pub original: String,
    pub translated: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionRequest {
    pub audio_path: String,
    pub language: String,
    pub task: String,
}

impl TranscriptionRequest {
    /// Transcription with automatic language detection.
    pub fn auto(audio_path: impl Into<String>) -> Self {
        Self {
            audio_path: audio_path.into(),
            language: "auto".to_string(),
            task: "transcribe".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionOutcome {
    pub text: String,
    pub language: String,
    pub language_probability: f64,
    pub duration: f64,
    pub processing_time: f64,
    #[serde(default)]
    pub segments: Vec<TranscriptionSegment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinedRequest {
    pub audio_path: String,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CombinedOutcome {
    pub original_text: String,
    pub translated_text: String,
    pub detected_language: String,
    pub target_language: String,
    pub language_probability: f64,
    pub audio_duration: f64,
    pub processing_time: f64,
}

/// Typed client for the engine API, one method per endpoint.
#[derive(Debug, Clone)]
pub struct EngineApi {
    client: ResilientClient,
}

impl EngineApi {
    pub fn new(client: ResilientClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    pub async fn system_status(&self) -> Result<SystemStatus, ApiError> {
        decode(self.client.get("/").await?).await
    }

    pub async fn health(&self) -> Result<HealthDetail, ApiError> {
        decode(self.client.get("/health").await?).await
    }

    pub async fn supported_languages(&self) -> Result<Vec<LanguageInfo>, ApiError> {
        let response: LanguagesResponse = decode(self.client.get("/api/languages").await?).await?;
        Ok(response.languages)
    }

    pub async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationOutcome, ApiError> {
        decode(self.client.post_json("/api/translate", request).await?).await
    }

    pub async fn translate_batch(
        &self,
        requests: &[TranslationRequest],
    ) -> Result<BatchTranslationOutcome, ApiError> {
        decode(self.client.post_json("/api/translate/batch", &requests).await?).await
    }

    pub async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionOutcome, ApiError> {
        decode(self.client.post_json("/api/transcribe", request).await?).await
    }

    pub async fn transcribe_and_translate(
        &self,
        request: &CombinedRequest,
    ) -> Result<CombinedOutcome, ApiError> {
        decode(
            self.client
                .post_json("/api/transcribe-and-translate", request)
                .await?,
        )
        .await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let detail = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| {
                body.get("detail")
                    .and_then(|d| d.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| status.to_string());
        return Err(ApiError::Engine { status, detail });
    }
    response.json().await.map_err(ApiError::Decode)
}
