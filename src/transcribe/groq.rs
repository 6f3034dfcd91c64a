// OpenAI-compatible Whisper endpoint (Groq by default)

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{multipart, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{TranscriptionRequest, TranscriptionService};
use crate::config::TranscriberConfig;
use crate::error::{Result, VidsubError};
use crate::transcript::{TranscriptCue, TranscriptFragment};

/// `verbose_json` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerboseTranscription {
    #[serde(default)]
    pub text: String,
    pub language: Option<String>,
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Option<Vec<VerboseSegment>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerboseSegment {
    pub id: Option<u64>,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub avg_logprob: Option<f64>,
    pub no_speech_prob: Option<f64>,
}

/// Converts a service-specific response into a segment-local fragment
pub trait FragmentMapper<T> {
    fn to_fragment(service_result: T) -> TranscriptFragment;
}

pub struct VerboseJsonMapper;

impl FragmentMapper<VerboseTranscription> for VerboseJsonMapper {
    fn to_fragment(response: VerboseTranscription) -> TranscriptFragment {
        let mut cues: Vec<TranscriptCue> = response
            .segments
            .unwrap_or_default()
            .into_iter()
            .filter_map(|seg| {
                let text = seg.text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(TranscriptCue::from_seconds(seg.start, seg.end, text))
                }
            })
            .collect();
        cues.sort_by_key(|cue| cue.start);

        TranscriptFragment {
            cues,
            language: response.language.filter(|l| !l.is_empty()),
        }
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_failure(status: StatusCode, retry_after: Option<&str>, body: &str) -> VidsubError {
    let detail = format!("status {}: {}", status, body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VidsubError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => VidsubError::RateLimit {
            message: detail,
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        _ => VidsubError::TranscriptionService(detail),
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

pub struct GroqTranscriptionService {
    client: Client,
    endpoint: String,
    model: String,
}

impl GroqTranscriptionService {
    pub fn new(config: &TranscriberConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("vidsub/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    async fn build_form(&self, request: &TranscriptionRequest<'_>) -> Result<multipart::Form> {
        let audio = tokio::fs::read(request.audio_path).await.map_err(|e| {
            VidsubError::TranscriptionService(format!(
                "Failed to read {}: {}",
                request.audio_path.display(),
                e
            ))
        })?;

        let file_name = request
            .audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let file_part = multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime_for(request.audio_path))
            .map_err(|e| VidsubError::TranscriptionService(format!("mime: {}", e)))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", request.temperature.to_string())
            .part("file", file_part);

        if let Some(language) = request.language.hint() {
            form = form.text("language", language.to_string());
        }

        Ok(form)
    }
}

#[async_trait]
impl TranscriptionService for GroqTranscriptionService {
    async fn transcribe(&self, request: TranscriptionRequest<'_>) -> Result<TranscriptFragment> {
        let url = format!("{}/audio/transcriptions", self.endpoint);
        let form = self.build_form(&request).await?;

        debug!(model = %self.model, "Sending audio to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(request.credential.secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| VidsubError::TranscriptionService(format!("request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(classify_failure(status, retry_after.as_deref(), &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| VidsubError::TranscriptionService(format!("body: {}", e)))?;
        let parsed: VerboseTranscription = serde_json::from_str(&body).map_err(|e| {
            VidsubError::TranscriptionService(format!("Failed to parse response: {}", e))
        })?;

        let fragment = VerboseJsonMapper::to_fragment(parsed);
        info!(
            cues = fragment.cues.len(),
            language = fragment.language.as_deref().unwrap_or("unknown"),
            "Transcription completed"
        );
        Ok(fragment)
    }
}
