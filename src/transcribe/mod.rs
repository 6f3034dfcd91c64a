// Transcription
//
// The remote service is reached through the `TranscriptionService`
// capability so the pipeline can run against a stub:
// - groq: OpenAI-compatible HTTP implementation (verbose_json responses)
// - retry: bounded exponential backoff for rate limiting
//
// `TranscriptionClient` resolves the credential once per job and hands out a
// `TranscriptionSession` that applies the retry policy to every segment.

pub mod groq;
pub mod retry;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub use retry::RetryPolicy;

use crate::config::{ApiKeySource, Language, ProcessingConfig};
use crate::error::{Result, VidsubError};
use crate::transcript::TranscriptFragment;

/// Credential used for every request of one job.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Key supplied by the caller; usage is attributed to them
    Caller(String),
    /// Shared, rate-limited key bundled with the application
    Fallback(String),
}

impl Credential {
    pub fn secret(&self) -> &str {
        match self {
            Self::Caller(key) | Self::Fallback(key) => key,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller(_) => f.write_str("Caller(***)"),
            Self::Fallback(_) => f.write_str("Fallback(***)"),
        }
    }
}

/// One upload to the transcription service.
#[derive(Debug, Clone, Copy)]
pub struct TranscriptionRequest<'a> {
    pub audio_path: &'a Path,
    pub language: &'a Language,
    pub credential: &'a Credential,
    pub temperature: f32,
}

/// Remote speech-to-text capability.
///
/// Implementations return cues in segment-local time. Silence is an empty
/// fragment, not an error.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(&self, request: TranscriptionRequest<'_>) -> Result<TranscriptFragment>;
}

/// Transcription entry point shared by every run.
#[derive(Clone)]
pub struct TranscriptionClient {
    service: Arc<dyn TranscriptionService>,
    fallback_key: Option<String>,
}

impl TranscriptionClient {
    pub fn new(service: Arc<dyn TranscriptionService>, fallback_key: Option<String>) -> Self {
        Self {
            service,
            fallback_key: fallback_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Pick the credential for a job. A missing key is an authentication
    /// failure, surfaced before anything is uploaded.
    pub fn resolve_credential(&self, source: &ApiKeySource) -> Result<Credential> {
        match source {
            ApiKeySource::Caller(key) => Ok(Credential::Caller(key.clone())),
            ApiKeySource::UseFallback => self
                .fallback_key
                .clone()
                .map(Credential::Fallback)
                .ok_or_else(|| {
                    VidsubError::Auth(
                        "No API key supplied and no fallback key is configured".to_string(),
                    )
                }),
        }
    }

    /// Start a session for one job, resolving the credential once.
    pub fn session(&self, config: &ProcessingConfig, language: Language) -> Result<TranscriptionSession> {
        let credential = self.resolve_credential(&config.api_key)?;
        info!(
            fallback = credential.is_fallback(),
            language = %language,
            "Transcription credential resolved"
        );

        Ok(TranscriptionSession {
            service: Arc::clone(&self.service),
            credential,
            language,
            temperature: config.temperature,
            retry: config.retry.clone(),
        })
    }
}

/// Per-job transcription state: credential, language hint and retry policy.
pub struct TranscriptionSession {
    service: Arc<dyn TranscriptionService>,
    credential: Credential,
    language: Language,
    temperature: f32,
    retry: RetryPolicy,
}

impl TranscriptionSession {
    /// Transcribe one audio payload, retrying only on rate limiting.
    pub async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptFragment> {
        let label = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| audio_path.display().to_string());

        let fragment = self
            .retry
            .run(&label, |attempt| {
                debug!("Uploading {} (attempt {})", label, attempt);
                self.service.transcribe(TranscriptionRequest {
                    audio_path,
                    language: &self.language,
                    credential: &self.credential,
                    temperature: self.temperature,
                })
            })
            .await?;

        debug!(cues = fragment.cues.len(), "Received transcription for {}", label);
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transcript::TranscriptCue;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingService {
        keys: Mutex<Vec<String>>,
        hints: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl TranscriptionService for RecordingService {
        async fn transcribe(&self, request: TranscriptionRequest<'_>) -> Result<TranscriptFragment> {
            self.keys.lock().unwrap().push(request.credential.secret().to_string());
            self.hints
                .lock()
                .unwrap()
                .push(request.language.hint().map(str::to_string));
            Ok(TranscriptFragment {
                cues: vec![TranscriptCue::new(Duration::ZERO, Duration::from_secs(1), "hi")],
                language: Some("en".to_string()),
            })
        }
    }

    #[test]
    fn fallback_without_key_is_auth_error() {
        let client = TranscriptionClient::new(Arc::new(RecordingService::default()), Some(" ".to_string()));
        let err = client.resolve_credential(&ApiKeySource::UseFallback).unwrap_err();
        assert!(matches!(err, VidsubError::Auth(_)));
    }

    #[test]
    fn caller_key_takes_precedence_over_fallback() {
        let client = TranscriptionClient::new(
            Arc::new(RecordingService::default()),
            Some("shared".to_string()),
        );
        let credential = client
            .resolve_credential(&ApiKeySource::Caller("mine".to_string()))
            .unwrap();
        assert_eq!(credential, Credential::Caller("mine".to_string()));
        assert!(!format!("{:?}", credential).contains("mine"));

        let fallback = client.resolve_credential(&ApiKeySource::UseFallback).unwrap();
        assert!(fallback.is_fallback());
    }

    #[tokio::test]
    async fn session_reuses_one_credential_for_every_segment() {
        let service = Arc::new(RecordingService::default());
        let client = TranscriptionClient::new(service.clone(), Some("shared".to_string()));
        let config = Config::default().processing_config(None, Some("de"));

        let session = client.session(&config, config.language.clone()).unwrap();
        for name in ["segment_0.mp3", "segment_1.mp3"] {
            let fragment = session.transcribe(Path::new(name)).await.unwrap();
            assert_eq!(fragment.cues.len(), 1);
        }

        assert_eq!(*service.keys.lock().unwrap(), vec!["shared", "shared"]);
        assert_eq!(
            *service.hints.lock().unwrap(),
            vec![Some("de".to_string()), Some("de".to_string())]
        );
    }
}
