use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, VidsubError};
use crate::transcribe::RetryPolicy;

/// Default payload ceiling, kept well under the service's documented 25 MB limit.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 18 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transcriber: TranscriberConfig,
    pub media: MediaConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Base URL of an OpenAI-compatible transcription API
    pub endpoint: String,
    /// Whisper model name sent with every request
    pub model: String,
    /// Caller-supplied API key; the fallback key is used when absent
    pub api_key: Option<String>,
    /// Environment variable holding the shared fallback key
    pub fallback_key_env: String,
    /// Language code or "auto"
    pub default_language: String,
    /// Sampling temperature for transcription
    pub temperature: f32,
    /// Attempts per segment when rate limited (including the first)
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Path to ffprobe binary
    pub probe_binary_path: String,
    /// Output sample rate for extracted and compressed audio
    pub sample_rate: u32,
    /// Output channel count
    pub channels: u32,
    /// Bitrate of the compressed speech track, in ffmpeg notation
    pub compressed_bitrate: String,
    /// Root for per-run temporary workspaces (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest payload sent in a single transcription request
    pub max_payload_bytes: u64,
    /// Optional upper bound on segment length
    pub max_segment_duration_secs: Option<u64>,
    /// Fraction of the payload ceiling targeted when sizing segments
    pub size_safety_margin: f64,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1".to_string(),
            model: "whisper-large-v3-turbo".to_string(),
            api_key: None,
            fallback_key_env: "GROQ_API_KEY".to_string(),
            default_language: "auto".to_string(),
            temperature: 0.0,
            max_attempts: 4,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
            request_timeout_secs: 300,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            probe_binary_path: "ffprobe".to_string(),
            sample_rate: 16_000,
            channels: 1,
            compressed_bitrate: "64k".to_string(),
            temp_dir: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_segment_duration_secs: None,
            size_safety_margin: 0.9,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidsubError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| VidsubError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| VidsubError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Build the immutable settings for one run, applying command-line overrides.
    pub fn processing_config(
        &self,
        api_key_override: Option<&str>,
        language_override: Option<&str>,
    ) -> ProcessingConfig {
        let caller_key = api_key_override
            .or(self.transcriber.api_key.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty());

        let api_key = match caller_key {
            Some(key) => ApiKeySource::Caller(key.to_string()),
            None => ApiKeySource::UseFallback,
        };

        let language = Language::parse(
            language_override.unwrap_or(&self.transcriber.default_language),
        );

        ProcessingConfig {
            api_key,
            language,
            max_payload_bytes: self.limits.max_payload_bytes,
            max_segment_duration: self
                .limits
                .max_segment_duration_secs
                .map(Duration::from_secs),
            size_safety_margin: self.limits.size_safety_margin,
            extraction: AudioParams::extraction(&self.media),
            compression: AudioParams::compression(&self.media),
            temperature: self.transcriber.temperature,
            retry: RetryPolicy {
                max_attempts: self.transcriber.max_attempts,
                initial_backoff: Duration::from_millis(self.transcriber.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.transcriber.max_backoff_ms),
            },
            temp_root: self.media.temp_dir.clone(),
        }
    }
}

/// Which credential a run authenticates with.
#[derive(Clone, PartialEq, Eq)]
pub enum ApiKeySource {
    Caller(String),
    UseFallback,
}

impl fmt::Debug for ApiKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller(_) => f.write_str("Caller(***)"),
            Self::UseFallback => f.write_str("UseFallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    Auto,
    Code(String),
}

impl Language {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("auto") {
            Self::Auto
        } else {
            Self::Code(value.to_lowercase())
        }
    }

    /// Language hint for the service; `None` lets it detect.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Auto => None,
            Self::Code(code) => Some(code),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hint().unwrap_or("auto"))
    }
}

/// Encoding parameters handed to the media tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioParams {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub bitrate: Option<String>,
    pub extension: String,
}

impl AudioParams {
    /// Lossless mono PCM used for the full-length extracted track
    pub fn extraction(media: &MediaConfig) -> Self {
        Self {
            codec: "pcm_s16le".to_string(),
            sample_rate: media.sample_rate,
            channels: media.channels,
            bitrate: None,
            extension: "wav".to_string(),
        }
    }

    /// Parameters matching the container implied by an output file name:
    /// `.wav` gets PCM, `.mp3` gets the compressed encoding.
    pub fn for_output(path: &Path, media: &MediaConfig) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("wav") => Ok(Self::extraction(media)),
            Some("mp3") => Ok(Self::compression(media)),
            _ => Err(VidsubError::Config(format!(
                "Unsupported audio output {}; use a .wav or .mp3 file name",
                path.display()
            ))),
        }
    }

    /// Speech-grade MP3 used for everything sent over the network
    pub fn compression(media: &MediaConfig) -> Self {
        Self {
            codec: "libmp3lame".to_string(),
            sample_rate: media.sample_rate,
            channels: media.channels,
            bitrate: Some(media.compressed_bitrate.clone()),
            extension: "mp3".to_string(),
        }
    }
}

/// Immutable per-run settings. Never mutated while a run is in flight.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub api_key: ApiKeySource,
    pub language: Language,
    pub max_payload_bytes: u64,
    pub max_segment_duration: Option<Duration>,
    pub size_safety_margin: f64,
    pub extraction: AudioParams,
    pub compression: AudioParams,
    pub temperature: f32,
    pub retry: RetryPolicy,
    pub temp_root: Option<PathBuf>,
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_bytes == 0 {
            return Err(VidsubError::Config(
                "max_payload_bytes must be greater than zero".to_string(),
            ));
        }
        if !(self.size_safety_margin > 0.0 && self.size_safety_margin <= 1.0) {
            return Err(VidsubError::Config(format!(
                "size_safety_margin must be in (0, 1], got {}",
                self.size_safety_margin
            )));
        }
        if self.max_segment_duration.is_some_and(|d| d.is_zero()) {
            return Err(VidsubError::Config(
                "max_segment_duration_secs must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(VidsubError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
