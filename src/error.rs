use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidsubError {
    #[error("Audio extraction error: {0}")]
    Extraction(String),

    #[error("Audio compression error: {0}")]
    Compression(String),

    #[error("Audio split error: {0}")]
    Split(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limited by transcription service: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Transcription service error: {0}")]
    TranscriptionService(String),

    #[error("Subtitle write error: {0}")]
    Write(String),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Subtitle parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, VidsubError>;

/// Error taxonomy reported to progress sinks and carried by failed runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Extraction,
    Compression,
    Split,
    Auth,
    RateLimit,
    TranscriptionService,
    Write,
    Cancelled,
    Config,
    Parse,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "ExtractionError",
            Self::Compression => "CompressionError",
            Self::Split => "SplitError",
            Self::Auth => "AuthError",
            Self::RateLimit => "RateLimitError",
            Self::TranscriptionService => "TranscriptionServiceError",
            Self::Write => "WriteError",
            Self::Cancelled => "Cancelled",
            Self::Config => "ConfigError",
            Self::Parse => "ParseError",
            Self::Io => "IoError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VidsubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Compression(_) => ErrorKind::Compression,
            Self::Split(_) => ErrorKind::Split,
            Self::Auth(_) => ErrorKind::Auth,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::TranscriptionService(_) | Self::Http(_) => ErrorKind::TranscriptionService,
            Self::Write(_) => ErrorKind::Write,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
        }
    }

    /// Only rate limiting is transient; everything else ends the run on first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }
}

/// Pipeline stage a status message or failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extracting,
    Compressing,
    Transcribing,
    Merging,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extracting => "extracting",
            Self::Compressing => "compressing",
            Self::Transcribing => "transcribing",
            Self::Merging => "merging",
        };
        f.write_str(name)
    }
}
