use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::Language;

/// One video-to-subtitle request. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct MediaJob {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub language: Language,
}

impl MediaJob {
    /// Create a job; the output defaults to the input path with an `.srt` extension.
    pub fn new<P: AsRef<Path>>(input_path: P, output_path: Option<PathBuf>, language: Language) -> Self {
        let input_path = input_path.as_ref().to_path_buf();
        let output_path = output_path.unwrap_or_else(|| default_output_path(&input_path));

        Self {
            id: Uuid::new_v4(),
            input_path,
            output_path,
            language,
        }
    }
}

pub fn default_output_path(input_path: &Path) -> PathBuf {
    input_path.with_extension("srt")
}
