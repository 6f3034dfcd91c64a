use std::path::Path;

use tracing::info;

use super::MediaTool;
use crate::config::AudioParams;
use crate::error::{Result, VidsubError};
use crate::temp::{RunWorkspace, TempAudio};

/// Pull the full-length audio track out of a video into the run workspace.
///
/// The returned handle owns the extracted file; no retry is attempted since
/// failures here come from the environment or the input, not from transient
/// conditions.
pub async fn extract_audio(
    tool: &dyn MediaTool,
    video_path: &Path,
    workspace: &RunWorkspace,
    params: &AudioParams,
) -> Result<TempAudio> {
    if !video_path.is_file() {
        return Err(VidsubError::Extraction(format!(
            "Input video not found: {}",
            video_path.display()
        )));
    }

    let file_name = video_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| video_path.display().to_string());
    info!("Extracting audio from {}", file_name);

    let audio = workspace.file(&format!("extracted.{}", params.extension));
    tool.extract_audio(video_path, audio.path(), params).await?;

    let size = audio.size().map_err(|_| {
        VidsubError::Extraction(format!("No audio track was written for {}", file_name))
    })?;

    info!(bytes = size, "Audio extraction completed");
    Ok(audio)
}
