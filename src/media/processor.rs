use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{MediaCommandBuilder, MediaTool};
use crate::config::{AudioParams, MediaConfig};
use crate::error::{Result, VidsubError};

/// ffmpeg/ffprobe implementation of the media tool
pub struct FfmpegTool {
    command_builder: MediaCommandBuilder,
}

impl FfmpegTool {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            command_builder: MediaCommandBuilder::new(&config.binary_path, &config.probe_binary_path),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -show_entries format=duration -of json` output.
///
/// A missing or `N/A` duration means an empty track and yields zero.
pub(crate) fn parse_probe_duration(stdout: &str) -> Result<Duration> {
    let probe: ProbeOutput = serde_json::from_str(stdout)
        .map_err(|e| VidsubError::Compression(format!("Unreadable duration probe output: {}", e)))?;

    let seconds = match probe.format.duration.as_deref() {
        None | Some("N/A") => 0.0,
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|e| VidsubError::Compression(format!("Invalid duration '{}': {}", raw, e)))?,
    };

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(VidsubError::Compression(format!("Invalid duration {}", seconds)));
    }

    Ok(Duration::from_millis((seconds * 1000.0).round() as u64))
}

fn first_line(output: &[u8]) -> String {
    String::from_utf8_lossy(output)
        .lines()
        .next()
        .unwrap_or("Unknown version")
        .to_string()
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path, params: &AudioParams) -> Result<()> {
        let command = self.command_builder.extract_audio(video_path, audio_path, params);
        command.execute(VidsubError::Extraction).await?;
        Ok(())
    }

    async fn transcode(&self, input_path: &Path, output_path: &Path, params: &AudioParams) -> Result<()> {
        let command = self.command_builder.transcode(input_path, output_path, params);
        command.execute(VidsubError::Compression).await?;
        Ok(())
    }

    async fn cut(
        &self,
        input_path: &Path,
        output_path: &Path,
        start: Duration,
        duration: Duration,
        params: &AudioParams,
    ) -> Result<()> {
        let command = self
            .command_builder
            .cut(input_path, output_path, start, duration, params);
        command.execute(VidsubError::Split).await?;
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<Duration> {
        let command = self.command_builder.probe_duration(path);
        let output = command.execute(VidsubError::Compression).await?;
        let duration = parse_probe_duration(&String::from_utf8_lossy(&output.stdout))?;

        debug!("Probed {}: {:.3}s", path.display(), duration.as_secs_f64());
        Ok(duration)
    }

    async fn version_info(&self) -> Result<String> {
        let ffmpeg = self
            .command_builder
            .version_check()
            .execute(VidsubError::Extraction)
            .await?;
        let ffprobe = self
            .command_builder
            .probe_version_check()
            .execute(VidsubError::Extraction)
            .await?;

        info!("Media tools are available");
        Ok(format!("{}\n{}", first_line(&ffmpeg.stdout), first_line(&ffprobe.stdout)))
    }
}
