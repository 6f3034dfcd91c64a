// Media processing
//
// The external audio tool is modelled as a capability (`MediaTool`) so the
// extractor, the reducer and the orchestrator can run against a fake:
// - commands: argument builders and process execution
// - processor: ffmpeg/ffprobe implementation of the capability
// - extractor: pulls the full-length audio track out of a video
// - reducer: compresses and splits audio under the payload ceiling

pub mod commands;
pub mod extractor;
pub mod processor;
pub mod reducer;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use commands::*;
pub use extractor::extract_audio;
pub use processor::*;
pub use reducer::{plan_segments, reduce, AudioSegment, SegmentPlan};

use crate::config::{AudioParams, MediaConfig};
use crate::error::Result;

/// Blocking invocations of the external audio tool.
///
/// Each method maps its own failures onto the error kind of the stage that
/// uses it: extraction, compression (including probing) and splitting.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Write the full audio track of `video_path` to `audio_path`
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path, params: &AudioParams) -> Result<()>;

    /// Re-encode an audio file
    async fn transcode(&self, input_path: &Path, output_path: &Path, params: &AudioParams) -> Result<()>;

    /// Write the `[start, start + duration)` slice of an audio file
    async fn cut(
        &self,
        input_path: &Path,
        output_path: &Path,
        start: Duration,
        duration: Duration,
        params: &AudioParams,
    ) -> Result<()>;

    /// Playback length of an audio file
    async fn probe_duration(&self, path: &Path) -> Result<Duration>;

    /// First line of `-version` output for both tools
    async fn version_info(&self) -> Result<String>;
}

/// Factory for media tool instances
pub struct MediaToolFactory;

impl MediaToolFactory {
    /// Create the default (ffmpeg-based) media tool
    pub fn create(config: &MediaConfig) -> Arc<dyn MediaTool> {
        Arc::new(processor::FfmpegTool::new(config))
    }
}
