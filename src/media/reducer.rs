use std::time::Duration;

use tracing::{debug, info};

use super::MediaTool;
use crate::config::ProcessingConfig;
use crate::error::{Result, VidsubError};
use crate::temp::{RunWorkspace, TempAudio};

/// A contiguous slice of the job's audio, ready to upload.
#[derive(Debug)]
pub struct AudioSegment {
    pub audio: TempAudio,
    /// Offset from the beginning of the original audio
    pub start_offset: Duration,
    pub duration: Duration,
    pub sequence_index: usize,
}

impl AudioSegment {
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.duration
    }
}

/// Time window of one segment before any file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    pub index: usize,
    pub start: Duration,
    pub duration: Duration,
}

/// Split `total` into consecutive windows whose estimated encoded size fits
/// the payload ceiling.
///
/// The bitrate is estimated from the compressed file (`size_bytes / total`)
/// and each window targets `ceiling * safety_margin` bytes. Windows are
/// computed in whole milliseconds so they are exactly contiguous; the last
/// one takes the remainder.
pub fn plan_segments(
    total: Duration,
    size_bytes: u64,
    ceiling_bytes: u64,
    safety_margin: f64,
    max_duration: Option<Duration>,
) -> Result<Vec<SegmentPlan>> {
    let total_ms = total.as_millis() as u64;
    let over_size = size_bytes > ceiling_bytes;
    let over_duration = max_duration.is_some_and(|max| total > max);

    if total_ms == 0 || (!over_size && !over_duration) {
        return Ok(vec![SegmentPlan {
            index: 0,
            start: Duration::ZERO,
            duration: Duration::from_millis(total_ms),
        }]);
    }

    let mut segment_ms = u64::MAX;
    if over_size {
        let target_bytes = (ceiling_bytes as f64 * safety_margin).floor() as u128;
        segment_ms = (target_bytes * total_ms as u128 / size_bytes as u128) as u64;
    }
    if let Some(max) = max_duration {
        segment_ms = segment_ms.min(max.as_millis() as u64);
    }

    if segment_ms == 0 {
        return Err(VidsubError::Split(format!(
            "Cannot fit {} bytes of audio into {} byte segments",
            size_bytes, ceiling_bytes
        )));
    }

    let count = total_ms.div_ceil(segment_ms);
    let plans = (0..count)
        .map(|i| {
            let start_ms = i * segment_ms;
            SegmentPlan {
                index: i as usize,
                start: Duration::from_millis(start_ms),
                duration: Duration::from_millis(segment_ms.min(total_ms - start_ms)),
            }
        })
        .collect();

    Ok(plans)
}

/// Compress the extracted audio and split it until every piece fits the
/// payload ceiling.
///
/// The caller keeps ownership of `extracted`; the intermediate compressed file
/// is deleted before returning unless it is itself the single segment.
pub async fn reduce(
    tool: &dyn MediaTool,
    extracted: &TempAudio,
    workspace: &RunWorkspace,
    config: &ProcessingConfig,
) -> Result<Vec<AudioSegment>> {
    let params = &config.compression;
    let ceiling = config.max_payload_bytes;

    let compressed = workspace.file(&format!("compressed.{}", params.extension));
    tool.transcode(extracted.path(), compressed.path(), params).await?;

    let size = compressed
        .size()
        .map_err(|e| VidsubError::Compression(format!("Compressed audio missing: {}", e)))?;
    let total = tool.probe_duration(compressed.path()).await?;

    info!(
        bytes = size,
        ceiling,
        seconds = total.as_secs_f64(),
        "Audio compressed"
    );

    let plans = plan_segments(
        total,
        size,
        ceiling,
        config.size_safety_margin,
        config.max_segment_duration,
    )?;

    if plans.len() == 1 {
        ensure_within_ceiling(0, size, ceiling)?;
        debug!("Compressed audio fits in a single segment");
        return Ok(vec![AudioSegment {
            audio: compressed,
            start_offset: Duration::ZERO,
            duration: plans[0].duration,
            sequence_index: 0,
        }]);
    }

    info!("Splitting audio into {} segments", plans.len());

    let mut segments = Vec::with_capacity(plans.len());
    for plan in &plans {
        let audio = workspace.file(&format!("segment_{}.{}", plan.index, params.extension));
        tool.cut(compressed.path(), audio.path(), plan.start, plan.duration, params)
            .await?;

        let segment_size = audio
            .size()
            .map_err(|e| VidsubError::Split(format!("Segment {} missing: {}", plan.index, e)))?;
        ensure_within_ceiling(plan.index, segment_size, ceiling)?;

        debug!(
            index = plan.index,
            bytes = segment_size,
            start = plan.start.as_secs_f64(),
            "Segment written"
        );

        segments.push(AudioSegment {
            audio,
            start_offset: plan.start,
            duration: plan.duration,
            sequence_index: plan.index,
        });
    }

    if segments.is_empty() {
        return Err(VidsubError::Split("Splitting produced no segments".to_string()));
    }

    Ok(segments)
}

/// A segment over the ceiling means the safety margin is miscalibrated.
fn ensure_within_ceiling(index: usize, size: u64, ceiling: u64) -> Result<()> {
    if size > ceiling {
        return Err(VidsubError::Split(format!(
            "Segment {} is {} bytes, over the {} byte ceiling",
            index, size, ceiling
        )));
    }
    Ok(())
}
