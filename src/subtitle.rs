use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::error::{Result, VidsubError};
use crate::transcript::{Transcript, TranscriptCue};

/// Render a transcript as SRT text. Cues are numbered from 1 in transcript order.
pub fn format_srt(transcript: &Transcript) -> String {
    let mut srt_content = String::new();

    for (index, cue) in transcript.cues().iter().enumerate() {
        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(cue.start),
            format_srt_time(cue.end),
            cue.text.trim()
        ));
    }

    srt_content
}

/// Write an SRT subtitle file. An empty transcript produces an empty file.
pub async fn write_srt<P: AsRef<Path>>(transcript: &Transcript, output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(VidsubError::Write(format!(
                "Output directory does not exist: {}",
                parent.display()
            )));
        }
    }

    fs::write(output_path, format_srt(transcript))
        .await
        .map_err(|e| VidsubError::Write(format!("{}: {}", output_path.display(), e)))?;

    info!(cues = transcript.len(), "SRT file generated successfully");
    Ok(())
}

/// Format a duration as an SRT timestamp (HH:MM:SS,mmm)
pub fn format_srt_time(time: Duration) -> String {
    let total_milliseconds = time.as_millis() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse an SRT timestamp; a `.` decimal separator is accepted as well.
pub fn parse_srt_time(value: &str) -> Option<Duration> {
    let (clock, millis) = value.trim().split_once([',', '.'])?;
    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let secs: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || secs >= 60 || millis.len() != 3 {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;

    Some(Duration::from_millis(
        hours * 3_600_000 + minutes * 60_000 + secs * 1_000 + millis,
    ))
}

/// Read SRT text back into cues.
pub fn parse_srt(content: &str) -> Result<Vec<TranscriptCue>> {
    let normalized = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in normalized.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let mut lines = block.lines();
        let number = lines.next().unwrap_or_default();
        let timing = lines.next().ok_or_else(|| {
            VidsubError::Parse(format!("Subtitle entry {} has no timing line", number))
        })?;

        let (start, end) = timing
            .split_once("-->")
            .and_then(|(start, end)| Some((parse_srt_time(start)?, parse_srt_time(end)?)))
            .ok_or_else(|| VidsubError::Parse(format!("Invalid timing line: {}", timing)))?;

        let text = lines.collect::<Vec<_>>().join("\n");
        cues.push(TranscriptCue::new(start, end, text));
    }

    Ok(cues)
}
