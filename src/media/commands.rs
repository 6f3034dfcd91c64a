use std::path::Path;
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::config::AudioParams;
use crate::error::{Result, VidsubError};

/// Abstract media tool invocation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-acodec").arg(codec)
    }

    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Apply every encoding parameter of an audio target
    pub fn audio_params(self, params: &AudioParams) -> Self {
        let cmd = self
            .audio_codec(params.codec.clone())
            .audio_sample_rate(params.sample_rate)
            .audio_channels(params.channels);

        match &params.bitrate {
            Some(bitrate) => cmd.audio_bitrate(bitrate.clone()),
            None => cmd,
        }
    }

    /// Output-side seek, placed after `-i` for sample-accurate cuts
    pub fn seek(self, start: Duration) -> Self {
        self.arg("-ss").arg(format_seconds(start))
    }

    pub fn limit_duration(self, duration: Duration) -> Self {
        self.arg("-t").arg(format_seconds(duration))
    }

    /// Run the command, mapping any failure onto the caller's error kind.
    ///
    /// A missing binary and a non-zero exit status are both failures; the
    /// captured stderr is attached to the error.
    pub async fn execute(&self, on_error: fn(String) -> VidsubError) -> Result<Output> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                on_error(format!(
                    "{} failed: could not run {}: {}",
                    self.description, self.binary_path, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(on_error(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output)
    }
}

fn format_seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// Builder for the invocations the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
    probe_binary_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, probe_binary_path: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            probe_binary_path: probe_binary_path.into(),
        }
    }

    pub fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P, params: &AudioParams) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .input(video_path)
            .no_video()
            .audio_params(params)
            .overwrite()
            .output(audio_path)
    }

    pub fn transcode<P: AsRef<Path>>(&self, input_path: P, output_path: P, params: &AudioParams) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio compression")
            .input(input_path)
            .no_video()
            .audio_params(params)
            .overwrite()
            .output(output_path)
    }

    pub fn cut<P: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: P,
        start: Duration,
        duration: Duration,
        params: &AudioParams,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio segment split")
            .input(input_path)
            .seek(start)
            .limit_duration(duration)
            .no_video()
            .audio_params(params)
            .overwrite()
            .output(output_path)
    }

    pub fn probe_duration<P: AsRef<Path>>(&self, path: P) -> MediaCommand {
        MediaCommand::new(&self.probe_binary_path, "Duration probe")
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
            .output(path)
    }

    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }

    pub fn probe_version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.probe_binary_path, "Probe version check").arg("-version")
    }
}
