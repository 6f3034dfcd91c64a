//! Vidsub - video to subtitle pipeline
//!
//! Extracts the audio track of a video with ffmpeg, brings it under the
//! upload ceiling of a hosted Whisper service by compressing and splitting,
//! transcribes each piece and merges the results into one SRT file.

pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod media;
pub mod progress;
pub mod subtitle;
pub mod temp;
pub mod transcribe;
pub mod transcript;
pub mod workflow;
