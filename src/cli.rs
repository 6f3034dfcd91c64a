use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate subtitles for a video file
    Process {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output subtitle file (defaults to the input path with .srt)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Spoken language code, or "auto" to let the service detect it
        #[arg(short, long)]
        language: Option<String>,

        /// API key for the transcription service; the configured fallback key is used when absent
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Extract the audio track from a video file
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Check that ffmpeg and ffprobe are available
    Check,

    /// Summarize an existing SRT file
    Inspect {
        /// Subtitle file to read
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show the effective configuration
    Config,
}
