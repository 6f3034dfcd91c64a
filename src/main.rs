//! Vidsub - video to subtitle pipeline
//!
//! Command-line entry point: logging, configuration lookup and dispatch.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidsub::cli::{Args, Commands};
use vidsub::config::{AudioParams, Config};
use vidsub::job::MediaJob;
use vidsub::media::MediaToolFactory;
use vidsub::progress::{ConsoleProgress, LogProgress, ProgressSink};
use vidsub::subtitle::{format_srt_time, parse_srt};
use vidsub::transcribe::groq::GroqTranscriptionService;
use vidsub::transcribe::TranscriptionClient;
use vidsub::workflow::{RunOutcome, Workflow};

const DEFAULT_CONFIG_FILE: &str = "vidsub.toml";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let config = load_config(args.config.as_deref())?;
    let media = MediaToolFactory::create(&config.media);

    match args.command {
        Commands::Process { input, output, language, api_key } => {
            let fallback_key = std::env::var(&config.transcriber.fallback_key_env).ok();
            let service = GroqTranscriptionService::new(&config.transcriber)?;
            let client = TranscriptionClient::new(Arc::new(service), fallback_key);

            let processing = config.processing_config(api_key.as_deref(), language.as_deref());
            let job = MediaJob::new(&input, output, processing.language.clone());
            info!("Processing video file: {}", input.display());

            let progress: Arc<dyn ProgressSink> = if std::io::stderr().is_terminal() {
                Arc::new(ConsoleProgress::new())
            } else {
                Arc::new(LogProgress)
            };
            let workflow = Arc::new(Workflow::new(media, client, progress));
            let cancel = workflow.cancel_handle();
            let mut handle = workflow.spawn(job, processing);

            let report = tokio::select! {
                report = &mut handle => report.context("processing task panicked")?,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupt received, stopping after the current step");
                    cancel.cancel();
                    handle.await.context("processing task panicked")?
                }
            };

            return Ok(match report.outcome {
                RunOutcome::Completed { output_path, cue_count } => {
                    println!("{} subtitle entries written to {}", cue_count, output_path.display());
                    ExitCode::SUCCESS
                }
                RunOutcome::Failed { stage, kind, message } => {
                    error!("Failed while {} ({}): {}", stage, kind, message);
                    ExitCode::FAILURE
                }
                RunOutcome::Cancelled => ExitCode::from(130),
            });
        }
        Commands::Extract { input, output } => {
            info!("Extracting audio from: {}", input.display());
            if !input.is_file() {
                anyhow::bail!("Input file not found: {}", input.display());
            }
            let params = AudioParams::for_output(&output, &config.media)?;
            media.extract_audio(&input, &output, &params).await?;
            println!("Audio written to {}", output.display());
        }
        Commands::Check => {
            let versions = media.version_info().await?;
            println!("{}", versions);
        }
        Commands::Inspect { input } => {
            let content = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let cues = parse_srt(&content)?;

            println!("{}: {} entries", input.display(), cues.len());
            if let (Some(first), Some(last)) = (cues.first(), cues.last()) {
                println!(
                    "Spans {} --> {}",
                    format_srt_time(first.start),
                    format_srt_time(last.end)
                );
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// `--config` wins, then `vidsub.toml` in the working directory, then defaults.
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
        return Ok(Config::from_file(&local)?);
    }

    Ok(Config::default())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".vidsub").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "vidsub.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Flushes on drop; must outlive every log call
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
