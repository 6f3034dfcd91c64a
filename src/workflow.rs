use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ProcessingConfig;
use crate::error::{ErrorKind, Result, Stage, VidsubError};
use crate::job::MediaJob;
use crate::media::{extract_audio, reduce, MediaTool};
use crate::progress::ProgressSink;
use crate::subtitle::write_srt;
use crate::temp::RunWorkspace;
use crate::transcribe::TranscriptionClient;
use crate::transcript::{Transcript, TranscriptFragment};

/// Lifecycle of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Extracting,
    Compressing,
    /// `segment` is 0-based
    Transcribing { segment: usize, total: usize },
    Merging,
    Completed,
    Failed { stage: Stage, kind: ErrorKind },
    Cancelled,
}

impl JobState {
    /// Stage this state belongs to; `None` for idle and terminal states
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Extracting => Some(Stage::Extracting),
            Self::Compressing => Some(Stage::Compressing),
            Self::Transcribing { .. } => Some(Stage::Transcribing),
            Self::Merging => Some(Stage::Merging),
            Self::Idle | Self::Completed | Self::Failed { .. } | Self::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Extracting => write!(f, "extracting"),
            Self::Compressing => write!(f, "compressing"),
            Self::Transcribing { segment, total } => {
                write!(f, "transcribing segment {} of {}", segment + 1, total)
            }
            Self::Merging => write!(f, "merging"),
            Self::Completed => write!(f, "completed"),
            Self::Failed { stage, kind } => write!(f, "failed while {} ({})", stage, kind),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a run ended. Exactly one per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { output_path: PathBuf, cue_count: usize },
    Failed { stage: Stage, kind: ErrorKind, message: String },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Every state visited, in order; the last one is terminal
    pub states: Vec<JobState>,
}

/// Handle for cancelling a running workflow.
///
/// Cancellation is cooperative: it is observed between stages and between
/// segments, never in the middle of a tool invocation or upload. The request
/// is cleared when the run ends, so later runs on the same workflow start
/// fresh. A request made before a run starts cancels that run.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.swap(false, Ordering::SeqCst);
    }
}

/// Records state transitions and forwards them to the progress sink.
struct RunTracker<'a> {
    sink: &'a dyn ProgressSink,
    states: Vec<JobState>,
}

impl<'a> RunTracker<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            states: vec![JobState::Idle],
        }
    }

    fn enter(&mut self, state: JobState, message: &str) {
        info!(state = %state, "{}", message);
        if let Some(stage) = state.stage() {
            self.sink.report(stage, message);
        }
        self.states.push(state);
    }

    /// Stage of the most recent non-terminal state
    fn current_stage(&self) -> Stage {
        self.states
            .iter()
            .rev()
            .find_map(JobState::stage)
            .unwrap_or(Stage::Extracting)
    }
}

/// Chunk orchestrator: extraction, size reduction, sequential transcription
/// and subtitle output for one job at a time.
pub struct Workflow {
    media: Arc<dyn MediaTool>,
    transcriber: TranscriptionClient,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelHandle,
}

impl Workflow {
    pub fn new(
        media: Arc<dyn MediaTool>,
        transcriber: TranscriptionClient,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            media,
            transcriber,
            progress,
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run the job on its own task, off the caller's thread.
    pub fn spawn(self: Arc<Self>, job: MediaJob, config: ProcessingConfig) -> JoinHandle<RunReport> {
        tokio::spawn(async move { self.run(&job, &config).await })
    }

    /// Process one job to completion, failure or cancellation.
    ///
    /// Every temporary file is gone by the time this returns, whatever the
    /// outcome. The output file is only written once all segments succeeded.
    pub async fn run(&self, job: &MediaJob, config: &ProcessingConfig) -> RunReport {
        let span = info_span!("job", id = %job.id);
        self.run_tracked(job, config).instrument(span).await
    }

    async fn run_tracked(&self, job: &MediaJob, config: &ProcessingConfig) -> RunReport {
        info!("Processing {}", job.input_path.display());
        let mut tracker = RunTracker::new(self.progress.as_ref());

        let outcome = match self.execute(job, config, &mut tracker).await {
            Ok(cue_count) => {
                tracker.states.push(JobState::Completed);
                self.progress.report_completion(&job.output_path);
                info!(cues = cue_count, "Wrote {}", job.output_path.display());
                RunOutcome::Completed {
                    output_path: job.output_path.clone(),
                    cue_count,
                }
            }
            Err(VidsubError::Cancelled) => {
                let stage = tracker.current_stage();
                tracker.states.push(JobState::Cancelled);
                self.progress
                    .report_error(stage, ErrorKind::Cancelled, "Processing cancelled");
                warn!("Run cancelled while {}", stage);
                RunOutcome::Cancelled
            }
            Err(e) => {
                let stage = tracker.current_stage();
                let kind = e.kind();
                let message = e.to_string();
                tracker.states.push(JobState::Failed { stage, kind });
                self.progress.report_error(stage, kind, &message);
                warn!("Run failed while {}: {}", stage, message);
                RunOutcome::Failed { stage, kind, message }
            }
        };

        // A cancel request only applies to the run it interrupted
        self.cancel.reset();

        RunReport {
            outcome,
            states: tracker.states,
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(VidsubError::Cancelled);
        }
        Ok(())
    }

    /// The happy path. Temporary files are owned by `workspace` and the
    /// handles created inside it, so every early return cleans up.
    async fn execute(&self, job: &MediaJob, config: &ProcessingConfig, tracker: &mut RunTracker<'_>) -> Result<usize> {
        config.validate()?;

        self.checkpoint()?;
        tracker.enter(JobState::Extracting, "Extracting audio");
        let workspace = RunWorkspace::create(config.temp_root.as_deref(), job.id)?;
        let extracted = extract_audio(
            self.media.as_ref(),
            &job.input_path,
            &workspace,
            &config.extraction,
        )
        .await?;

        self.checkpoint()?;
        tracker.enter(JobState::Compressing, "Compressing audio");
        let reduced = reduce(self.media.as_ref(), &extracted, &workspace, config).await;
        // Superseded by the segments whether or not reduction succeeded
        extracted.release();
        let segments = reduced?;
        let total = segments.len();

        self.checkpoint()?;
        tracker.enter(
            JobState::Transcribing { segment: 0, total },
            &format!("Transcribing segment 1 of {}", total),
        );
        let session = self.transcriber.session(config, job.language.clone())?;

        let mut transcript = Transcript::new();
        for segment in segments {
            let index = segment.sequence_index;
            if index > 0 {
                self.checkpoint()?;
                tracker.enter(
                    JobState::Transcribing { segment: index, total },
                    &format!("Transcribing segment {} of {}", index + 1, total),
                );
            }

            let fragment = if segment.duration.is_zero() {
                debug!("Segment {} is empty, nothing to transcribe", index);
                TranscriptFragment::default()
            } else {
                session.transcribe(segment.audio.path()).await?
            };

            let added = transcript.append_segment(fragment, segment.start_offset, segment.duration);
            debug!(
                index,
                cues = added,
                start = segment.start_offset.as_secs_f64(),
                end = segment.end_offset().as_secs_f64(),
                "Segment merged"
            );
        }

        self.checkpoint()?;
        tracker.enter(
            JobState::Merging,
            &format!("Writing {} subtitle entries", transcript.len()),
        );
        debug_assert!(transcript.is_ordered());
        if let Some(language) = transcript.language() {
            info!("Detected language: {}", language);
        }
        write_srt(&transcript, &job.output_path).await?;

        Ok(transcript.len())
    }
}
