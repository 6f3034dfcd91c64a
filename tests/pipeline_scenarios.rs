use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;

use vidsub::config::{ApiKeySource, AudioParams, Config, Language, ProcessingConfig};
use vidsub::error::{ErrorKind, Result, Stage, VidsubError};
use vidsub::job::MediaJob;
use vidsub::media::MediaTool;
use vidsub::progress::ProgressSink;
use vidsub::subtitle::parse_srt;
use vidsub::transcribe::{RetryPolicy, TranscriptionClient, TranscriptionRequest, TranscriptionService};
use vidsub::transcript::{TranscriptCue, TranscriptFragment};
use vidsub::workflow::{CancelHandle, JobState, RunOutcome, Workflow};

const MB: u64 = 1_000_000;

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

fn sparse_file(path: &Path, len: u64) -> Result<()> {
    File::create(path)?.set_len(len)?;
    Ok(())
}

/// Audio tool that writes sparse files of predictable sizes.
struct FakeMedia {
    compressed_bytes: u64,
    duration: Duration,
    transcode_fails: bool,
    cancel_on_extract: Mutex<Option<CancelHandle>>,
}

impl FakeMedia {
    fn new(compressed_bytes: u64, duration: Duration) -> Self {
        Self {
            compressed_bytes,
            duration,
            transcode_fails: false,
            cancel_on_extract: Mutex::new(None),
        }
    }

    fn failing_transcode(mut self) -> Self {
        self.transcode_fails = true;
        self
    }
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path, _: &AudioParams) -> Result<()> {
        if !video_path.exists() {
            return Err(VidsubError::Extraction("no such file".to_string()));
        }
        if let Some(cancel) = self.cancel_on_extract.lock().unwrap().take() {
            cancel.cancel();
        }
        sparse_file(audio_path, self.compressed_bytes * 4)
    }

    async fn transcode(&self, _: &Path, output_path: &Path, _: &AudioParams) -> Result<()> {
        if self.transcode_fails {
            // Leave a partial file behind, as a crashed encoder would
            sparse_file(output_path, 1024)?;
            return Err(VidsubError::Compression("encoder exited with status 1".to_string()));
        }
        sparse_file(output_path, self.compressed_bytes)
    }

    async fn cut(
        &self,
        _: &Path,
        output_path: &Path,
        _start: Duration,
        duration: Duration,
        _: &AudioParams,
    ) -> Result<()> {
        let bytes = (self.compressed_bytes as u128 * duration.as_millis()
            / self.duration.as_millis().max(1)) as u64;
        sparse_file(output_path, bytes)
    }

    async fn probe_duration(&self, _: &Path) -> Result<Duration> {
        Ok(self.duration)
    }

    async fn version_info(&self) -> Result<String> {
        Ok("fake".to_string())
    }
}

enum Reply {
    Cues(Vec<(f64, f64, &'static str)>),
    Fail(fn() -> VidsubError),
}

/// Scripted transcription service. Falls back to one cue per call once the
/// script runs out.
#[derive(Default)]
struct ScriptedService {
    script: Mutex<VecDeque<Reply>>,
    uploads: Mutex<Vec<PathBuf>>,
    keys: Mutex<Vec<String>>,
    cancel_after_first: Mutex<Option<CancelHandle>>,
}

impl ScriptedService {
    fn with_script(replies: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl TranscriptionService for ScriptedService {
    async fn transcribe(&self, request: TranscriptionRequest<'_>) -> Result<TranscriptFragment> {
        assert!(request.audio_path.exists(), "segment must exist while uploading");
        self.uploads.lock().unwrap().push(request.audio_path.to_path_buf());
        self.keys.lock().unwrap().push(request.credential.secret().to_string());

        if let Some(cancel) = self.cancel_after_first.lock().unwrap().take() {
            cancel.cancel();
        }

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Cues(vec![(1.0, 2.5, "line")]));

        match reply {
            Reply::Cues(cues) => Ok(TranscriptFragment {
                cues: cues
                    .into_iter()
                    .map(|(start, end, text)| TranscriptCue::from_seconds(start, end, text))
                    .collect(),
                language: Some("en".to_string()),
            }),
            Reply::Fail(make) => Err(make()),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<(Stage, String)>>,
    errors: Mutex<Vec<(Stage, ErrorKind)>>,
    completions: Mutex<Vec<PathBuf>>,
}

impl ProgressSink for RecordingSink {
    fn report(&self, stage: Stage, message: &str) {
        self.messages.lock().unwrap().push((stage, message.to_string()));
    }

    fn report_error(&self, stage: Stage, kind: ErrorKind, _detail: &str) {
        self.errors.lock().unwrap().push((stage, kind));
    }

    fn report_completion(&self, output_path: &Path) {
        self.completions.lock().unwrap().push(output_path.to_path_buf());
    }
}

struct Harness {
    temp: TempDir,
    media: Arc<FakeMedia>,
    service: Arc<ScriptedService>,
    sink: Arc<RecordingSink>,
    workflow: Workflow,
    config: ProcessingConfig,
    job: MediaJob,
}

impl Harness {
    fn new(media: FakeMedia, service: ScriptedService) -> Self {
        Self::with_fallback(media, service, None)
    }

    fn with_fallback(media: FakeMedia, service: ScriptedService, fallback: Option<&str>) -> Self {
        let temp = TempDir::new().unwrap();
        let input = temp.child("talk.mp4");
        input.write_binary(b"not really a video").unwrap();

        let media = Arc::new(media);
        let service = Arc::new(service);
        let sink = Arc::new(RecordingSink::default());
        let client = TranscriptionClient::new(service.clone(), fallback.map(str::to_string));
        let workflow = Workflow::new(media.clone(), client, sink.clone());

        let mut config = Config::default().processing_config(Some("caller-key"), None);
        config.retry = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        config.temp_root = Some(temp.path().join("work"));

        let job = MediaJob::new(input.path(), None, Language::Auto);

        Self {
            temp,
            media,
            service,
            sink,
            workflow,
            config,
            job,
        }
    }

    fn work_dir_is_empty(&self) -> bool {
        let work = self.temp.path().join("work");
        !work.exists() || std::fs::read_dir(work).unwrap().next().is_none()
    }

    fn output_cues(&self) -> Vec<TranscriptCue> {
        parse_srt(&std::fs::read_to_string(&self.job.output_path).unwrap()).unwrap()
    }
}

#[tokio::test]
async fn short_video_is_transcribed_in_one_request() {
    let harness = Harness::new(
        FakeMedia::new(12 * MB, secs(600)),
        ScriptedService::with_script(vec![Reply::Cues(vec![
            (0.0, 2.0, "Welcome."),
            (2.0, 4.5, "Today we talk about rivers."),
            (300.0, 302.0, "Thanks."),
        ])]),
    );

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert_eq!(
        report.outcome,
        RunOutcome::Completed {
            output_path: harness.temp.path().join("talk.srt"),
            cue_count: 3,
        }
    );
    assert_eq!(harness.service.calls(), 1);

    let cues = harness.output_cues();
    assert_eq!(cues.len(), 3);
    assert_eq!(cues[0].start, Duration::ZERO);
    assert_eq!(cues[2].text, "Thanks.");

    assert_eq!(
        report.states,
        vec![
            JobState::Idle,
            JobState::Extracting,
            JobState::Compressing,
            JobState::Transcribing { segment: 0, total: 1 },
            JobState::Merging,
            JobState::Completed,
        ]
    );
    assert_eq!(harness.sink.completions.lock().unwrap().len(), 1);
    assert!(harness.work_dir_is_empty());
}

#[tokio::test]
async fn long_video_cues_are_shifted_by_segment_offsets() {
    let mut harness = Harness::new(
        FakeMedia::new(54 * MB, secs(90 * 60)),
        ScriptedService::default(),
    );
    harness.config.max_payload_bytes = 18 * MB;
    harness.config.size_safety_margin = 1.0;

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(report.outcome, RunOutcome::Completed { cue_count: 3, .. }));
    assert_eq!(harness.service.calls(), 3);

    let starts: Vec<Duration> = harness.output_cues().iter().map(|c| c.start).collect();
    assert_eq!(
        starts,
        vec![
            Duration::from_millis(1_000),
            Duration::from_millis(1_801_000),
            Duration::from_millis(3_601_000),
        ]
    );

    // One credential for the whole job
    assert!(harness.service.keys.lock().unwrap().iter().all(|k| k == "caller-key"));
    assert!(harness.work_dir_is_empty());
}

#[tokio::test]
async fn rejected_key_fails_without_writing_output() {
    let harness = Harness::new(
        FakeMedia::new(54 * MB, secs(90 * 60)),
        ScriptedService::with_script(vec![Reply::Fail(|| {
            VidsubError::Auth("invalid_api_key".to_string())
        })]),
    );

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    match &report.outcome {
        RunOutcome::Failed { stage, kind, .. } => {
            assert_eq!(*stage, Stage::Transcribing);
            assert_eq!(*kind, ErrorKind::Auth);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(harness.service.calls(), 1);
    assert!(!harness.job.output_path.exists());
    assert_eq!(
        *harness.sink.errors.lock().unwrap(),
        vec![(Stage::Transcribing, ErrorKind::Auth)]
    );
    assert!(harness.work_dir_is_empty());
}

fn rate_limited() -> VidsubError {
    VidsubError::RateLimit {
        message: "slow down".to_string(),
        retry_after: None,
    }
}

#[tokio::test]
async fn rate_limiting_is_retried_until_success() {
    let harness = Harness::new(
        FakeMedia::new(5 * MB, secs(600)),
        ScriptedService::with_script(vec![Reply::Fail(rate_limited), Reply::Fail(rate_limited)]),
    );

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(report.outcome, RunOutcome::Completed { cue_count: 1, .. }));
    assert_eq!(harness.service.calls(), 3);
    assert_eq!(
        harness.output_cues(),
        vec![TranscriptCue::from_seconds(1.0, 2.5, "line")]
    );
}

#[tokio::test]
async fn rate_limiting_gives_up_after_max_attempts() {
    let harness = Harness::new(
        FakeMedia::new(5 * MB, secs(600)),
        ScriptedService::with_script((0..10).map(|_| Reply::Fail(rate_limited)).collect()),
    );

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed {
            kind: ErrorKind::RateLimit,
            stage: Stage::Transcribing,
            ..
        }
    ));
    assert_eq!(harness.service.calls(), 4);
    assert!(!harness.job.output_path.exists());
}

#[tokio::test]
async fn silent_track_produces_empty_subtitle_file() {
    let harness = Harness::new(
        FakeMedia::new(MB, secs(120)),
        ScriptedService::with_script(vec![Reply::Cues(vec![])]),
    );

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(report.outcome, RunOutcome::Completed { cue_count: 0, .. }));
    assert_eq!(std::fs::read_to_string(&harness.job.output_path).unwrap(), "");
}

#[tokio::test]
async fn empty_audio_is_not_uploaded() {
    let harness = Harness::new(
        FakeMedia::new(0, Duration::ZERO),
        ScriptedService::default(),
    );

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(report.outcome, RunOutcome::Completed { cue_count: 0, .. }));
    assert_eq!(harness.service.calls(), 0);
}

#[tokio::test]
async fn cancellation_stops_before_the_next_segment() {
    let mut harness = Harness::new(
        FakeMedia::new(54 * MB, secs(90 * 60)),
        ScriptedService::default(),
    );
    harness.config.size_safety_margin = 1.0;
    *harness.service.cancel_after_first.lock().unwrap() = Some(harness.workflow.cancel_handle());

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.states.last(), Some(&JobState::Cancelled));
    assert_eq!(harness.service.calls(), 1);
    assert!(!harness.job.output_path.exists());
    assert_eq!(
        *harness.sink.errors.lock().unwrap(),
        vec![(Stage::Transcribing, ErrorKind::Cancelled)]
    );
    assert!(harness.work_dir_is_empty());
}

#[tokio::test]
async fn missing_key_fails_before_any_upload() {
    let mut harness = Harness::new(
        FakeMedia::new(5 * MB, secs(600)),
        ScriptedService::default(),
    );
    harness.config.api_key = ApiKeySource::UseFallback;

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed { kind: ErrorKind::Auth, .. }
    ));
    assert_eq!(harness.service.calls(), 0);
    assert!(harness.work_dir_is_empty());
}

#[tokio::test]
async fn fallback_key_is_used_when_caller_has_none() {
    let mut harness = Harness::with_fallback(
        FakeMedia::new(5 * MB, secs(600)),
        ScriptedService::default(),
        Some("shared-key"),
    );
    harness.config.api_key = ApiKeySource::UseFallback;

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(report.outcome, RunOutcome::Completed { .. }));
    assert_eq!(*harness.service.keys.lock().unwrap(), vec!["shared-key"]);
}

#[tokio::test]
async fn missing_input_fails_during_extraction() {
    let mut harness = Harness::new(
        FakeMedia::new(5 * MB, secs(600)),
        ScriptedService::default(),
    );
    harness.job = MediaJob::new(harness.temp.path().join("missing.mp4"), None, Language::Auto);

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed {
            stage: Stage::Extracting,
            kind: ErrorKind::Extraction,
            ..
        }
    ));
    assert_eq!(harness.service.calls(), 0);
}

#[tokio::test]
async fn rerunning_a_job_rewrites_identical_output() {
    let harness = Harness::new(
        FakeMedia::new(54 * MB, secs(90 * 60)),
        ScriptedService::default(),
    );

    harness.workflow.run(&harness.job, &harness.config).await;
    let first = std::fs::read_to_string(&harness.job.output_path).unwrap();
    harness.workflow.run(&harness.job, &harness.config).await;
    let second = std::fs::read_to_string(&harness.job.output_path).unwrap();

    assert_eq!(first, second);
    assert!(harness.work_dir_is_empty());
}

#[tokio::test]
async fn spawned_run_reports_progress_per_segment() {
    let harness = Harness::new(
        FakeMedia::new(54 * MB, secs(90 * 60)),
        ScriptedService::default(),
    );
    let Harness {
        temp: _temp,
        sink,
        workflow,
        config,
        job,
        ..
    } = harness;

    let report = Arc::new(workflow).spawn(job, config).await.unwrap();

    assert!(matches!(report.outcome, RunOutcome::Completed { .. }));
    let transcribing = sink
        .messages
        .lock()
        .unwrap()
        .iter()
        .filter(|(stage, _)| *stage == Stage::Transcribing)
        .count();
    // Default ceiling and margin: 54 MB at 0.9 * 18 MiB per segment
    assert_eq!(transcribing, 4);
}

#[tokio::test]
async fn cancelled_run_does_not_cancel_the_next_one() {
    let mut harness = Harness::new(FakeMedia::new(54 * MB, secs(90 * 60)), ScriptedService::default());
    harness.config.size_safety_margin = 1.0;
    *harness.service.cancel_after_first.lock().unwrap() = Some(harness.workflow.cancel_handle());

    let first = harness.workflow.run(&harness.job, &harness.config).await;
    assert_eq!(first.outcome, RunOutcome::Cancelled);
    assert_eq!(harness.service.calls(), 1);

    let second = harness.workflow.run(&harness.job, &harness.config).await;
    assert!(matches!(second.outcome, RunOutcome::Completed { cue_count: 3, .. }));
    assert_eq!(harness.service.calls(), 4);
    assert_eq!(harness.output_cues().len(), 3);
}

#[tokio::test]
async fn compression_failure_removes_extracted_audio() {
    let harness = Harness::new(
        FakeMedia::new(5 * MB, secs(600)).failing_transcode(),
        ScriptedService::default(),
    );

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed {
            stage: Stage::Compressing,
            kind: ErrorKind::Compression,
            ..
        }
    ));
    assert_eq!(harness.service.calls(), 0);
    assert!(!harness.job.output_path.exists());
    assert!(harness.work_dir_is_empty());
}

#[tokio::test]
async fn unwritable_output_fails_while_merging() {
    let mut harness = Harness::new(FakeMedia::new(54 * MB, secs(90 * 60)), ScriptedService::default());
    let output = harness.temp.path().join("no-such-dir").join("talk.srt");
    harness.job = MediaJob::new(harness.temp.path().join("talk.mp4"), Some(output.clone()), Language::Auto);

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed {
            stage: Stage::Merging,
            kind: ErrorKind::Write,
            ..
        }
    ));
    assert_eq!(report.states.last(), Some(&JobState::Failed { stage: Stage::Merging, kind: ErrorKind::Write }));
    assert!(!output.exists());
    assert!(harness.work_dir_is_empty());
}

#[tokio::test]
async fn cancellation_between_stages_stops_after_extraction() {
    let harness = Harness::new(FakeMedia::new(5 * MB, secs(600)), ScriptedService::default());
    *harness.media.cancel_on_extract.lock().unwrap() = Some(harness.workflow.cancel_handle());

    let report = harness.workflow.run(&harness.job, &harness.config).await;

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(
        report.states,
        vec![JobState::Idle, JobState::Extracting, JobState::Cancelled]
    );
    assert_eq!(
        *harness.sink.errors.lock().unwrap(),
        vec![(Stage::Extracting, ErrorKind::Cancelled)]
    );
    assert_eq!(harness.service.calls(), 0);
    assert!(!harness.job.output_path.exists());
    assert!(harness.work_dir_is_empty());
}
