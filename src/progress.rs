use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::error::{ErrorKind, Stage};

/// Receiver of run status. The pipeline never depends on how it is rendered.
pub trait ProgressSink: Send + Sync {
    /// Human-readable status for a state transition
    fn report(&self, stage: Stage, message: &str);

    /// A run ended in failure or cancellation
    fn report_error(&self, stage: Stage, kind: ErrorKind, detail: &str);

    /// The subtitle file was written
    fn report_completion(&self, output_path: &Path);
}

/// Sink that only writes structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, stage: Stage, message: &str) {
        info!(%stage, "{}", message);
    }

    fn report_error(&self, stage: Stage, kind: ErrorKind, detail: &str) {
        error!(%stage, %kind, "{}", detail);
    }

    fn report_completion(&self, output_path: &Path) {
        info!("Subtitles written to {}", output_path.display());
    }
}

/// Terminal spinner for interactive runs
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn report(&self, stage: Stage, message: &str) {
        self.bar.set_message(format!("[{}] {}", stage, message));
    }

    fn report_error(&self, stage: Stage, kind: ErrorKind, detail: &str) {
        self.bar
            .abandon_with_message(format!("[{}] {}: {}", stage, kind, detail));
    }

    fn report_completion(&self, output_path: &Path) {
        self.bar
            .finish_with_message(format!("Subtitles written to {}", output_path.display()));
    }
}
