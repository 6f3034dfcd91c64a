use std::time::Duration;

/// One timed subtitle entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptCue {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl TranscriptCue {
    pub fn new<S: Into<String>>(start: Duration, end: Duration, text: S) -> Self {
        Self {
            start,
            end: end.max(start),
            text: text.into(),
        }
    }

    /// Build a cue from service-reported seconds, rounded to whole milliseconds.
    pub fn from_seconds<S: Into<String>>(start: f64, end: f64, text: S) -> Self {
        Self::new(seconds_to_duration(start), seconds_to_duration(end), text)
    }

    /// Move a segment-local cue into global time, clamped to the segment window.
    pub fn shifted(self, offset: Duration, window: Duration) -> Self {
        let limit = offset + window;
        Self {
            start: (self.start + offset).min(limit),
            end: (self.end + offset).min(limit),
            text: self.text,
        }
    }
}

fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_millis((seconds * 1000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

/// Cues of one segment in segment-local time, as returned by the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptFragment {
    pub cues: Vec<TranscriptCue>,
    pub language: Option<String>,
}

/// Ordered, non-overlapping cues covering a whole job, in global time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    cues: Vec<TranscriptCue>,
    language: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cues(cues: Vec<TranscriptCue>) -> Self {
        Self { cues, language: None }
    }

    /// Append one segment's cues after offset correction.
    ///
    /// Segments must be appended in sequence order; cues are clamped to the
    /// segment window so neighbouring segments cannot overlap, and cues that
    /// start at or after the window end are dropped. Returns the number of
    /// cues added.
    pub fn append_segment(&mut self, fragment: TranscriptFragment, offset: Duration, window: Duration) -> usize {
        if self.language.is_none() {
            self.language = fragment.language.filter(|l| !l.is_empty());
        }

        let before = self.cues.len();
        self.cues.extend(
            fragment
                .cues
                .into_iter()
                .filter(|cue| cue.start < window)
                .map(|cue| cue.shifted(offset, window)),
        );
        self.cues.len() - before
    }

    pub fn cues(&self) -> &[TranscriptCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// First language reported by the service, if any
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// End time of the last cue
    pub fn span(&self) -> Duration {
        self.cues.last().map(|c| c.end).unwrap_or_default()
    }

    pub fn is_ordered(&self) -> bool {
        self.cues.windows(2).all(|w| w[0].start <= w[1].start)
    }
}
