use stokes_protocol::RunStatus;
use thiserror::Error;

/// Discrete state of the run/preview machine. The wire only ever reports
/// the last four; the first three are client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Inferring,
    Running,
    Previewing,
    Completed,
    Failed,
    Stopped,
}

impl Phase {
    /// A busy phase rejects a conflicting start; terminal phases are
    /// restartable.
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Inferring | Phase::Running | Phase::Previewing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::Stopped)
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Inferring => "inferring",
            Phase::Running => "running",
            Phase::Previewing => "previewing",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::Stopped => "stopped",
        }
    }
}

impl From<RunStatus> for Phase {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Running => Phase::Running,
            RunStatus::Completed => Phase::Completed,
            RunStatus::Failed => Phase::Failed,
            RunStatus::Stopped => Phase::Stopped,
        }
    }
}

/// Derived view of the active run: phase, the server's free-text step
/// label, progress (0-100), artifact references, and the append-only log.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub phase: Phase,
    pub current_step: String,
    pub progress: f32,
    pub output_url: Option<String>,
    pub gif_url: Option<String>,
    log: Vec<String>,
}

impl RunState {
    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub(crate) fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }

    /// Starting a run wipes the previous run's residue regardless of what
    /// it was: log, progress, step label, artifact references.
    pub(crate) fn reset_for_run(&mut self) {
        self.log.clear();
        self.progress = 0.0;
        self.current_step.clear();
        self.output_url = None;
        self.gif_url = None;
        self.phase = Phase::Running;
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("frame index {index} out of range ({len} frames)")]
pub struct FrameOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// Frames from the last preview response plus a selector into them.
/// Created empty at preview start, populated once per response, never
/// mutated incrementally.
#[derive(Debug, Clone, Default)]
pub struct PreviewSession {
    frames: Vec<String>,
    selected_index: usize,
}

impl PreviewSession {
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn selected_frame(&self) -> Option<&str> {
        self.frames.get(self.selected_index).map(String::as_str)
    }

    pub fn select(&mut self, index: usize) -> Result<(), FrameOutOfRange> {
        if index >= self.frames.len() {
            return Err(FrameOutOfRange {
                index,
                len: self.frames.len(),
            });
        }
        self.selected_index = index;
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
        self.selected_index = 0;
    }

    pub(crate) fn populate(&mut self, frames: Vec<String>) {
        self.frames = frames;
        self.selected_index = 0;
    }
}
