//! The session's state machine. All mutation of the parameter trees, the
//! effect description, the run state, and the preview session goes through
//! this controller, either as a request method or as one `apply_event`
//! reduction. Transport and server failures are recovered locally with a
//! log line and a non-busy phase; nothing is retried automatically.

use crate::backend::PipelineBackend;
use crate::defaults;
use crate::editor::{self, EditError};
use crate::state::{FrameOutOfRange, Phase, PreviewSession, RunState};
use crate::tree::{ParamTree, Path};
use stokes_protocol::{
    ChannelEvent, EffectDescription, InferRequest, InferResponse, PreviewRequest, PreviewResponse,
    PreviewSettings, ResponseStatus, RunRequest, StatusUpdate,
};
use thiserror::Error;

pub const MAX_PREVIEW_FRAMES: u32 = 100;

/// The controller's inbox: wire events plus connectivity markers
/// synthesized by whichever transport feeds it.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Log(String),
    Status(StatusUpdate),
}

impl From<ChannelEvent> for SessionEvent {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::PipelineLog { message } => SessionEvent::Log(message),
            ChannelEvent::PipelineStatus(update) => SessionEvent::Status(update),
        }
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("cannot start while {active}")]
    Busy { active: &'static str },
    #[error("preview duration must be between 1 and 100 frames (got {got})")]
    InvalidPreviewDuration { got: u32 },
}

pub struct SessionController<B> {
    backend: B,
    effect: EffectDescription,
    simulation_params: ParamTree,
    visualization_params: ParamTree,
    run: RunState,
    preview: PreviewSession,
}

impl<B: PipelineBackend> SessionController<B> {
    pub fn new(backend: B) -> Self {
        Self::with_params(
            backend,
            defaults::simulation_params(),
            defaults::visualization_params(),
        )
    }

    pub fn with_params(backend: B, simulation_params: ParamTree, visualization_params: ParamTree) -> Self {
        Self {
            backend,
            effect: defaults::effect_description(),
            simulation_params,
            visualization_params,
            run: RunState::default(),
            preview: PreviewSession::default(),
        }
    }

    pub fn run_state(&self) -> &RunState {
        &self.run
    }

    pub fn phase(&self) -> Phase {
        self.run.phase
    }

    pub fn preview(&self) -> &PreviewSession {
        &self.preview
    }

    pub fn simulation_params(&self) -> &ParamTree {
        &self.simulation_params
    }

    pub fn visualization_params(&self) -> &ParamTree {
        &self.visualization_params
    }

    pub fn effect_description(&self) -> &EffectDescription {
        &self.effect
    }

    /// Field-by-field edit of the effect description.
    pub fn describe(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.effect.insert(field.into(), value.into());
    }

    pub fn replace_effect_description(&mut self, description: EffectDescription) {
        self.effect = description;
    }

    /// One committed editor edit against the simulation tree. The edit
    /// either lands whole or leaves the session untouched.
    pub fn commit_simulation_edit(&mut self, path: &Path, raw: &str) -> Result<(), EditError> {
        self.simulation_params = editor::commit(&self.simulation_params, path, raw)?;
        Ok(())
    }

    pub fn commit_visualization_edit(&mut self, path: &Path, raw: &str) -> Result<(), EditError> {
        self.visualization_params = editor::commit(&self.visualization_params, path, raw)?;
        Ok(())
    }

    pub fn select_preview_frame(&mut self, index: usize) -> Result<(), FrameOutOfRange> {
        self.preview.select(index)
    }

    fn ensure_not_busy(&self) -> Result<(), ControlError> {
        if self.run.phase.is_busy() {
            return Err(ControlError::Busy {
                active: self.run.phase.label(),
            });
        }
        Ok(())
    }

    /// Send the effect description to the inference collaborator and, on
    /// success, replace both parameter trees wholesale. Inference failure
    /// is non-fatal: logged, back to idle.
    pub async fn request_inference(&mut self) -> Result<(), ControlError> {
        self.ensure_not_busy()?;
        self.run.push_log("Inferring parameters from LLM...");
        self.run.phase = Phase::Inferring;
        let req = InferRequest {
            effect_description: self.effect.clone(),
        };
        match self.backend.infer_params(&req).await {
            Ok(resp) => self.ingest_inference(resp),
            Err(e) => {
                tracing::warn!("inference request failed: {e}");
                self.run.push_log(format!("API Error during inference: {e}"));
            }
        }
        self.run.phase = Phase::Idle;
        Ok(())
    }

    fn ingest_inference(&mut self, resp: InferResponse) {
        if resp.status != ResponseStatus::Success {
            let msg = resp.message.unwrap_or_else(|| "unknown error".to_string());
            self.run.push_log(format!("Parameter inference failed: {msg}"));
            return;
        }
        let (Some(sim), Some(vis)) = (resp.simulation_params, resp.visualization_params) else {
            self.run
                .push_log("Parameter inference failed: response missing parameter sets");
            return;
        };
        match (ParamTree::from_value(&sim), ParamTree::from_value(&vis)) {
            (Ok(sim), Ok(vis)) => {
                self.simulation_params = sim;
                self.visualization_params = vis;
                self.run.push_log("Parameters inferred successfully.");
            }
            (Err(e), _) | (_, Err(e)) => {
                self.run.push_log(format!("Parameter inference failed: {e}"));
            }
        }
    }

    /// Start a pipeline run. Clears the previous run's log, progress, and
    /// artifact references, then sends the current parameters. The
    /// response acknowledges acceptance only; progress arrives as events.
    pub async fn request_run(&mut self) -> Result<(), ControlError> {
        self.ensure_not_busy()?;
        self.run.reset_for_run();
        let req = RunRequest {
            simulation_params: self.simulation_params.to_value(),
            visualization_params: self.visualization_params.to_value(),
        };
        match self.backend.run_pipeline(&req).await {
            Ok(ack) => self.run.push_log(format!("API Response: {}", ack.message)),
            Err(e) => {
                tracing::warn!("run request failed: {e}");
                self.run.push_log(format!("API Error: {e}"));
                self.run.phase = Phase::Failed;
            }
        }
        Ok(())
    }

    /// Advisory stop. Logs the acknowledgement but changes no phase; the
    /// phase moves when (and only when) a status event says so, whichever
    /// terminal event arrives first.
    pub async fn request_stop(&mut self) {
        match self.backend.stop_pipeline().await {
            Ok(ack) => self.run.push_log(format!("API Response: {}", ack.message)),
            Err(e) => {
                tracing::warn!("stop request failed: {e}");
                self.run.push_log(format!("API Error: {e}"));
            }
        }
    }

    /// Render a short preview of the current simulation parameters. The
    /// frame store is cleared (selector back to 0) before the request goes
    /// out, and populated once from the single response.
    pub async fn request_preview(&mut self, duration_frames: u32) -> Result<(), ControlError> {
        self.ensure_not_busy()?;
        if duration_frames == 0 || duration_frames > MAX_PREVIEW_FRAMES {
            return Err(ControlError::InvalidPreviewDuration {
                got: duration_frames,
            });
        }
        self.run.push_log("Generating preview...");
        self.run.phase = Phase::Previewing;
        self.preview.clear();
        let req = PreviewRequest {
            simulation_params: self.simulation_params.to_value(),
            preview_settings: PreviewSettings { duration_frames },
        };
        match self.backend.run_preview(&req).await {
            Ok(resp) => self.ingest_preview(resp),
            Err(e) => {
                tracing::warn!("preview request failed: {e}");
                self.run.push_log(format!("API Error during preview: {e}"));
            }
        }
        self.run.phase = Phase::Idle;
        Ok(())
    }

    fn ingest_preview(&mut self, resp: PreviewResponse) {
        if resp.status != ResponseStatus::Success {
            let msg = resp.message.unwrap_or_else(|| "unknown error".to_string());
            self.run.push_log(format!("Preview generation failed: {msg}"));
            return;
        }
        let Some(data) = resp.preview_data else {
            self.run.push_log("Preview generation failed: response missing frames");
            return;
        };
        self.preview.populate(data.frames);
        self.run.push_log("Preview frames generated successfully.");
    }

    /// Reduce one inbound event into the session state. Callable by any
    /// transport binding; the event's own status field is authoritative
    /// for the phase, and optional fields only overwrite when present.
    pub fn apply_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => self.run.push_log("Connected to server."),
            SessionEvent::Disconnected => self.run.push_log("Disconnected from server."),
            SessionEvent::Log(message) => self.run.push_log(message),
            SessionEvent::Status(update) => self.apply_status(update),
        }
    }

    fn apply_status(&mut self, update: StatusUpdate) {
        let StatusUpdate {
            status,
            current_step,
            progress,
            output_url,
            gif_url,
            message,
        } = update;
        let detail = message.unwrap_or_else(|| current_step.clone());
        self.run.phase = Phase::from(status);
        self.run.current_step = current_step;
        if let Some(progress) = progress {
            self.run.progress = progress;
        }
        if let Some(url) = output_url {
            self.run.output_url = Some(url);
        }
        if let Some(url) = gif_url {
            self.run.gif_url = Some(url);
        }
        self.run
            .push_log(format!("Status: {} - {detail}", status.label()));
    }
}
