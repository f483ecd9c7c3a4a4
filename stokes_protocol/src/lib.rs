use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Natural-language description of the desired effect, sent to the
/// inference endpoint. Flat text fields, insertion order preserved for
/// display.
pub type EffectDescription = IndexMap<String, String>;

/// Server-reported phase of the pipeline run. The client's own phase
/// vocabulary is wider (it also tracks inference and preview activity);
/// only these four travel on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Stopped => "stopped",
        }
    }
}

/// One structured status push. `current_step` is a free-text label chosen
/// by the server; the optional fields only overwrite client state when
/// present.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatusUpdate {
    pub status: RunStatus,
    pub current_step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Events pushed over the long-lived channel, demultiplexed by `type`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChannelEvent {
    PipelineLog { message: String },
    PipelineStatus(StatusUpdate),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InferRequest {
    pub effect_description: EffectDescription,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InferResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_params: Option<Value>,
}

/// Parameter payloads travel as raw JSON; the client's typed tree converts
/// at the boundary.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunRequest {
    pub simulation_params: Value,
    pub visualization_params: Value,
}

/// Acceptance of the run request, not completion. Everything after this
/// arrives as `ChannelEvent`s.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunAck {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StopAck {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PreviewSettings {
    pub duration_frames: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PreviewRequest {
    pub simulation_params: Value,
    pub preview_settings: PreviewSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PreviewData {
    /// Ordered base64-encoded frame images, opaque to the client.
    pub frames: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PreviewResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_data: Option<PreviewData>,
}
