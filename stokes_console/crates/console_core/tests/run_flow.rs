use console_core::backend::{BackendError, PipelineBackend};
use console_core::controller::{ControlError, SessionController, SessionEvent};
use console_core::state::Phase;
use console_core::tree::{ParamTree, Path};
use reqwest::StatusCode;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use stokes_protocol::{
    ChannelEvent, InferRequest, InferResponse, PreviewData, PreviewRequest, PreviewResponse,
    ResponseStatus, RunAck, RunRequest, RunStatus, StatusUpdate, StopAck,
};

/// Scripted stand-in for the remote service: each request pops the next
/// queued response; `None` (or an empty queue) acts as a transport
/// failure before any server response.
#[derive(Default)]
struct MockBackend {
    infer: Mutex<VecDeque<Option<InferResponse>>>,
    run: Mutex<VecDeque<Option<RunAck>>>,
    stop: Mutex<VecDeque<Option<StopAck>>>,
    preview: Mutex<VecDeque<Option<PreviewResponse>>>,
}

impl MockBackend {
    fn queue_infer(self, resp: Option<InferResponse>) -> Self {
        self.infer.lock().unwrap().push_back(resp);
        self
    }

    fn queue_run(self, resp: Option<RunAck>) -> Self {
        self.run.lock().unwrap().push_back(resp);
        self
    }

    fn queue_stop(self, resp: Option<StopAck>) -> Self {
        self.stop.lock().unwrap().push_back(resp);
        self
    }

    fn queue_preview(self, resp: Option<PreviewResponse>) -> Self {
        self.preview.lock().unwrap().push_back(resp);
        self
    }
}

fn transport_down() -> BackendError {
    BackendError::BadStatus {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "connection refused".to_string(),
    }
}

impl PipelineBackend for MockBackend {
    async fn infer_params(&self, _req: &InferRequest) -> Result<InferResponse, BackendError> {
        self.infer.lock().unwrap().pop_front().flatten().ok_or_else(transport_down)
    }

    async fn run_pipeline(&self, _req: &RunRequest) -> Result<RunAck, BackendError> {
        self.run.lock().unwrap().pop_front().flatten().ok_or_else(transport_down)
    }

    async fn stop_pipeline(&self) -> Result<StopAck, BackendError> {
        self.stop.lock().unwrap().pop_front().flatten().ok_or_else(transport_down)
    }

    async fn run_preview(&self, _req: &PreviewRequest) -> Result<PreviewResponse, BackendError> {
        self.preview.lock().unwrap().pop_front().flatten().ok_or_else(transport_down)
    }
}

fn run_ack() -> Option<RunAck> {
    Some(RunAck {
        message: "Pipeline started".to_string(),
    })
}

fn stop_ack() -> Option<StopAck> {
    Some(StopAck {
        message: "Stop requested".to_string(),
    })
}

fn status(status: RunStatus, step: &str, progress: Option<f32>) -> SessionEvent {
    SessionEvent::Status(StatusUpdate {
        status,
        current_step: step.to_string(),
        progress,
        output_url: None,
        gif_url: None,
        message: None,
    })
}

fn log_lines<B>(controller: &SessionController<B>) -> Vec<&str>
where
    B: PipelineBackend,
{
    controller.run_state().log().iter().map(String::as_str).collect()
}

#[test]
fn connectivity_markers_append_log_lines() {
    let mut controller = SessionController::new(MockBackend::default());
    controller.apply_event(SessionEvent::Connected);
    controller.apply_event(SessionEvent::Disconnected);
    assert_eq!(
        log_lines(&controller),
        ["Connected to server.", "Disconnected from server."]
    );
}

#[test]
fn log_events_append_verbatim() {
    let mut controller = SessionController::new(MockBackend::default());
    let event: ChannelEvent =
        serde_json::from_str(r#"{"type":"pipeline_log","message":"solving frame 3 of 30"}"#)
            .expect("valid event json");
    controller.apply_event(event.into());
    assert_eq!(log_lines(&controller), ["solving frame 3 of 30"]);
}

#[tokio::test]
async fn run_resets_previous_session_residue() {
    let mut controller = SessionController::new(MockBackend::default().queue_run(run_ack()));
    controller.apply_event(SessionEvent::Log("old line".to_string()));
    controller.apply_event(SessionEvent::Status(StatusUpdate {
        status: RunStatus::Completed,
        current_step: "render".to_string(),
        progress: Some(100.0),
        output_url: Some("http://srv/out".to_string()),
        gif_url: Some("http://srv/out.gif".to_string()),
        message: None,
    }));
    assert_eq!(controller.run_state().progress, 100.0);

    controller.request_run().await.expect("run accepted");
    let run = controller.run_state();
    assert_eq!(run.phase, Phase::Running);
    assert_eq!(run.progress, 0.0);
    assert_eq!(run.current_step, "");
    assert!(run.output_url.is_none());
    assert!(run.gif_url.is_none());
    assert_eq!(log_lines(&controller), ["API Response: Pipeline started"]);
}

#[tokio::test]
async fn status_events_drive_run_to_completion_in_order() {
    let mut controller = SessionController::new(MockBackend::default().queue_run(run_ack()));
    controller.request_run().await.expect("run accepted");

    let payloads = [
        r#"{"type":"pipeline_status","status":"running","current_step":"simulation","progress":10}"#,
        r#"{"type":"pipeline_status","status":"running","current_step":"rendering","progress":55}"#,
        r#"{"type":"pipeline_status","status":"completed","current_step":"done","progress":100,"output_url":"http://srv/frames"}"#,
    ];
    for payload in payloads {
        let event: ChannelEvent = serde_json::from_str(payload).expect("valid event json");
        controller.apply_event(event.into());
    }

    let run = controller.run_state();
    assert_eq!(run.phase, Phase::Completed);
    assert_eq!(run.progress, 100.0);
    assert_eq!(run.output_url.as_deref(), Some("http://srv/frames"));
    assert_eq!(
        log_lines(&controller),
        [
            "API Response: Pipeline started",
            "Status: running - simulation",
            "Status: running - rendering",
            "Status: completed - done",
        ]
    );
}

#[tokio::test]
async fn missing_progress_keeps_last_value() {
    let mut controller = SessionController::new(MockBackend::default().queue_run(run_ack()));
    controller.request_run().await.expect("run accepted");

    controller.apply_event(status(RunStatus::Running, "simulation", Some(42.0)));
    assert_eq!(controller.run_state().progress, 42.0);

    let event: ChannelEvent = serde_json::from_str(
        r#"{"type":"pipeline_status","status":"running","current_step":"meshing"}"#,
    )
    .expect("valid event json");
    controller.apply_event(event.into());

    let run = controller.run_state();
    assert_eq!(run.progress, 42.0);
    assert_eq!(run.current_step, "meshing");
}

#[tokio::test]
async fn concurrent_starts_are_rejected_without_clobbering() {
    let mut controller = SessionController::new(MockBackend::default().queue_run(run_ack()));
    controller.request_run().await.expect("run accepted");
    controller.apply_event(status(RunStatus::Running, "simulation", Some(30.0)));
    let log_before = log_lines(&controller).len();

    let err = controller.request_run().await.unwrap_err();
    assert!(matches!(err, ControlError::Busy { .. }), "got {err:?}");

    let err = controller.request_preview(10).await.unwrap_err();
    assert!(matches!(err, ControlError::Busy { .. }), "got {err:?}");

    let err = controller.request_inference().await.unwrap_err();
    assert!(matches!(err, ControlError::Busy { .. }), "got {err:?}");

    let run = controller.run_state();
    assert_eq!(run.phase, Phase::Running);
    assert_eq!(run.progress, 30.0);
    assert_eq!(run.log().len(), log_before);
}

#[tokio::test]
async fn transport_failure_fails_the_run_locally() {
    let backend = MockBackend::default().queue_run(None).queue_run(run_ack());
    let mut controller = SessionController::new(backend);

    controller.request_run().await.expect("recovered locally");
    assert_eq!(controller.phase(), Phase::Failed);
    let lines = log_lines(&controller);
    assert!(lines[0].starts_with("API Error:"), "got {lines:?}");

    // The session stays usable; the user re-issues the action.
    controller.request_run().await.expect("second run accepted");
    assert_eq!(controller.phase(), Phase::Running);
}

#[tokio::test]
async fn stop_is_advisory_and_last_status_wins() {
    let backend = MockBackend::default()
        .queue_run(run_ack())
        .queue_run(run_ack())
        .queue_stop(stop_ack())
        .queue_stop(stop_ack());
    let mut controller = SessionController::new(backend);

    // Stop ack first, terminal event second.
    controller.request_run().await.expect("run accepted");
    controller.request_stop().await;
    assert_eq!(controller.phase(), Phase::Running);
    assert!(log_lines(&controller).contains(&"API Response: Stop requested"));
    controller.apply_event(status(RunStatus::Stopped, "aborted", None));
    assert_eq!(controller.phase(), Phase::Stopped);

    // Natural completion first, late stop ack second.
    controller.request_run().await.expect("run accepted");
    controller.apply_event(status(RunStatus::Completed, "done", Some(100.0)));
    controller.request_stop().await;
    assert_eq!(controller.phase(), Phase::Completed);
}

#[tokio::test]
async fn inference_replaces_both_trees_wholesale() {
    let backend = MockBackend::default().queue_infer(Some(InferResponse {
        status: ResponseStatus::Success,
        message: None,
        simulation_params: Some(json!({"solver": {"iterations": 40}, "viscosity": 0.07})),
        visualization_params: Some(json!({"palette": "inferno"})),
    }));
    let mut controller = SessionController::new(backend);

    let old_path: Path = "grid_resolution[0]".parse().unwrap();
    assert!(controller.simulation_params().get(&old_path).is_ok());

    controller.request_inference().await.expect("inference ran");
    assert_eq!(controller.phase(), Phase::Idle);

    // Old addresses no longer exist in the replaced tree.
    assert!(controller.simulation_params().get(&old_path).is_err());

    let new_path: Path = "solver.iterations".parse().unwrap();
    assert_eq!(
        controller.simulation_params().get(&new_path).unwrap(),
        &ParamTree::Number(40.0)
    );
    let vis_path: Path = "palette".parse().unwrap();
    assert_eq!(
        controller.visualization_params().get(&vis_path).unwrap(),
        &ParamTree::Text("inferno".to_string())
    );
    assert_eq!(
        log_lines(&controller).last().copied(),
        Some("Parameters inferred successfully.")
    );
}

#[tokio::test]
async fn failed_inference_is_non_fatal() {
    let backend = MockBackend::default()
        .queue_infer(Some(InferResponse {
            status: ResponseStatus::Error,
            message: Some("model unavailable".to_string()),
            simulation_params: None,
            visualization_params: None,
        }))
        .queue_infer(None);
    let mut controller = SessionController::new(backend);
    let before = controller.simulation_params().clone();

    controller.request_inference().await.expect("recovered locally");
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(controller.simulation_params(), &before);
    assert!(log_lines(&controller)
        .contains(&"Parameter inference failed: model unavailable"));

    // Transport failure: same recovery.
    controller.request_inference().await.expect("recovered locally");
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(log_lines(&controller)
        .iter()
        .any(|l| l.starts_with("API Error during inference:")));
}

#[tokio::test]
async fn preview_populates_frames_and_resets_selector() {
    let frames: Vec<String> = (0..30).map(|i| format!("ZnJhbWUt{i}")).collect();
    let backend = MockBackend::default()
        .queue_preview(Some(PreviewResponse {
            status: ResponseStatus::Success,
            message: None,
            preview_data: Some(PreviewData {
                frames: frames.clone(),
            }),
        }))
        .queue_preview(Some(PreviewResponse {
            status: ResponseStatus::Error,
            message: Some("solver exploded".to_string()),
            preview_data: None,
        }));
    let mut controller = SessionController::new(backend);

    controller.request_preview(30).await.expect("preview ran");
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(controller.preview().frames().len(), 30);
    assert_eq!(controller.preview().selected_index(), 0);

    controller.select_preview_frame(29).expect("in range");
    assert_eq!(controller.preview().selected_index(), 29);
    assert!(controller.select_preview_frame(30).is_err());

    // A new preview clears the session before any frames arrive; this one
    // fails, so it stays empty with the selector back at 0.
    controller.request_preview(30).await.expect("recovered locally");
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(controller.preview().frames().is_empty());
    assert_eq!(controller.preview().selected_index(), 0);
    assert!(log_lines(&controller)
        .contains(&"Preview generation failed: solver exploded"));
}

#[tokio::test]
async fn preview_duration_is_bounded() {
    let mut controller = SessionController::new(MockBackend::default());

    let err = controller.request_preview(0).await.unwrap_err();
    assert!(matches!(err, ControlError::InvalidPreviewDuration { got: 0 }));

    let err = controller.request_preview(101).await.unwrap_err();
    assert!(matches!(err, ControlError::InvalidPreviewDuration { got: 101 }));

    // Rejected starts leave no trace.
    assert!(controller.run_state().log().is_empty());
    assert_eq!(controller.phase(), Phase::Idle);
}
