use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use stokes_protocol::{
    InferRequest, InferResponse, PreviewRequest, PreviewResponse, RunAck, RunRequest, StopAck,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request failed: status={status} body={body}")]
    BadStatus { status: StatusCode, body: String },
    #[error("response parse failed: {0}")]
    Parse(String),
}

/// The RPC collaborator boundary. The real service answers over HTTP;
/// tests substitute a scripted implementation.
#[allow(async_fn_in_trait)]
pub trait PipelineBackend {
    async fn infer_params(&self, req: &InferRequest) -> Result<InferResponse, BackendError>;
    async fn run_pipeline(&self, req: &RunRequest) -> Result<RunAck, BackendError>;
    async fn stop_pipeline(&self) -> Result<StopAck, BackendError>;
    async fn run_preview(&self, req: &PreviewRequest) -> Result<PreviewResponse, BackendError>;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
// Preview renders its frames synchronously server-side.
const PREVIEW_TIMEOUT: Duration = Duration::from_secs(300);

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B, timeout: Duration) -> Result<T, BackendError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self.client.post(&url).timeout(timeout).json(body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::BadStatus { status, body });
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| BackendError::Parse(format!("{e}: {body}")))
    }
}

impl PipelineBackend for HttpBackend {
    async fn infer_params(&self, req: &InferRequest) -> Result<InferResponse, BackendError> {
        self.post_json("get_llm_inferred_params", req, REQUEST_TIMEOUT).await
    }

    async fn run_pipeline(&self, req: &RunRequest) -> Result<RunAck, BackendError> {
        self.post_json("run_pipeline", req, REQUEST_TIMEOUT).await
    }

    async fn stop_pipeline(&self) -> Result<StopAck, BackendError> {
        self.post_json("stop_pipeline", &serde_json::json!({}), REQUEST_TIMEOUT).await
    }

    async fn run_preview(&self, req: &PreviewRequest) -> Result<PreviewResponse, BackendError> {
        self.post_json("run_preview", req, PREVIEW_TIMEOUT).await
    }
}
