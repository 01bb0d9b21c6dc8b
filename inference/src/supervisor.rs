//! Launches the external model server and supervises its startup.
//!
//! The server's readiness is only observable through its log text, not a
//! health port: a reader drains stderr, re-emits every chunk for diagnostic
//! visibility, and scans for a fixed marker. A bounded wait turns a hung
//! startup into a reported error instead of an indefinite block.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use types::config::PredictConfig;
use types::error::{InferenceError, InferenceResult};
use url::Url;

/// Lifecycle of one model server process.
///
/// `NotStarted → Starting → Ready → Terminated`, with `Starting → Failed`
/// on timeout or early process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Ready,
    Failed,
    Terminated,
}

/// Brings up an inference endpoint for a staged model.
#[async_trait]
pub trait ModelServer: Send + Sync + 'static {
    async fn start(&self, model_base_path: &Path) -> InferenceResult<ServerHandle>;
}

/// A running inference endpoint, usually backed by a child process.
///
/// Dropping the handle kills the child, so no process outlives the request
/// that started it regardless of exit path.
#[derive(Debug)]
pub struct ServerHandle {
    endpoint: Url,
    child: Option<Child>,
    state: ServerState,
}

impl ServerHandle {
    /// Handle for an endpoint nobody supervises (tests, external servers).
    pub fn detached(endpoint: Url) -> Self {
        Self { endpoint, child: None, state: ServerState::Ready }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Kill the child and reap it.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!("failed to kill model server: {e}");
            }
        }
        self.state = ServerState::Terminated;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(child) = &mut self.child {
            let _ = child.start_kill();
        }
    }
}

/// Supervisor for `tensorflow_model_server`.
pub struct TensorflowServer {
    config: PredictConfig,
}

impl TensorflowServer {
    pub fn new(config: PredictConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelServer for TensorflowServer {
    async fn start(&self, model_base_path: &Path) -> InferenceResult<ServerHandle> {
        let config = &self.config;
        let mut child = Command::new(&config.server_binary)
            .arg(format!("--port={}", config.grpc_port))
            .arg(format!("--rest_api_port={}", config.rest_port))
            .arg(format!("--model_name={}", config.model_name))
            .arg(format!("--model_base_path={}", model_base_path.display()))
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                InferenceError::Process(format!("failed to launch {}: {e}", config.server_binary))
            })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            InferenceError::Process("model server stderr was not captured".to_string())
        })?;

        let endpoint = Url::parse(&config.predict_url())
            .map_err(|e| InferenceError::Process(e.to_string()))?;
        let mut handle =
            ServerHandle { endpoint, child: Some(child), state: ServerState::Starting };

        match wait_for_ready(stderr, &config.readiness_marker, config.startup_timeout).await {
            Ok(log) => {
                handle.state = ServerState::Ready;
                forward_log(log);
                tracing::info!("model server ready");
                Ok(handle)
            }
            Err(e) => {
                handle.state = ServerState::Failed;
                if let Some(mut child) = handle.child.take() {
                    let _ = child.kill().await;
                }
                Err(e)
            }
        }
    }
}

/// Wait for the readiness marker, bounded by `timeout`. Returns the log
/// stream back so the caller can keep forwarding it.
async fn wait_for_ready<R>(mut log: R, marker: &str, timeout: Duration) -> InferenceResult<R>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, scan_for_marker(&mut log, marker)).await {
        Ok(Ok(())) => Ok(log),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(InferenceError::StartupTimeout(timeout)),
    }
}

/// Read the log chunk by chunk, re-emitting each one, until the marker shows
/// up. The scan runs over the accumulated text so a marker split across two
/// reads still matches.
async fn scan_for_marker<R>(log: &mut R, marker: &str) -> InferenceResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    let mut seen = Vec::new();
    loop {
        let n = log.read(&mut buf).await.map_err(|e| {
            InferenceError::Process(format!("failed to read model server log: {e}"))
        })?;
        if n == 0 {
            return Err(InferenceError::Process(
                "model server closed its log stream before becoming ready".to_string(),
            ));
        }
        let chunk = &buf[..n];
        tracing::info!(target: "model_server", "{}", String::from_utf8_lossy(chunk).trim_end());
        seen.extend_from_slice(chunk);
        if String::from_utf8_lossy(&seen).contains(marker) {
            return Ok(());
        }
    }
}

/// Keep draining the log after readiness so the server's output stays
/// visible for the request's lifetime.
fn forward_log<R>(log: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(log).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!(target: "model_server", "{line}");
        }
    });
}
