//! Out-of-process render engine.
//!
//! The engine decodes GRIB data, reprojects it and writes images. It is
//! driven by one JSON [`RenderRequest`] on stdin and answers with one JSON
//! [`RenderResponse`] on stdout.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use grib2pf_common::{ImageArea, PfError, PfResult, RenderMode};
use palette::PaletteTable;

/// Upstream data the engine should decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderSource {
    Grib { url: String },
    /// Precipitation-flag grid selecting the palette for each reflectivity cell
    TypedReflectivity { type_url: String, refl_url: String },
}

/// One message of the payload rendered to one image or four quadrants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    /// Byte offset of the message; 0 for single-message payloads
    pub offset: u64,
    pub palette: Arc<PaletteTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snow_palette: Option<Arc<PaletteTable>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hail_palette: Option<Arc<PaletteTable>>,
    pub width: u32,
    pub height: u32,
    pub mode: RenderMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub contour: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<ImageArea>,
    /// One path, or four in top-left, top-right, bottom-left, bottom-right order
    pub images: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub feed: String,
    pub job_id: u64,
    pub source: RenderSource,
    pub gzipped: bool,
    pub timeout_secs: u64,
    pub messages: Vec<MessageRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderResponse {
    /// 0 on success
    pub error: i32,
    /// Per message, the area covered by each of its images
    #[serde(default)]
    pub areas: Vec<Vec<ImageArea>>,
}

impl RenderResponse {
    pub fn success(areas: Vec<Vec<ImageArea>>) -> Self {
        Self { error: 0, areas }
    }

    /// Reject error codes and area lists that do not line up with the request.
    pub fn check(&self, request: &RenderRequest) -> PfResult<()> {
        if self.error != 0 {
            return Err(PfError::RenderFailed(self.error));
        }
        if self.areas.len() != request.messages.len() {
            return Err(PfError::RenderEngine(format!(
                "expected areas for {} messages, got {}",
                request.messages.len(),
                self.areas.len()
            )));
        }
        for (i, (areas, message)) in self.areas.iter().zip(&request.messages).enumerate() {
            if areas.len() != message.images.len() {
                return Err(PfError::RenderEngine(format!(
                    "message {} has {} images but {} areas",
                    i,
                    message.images.len(),
                    areas.len()
                )));
            }
        }
        Ok(())
    }
}

/// Produces images for a request.
///
/// Implementations return [`PfError::Superseded`] once `cancel` fires, and
/// only after all of their work has stopped.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn render(
        &self,
        request: &RenderRequest,
        cancel: CancellationToken,
    ) -> PfResult<RenderResponse>;
}

/// Runs an engine executable per request.
pub struct ProcessRenderEngine {
    command: PathBuf,
    args: Vec<String>,
    job_timeout: Duration,
}

impl ProcessRenderEngine {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            job_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Upper bound on one engine run before the child is killed.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

enum RunEnd {
    Finished(PfResult<(std::process::ExitStatus, Vec<u8>)>),
    Cancelled,
    TimedOut,
}

#[async_trait]
impl RenderEngine for ProcessRenderEngine {
    #[instrument(skip(self, request, cancel), fields(feed = %request.feed, job = request.job_id))]
    async fn render(
        &self,
        request: &RenderRequest,
        cancel: CancellationToken,
    ) -> PfResult<RenderResponse> {
        let payload = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PfError::RenderEngine(format!(
                    "failed to start {}: {}",
                    self.command.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PfError::RenderEngine("engine stdin unavailable".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| PfError::RenderEngine("engine stdout unavailable".to_string()))?;

        let end = {
            let run = async {
                stdin.write_all(&payload).await?;
                drop(stdin);

                let mut output = Vec::new();
                stdout.read_to_end(&mut output).await?;
                let status = child.wait().await?;
                Ok::<_, PfError>((status, output))
            };

            tokio::select! {
                _ = cancel.cancelled() => RunEnd::Cancelled,
                _ = tokio::time::sleep(self.job_timeout) => RunEnd::TimedOut,
                result = run => RunEnd::Finished(result),
            }
        };

        let (status, output) = match end {
            RunEnd::Finished(result) => result?,
            RunEnd::Cancelled => {
                // kill() also reaps the child
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill superseded render engine");
                }
                debug!("Render engine stopped for newer data");
                return Err(PfError::Superseded);
            }
            RunEnd::TimedOut => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill stalled render engine");
                }
                return Err(PfError::Timeout(self.job_timeout.as_secs()));
            }
        };

        if !status.success() {
            return Err(PfError::RenderFailed(status.code().unwrap_or(-1)));
        }

        let response: RenderResponse = serde_json::from_slice(&output)?;
        response.check(request)?;
        Ok(response)
    }
}
