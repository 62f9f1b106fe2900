//! Per-feed generation job slot.
//!
//! A feed has at most one generation running. Submitting a new one cancels
//! the running job and waits for it to stop completely before the new job
//! is spawned, so output from older data can never land after output from
//! newer data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use grib2pf_common::{ImageArea, PfError, PfResult};
use placefile::{write_atomic, Placefile, PlacefileImage};

use crate::engine::{MessageRequest, RenderEngine, RenderRequest, RenderSource};
use crate::metrics;
use crate::plan::{FeedPlan, OutputPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    Superseded,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Superseded => "superseded",
        }
    }
}

/// Final status of a job that has left the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: u64,
    pub status: JobStatus,
}

struct RunningJob {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<JobStatus>,
}

pub struct FeedSupervisor {
    plan: Arc<FeedPlan>,
    engine: Arc<dyn RenderEngine>,
    next_job_id: u64,
    current: Option<RunningJob>,
}

impl FeedSupervisor {
    pub fn new(plan: Arc<FeedPlan>, engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            plan,
            engine,
            next_job_id: 1,
            current: None,
        }
    }

    pub fn plan(&self) -> &FeedPlan {
        &self.plan
    }

    pub fn current_status(&self) -> Option<JobStatus> {
        self.current
            .as_ref()
            .filter(|job| !job.handle.is_finished())
            .map(|_| JobStatus::Running)
    }

    pub fn current_job_id(&self) -> Option<u64> {
        self.current.as_ref().map(|job| job.id)
    }

    /// Start a generation, superseding the running one.
    ///
    /// Returns the new job id and the outcome of the job it replaced.
    #[instrument(skip_all, fields(feed = %self.plan.id))]
    pub async fn submit(
        &mut self,
        source: RenderSource,
        offsets: BTreeMap<String, u64>,
    ) -> (u64, Option<JobOutcome>) {
        let previous = self.cancel_current().await;

        let id = self.next_job_id;
        self.next_job_id += 1;

        let job = Job {
            id,
            plan: self.plan.clone(),
            engine: self.engine.clone(),
            source,
            offsets,
        };
        let cancel = CancellationToken::new();

        info!(job = id, source = ?job.source, "Starting generation");
        metrics::record_generation_started(&self.plan.id);

        let handle = tokio::spawn(job.run(cancel.clone()));
        self.current = Some(RunningJob { id, cancel, handle });

        (id, previous)
    }

    /// Wait for the running job to finish on its own.
    pub async fn wait_current(&mut self) -> Option<JobOutcome> {
        let job = self.current.take()?;
        Some(self.collect(job).await)
    }

    /// Cancel the running job, if any, and wait until it has stopped.
    pub async fn cancel_current(&mut self) -> Option<JobOutcome> {
        let job = self.current.take()?;
        if !job.handle.is_finished() {
            debug!(feed = %self.plan.id, job = job.id, "Cancelling running generation");
            job.cancel.cancel();
        }
        Some(self.collect(job).await)
    }

    async fn collect(&self, job: RunningJob) -> JobOutcome {
        let status = match job.handle.await {
            Ok(status) => status,
            Err(e) => {
                error!(feed = %self.plan.id, job = job.id, error = %e, "Generation task aborted");
                metrics::record_generation_finished(&self.plan.id, JobStatus::Failed);
                JobStatus::Failed
            }
        };
        JobOutcome {
            job_id: job.id,
            status,
        }
    }
}

/// One generation attempt.
struct Job {
    id: u64,
    plan: Arc<FeedPlan>,
    engine: Arc<dyn RenderEngine>,
    source: RenderSource,
    offsets: BTreeMap<String, u64>,
}

/// Engine output path and the published path it is renamed to.
struct Staged {
    temp: PathBuf,
    target: PathBuf,
}

impl Job {
    async fn run(self, cancel: CancellationToken) -> JobStatus {
        let started = Instant::now();

        let status = match self.generate(&cancel).await {
            Ok(()) => {
                info!(
                    feed = %self.plan.id,
                    job = self.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Generation complete"
                );
                JobStatus::Succeeded
            }
            Err(PfError::Superseded) => {
                info!(feed = %self.plan.id, job = self.id, "Generation superseded");
                JobStatus::Superseded
            }
            Err(e) => {
                error!(feed = %self.plan.id, job = self.id, error = %e, "Generation failed");
                JobStatus::Failed
            }
        };

        metrics::record_generation_finished(&self.plan.id, status);
        status
    }

    async fn generate(&self, cancel: &CancellationToken) -> PfResult<()> {
        let staged: Vec<Vec<Staged>> = self
            .plan
            .outputs
            .iter()
            .map(|output| {
                output
                    .image_paths()
                    .into_iter()
                    .map(|target| Staged {
                        temp: staging_path(&target, self.id),
                        target,
                    })
                    .collect()
            })
            .collect();

        for set in &staged {
            for file in set {
                if let Some(parent) = file.target.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let request = RenderRequest {
            feed: self.plan.id.clone(),
            job_id: self.id,
            source: self.source.clone(),
            gzipped: self.plan.gzipped,
            timeout_secs: self.plan.timeout.as_secs(),
            messages: self
                .plan
                .outputs
                .iter()
                .zip(&staged)
                .map(|(output, set)| self.message(output, set))
                .collect(),
        };

        let response = match self.engine.render(&request, cancel.clone()).await {
            Ok(response) => response,
            Err(e) => {
                discard(&staged).await;
                return Err(e);
            }
        };

        if cancel.is_cancelled() {
            discard(&staged).await;
            return Err(PfError::Superseded);
        }

        if let Err(e) = self.publish(&staged, &response.areas).await {
            discard(&staged).await;
            return Err(e);
        }

        Ok(())
    }

    /// Move every staged image into place, then write the placefiles.
    ///
    /// All staged images are checked before the first rename, and every
    /// image is renamed before any placefile is written.
    async fn publish(&self, staged: &[Vec<Staged>], areas: &[Vec<ImageArea>]) -> PfResult<()> {
        for file in staged.iter().flatten() {
            tokio::fs::metadata(&file.temp).await.map_err(|e| {
                PfError::RenderEngine(format!("missing image {}: {}", file.temp.display(), e))
            })?;
            if let Ok(meta) = tokio::fs::metadata(&file.target).await {
                if meta.is_dir() {
                    return Err(PfError::Io(format!(
                        "{} is a directory",
                        file.target.display()
                    )));
                }
            }
        }

        for file in staged.iter().flatten() {
            tokio::fs::rename(&file.temp, &file.target).await?;
        }

        for (output, areas) in self.plan.outputs.iter().zip(areas) {
            let mut placefile = Placefile::new(output.title.clone(), self.plan.refresh_secs)
                .with_threshold(self.plan.threshold);
            for (image_ref, area) in output.image_refs().into_iter().zip(areas) {
                placefile = placefile.with_image(PlacefileImage::new(image_ref, area.normalized()));
            }

            write_atomic(&placefile, &output.place_file).map_err(|e| PfError::Io(e.to_string()))?;
            debug!(
                feed = %self.plan.id,
                place_file = %output.place_file.display(),
                "Outputs published"
            );
        }

        Ok(())
    }

    fn message(&self, output: &OutputPlan, staged: &[Staged]) -> MessageRequest {
        MessageRequest {
            offset: output
                .product
                .as_deref()
                .and_then(|p| self.offsets.get(p).copied())
                .unwrap_or(0),
            palette: output.palette.clone(),
            snow_palette: output.snow_palette.clone(),
            hail_palette: output.hail_palette.clone(),
            width: output.width,
            height: output.height,
            mode: output.mode,
            minimum: output.minimum,
            contour: output.contour,
            area: output.area,
            images: staged.iter().map(|s| s.temp.clone()).collect(),
        }
    }
}

/// Hidden per-job sibling of `target`, keeping its extension.
pub fn staging_path(target: &Path, job_id: u64) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".job{}-{}", job_id, name))
}

async fn discard(staged: &[Vec<Staged>]) {
    for file in staged.iter().flatten() {
        match tokio::fs::remove_file(&file.temp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %file.temp.display(), error = %e, "Failed to remove staged image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("/srv/pf/mrms_top_left.png"), 7),
            PathBuf::from("/srv/pf/.job7-mrms_top_left.png")
        );
    }
}
