//! Shared fakes for service tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use grib2pf::{RenderEngine, RenderRequest, RenderResponse};
use grib2pf_common::{ImageArea, PfError, PfResult};

/// Engine event, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(u64),
    Cancelled(u64),
    Wrote(u64),
}

/// Writes `job{id}` into every requested image.
///
/// Jobs listed in `slow` block until cancelled; jobs listed in `failing`
/// report an engine error without writing anything.
pub struct FakeEngine {
    pub slow: Vec<u64>,
    pub failing: Vec<u64>,
    /// Area reported for every image, in the 0..360 longitude convention
    pub area: ImageArea,
    pub events: Mutex<Vec<Event>>,
    pub requests: Mutex<Vec<RenderRequest>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            slow: Vec::new(),
            failing: Vec::new(),
            area: ImageArea::new(54.9951, 20.0049, 230.0049, 299.9951),
            events: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_slow(mut self, jobs: &[u64]) -> Self {
        self.slow = jobs.to_vec();
        self
    }

    pub fn with_failing(mut self, jobs: &[u64]) -> Self {
        self.failing = jobs.to_vec();
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn render(
        &self,
        request: &RenderRequest,
        cancel: CancellationToken,
    ) -> PfResult<RenderResponse> {
        let job = request.job_id;
        self.push(Event::Started(job));
        self.requests.lock().unwrap().push(request.clone());

        let delay = if self.slow.contains(&job) {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(10)
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                self.push(Event::Cancelled(job));
                return Err(PfError::Superseded);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if self.failing.contains(&job) {
            return Err(PfError::RenderFailed(2));
        }

        let mut areas = Vec::new();
        for message in &request.messages {
            for image in &message.images {
                tokio::fs::write(image, format!("job{}", job)).await?;
            }
            areas.push(vec![self.area; message.images.len()]);
        }
        self.push(Event::Wrote(job));

        Ok(RenderResponse::success(areas))
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

/// Names of every entry in `dir`, sorted.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
