//! Polling loop for one feed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use freshness::{
    CursorListingTracker, DateProbeTracker, FeedCursor, FetchTarget, FreshnessTracker,
    IndexOffsetTracker, KeyShape, ObjectLister, S3Lister, TextFetcher,
};

use crate::composite::CompositeGate;
use crate::config::{FeedConfig, SourceConfig};
use crate::engine::{RenderEngine, RenderSource};
use crate::metrics;
use crate::plan::FeedPlan;
use crate::supervisor::{FeedSupervisor, JobOutcome};

/// How the inputs of a feed combine into one render source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// One input, rendered directly
    Single,
    /// Precipitation flag (input 0) plus reflectivity (input 1)
    TypedReflectivity,
}

impl SourceShape {
    fn render_source(&self, targets: &[FetchTarget]) -> Option<(RenderSource, BTreeMap<String, u64>)> {
        match (self, targets) {
            (SourceShape::Single, [target]) => Some((
                RenderSource::Grib {
                    url: target.url.clone(),
                },
                target.offsets.clone(),
            )),
            (SourceShape::TypedReflectivity, [flag, refl]) => Some((
                RenderSource::TypedReflectivity {
                    type_url: flag.url.clone(),
                    refl_url: refl.url.clone(),
                },
                BTreeMap::new(),
            )),
            _ => None,
        }
    }
}

/// One upstream input with its own tracker and cursor.
pub struct FeedInput {
    pub name: String,
    pub tracker: FreshnessTracker,
    pub cursor: FeedCursor,
}

impl FeedInput {
    pub fn new(name: &str, tracker: FreshnessTracker, interval: Duration) -> Self {
        let cursor = tracker.new_cursor(interval);
        Self {
            name: name.to_string(),
            tracker,
            cursor,
        }
    }
}

pub struct FeedRunner {
    id: String,
    inputs: Vec<FeedInput>,
    gate: CompositeGate,
    shape: SourceShape,
    supervisor: FeedSupervisor,
    poll_interval: Duration,
    timeout: Duration,
}

impl FeedRunner {
    pub fn new(
        plan: FeedPlan,
        inputs: Vec<FeedInput>,
        shape: SourceShape,
        engine: Arc<dyn RenderEngine>,
    ) -> Self {
        Self {
            id: plan.id.clone(),
            gate: CompositeGate::new(inputs.len()),
            inputs,
            shape,
            poll_interval: plan.poll_interval,
            timeout: plan.timeout,
            supervisor: FeedSupervisor::new(Arc::new(plan), engine),
        }
    }

    /// Build a runner from configuration, loading color tables and
    /// creating the upstream clients.
    pub async fn from_config(
        config: &FeedConfig,
        engine: Arc<dyn RenderEngine>,
        fetcher: Arc<dyn TextFetcher>,
    ) -> Result<Self> {
        let plan = FeedPlan::from_config(config)?;
        let (inputs, shape) = build_inputs(config, fetcher, plan.poll_interval).await;
        Ok(Self::new(plan, inputs, shape, engine))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn inputs(&self) -> &[FeedInput] {
        &self.inputs
    }

    pub fn supervisor(&self) -> &FeedSupervisor {
        &self.supervisor
    }

    /// Poll every input once and launch a generation when the feed is ready.
    ///
    /// Returns the id of the launched job.
    #[instrument(skip(self), fields(feed = %self.id))]
    pub async fn poll_once(&mut self) -> Option<u64> {
        for (index, input) in self.inputs.iter_mut().enumerate() {
            metrics::record_poll(&self.id);

            match input.tracker.poll(&mut input.cursor, self.timeout).await {
                Ok(Some(target)) => {
                    debug!(input = %input.name, url = %target.url, "Input changed");
                    self.gate.record(index, target);
                }
                Ok(None) => {}
                Err(e) => {
                    metrics::record_poll_failure(&self.id);
                    if e.is_transient() {
                        warn!(input = %input.name, error = %e, "Freshness check failed, retrying next poll");
                    } else {
                        error!(input = %input.name, error = %e, "Freshness check failed");
                    }
                }
            }
        }

        let targets = self.gate.take_ready()?;
        let Some((source, offsets)) = self.shape.render_source(&targets) else {
            error!(inputs = targets.len(), "Inputs do not match the feed's source shape");
            return None;
        };

        let (job_id, previous) = self.supervisor.submit(source, offsets).await;
        if let Some(JobOutcome { job_id: old, status }) = previous {
            debug!(job = old, status = status.as_str(), "Previous generation finished");
        }
        Some(job_id)
    }

    /// Poll until `shutdown` fires, then stop the running generation.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            feed = %self.id,
            inputs = self.inputs.len(),
            interval_secs = self.poll_interval.as_secs(),
            "Feed started"
        );

        loop {
            self.poll_once().await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        if let Some(outcome) = self.supervisor.cancel_current().await {
            debug!(feed = %self.id, job = outcome.job_id, status = outcome.status.as_str(), "Last generation stopped");
        }
        info!(feed = %self.id, "Feed stopped");
    }

    /// Poll once and wait for any generation it started.
    pub async fn run_once(&mut self) -> Option<JobOutcome> {
        self.poll_once().await;
        let outcome = self.supervisor.wait_current().await;
        match &outcome {
            Some(outcome) => info!(
                feed = %self.id,
                job = outcome.job_id,
                status = outcome.status.as_str(),
                "Single run finished"
            ),
            None => info!(feed = %self.id, "No new data"),
        }
        outcome
    }
}

async fn s3_lister(region: &str) -> Arc<dyn ObjectLister> {
    Arc::new(S3Lister::anonymous(region).await)
}

fn single(
    name: &str,
    tracker: FreshnessTracker,
    interval: Duration,
) -> (Vec<FeedInput>, SourceShape) {
    (vec![FeedInput::new(name, tracker, interval)], SourceShape::Single)
}

async fn build_inputs(
    config: &FeedConfig,
    fetcher: Arc<dyn TextFetcher>,
    interval: Duration,
) -> (Vec<FeedInput>, SourceShape) {
    match &config.source {
        SourceConfig::CursorListing {
            bucket,
            product,
            region,
        } => {
            let lister = s3_lister(region).await;
            single(
                product,
                FreshnessTracker::CursorListing(CursorListingTracker::new(lister, bucket, product)),
                interval,
            )
        }
        SourceConfig::IndexOffset {
            bucket,
            prefix_template,
            file_token,
            extension,
            index_suffix,
            lookback_hours,
            region,
        } => {
            let lister = s3_lister(region).await;
            let tracker = IndexOffsetTracker::new(
                lister,
                fetcher,
                bucket,
                prefix_template,
                KeyShape::new(file_token).with_extension(extension),
                config.products(),
            )
            .with_lookback_hours(*lookback_hours)
            .with_index_suffix(index_suffix);
            single(prefix_template, FreshnessTracker::IndexOffset(tracker), interval)
        }
        SourceConfig::DateProbe {
            url_template,
            cadence,
            latency_minutes,
        } => {
            let tracker =
                DateProbeTracker::new(fetcher, url_template, cadence.clone(), *latency_minutes);
            single(url_template, FreshnessTracker::DateProbe(tracker), interval)
        }
        SourceConfig::Periodic { url } => {
            single(url, FreshnessTracker::Periodic { url: url.clone() }, interval)
        }
        SourceConfig::TypedReflectivity {
            bucket,
            type_product,
            refl_product,
            region,
            ..
        } => {
            let lister = s3_lister(region).await;
            let inputs = vec![
                FeedInput::new(
                    type_product,
                    FreshnessTracker::CursorListing(CursorListingTracker::new(
                        lister.clone(),
                        bucket,
                        type_product,
                    )),
                    interval,
                ),
                FeedInput::new(
                    refl_product,
                    FreshnessTracker::CursorListing(CursorListingTracker::new(
                        lister,
                        bucket,
                        refl_product,
                    )),
                    interval,
                ),
            ];
            (inputs, SourceShape::TypedReflectivity)
        }
    }
}
