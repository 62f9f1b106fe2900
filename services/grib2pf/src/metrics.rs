//! Prometheus counters, labelled by feed.

use metrics::counter;

use crate::supervisor::JobStatus;

pub fn record_poll(feed: &str) {
    counter!("grib2pf_polls_total", "feed" => feed.to_string()).increment(1);
}

pub fn record_poll_failure(feed: &str) {
    counter!("grib2pf_poll_failures_total", "feed" => feed.to_string()).increment(1);
}

pub fn record_generation_started(feed: &str) {
    counter!("grib2pf_generations_started_total", "feed" => feed.to_string()).increment(1);
}

pub fn record_generation_finished(feed: &str, status: JobStatus) {
    let feed = feed.to_string();
    match status {
        JobStatus::Succeeded => {
            counter!("grib2pf_generations_succeeded_total", "feed" => feed).increment(1)
        }
        JobStatus::Failed => {
            counter!("grib2pf_generations_failed_total", "feed" => feed).increment(1)
        }
        JobStatus::Superseded => {
            counter!("grib2pf_generations_superseded_total", "feed" => feed).increment(1)
        }
        JobStatus::Running => {}
    }
}
