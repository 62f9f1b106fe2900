//! Fixed-cadence feeds whose URLs derive from the publish time (NOMADS RTMA).

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use grib2pf_common::{render_time_template, PfError, PfResult};

use crate::cursor::FeedCursor;
use crate::fetch::TextFetcher;
use crate::target::FetchTarget;

/// Publication schedule of a date-probe feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Every N minutes past midnight UTC
    Minutes(u32),
    /// Run hours within each UTC day (e.g. `[0, 6, 12, 18]`)
    DailyRuns(Vec<u32>),
}

impl Cadence {
    /// Latest boundary at or before `time`.
    pub fn floor(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let minute = match time.duration_trunc(ChronoDuration::minutes(1)) {
            Ok(t) => t,
            Err(_) => time,
        };

        match self {
            Cadence::Minutes(step) => {
                let step = (*step).max(1);
                let since_midnight = minute.hour() * 60 + minute.minute();
                let excess = since_midnight % step;
                minute - ChronoDuration::minutes(i64::from(excess))
            }
            Cadence::DailyRuns(runs) => {
                let hour_start = minute - ChronoDuration::minutes(i64::from(minute.minute()));
                let hour = hour_start.hour();

                if let Some(run) = runs.iter().copied().filter(|r| *r <= hour).max() {
                    return hour_start - ChronoDuration::hours(i64::from(hour - run));
                }

                match runs.iter().copied().filter(|r| *r < 24).max() {
                    Some(last) => {
                        let midnight = hour_start - ChronoDuration::hours(i64::from(hour));
                        midnight - ChronoDuration::hours(i64::from(24 - last))
                    }
                    None => hour_start,
                }
            }
        }
    }
}

pub struct DateProbeTracker {
    fetcher: Arc<dyn TextFetcher>,
    url_template: String,
    cadence: Cadence,
    latency: ChronoDuration,
}

impl DateProbeTracker {
    pub fn new(
        fetcher: Arc<dyn TextFetcher>,
        url_template: &str,
        cadence: Cadence,
        latency_minutes: i64,
    ) -> Self {
        Self {
            fetcher,
            url_template: url_template.to_string(),
            cadence,
            latency: ChronoDuration::minutes(latency_minutes),
        }
    }

    pub fn expected_publish_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.cadence.floor(now - self.latency)
    }

    pub fn expected_url(&self, now: DateTime<Utc>) -> PfResult<String> {
        render_time_template(&self.url_template, self.expected_publish_time(now))
    }

    #[instrument(skip(self, cursor))]
    pub async fn poll_at(
        &self,
        cursor: &mut FeedCursor,
        now: DateTime<Utc>,
    ) -> PfResult<Option<FetchTarget>> {
        let url = self.expected_url(now)?;

        if cursor.last_seen() == Some(url.as_str()) {
            debug!(url = %url, "Expected URL already processed");
            return Ok(None);
        }

        let Some((directory, filename)) = split_url(&url) else {
            return Err(PfError::InvalidTemplate(self.url_template.clone()));
        };

        let listing = match self.fetcher.fetch_text(directory).await {
            Ok(listing) => listing,
            Err(PfError::Status { status: 404, .. }) => {
                debug!(directory = %directory, "Directory not published yet");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !listing_contains(&listing, filename) {
            debug!(url = %url, "Expected file not published yet");
            return Ok(None);
        }

        if !cursor.advance(&url) {
            return Ok(None);
        }

        info!(url = %url, "New file published");
        Ok(Some(FetchTarget::new(url.clone(), url)))
    }
}

/// `(directory including trailing slash, file name)`.
fn split_url(url: &str) -> Option<(&str, &str)> {
    let idx = url.rfind('/')?;
    let filename = &url[idx + 1..];
    if filename.is_empty() {
        return None;
    }
    Some((&url[..=idx], filename))
}

/// Whether `filename` appears as a whole token in an HTML or plain directory listing.
fn listing_contains(listing: &str, filename: &str) -> bool {
    listing
        .split(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '/' | '='))
        .any(|token| token == filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_split_url() {
        let (dir, file) = split_url("https://host/a/b/file.grb2").unwrap();
        assert_eq!(dir, "https://host/a/b/");
        assert_eq!(file, "file.grb2");
        assert!(split_url("https://host/a/").is_none());
    }

    #[test]
    fn test_listing_token_match_is_exact() {
        let listing = r#"<a href="rtma2p5_ru.t2045z.2dvaranl_ndfd.grb2.idx">rtma2p5_ru.t2045z.2dvaranl_ndfd.grb2.idx</a>"#;
        assert!(!listing_contains(listing, "rtma2p5_ru.t2045z.2dvaranl_ndfd.grb2"));
        assert!(listing_contains(listing, "rtma2p5_ru.t2045z.2dvaranl_ndfd.grb2.idx"));
    }

    #[test]
    fn test_minutes_floor() {
        let cadence = Cadence::Minutes(15);
        let t = Utc.with_ymd_and_hms(2025, 6, 6, 20, 59, 31).unwrap();
        assert_eq!(cadence.floor(t), Utc.with_ymd_and_hms(2025, 6, 6, 20, 45, 0).unwrap());
    }

    #[test]
    fn test_daily_runs_floor() {
        let cadence = Cadence::DailyRuns(vec![0, 6, 12, 18]);
        let t = Utc.with_ymd_and_hms(2025, 6, 6, 13, 20, 0).unwrap();
        assert_eq!(cadence.floor(t), Utc.with_ymd_and_hms(2025, 6, 6, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_daily_runs_previous_day_fallback() {
        let cadence = Cadence::DailyRuns(vec![6, 18]);
        let t = Utc.with_ymd_and_hms(2025, 6, 6, 3, 0, 0).unwrap();
        assert_eq!(cadence.floor(t), Utc.with_ymd_and_hms(2025, 6, 5, 18, 0, 0).unwrap());
    }
}
