use std::fmt;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;

use crate::models::ConversationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
pub enum Window {
    #[serde(rename = "24h")]
    #[value(name = "24h")]
    Hours24,
    #[serde(rename = "7d")]
    #[value(name = "7d")]
    Days7,
    #[serde(rename = "30d")]
    #[value(name = "30d")]
    Days30,
}

impl Window {
    /// Canonical display order.
    pub const ALL: [Window; 3] = [Window::Hours24, Window::Days7, Window::Days30];

    pub fn hours(self) -> u32 {
        match self {
            Window::Hours24 => 24,
            Window::Days7 => 168,
            Window::Days30 => 720,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::hours(i64::from(self.hours()))
    }

    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }

    pub fn label(self) -> &'static str {
        match self {
            Window::Hours24 => "24h",
            Window::Days7 => "7d",
            Window::Days30 => "30d",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowValue<T> {
    pub window: Window,
    pub value: T,
}

/// Records whose reference timestamp is at or after `now - window`.
/// Only the lower bound is enforced; records dated after `now` are kept.
pub fn filter_by_window(
    records: &[ConversationRecord],
    window: Window,
    now: DateTime<Utc>,
) -> Vec<&ConversationRecord> {
    since(records, window.cutoff(now))
}

pub fn since(records: &[ConversationRecord], cutoff: DateTime<Utc>) -> Vec<&ConversationRecord> {
    records
        .iter()
        .filter(|record| record.reference_time().is_some_and(|ts| ts >= cutoff))
        .collect()
}

/// Runs a single-window aggregator for 24h, 7d and 30d, in that order.
pub fn build_series<T, F>(mut aggregate: F) -> Vec<WindowValue<T>>
where
    F: FnMut(Window) -> T,
{
    Window::ALL
        .into_iter()
        .map(|window| WindowValue {
            window,
            value: aggregate(window),
        })
        .collect()
}

pub fn floor_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::hours(1)).unwrap_or(ts)
}

/// `hours` before `ts`, saturating at the earliest representable instant.
pub fn hours_before(ts: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    ts.checked_sub_signed(Duration::hours(i64::from(hours)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Start of the oldest of `hours` hourly buckets counted back from the hour boundary at or
/// before `now`. Records in the current partial hour clamp into the newest bucket.
pub fn hourly_horizon_start(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    hours_before(floor_to_hour(now), hours)
}

/// Bucket for `ts` in a run of `buckets` equal-width buckets beginning at `start`.
/// `None` before `start`; anything past the end lands in the last bucket.
pub fn bucket_index(
    ts: DateTime<Utc>,
    start: DateTime<Utc>,
    width: Duration,
    buckets: usize,
) -> Option<usize> {
    if ts < start || buckets == 0 {
        return None;
    }
    let width_secs = width.num_seconds().max(1);
    let offset = (ts - start).num_seconds() / width_secs;
    let index = usize::try_from(offset).unwrap_or(usize::MAX);
    Some(index.min(buckets - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_row;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap()
    }

    fn record(key: &str, hours_ago: Option<i64>) -> ConversationRecord {
        let mut raw = crate::models::RawRow::new();
        raw.insert("issue_key".into(), json!(key));
        if let Some(hours) = hours_ago {
            let ts = now() - Duration::hours(hours);
            raw.insert("conversation_end".into(), json!(ts.to_rfc3339()));
        }
        normalize_row(&raw)
    }

    fn keys(records: &[&ConversationRecord]) -> Vec<String> {
        records.iter().map(|record| record.issue_key.clone()).collect()
    }

    #[test]
    fn window_durations() {
        assert_eq!(Window::Hours24.duration(), Duration::hours(24));
        assert_eq!(Window::Days7.duration(), Duration::hours(168));
        assert_eq!(Window::Days30.duration(), Duration::hours(720));
    }

    #[test]
    fn filters_by_lower_bound_only() {
        let records = vec![
            record("recent", Some(2)),
            record("edge", Some(24)),
            record("week", Some(100)),
            record("old", Some(1000)),
            record("future", Some(-5)),
            record("undated", None),
        ];

        let day = filter_by_window(&records, Window::Hours24, now());
        assert_eq!(keys(&day), vec!["recent", "edge", "future"]);

        let week = filter_by_window(&records, Window::Days7, now());
        assert_eq!(keys(&week), vec!["recent", "edge", "week", "future"]);

        let month = filter_by_window(&records, Window::Days30, now());
        for window in [Window::Hours24, Window::Days7] {
            for item in filter_by_window(&records, window, now()) {
                assert!(month.iter().any(|other| other.issue_key == item.issue_key));
            }
        }
    }

    #[test]
    fn falls_back_to_start_timestamp() {
        let mut raw = crate::models::RawRow::new();
        raw.insert("issue_key".into(), json!("start-only"));
        raw.insert(
            "conversation_start".into(),
            json!((now() - Duration::hours(1)).to_rfc3339()),
        );
        let records = vec![normalize_row(&raw)];
        assert_eq!(filter_by_window(&records, Window::Hours24, now()).len(), 1);
    }

    #[test]
    fn series_preserves_canonical_order() {
        let series = build_series(|window| window.hours());
        let windows: Vec<Window> = series.iter().map(|point| point.window).collect();
        assert_eq!(windows, Window::ALL.to_vec());
        assert_eq!(series[2].value, 720);
    }

    #[test]
    fn bucket_index_clamps_late_values() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let hour = Duration::hours(1);
        assert_eq!(bucket_index(start - hour, start, hour, 3), None);
        assert_eq!(bucket_index(start, start, hour, 3), Some(0));
        assert_eq!(bucket_index(start + Duration::minutes(90), start, hour, 3), Some(1));
        assert_eq!(bucket_index(start + Duration::hours(10), start, hour, 3), Some(2));
    }

    #[test]
    fn horizon_aligns_to_hour() {
        assert_eq!(
            hourly_horizon_start(now(), 24),
            Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap()
        );
        // the horizon never starts after the matching window cutoff
        for window in Window::ALL {
            assert!(hourly_horizon_start(now(), window.hours()) <= window.cutoff(now()));
        }
    }

    #[test]
    fn hours_before_saturates() {
        assert_eq!(hours_before(now(), 2), now() - Duration::hours(2));
        assert_eq!(hours_before(now(), u32::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
