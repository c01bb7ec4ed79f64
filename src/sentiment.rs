use chrono::{DateTime, Duration, Utc};

use crate::models::{ConversationRecord, SentimentCounts, TimelineBucket};
use crate::window::{bucket_index, hourly_horizon_start, since};

pub const RECENT_BREAKDOWN_MINUTES: i64 = 60;

/// Hourly sentiment counts over the trailing `horizon_hours`, oldest bucket first.
/// Buckets count back from the hour boundary at or before `now`; the current partial hour
/// and future-dated records land in the newest bucket.
pub fn sentiment_timeline(
    records: &[ConversationRecord],
    now: DateTime<Utc>,
    horizon_hours: u32,
) -> Vec<TimelineBucket> {
    let start = hourly_horizon_start(now, horizon_hours);
    let mut buckets: Vec<TimelineBucket> = (0..horizon_hours)
        .map(|offset| {
            let bucket_start = start + Duration::hours(i64::from(offset));
            TimelineBucket {
                start: bucket_start,
                label: bucket_start.format("%Y-%m-%d %H:00 UTC").to_string(),
                counts: SentimentCounts::default(),
            }
        })
        .collect();

    for record in records {
        let Some(ts) = record.reference_time() else {
            continue;
        };
        if let Some(index) = bucket_index(ts, start, Duration::hours(1), buckets.len()) {
            buckets[index].counts.increment(record.sentiment);
        }
    }

    buckets
}

/// Point-in-time counts for the last hour, independent of the selected window.
pub fn recent_sentiment_breakdown(
    records: &[ConversationRecord],
    now: DateTime<Utc>,
) -> SentimentCounts {
    let mut counts = SentimentCounts::default();
    for record in since(records, now - Duration::minutes(RECENT_BREAKDOWN_MINUTES)) {
        counts.increment(record.sentiment);
    }
    counts
}
