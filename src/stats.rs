//! Rolling rate, per-topic counters, latency window, top-N topics (§4.4).
//!
//! Mutated only by the dispatch worker; read accessors return owned
//! snapshots so command handlers never hold a lock across `.await`.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

const TRUNCATION_SUFFIX: &str = "...";

/// A point-in-time copy of the counters, safe to print or serialize without
/// holding the collector's lock.
#[derive(Clone, Debug, Default)]
pub struct StatsSnapshot {
    pub total_messages: u64,
    pub dropped_overflow: u64,
    pub rate_per_second: f64,
    pub top_topics: Vec<(String, u64)>,
    pub latency: LatencySnapshot,
}

#[derive(Clone, Debug, Default)]
pub struct LatencySnapshot {
    pub count: usize,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    pub avg: Option<Duration>,
    pub p95: Option<Duration>,
    pub p99: Option<Duration>,
}

pub struct StatisticsCollector {
    total_messages: u64,
    dropped_overflow: u64,
    per_topic: HashMap<String, u64>,
    arrivals: VecDeque<DateTime<Utc>>,
    rate_window: chrono::Duration,
    latency_samples: VecDeque<Duration>,
    latency_window_size: usize,
    topic_truncation_threshold: usize,
    top_topics_limit: usize,
}

impl StatisticsCollector {
    pub fn new(
        rate_window_seconds: i64,
        latency_window_size: usize,
        topic_truncation_threshold: usize,
        top_topics_limit: usize,
    ) -> Self {
        Self {
            total_messages: 0,
            dropped_overflow: 0,
            per_topic: HashMap::new(),
            arrivals: VecDeque::new(),
            rate_window: chrono::Duration::seconds(rate_window_seconds.max(1)),
            latency_samples: VecDeque::new(),
            latency_window_size: latency_window_size.max(1),
            topic_truncation_threshold,
            top_topics_limit,
        }
    }

    /// Records one ingested message at `at`. Truncates long topic keys past
    /// `topic_truncation_threshold` so a topic-explosion attack cannot grow
    /// `per_topic` unboundedly.
    pub fn record(&mut self, topic: &str, at: DateTime<Utc>) {
        self.total_messages += 1;
        let key = self.truncate_topic(topic);
        *self.per_topic.entry(key).or_insert(0) += 1;

        self.arrivals.push_back(at);
        self.evict_expired_arrivals(at);
    }

    pub fn record_overflow_drop(&mut self) {
        self.dropped_overflow += 1;
    }

    pub fn record_latency(&mut self, latency: Duration) {
        if self.latency_samples.len() == self.latency_window_size {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency);
    }

    fn truncate_topic(&self, topic: &str) -> String {
        if topic.len() <= self.topic_truncation_threshold {
            topic.to_string()
        } else {
            let cut = topic
                .char_indices()
                .take(self.topic_truncation_threshold)
                .last()
                .map(|(idx, c)| idx + c.len_utf8())
                .unwrap_or(0);
            format!("{}{TRUNCATION_SUFFIX}", &topic[..cut])
        }
    }

    fn evict_expired_arrivals(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.rate_window;
        while let Some(front) = self.arrivals.front() {
            if *front < cutoff {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
    }

    /// Count over the rolling window divided by the window length, in
    /// messages/second. Non-negative, bounded above by `total_messages`.
    pub fn rate(&self) -> f64 {
        let window_secs = self.rate_window.num_milliseconds() as f64 / 1000.0;
        if window_secs <= 0.0 {
            return 0.0;
        }
        self.arrivals.len() as f64 / window_secs
    }

    pub fn top_topics(&self, n: usize) -> Vec<(String, u64)> {
        let mut topics: Vec<(String, u64)> = self
            .per_topic
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        topics.truncate(n);
        topics
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn dropped_overflow(&self) -> u64 {
        self.dropped_overflow
    }

    fn latency_snapshot(&self) -> LatencySnapshot {
        if self.latency_samples.is_empty() {
            return LatencySnapshot::default();
        }

        let mut sorted: Vec<Duration> = self.latency_samples.iter().copied().collect();
        sorted.sort();

        let count = sorted.len();
        let sum: Duration = sorted.iter().sum();
        let avg = sum / count as u32;

        LatencySnapshot {
            count,
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            avg: Some(avg),
            p95: Some(percentile(&sorted, 0.95)),
            p99: Some(percentile(&sorted, 0.99)),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_messages: self.total_messages,
            dropped_overflow: self.dropped_overflow,
            rate_per_second: self.rate(),
            top_topics: self.top_topics(self.top_topics_limit),
            latency: self.latency_snapshot(),
        }
    }
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_messages_counts_every_record() {
        let mut stats = StatisticsCollector::new(10, 100, 128, 10);
        let now = Utc::now();
        for _ in 0..100 {
            stats.record("sensors/a", now);
        }
        assert_eq!(stats.total_messages(), 100);
    }

    #[test]
    fn long_topics_are_truncated_with_a_suffix() {
        let mut stats = StatisticsCollector::new(10, 100, 8, 10);
        stats.record("0123456789abcdef", Utc::now());
        let top = stats.top_topics(1);
        assert_eq!(top[0].0, format!("01234567{TRUNCATION_SUFFIX}"));
    }

    #[test]
    fn rate_is_bounded_by_arrivals_within_the_window() {
        let mut stats = StatisticsCollector::new(1, 100, 128, 10);
        let now = Utc::now();
        for _ in 0..5 {
            stats.record("a", now);
        }
        // All within the same instant: rate should equal count/window, never
        // more than total_messages/1s.
        assert!(stats.rate() <= stats.total_messages() as f64);
        assert!(stats.rate() >= 0.0);
    }

    #[test]
    fn top_topics_orders_by_count_descending() {
        let mut stats = StatisticsCollector::new(10, 100, 128, 10);
        let now = Utc::now();
        for _ in 0..3 {
            stats.record("busy", now);
        }
        stats.record("quiet", now);
        let top = stats.top_topics(2);
        assert_eq!(top[0], ("busy".to_string(), 3));
        assert_eq!(top[1], ("quiet".to_string(), 1));
    }

    #[test]
    fn latency_window_is_bounded_and_reports_percentiles() {
        let mut stats = StatisticsCollector::new(10, 3, 128, 10);
        for ms in [10, 20, 30, 40] {
            stats.record_latency(Duration::from_millis(ms));
        }
        let snap = stats.snapshot();
        // window size 3: the oldest sample (10ms) was evicted.
        assert_eq!(snap.latency.count, 3);
        assert_eq!(snap.latency.min, Some(Duration::from_millis(20)));
        assert_eq!(snap.latency.max, Some(Duration::from_millis(40)));
    }

    #[test]
    fn pause_does_not_affect_stats_recording() {
        // S7: stats has no notion of pause at all — it only ever sees what
        // the dispatcher chooses to record, which is every ingested message
        // regardless of display state.
        let mut stats = StatisticsCollector::new(10, 100, 128, 10);
        let now = Utc::now();
        for _ in 0..100 {
            stats.record("a", now);
        }
        assert_eq!(stats.total_messages(), 100);
        stats.record("a", now);
        assert_eq!(stats.total_messages(), 101);
    }
}
