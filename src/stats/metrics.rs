//! Statistics for the frame pipeline and the stream server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Live pipeline counters
///
/// Updated with relaxed atomics from the production loop and the viewer
/// tasks; read as a [`StatsSnapshot`].
#[derive(Debug)]
pub struct PipelineStats {
    started_at: Instant,
    frames_received: AtomicU64,
    empty_frames: AtomicU64,
    idle_frames: AtomicU64,
    frames_transcoded: AtomicU64,
    transcode_failures: AtomicU64,
    viewers_total: AtomicU64,
    parts_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_received: AtomicU64::new(0),
            empty_frames: AtomicU64::new(0),
            idle_frames: AtomicU64::new(0),
            frames_transcoded: AtomicU64::new(0),
            transcode_failures: AtomicU64::new(0),
            viewers_total: AtomicU64::new(0),
            parts_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// A frame was delivered by the capture source
    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A delivered frame had no payload
    pub fn record_empty(&self) {
        self.empty_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame was kept at full resolution only because nobody was watching
    pub fn record_idle(&self) {
        self.idle_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transcoded(&self) {
        self.frames_transcoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transcode_failure(&self) {
        self.transcode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A streaming connection was accepted
    pub fn record_viewer(&self) {
        self.viewers_total.fetch_add(1, Ordering::Relaxed);
    }

    /// A multipart part of `bytes` payload bytes was written to a viewer
    pub fn record_part(&self, bytes: usize) {
        self.parts_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Time since the pipeline was created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self, active_viewers: usize) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            empty_frames: self.empty_frames.load(Ordering::Relaxed),
            idle_frames: self.idle_frames.load(Ordering::Relaxed),
            frames_transcoded: self.frames_transcoded.load(Ordering::Relaxed),
            transcode_failures: self.transcode_failures.load(Ordering::Relaxed),
            active_viewers,
            viewers_total: self.viewers_total.load(Ordering::Relaxed),
            parts_sent: self.parts_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub frames_received: u64,
    pub empty_frames: u64,
    pub idle_frames: u64,
    pub frames_transcoded: u64,
    pub transcode_failures: u64,
    pub active_viewers: usize,
    pub viewers_total: u64,
    pub parts_sent: u64,
    pub bytes_sent: u64,
}

impl StatsSnapshot {
    /// Average transcoded frames per second over the uptime
    pub fn transcode_rate(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.frames_transcoded as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let stats = PipelineStats::new();
        let snap = stats.snapshot(0);

        assert_eq!(snap.frames_received, 0);
        assert_eq!(snap.frames_transcoded, 0);
        assert_eq!(snap.transcode_failures, 0);
        assert_eq!(snap.parts_sent, 0);
        assert_eq!(snap.active_viewers, 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = PipelineStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_idle();
        stats.record_transcoded();
        stats.record_part(1_000);
        stats.record_part(500);

        let snap = stats.snapshot(3);
        assert_eq!(snap.frames_received, 2);
        assert_eq!(snap.idle_frames, 1);
        assert_eq!(snap.frames_transcoded, 1);
        assert_eq!(snap.parts_sent, 2);
        assert_eq!(snap.bytes_sent, 1_500);
        assert_eq!(snap.active_viewers, 3);
    }

    #[test]
    fn test_transcode_rate_zero_uptime() {
        let snap = StatsSnapshot {
            frames_transcoded: 100,
            ..Default::default()
        };
        assert_eq!(snap.transcode_rate(), 0.0);
    }

    #[test]
    fn test_transcode_rate() {
        let snap = StatsSnapshot {
            uptime_secs: 10,
            frames_transcoded: 300,
            ..Default::default()
        };
        assert_eq!(snap.transcode_rate(), 30.0);
    }
}
