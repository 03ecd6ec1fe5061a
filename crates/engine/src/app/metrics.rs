use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::lock::{read_or_recover, write_or_recover};

/// Latest throughput numbers. The simulation clock owns `tps`, the render
/// clock owns the frame fields.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub tps: f32,
    pub fps: f32,
    pub frame_time_ms: f32,
    pub render_failures: u32,
}

#[derive(Clone, Debug)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(LoopMetricsSnapshot::default())),
        }
    }
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        *read_or_recover(&self.snapshot, "metrics")
    }

    pub(crate) fn publish_simulation(&self, interval: &IntervalMetrics) {
        write_or_recover(&self.snapshot, "metrics").tps = interval.ticks_per_second;
    }

    pub(crate) fn publish_render(&self, interval: &IntervalMetrics) {
        let mut snapshot = write_or_recover(&self.snapshot, "metrics");
        snapshot.fps = interval.frames_per_second;
        snapshot.frame_time_ms = interval.frame_time_ms;
        snapshot.render_failures = interval.render_failures;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct IntervalMetrics {
    pub(crate) ticks_per_second: f32,
    pub(crate) frames_per_second: f32,
    pub(crate) frame_time_ms: f32,
    pub(crate) render_failures: u32,
}

/// Per-thread counters rolled into a rate once per interval.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames: u32,
    ticks: u32,
    render_failures: u32,
    frame_time_sum: Duration,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            frames: 0,
            ticks: 0,
            render_failures: 0,
            frame_time_sum: Duration::ZERO,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_time: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_time);
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub(crate) fn record_render_failure(&mut self) {
        self.render_failures = self.render_failures.saturating_add(1);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<IntervalMetrics> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = if self.frames == 0 {
            0.0
        } else {
            (self.frame_time_sum.as_secs_f32() / self.frames as f32) * 1000.0
        };

        let metrics = IntervalMetrics {
            ticks_per_second: self.ticks as f32 / elapsed_seconds,
            frames_per_second: self.frames as f32 / elapsed_seconds,
            frame_time_ms,
            render_failures: self.render_failures,
        };

        self.interval_start = now;
        self.frames = 0;
        self.ticks = 0;
        self.render_failures = 0;
        self.frame_time_sum = Duration::ZERO;

        Some(metrics)
    }
}
