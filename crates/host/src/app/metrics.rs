use std::time::{Duration, Instant};

use engine::SchedulerStats;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TickMetricsSnapshot {
    pub(crate) tps: f32,
    pub(crate) dispatched: u64,
    pub(crate) resolved: u64,
    pub(crate) rejected: u64,
    pub(crate) peak_queue_depth: usize,
}

/// Per-interval tick rate plus scheduler counter deltas.
#[derive(Debug)]
pub(crate) struct TickMetrics {
    interval_start: Instant,
    interval: Duration,
    ticks: u32,
    peak_queue_depth: usize,
    baseline: SchedulerStats,
}

impl TickMetrics {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            ticks: 0,
            peak_queue_depth: 0,
            baseline: SchedulerStats::default(),
        }
    }

    pub(crate) fn record_tick(&mut self, queue_depth: usize) {
        self.ticks = self.ticks.saturating_add(1);
        self.peak_queue_depth = self.peak_queue_depth.max(queue_depth);
    }

    pub(crate) fn maybe_snapshot(
        &mut self,
        now: Instant,
        stats: SchedulerStats,
    ) -> Option<TickMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let snapshot = TickMetricsSnapshot {
            tps: self.ticks as f32 / elapsed_seconds,
            dispatched: stats.dispatched.saturating_sub(self.baseline.dispatched),
            resolved: stats.resolved.saturating_sub(self.baseline.resolved),
            rejected: stats.rejected.saturating_sub(self.baseline.rejected),
            peak_queue_depth: self.peak_queue_depth,
        };

        self.interval_start = now;
        self.ticks = 0;
        self.peak_queue_depth = 0;
        self.baseline = stats;

        Some(snapshot)
    }
}
