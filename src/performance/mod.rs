//! # Tick Performance Monitoring
//!
//! Tracks how long the host spends encoding and submitting each tick, how
//! many ticks actually reached the device, and how many were skipped because
//! the accelerator was behind or the drawable was unavailable.
//!
//! ## Usage
//!
//! ```rust
//! use gridlife::performance::PerformanceMonitor;
//! use gridlife::simulation::scheduler::TickOutcome;
//!
//! let mut monitor = PerformanceMonitor::new();
//!
//! // Around each scheduler tick
//! monitor.begin_tick();
//! // ... scheduler.tick() ...
//! monitor.end_tick(&TickOutcome::Submitted { step: 1 });
//!
//! println!("{}", monitor.summary());
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::simulation::scheduler::TickOutcome;

/// Derived tick metrics for the current sample window
#[derive(Debug, Clone, PartialEq)]
pub struct TickMetrics {
    /// Submitted ticks per wall-clock second since the last refresh
    pub ticks_per_second: f32,
    /// Average host time per submitted tick in milliseconds
    pub tick_time_ms: f32,
    pub min_tick_time_ms: f32,
    pub max_tick_time_ms: f32,
    /// Ticks that reached the device
    pub submitted: u64,
    /// Ticks skipped by the overload policy or an unavailable target
    pub skipped: u64,
}

impl Default for TickMetrics {
    fn default() -> Self {
        Self {
            ticks_per_second: 0.0,
            tick_time_ms: 0.0,
            min_tick_time_ms: f32::MAX,
            max_tick_time_ms: 0.0,
            submitted: 0,
            skipped: 0,
        }
    }
}

/// Rolling tick-time monitor
pub struct PerformanceMonitor {
    /// Ring buffer of recent tick times for averaging
    tick_times: VecDeque<Duration>,
    max_samples: usize,
    tick_start: Option<Instant>,
    current_metrics: TickMetrics,
    submitted: u64,
    skipped: u64,
    /// Submitted ticks since `rate_window_start`
    rate_window_ticks: u64,
    rate_window_start: Instant,
    last_update: Instant,
    update_interval: Duration,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_samples(120) // ~2 seconds at the default cadence
    }

    pub fn with_samples(max_samples: usize) -> Self {
        let now = Instant::now();
        Self {
            tick_times: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            tick_start: None,
            current_metrics: TickMetrics::default(),
            submitted: 0,
            skipped: 0,
            rate_window_ticks: 0,
            rate_window_start: now,
            last_update: now,
            update_interval: Duration::from_millis(250),
        }
    }

    pub fn begin_tick(&mut self) {
        self.tick_start = Some(Instant::now());
    }

    /// Close the tick opened by [`begin_tick`](Self::begin_tick)
    pub fn end_tick(&mut self, outcome: &TickOutcome) {
        if let Some(start) = self.tick_start.take() {
            self.record(outcome, start.elapsed());

            if self.last_update.elapsed() >= self.update_interval {
                self.refresh();
            }
        }
    }

    /// Account for one tick that took `elapsed` on the host
    pub fn record(&mut self, outcome: &TickOutcome, elapsed: Duration) {
        match outcome {
            TickOutcome::Submitted { .. } => {
                self.submitted += 1;
                self.rate_window_ticks += 1;
                if self.tick_times.len() >= self.max_samples {
                    self.tick_times.pop_front();
                }
                self.tick_times.push_back(elapsed);
            }
            TickOutcome::Coalesced { .. } | TickOutcome::TargetUnavailable => {
                self.skipped += 1;
            }
        }
    }

    /// Recompute the derived metrics from the current window
    pub fn refresh(&mut self) {
        let metrics = &mut self.current_metrics;
        metrics.submitted = self.submitted;
        metrics.skipped = self.skipped;

        let window = self.rate_window_start.elapsed().as_secs_f32();
        if window > 0.0 {
            metrics.ticks_per_second = self.rate_window_ticks as f32 / window;
        }
        self.rate_window_ticks = 0;
        self.rate_window_start = Instant::now();
        self.last_update = Instant::now();

        if self.tick_times.is_empty() {
            return;
        }
        let total: Duration = self.tick_times.iter().sum();
        let average = total / self.tick_times.len() as u32;
        metrics.tick_time_ms = average.as_secs_f32() * 1000.0;

        if let (Some(min), Some(max)) = (self.tick_times.iter().min(), self.tick_times.iter().max()) {
            metrics.min_tick_time_ms = min.as_secs_f32() * 1000.0;
            metrics.max_tick_time_ms = max.as_secs_f32() * 1000.0;
        }
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.current_metrics
    }

    /// Tick time history in milliseconds, oldest first
    pub fn tick_time_history(&self) -> Vec<f32> {
        self.tick_times
            .iter()
            .map(|duration| duration.as_secs_f32() * 1000.0)
            .collect()
    }

    pub fn summary(&self) -> String {
        let m = &self.current_metrics;
        format!(
            "{:.1} ticks/s, tick {:.2}ms (min {:.2}, max {:.2}), {} submitted, {} skipped",
            m.ticks_per_second,
            m.tick_time_ms,
            if m.min_tick_time_ms == f32::MAX { 0.0 } else { m.min_tick_time_ms },
            m.max_tick_time_ms,
            m.submitted,
            m.skipped
        )
    }

    /// Refresh and write the summary to the log
    pub fn log_summary(&mut self, step: u64) {
        self.refresh();
        log::info!("step {step}: {}", self.summary());
    }

    pub fn reset(&mut self) {
        *self = Self::with_samples(self.max_samples);
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_submitted_and_skipped() {
        let mut monitor = PerformanceMonitor::new();
        let tick = Duration::from_millis(2);
        monitor.record(&TickOutcome::Submitted { step: 1 }, tick);
        monitor.record(&TickOutcome::Coalesced { in_flight: 3 }, tick);
        monitor.record(&TickOutcome::TargetUnavailable, tick);
        monitor.record(&TickOutcome::Submitted { step: 2 }, tick);
        monitor.refresh();

        let metrics = monitor.metrics();
        assert_eq!(metrics.submitted, 2);
        assert_eq!(metrics.skipped, 2);
        assert_eq!(monitor.tick_time_history().len(), 2);
    }

    #[test]
    fn test_average_min_max() {
        let mut monitor = PerformanceMonitor::new();
        for ms in [1, 2, 3, 6] {
            monitor.record(&TickOutcome::Submitted { step: ms }, Duration::from_millis(ms));
        }
        monitor.refresh();

        let metrics = monitor.metrics();
        assert!((metrics.tick_time_ms - 3.0).abs() < 1e-3);
        assert!((metrics.min_tick_time_ms - 1.0).abs() < 1e-3);
        assert!((metrics.max_tick_time_ms - 6.0).abs() < 1e-3);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut monitor = PerformanceMonitor::with_samples(4);
        for step in 0..10 {
            monitor.record(&TickOutcome::Submitted { step }, Duration::from_millis(step));
        }
        let history: Vec<u32> = monitor
            .tick_time_history()
            .iter()
            .map(|ms| ms.round() as u32)
            .collect();
        assert_eq!(history, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_begin_end_records_one_tick() {
        let mut monitor = PerformanceMonitor::new();
        monitor.begin_tick();
        monitor.end_tick(&TickOutcome::Submitted { step: 1 });
        // Without begin_tick nothing is recorded
        monitor.end_tick(&TickOutcome::Submitted { step: 2 });
        monitor.refresh();
        assert_eq!(monitor.metrics().submitted, 1);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut monitor = PerformanceMonitor::new();
        monitor.record(&TickOutcome::TargetUnavailable, Duration::ZERO);
        monitor.reset();
        monitor.refresh();
        assert_eq!(monitor.metrics().skipped, 0);
        assert!(monitor.summary().contains("0 skipped"));
    }
}
