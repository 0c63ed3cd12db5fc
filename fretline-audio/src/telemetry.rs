//! Scheduler latency telemetry.
//!
//! Every fired timer contributes one (scheduled delay, lateness) pair to
//! a fixed window, so a session summary can say not only how late timers
//! ran but what kind of arming was hit worst.

use std::time::Duration;

/// Number of recent firings kept for the summary.
const WINDOW: usize = 256;

#[derive(Debug, Clone, Copy, Default)]
struct Sample {
    delay_us: u32,
    late_us: u32,
}

fn as_us(d: Duration) -> u32 {
    d.as_micros().min(u128::from(u32::MAX)) as u32
}

/// Lateness statistics over one collection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencySummary {
    pub samples: usize,
    pub avg_late_us: u32,
    pub max_late_us: u32,
    pub p95_late_us: u32,
    /// Firings later than the budget in this window.
    pub overruns: u64,
    /// `(delay_us, late_us)` of the latest-firing timer in the window.
    pub worst: Option<(u32, u32)>,
}

/// Latency collector for the scheduler thread.
pub struct TimerTelemetry {
    window: [Sample; WINDOW],
    idx: usize,
    len: usize,
    overruns: u64,
}

impl Default for TimerTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerTelemetry {
    pub fn new() -> Self {
        Self {
            window: [Sample::default(); WINDOW],
            idx: 0,
            len: 0,
            overruns: 0,
        }
    }

    /// Record one firing: the delay it was armed with and how late it
    /// ran. `budget_us` is the lateness considered acceptable; anything
    /// beyond it counts as an overrun.
    pub fn record(&mut self, delay: Duration, lateness: Duration, budget_us: u32) {
        let sample = Sample { delay_us: as_us(delay), late_us: as_us(lateness) };
        self.window[self.idx] = sample;
        self.idx = (self.idx + 1) % WINDOW;
        if self.len < WINDOW {
            self.len += 1;
        }
        if sample.late_us > budget_us {
            self.overruns += 1;
        }
    }

    /// Summarize the window and reset the collector.
    pub fn take_summary(&mut self) -> LatencySummary {
        let n = self.len;
        if n == 0 {
            *self = Self::new();
            return LatencySummary::default();
        }

        let worst = self.window[..n]
            .iter()
            .max_by_key(|s| s.late_us)
            .map(|s| (s.delay_us, s.late_us));
        let mut lates: Vec<u32> = self.window[..n].iter().map(|s| s.late_us).collect();
        lates.sort_unstable();

        let sum: u64 = lates.iter().map(|&v| u64::from(v)).sum();
        let summary = LatencySummary {
            samples: n,
            avg_late_us: (sum / n as u64) as u32,
            max_late_us: lates[n - 1],
            p95_late_us: lates[(n - 1) * 95 / 100],
            overruns: self.overruns,
            worst,
        };
        *self = Self::new();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us(v: u64) -> Duration {
        Duration::from_micros(v)
    }

    #[test]
    fn empty_collector_summarizes_to_zero() {
        let mut t = TimerTelemetry::new();
        assert_eq!(t.take_summary(), LatencySummary::default());
    }

    #[test]
    fn summary_pairs_the_worst_lateness_with_its_delay() {
        let mut t = TimerTelemetry::new();
        t.record(us(10_000), us(100), 2000);
        t.record(us(50_000), us(900), 2000);
        t.record(us(20_000), us(500), 2000);

        let s = t.take_summary();
        assert_eq!(s.samples, 3);
        assert_eq!(s.avg_late_us, 500);
        assert_eq!(s.max_late_us, 900);
        assert_eq!(s.p95_late_us, 500);
        assert_eq!(s.worst, Some((50_000, 900)));
        assert_eq!(s.overruns, 0);
    }

    #[test]
    fn overruns_count_firings_beyond_the_budget() {
        let mut t = TimerTelemetry::new();
        t.record(us(1_000), us(3_000), 2000);
        t.record(us(1_000), us(100), 2000);
        assert_eq!(t.take_summary().overruns, 1);

        // The summary reset also restarts the overrun count.
        t.record(us(1_000), us(5_000), 2000);
        let s = t.take_summary();
        assert_eq!(s.overruns, 1);
        assert_eq!(s.samples, 1);
    }

    #[test]
    fn window_keeps_only_the_most_recent_samples() {
        let mut t = TimerTelemetry::new();
        for i in 0..300u64 {
            t.record(us(1_000), us(i), 2000);
        }
        let s = t.take_summary();
        assert_eq!(s.samples, 256);
        assert_eq!(s.max_late_us, 299);
        assert_eq!(s.worst, Some((1_000, 299)));
    }
}
