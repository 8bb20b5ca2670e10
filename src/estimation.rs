// src/estimation.rs - Print time estimation from progress samples
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::EstimationConfig;

/// Tuning of the live estimate's stability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    /// Number of recent estimates averaged.
    pub rolling_window: usize,
    /// Largest drift of the running average, in seconds, that still counts as stable.
    pub threshold_secs: f64,
    /// Consecutive stable samples needed before the live estimate is trusted.
    pub countdown: usize,
}

impl EstimatorConfig {
    /// Sizes the window to cover roughly `window` worth of samples at the given poll interval.
    pub fn for_poll_interval(poll_interval: Duration, window: Duration, threshold_secs: f64) -> Self {
        let poll = poll_interval.as_secs_f64();
        let rolling_window = if poll > 0.0 {
            ((window.as_secs_f64() / poll).ceil() as usize).max(1)
        } else {
            1
        };
        Self {
            rolling_window,
            threshold_secs,
            countdown: rolling_window,
        }
    }

    pub fn from_config(config: &EstimationConfig, poll_interval: Duration) -> Self {
        Self::for_poll_interval(
            poll_interval,
            Duration::from_secs_f64(config.rolling_window_secs),
            config.threshold_secs,
        )
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self::for_poll_interval(Duration::from_secs(10), Duration::from_secs(15), 60.0)
    }
}

/// Tracks whether a stream of total-time estimates has settled.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    config: EstimatorConfig,
    totals: VecDeque<f64>,
    distances: VecDeque<f64>,
    sum_total: f64,
    count: usize,
    stable_counter: usize,
}

impl StabilityTracker {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            totals: VecDeque::with_capacity(config.rolling_window),
            distances: VecDeque::with_capacity(config.rolling_window),
            sum_total: 0.0,
            count: 0,
            stable_counter: 0,
        }
    }

    pub fn update(&mut self, estimate: f64) {
        let previous_average = self.average_total();

        self.sum_total += estimate;
        self.count += 1;
        push_bounded(&mut self.totals, estimate, self.config.rolling_window);

        if let (Some(previous), Some(current)) = (previous_average, self.average_total()) {
            push_bounded(
                &mut self.distances,
                (current - previous).abs(),
                self.config.rolling_window,
            );
        }

        match self.average_distance() {
            Some(distance) if distance.abs() < self.config.threshold_secs => {
                self.stable_counter += 1;
            }
            _ => self.stable_counter = 0,
        }
    }

    pub fn is_stable(&self) -> bool {
        self.stable_counter >= self.config.countdown
    }

    /// Mean of every estimate seen so far.
    pub fn average_total(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_total / self.count as f64)
    }

    /// Mean of the estimates in the rolling window, once it has filled.
    pub fn average_total_rolling(&self) -> Option<f64> {
        if self.count < self.config.rolling_window || self.totals.is_empty() {
            return None;
        }
        Some(self.totals.iter().sum::<f64>() / self.totals.len() as f64)
    }

    pub fn average_distance(&self) -> Option<f64> {
        if self.count < self.config.rolling_window + 1 || self.distances.is_empty() {
            return None;
        }
        Some(self.distances.iter().sum::<f64>() / self.distances.len() as f64)
    }
}

fn push_bounded(values: &mut VecDeque<f64>, value: f64, capacity: usize) {
    if values.len() == capacity {
        values.pop_front();
    }
    values.push_back(value);
}

/// Total and remaining print time, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeEstimate {
    pub total: Option<f64>,
    pub remaining: Option<f64>,
}

/// Combines a live estimate (`elapsed / fraction`) with a statistical one from job metadata.
#[derive(Debug, Clone)]
pub struct PrintTimeEstimator {
    config: EstimatorConfig,
    tracker: StabilityTracker,
}

impl PrintTimeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            tracker: StabilityTracker::new(config),
        }
    }

    pub fn config(&self) -> EstimatorConfig {
        self.config
    }

    /// Forgets all samples; called when a new print starts.
    pub fn reset(&mut self) {
        self.tracker = StabilityTracker::new(self.config);
    }

    /// Feeds one sample and returns the live total estimate if it has stabilized.
    pub fn live_estimate(&mut self, fraction: Option<f64>, elapsed: Option<f64>) -> Option<f64> {
        let (fraction, elapsed) = match (fraction, elapsed) {
            (Some(f), Some(e)) if f > 0.0 && e > 0.0 => (f, e),
            _ => return None,
        };
        self.tracker.update(elapsed / fraction);
        if self.tracker.is_stable() {
            self.tracker.average_total_rolling()
        } else {
            None
        }
    }

    pub fn estimate(
        &mut self,
        fraction: Option<f64>,
        elapsed: Option<f64>,
        statistical: Option<f64>,
    ) -> TimeEstimate {
        let live = self.live_estimate(fraction, elapsed);
        let progressing = fraction.is_some_and(|f| f > 0.0) && elapsed.is_some_and(|e| e > 0.0);
        let total = if progressing {
            blend_total(fraction, statistical, live)
        } else {
            live
        };
        let remaining = match (total, elapsed) {
            (Some(total), Some(elapsed)) => Some(total - elapsed),
            _ => None,
        };
        TimeEstimate { total, remaining }
    }
}

impl Default for PrintTimeEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

/// Weights the live estimate in over the first half of the print.
///
/// Below 50% the live share is `2 * fraction`; from 50% on only the live estimate counts.
pub fn blend_total(fraction: Option<f64>, statistical: Option<f64>, live: Option<f64>) -> Option<f64> {
    match (statistical, live) {
        (Some(statistical), Some(live)) => {
            let Some(fraction) = fraction else {
                return Some(statistical);
            };
            let weight = if fraction < 0.5 { fraction * 2.0 } else { 1.0 };
            Some((1.0 - weight) * statistical + weight * live)
        }
        (Some(statistical), None) => Some(statistical),
        (None, live) => live,
    }
}
