// src/host.rs - Print host side of the bridge: histories, progress and current data
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

use crate::comm::callback::HostCallback;
use crate::comm::state::PrinterState;
use crate::comm::telemetry::Reading;
use crate::config::MonitorConfig;
use crate::estimation::{EstimatorConfig, PrintTimeEstimator};
use crate::monitor::{CurrentData, ProgressData, StateData, StateMonitor, TemperatureData};

/// Everything a freshly attached UI needs in one go.
#[derive(Debug, Clone, Serialize)]
pub struct InitialData {
    pub current: CurrentData,
    pub temperatures: Vec<TemperatureData>,
    pub logs: Vec<String>,
    pub messages: Vec<String>,
}

struct HostData {
    state: PrinterState,
    logs: VecDeque<String>,
    messages: VecDeque<String>,
    temperatures: VecDeque<TemperatureData>,
    tools: Vec<Reading>,
    bed: Option<Reading>,
    estimator: PrintTimeEstimator,
    statistical_estimate: Option<f64>,
    last_progress_report: Option<u32>,
}

/// [`HostCallback`] implementation that keeps what a print host shows its users.
pub struct HostAdapter {
    data: Mutex<HostData>,
    monitor: StateMonitor,
    history_len: usize,
    temperature_cutoff: TimeDelta,
}

impl HostAdapter {
    /// Must be called within a tokio runtime; `on_update` receives coalesced current data.
    pub fn new<F>(config: &MonitorConfig, estimator: EstimatorConfig, on_update: F) -> Self
    where
        F: Fn(CurrentData) + Send + Sync + 'static,
    {
        let monitor = StateMonitor::spawn(Duration::from_millis(config.interval_ms), on_update);
        monitor.set_state(StateData::new(
            PrinterState::Offline,
            PrinterState::Offline.label(None),
        ));
        let cutoff = i64::try_from(config.temperature_cutoff_mins.saturating_mul(60))
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            data: Mutex::new(HostData {
                state: PrinterState::Offline,
                logs: VecDeque::with_capacity(config.history_len),
                messages: VecDeque::with_capacity(config.history_len),
                temperatures: VecDeque::new(),
                tools: Vec::new(),
                bed: None,
                estimator: PrintTimeEstimator::new(estimator),
                statistical_estimate: None,
                last_progress_report: None,
            }),
            monitor,
            history_len: config.history_len,
            temperature_cutoff: cutoff,
        }
    }

    fn data(&self) -> MutexGuard<'_, HostData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the selected job and its expected duration, if the job's metadata has one.
    pub fn set_job(&self, job_uri: Option<Url>, estimated_print_time: Option<f64>) {
        self.data().statistical_estimate = estimated_print_time;
        self.monitor.set_job_uri(job_uri);
    }

    pub fn state(&self) -> PrinterState {
        self.data().state
    }

    pub fn logs(&self) -> Vec<String> {
        self.data().logs.iter().cloned().collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.data().messages.iter().cloned().collect()
    }

    pub fn temperature_history(&self) -> Vec<TemperatureData> {
        self.data().temperatures.iter().cloned().collect()
    }

    /// Latest tool readings (by index) and bed reading.
    pub fn current_temperatures(&self) -> (Vec<Reading>, Option<Reading>) {
        let data = self.data();
        (data.tools.clone(), data.bed)
    }

    pub fn current_data(&self) -> CurrentData {
        self.monitor.current_data()
    }

    pub fn initial_data(&self) -> InitialData {
        let current = self.monitor.current_data();
        let data = self.data();
        InitialData {
            current,
            temperatures: data.temperatures.iter().cloned().collect(),
            logs: data.logs.iter().cloned().collect(),
            messages: data.messages.iter().cloned().collect(),
        }
    }

    fn push_history(history: &mut VecDeque<String>, entry: &str, limit: usize) {
        if limit == 0 {
            return;
        }
        while history.len() >= limit {
            history.pop_front();
        }
        history.push_back(entry.to_string());
    }
}

impl HostCallback for HostAdapter {
    fn on_state_change(&self, state: PrinterState, label: &str) {
        let mut data = self.data();
        let previous = data.state;
        data.state = state;

        if state == PrinterState::Printing && previous != PrinterState::Paused {
            tracing::debug!("Print started, resetting time estimation");
            data.estimator.reset();
            data.last_progress_report = None;
        }
        if matches!(state, PrinterState::Closed | PrinterState::ClosedWithError) {
            data.statistical_estimate = None;
            data.last_progress_report = None;
            self.monitor.set_progress(ProgressData::default());
            self.monitor.set_job_uri(None);
        }
        drop(data);

        self.monitor.set_state(StateData::new(state, label));
    }

    fn on_temperature_update(&self, tools: &[Reading], bed: Option<Reading>) {
        let now = Utc::now();
        let point = TemperatureData {
            time: now,
            tools: tools.to_vec(),
            bed,
        };

        let mut data = self.data();
        data.tools = tools.to_vec();
        data.bed = bed;
        data.temperatures.push_back(point.clone());
        let oldest = now.checked_sub_signed(self.temperature_cutoff).unwrap_or(DateTime::<Utc>::MIN_UTC);
        while data.temperatures.front().is_some_and(|t| t.time < oldest) {
            data.temperatures.pop_front();
        }
        drop(data);

        self.monitor.add_temperature(point);
    }

    fn on_line(&self, line: &str) {
        Self::push_history(&mut self.data().messages, line, self.history_len);
    }

    fn on_progress_update(
        &self,
        fraction: Option<f64>,
        raw_percent: Option<f64>,
        elapsed: Option<f64>,
        remaining: Option<f64>,
    ) {
        let mut data = self.data();
        let statistical = data.statistical_estimate;
        let estimate = data.estimator.estimate(fraction, elapsed, statistical);

        let progress = ProgressData {
            completion: raw_percent.or_else(|| fraction.map(|f| f * 100.0)),
            print_time: elapsed.map(whole_seconds),
            print_time_left: estimate.remaining.or(remaining).map(whole_seconds),
        };

        if let Some(percent) = progress.completion {
            let report = percent as u32;
            if data.last_progress_report != Some(report) {
                data.last_progress_report = Some(report);
                tracing::info!("Print progress: {}%", report);
            }
        }
        drop(data);

        self.monitor.set_progress(progress);
    }

    fn on_log(&self, message: &str) {
        Self::push_history(&mut self.data().logs, message, self.history_len);
    }
}

fn whole_seconds(secs: f64) -> u64 {
    secs.max(0.0) as u64
}
