// src/monitor.rs - Coalesced publishing of the printer's current data
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::comm::state::PrinterState;
use crate::comm::telemetry::Reading;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateFlags {
    pub operational: bool,
    pub printing: bool,
    pub paused: bool,
    pub closed_or_error: bool,
    pub error: bool,
    pub ready: bool,
}

impl From<PrinterState> for StateFlags {
    fn from(state: PrinterState) -> Self {
        Self {
            operational: state.is_operational(),
            printing: state.is_printing(),
            paused: state.is_paused(),
            closed_or_error: state.is_closed_or_error(),
            error: state.is_error(),
            ready: state.is_operational() && !state.is_busy(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateData {
    pub text: String,
    pub flags: StateFlags,
}

impl StateData {
    pub fn new(state: PrinterState, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            flags: state.into(),
        }
    }
}

/// Progress as shown to the user: percent and whole seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProgressData {
    pub completion: Option<f64>,
    pub print_time: Option<u64>,
    pub print_time_left: Option<u64>,
}

/// One temperature data point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureData {
    pub time: DateTime<Utc>,
    pub tools: Vec<Reading>,
    pub bed: Option<Reading>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrentData {
    pub state: StateData,
    pub job_uri: Option<Url>,
    pub progress: ProgressData,
    pub temperature: Option<TemperatureData>,
}

struct Shared {
    data: Mutex<CurrentData>,
    changed: Notify,
}

impl Shared {
    fn data(&self) -> MutexGuard<'_, CurrentData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publishes [`CurrentData`] at most once per interval, and only after something changed.
pub struct StateMonitor {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl StateMonitor {
    /// Starts the publisher task; must be called within a tokio runtime.
    pub fn spawn<F>(interval: Duration, on_update: F) -> Self
    where
        F: Fn(CurrentData) + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            data: Mutex::new(CurrentData::default()),
            changed: Notify::new(),
        });
        let worker = tokio::spawn(publish(shared.clone(), interval, on_update));
        Self { shared, worker }
    }

    pub fn set_state(&self, state: StateData) {
        self.update(|data| data.state = state);
    }

    pub fn set_progress(&self, progress: ProgressData) {
        self.update(|data| data.progress = progress);
    }

    pub fn set_job_uri(&self, job_uri: Option<Url>) {
        self.update(|data| data.job_uri = job_uri);
    }

    pub fn add_temperature(&self, temperature: TemperatureData) {
        self.update(|data| data.temperature = Some(temperature));
    }

    pub fn current_data(&self) -> CurrentData {
        self.shared.data().clone()
    }

    fn update(&self, apply: impl FnOnce(&mut CurrentData)) {
        apply(&mut self.shared.data());
        self.shared.changed.notify_one();
    }
}

impl Drop for StateMonitor {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn publish<F>(shared: Arc<Shared>, interval: Duration, on_update: F)
where
    F: Fn(CurrentData),
{
    let mut last_update = Instant::now().checked_sub(interval).unwrap_or_else(Instant::now);
    loop {
        shared.changed.notified().await;

        let wait = interval.saturating_sub(last_update.elapsed());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let data = shared.data().clone();
        on_update(data);
        last_update = Instant::now();
    }
}
