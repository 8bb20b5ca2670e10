// src/comm/polling.rs - Periodic status polling of the remote printer
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::session::Session;
use super::state::PrinterState;
use super::telemetry::{Reading, TelemetrySample};
use super::ProgressSnapshot;
use crate::api::models::{PrinterStatus, TemperatureReading};

/// Where a status document says the session should be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMapping {
    Target(PrinterState),
    /// A print status this bridge does not know; the session keeps its state.
    Unrecognized(String),
}

/// Maps remote `{status, current_print.status}` to a session state.
pub fn map_status(status: &PrinterStatus) -> StatusMapping {
    if !status.is_online() {
        return StatusMapping::Target(PrinterState::Connecting);
    }
    match status.current_print.as_ref() {
        None => StatusMapping::Target(PrinterState::Operational),
        Some(print) => match print.status.as_str() {
            "new" => StatusMapping::Target(PrinterState::Operational),
            "printing" | "warming_up" => StatusMapping::Target(PrinterState::Printing),
            "paused" => StatusMapping::Target(PrinterState::Paused),
            other => StatusMapping::Unrecognized(other.to_string()),
        },
    }
}

pub fn extract_telemetry(status: &PrinterStatus) -> TelemetrySample {
    let temps = status.temperatures.clone().unwrap_or_default();
    let reading = |r: Option<TemperatureReading>| Reading {
        actual: r.and_then(|r| r.current),
        target: r.and_then(|r| r.target),
    };
    TelemetrySample {
        tools: vec![reading(temps.extruder1)],
        bed: temps.bed.map(|bed| reading(Some(bed))),
    }
}

/// Progress of the current print; cleared when there is none or it has not started.
pub fn extract_progress(status: &PrinterStatus) -> ProgressSnapshot {
    match status.current_print.as_ref() {
        Some(print) if !print.is_new() => ProgressSnapshot {
            fraction: print.percent_complete.map(|p| p / 100.0),
            elapsed_secs: print.elapsed,
            remaining_secs: print.remaining,
            raw_percent: print.percent_complete,
        },
        _ => ProgressSnapshot::default(),
    }
}

/// Performs one status fetch and applies it to the session.
///
/// Failed fetches are logged and skipped without touching state, telemetry or progress.
pub async fn poll_once(session: &Session) {
    let Some(printer_uri) = session.printer_uri().await else {
        return;
    };

    let status = match session.service().printer_status(&printer_uri).await {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!("Status poll of {} failed: {}", printer_uri, e);
            session.log(&format!("Warning: status poll failed: {e}"));
            return;
        }
    };

    if !session.is_active() {
        return;
    }

    match map_status(&status) {
        StatusMapping::Target(state) => session.change_state(state).await,
        StatusMapping::Unrecognized(print_status) => {
            tracing::warn!("Unrecognized print status '{}', keeping current state", print_status);
            session.log(&format!("Unrecognized print status: {print_status}"));
        }
    }
    if !session.is_active() {
        return;
    }

    let telemetry = extract_telemetry(&status);
    session.callback().on_temperature_update(&telemetry.tools, telemetry.bed);

    let job_uri = status
        .current_print
        .as_ref()
        .filter(|print| !print.is_new())
        .and_then(|print| print.job_uri.clone());
    session.set_current_job_uri(job_uri).await;

    let progress = extract_progress(&status);
    session.callback().on_progress_update(
        progress.fraction,
        progress.raw_percent,
        progress.elapsed_secs,
        progress.remaining_secs,
    );
    session.set_progress(progress).await;
}

/// Drives [`poll_once`] on a fixed interval until shutdown.
///
/// The first tick fires one interval after start; connecting already polled once.
pub struct StatusPoller {
    session: Arc<Session>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(session: Arc<Session>, interval: Duration) -> Self {
        Self { session, interval }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Status polling loop shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if !self.session.is_active() {
                        break;
                    }
                    poll_once(&self.session).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{CurrentPrint, Temperatures};

    fn online(print_status: Option<&str>) -> PrinterStatus {
        PrinterStatus {
            status: "ONLINE".into(),
            temperatures: None,
            current_print: print_status.map(|s| CurrentPrint {
                status: s.into(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn status_mapping_table() {
        let offline = PrinterStatus { status: "OFFLINE".into(), ..Default::default() };
        assert_eq!(map_status(&offline), StatusMapping::Target(PrinterState::Connecting));
        assert_eq!(map_status(&online(None)), StatusMapping::Target(PrinterState::Operational));
        assert_eq!(map_status(&online(Some("new"))), StatusMapping::Target(PrinterState::Operational));
        assert_eq!(map_status(&online(Some("printing"))), StatusMapping::Target(PrinterState::Printing));
        assert_eq!(map_status(&online(Some("warming_up"))), StatusMapping::Target(PrinterState::Printing));
        assert_eq!(map_status(&online(Some("paused"))), StatusMapping::Target(PrinterState::Paused));
        assert_eq!(
            map_status(&online(Some("complete"))),
            StatusMapping::Unrecognized("complete".into())
        );
    }

    #[test]
    fn offline_wins_over_print_status() {
        let mut status = online(Some("printing"));
        status.status = "OFFLINE".into();
        assert_eq!(map_status(&status), StatusMapping::Target(PrinterState::Connecting));
    }

    #[test]
    fn telemetry_defaults_to_empty_readings() {
        let sample = extract_telemetry(&online(None));
        assert_eq!(sample.tools, vec![Reading::default()]);
        assert_eq!(sample.bed, None);

        let mut status = online(None);
        status.temperatures = Some(Temperatures {
            extruder1: Some(TemperatureReading { current: Some(205.0), target: Some(210.0) }),
            bed: Some(TemperatureReading { current: Some(55.0), target: None }),
        });
        let sample = extract_telemetry(&status);
        assert_eq!(sample.tools, vec![Reading::new(205.0, Some(210.0))]);
        assert_eq!(sample.bed, Some(Reading::new(55.0, None)));
    }

    #[test]
    fn progress_is_normalized_and_cleared_for_new_jobs() {
        let mut status = online(Some("printing"));
        if let Some(print) = status.current_print.as_mut() {
            print.percent_complete = Some(25.0);
            print.elapsed = Some(300.0);
            print.remaining = Some(900.0);
        }
        let progress = extract_progress(&status);
        assert_eq!(progress.fraction, Some(0.25));
        assert_eq!(progress.raw_percent, Some(25.0));
        assert_eq!(progress.elapsed_secs, Some(300.0));
        assert_eq!(progress.remaining_secs, Some(900.0));

        assert_eq!(extract_progress(&online(Some("new"))), ProgressSnapshot::default());
        assert_eq!(extract_progress(&online(None)), ProgressSnapshot::default());
    }
}
