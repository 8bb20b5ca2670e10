// src/comm/session.rs - Shared state of one live connection to a remote printer
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::ProgressSnapshot;
use super::callback::HostCallback;
use super::events::EventSink;
use super::queue::CommandQueue;
use super::state::{PrinterState, StateMachine};
use super::telemetry::parse_temperature_line;
use crate::api::PrintService;

/// One logical connection between the host and a remote printer resource.
///
/// Owned by [`super::CloudComm`] and shared with its worker tasks. Once stopped, a session
/// never reports anything to the host again.
pub struct Session {
    port: String,
    baud_rate: u32,
    printer_uri: RwLock<Option<Url>>,
    current_job_uri: RwLock<Option<Url>>,
    machine: Mutex<StateMachine>,
    progress: RwLock<ProgressSnapshot>,
    active: AtomicBool,
    queue: CommandQueue,
    service: Arc<dyn PrintService>,
    callback: Arc<dyn HostCallback>,
    sink: Arc<dyn EventSink>,
}

impl Session {
    pub fn new(
        port: impl Into<String>,
        baud_rate: u32,
        service: Arc<dyn PrintService>,
        callback: Arc<dyn HostCallback>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let port = port.into();
        Self {
            machine: Mutex::new(StateMachine::new(port.clone(), baud_rate)),
            port,
            baud_rate,
            printer_uri: RwLock::new(None),
            current_job_uri: RwLock::new(None),
            progress: RwLock::new(ProgressSnapshot::default()),
            active: AtomicBool::new(true),
            queue: CommandQueue::new(),
            service,
            callback,
            sink,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn service(&self) -> &dyn PrintService {
        self.service.as_ref()
    }

    pub fn callback(&self) -> &dyn HostCallback {
        self.callback.as_ref()
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub async fn state(&self) -> PrinterState {
        self.machine.lock().await.state()
    }

    pub async fn state_label(&self) -> String {
        self.machine.lock().await.label()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.machine.lock().await.last_error().map(str::to_string)
    }

    pub async fn printer_uri(&self) -> Option<Url> {
        self.printer_uri.read().await.clone()
    }

    pub(crate) async fn set_printer_uri(&self, uri: Url) {
        *self.printer_uri.write().await = Some(uri);
    }

    pub async fn current_job_uri(&self) -> Option<Url> {
        self.current_job_uri.read().await.clone()
    }

    pub(crate) async fn set_current_job_uri(&self, uri: Option<Url>) {
        *self.current_job_uri.write().await = uri;
    }

    pub async fn progress(&self) -> ProgressSnapshot {
        self.progress.read().await.clone()
    }

    pub(crate) async fn set_progress(&self, progress: ProgressSnapshot) {
        *self.progress.write().await = progress;
    }

    /// Moves the state machine and reports the change to the host and the event sink.
    ///
    /// The machine lock is held until every event has been fired, so observers see
    /// transitions strictly in order.
    pub async fn change_state(&self, new_state: PrinterState) {
        let mut machine = self.machine.lock().await;
        self.apply(&mut machine, new_state);
    }

    /// Records `message` as the last error and moves to [`PrinterState::Error`].
    pub async fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        let mut machine = self.machine.lock().await;
        machine.set_error(message);
        self.apply(&mut machine, PrinterState::Error);
    }

    pub(crate) async fn mark_cancel_requested(&self) {
        self.machine.lock().await.mark_cancel_requested();
    }

    pub(crate) async fn clear_cancel_requested(&self) {
        self.machine.lock().await.clear_cancel_requested();
    }

    fn apply(&self, machine: &mut StateMachine, new_state: PrinterState) {
        // A stopped session may only finish closing.
        if !self.is_active() && new_state != PrinterState::Closed {
            tracing::debug!("Ignoring {:?} on a stopped session", new_state);
            return;
        }
        let old_label = machine.label();
        let Some(transition) = machine.transition(new_state) else {
            return;
        };
        let label = machine.label();
        self.log(&format!("Changing monitoring state from '{old_label}' to '{label}'"));
        self.callback.on_state_change(transition.to, &label);
        for event in transition.events {
            self.sink.fire(event);
        }
    }

    pub fn log(&self, message: &str) {
        tracing::debug!(target: "printcloud_bridge::host_log", "{}", message);
        self.callback.on_log(message);
    }

    /// Submits one command line and queues its acknowledgement.
    ///
    /// Comments and surrounding whitespace are stripped; nothing is sent for an empty line or
    /// when the printer is not operational.
    pub async fn send_command(&self, line: &str) -> Option<Url> {
        let command = clean_command(line)?;
        if !self.is_active() || !self.state().await.is_operational() {
            tracing::debug!("Not sending '{}', printer is not operational", command);
            return None;
        }
        let printer = self.printer_uri().await?;

        match self.service.send_command(&printer, &command).await {
            Ok(ack_uri) => {
                self.log(&format!("Sent {command} to {printer}, acknowledgement at {ack_uri}"));
                self.queue.enqueue(ack_uri.clone()).await;
                Some(ack_uri)
            }
            Err(e) => {
                tracing::warn!("Sending '{}' to {} failed: {}", command, printer, e);
                self.log(&format!("Warning: {e}"));
                None
            }
        }
    }

    /// Resolves at most one pending acknowledgement and hands its response to the host.
    pub async fn read_line(&self, now: Instant) -> Option<String> {
        let line = self
            .queue
            .drain_one(self.service.as_ref(), now)
            .await
            .into_line()?;
        if !self.is_active() || line.is_empty() {
            return None;
        }

        for report in line.lines().filter_map(parse_temperature_line) {
            self.callback.on_temperature_update(&report.tools, report.bed);
        }
        self.callback.on_line(&line);
        Some(line)
    }
}

/// Strips a `;` comment and surrounding whitespace; non-ASCII characters become `?`.
pub fn clean_command(line: &str) -> Option<String> {
    let code = line.split(';').next().unwrap_or_default().trim();
    if code.is_empty() {
        return None;
    }
    Some(
        code.chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .collect(),
    )
}
