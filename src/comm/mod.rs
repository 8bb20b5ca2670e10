// src/comm/mod.rs - Serial-style connection to a printer behind the remote print service
pub mod callback;
pub mod control;
pub mod events;
pub mod polling;
pub mod queue;
pub mod session;
pub mod state;
pub mod telemetry;

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use url::Url;

use self::callback::HostCallback;
use self::events::{EventSink, PrinterEvent};
use self::polling::StatusPoller;
use self::state::PrinterState;
use crate::api::models::{CreatePrinterRequest, JobAction};
use crate::api::{ApiError, PrintService, client_uri};
use crate::config::{Config, ConfigError, ProfileConfig};

pub use self::control::ControlError;

pub use self::session::Session;

#[derive(Debug, Error)]
pub enum CommError {
    #[error("Not connected to a printer")]
    NotConnected,
    #[error("No print job is active")]
    NoActiveJob,
    #[error("Not possible while the printer is {0:?}")]
    InvalidState(PrinterState),
    #[error("Print service error: {0}")]
    Api(#[from] ApiError),
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// Progress of the current print as last reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// 0..=1
    pub fraction: Option<f64>,
    pub elapsed_secs: Option<f64>,
    pub remaining_secs: Option<f64>,
    /// 0..=100
    pub raw_percent: Option<f64>,
}

/// The local client program that talks to the printer on the service's behalf.
pub trait CompanionProcess: Send {
    /// Asks the process to shut down; called once when the connection closes.
    fn interrupt(&mut self);
}

#[derive(Debug, Clone)]
pub struct CommSettings {
    pub client_uri: Url,
    pub printer_model: String,
    pub printer_name: String,
    pub status_interval: Duration,
    pub readline_interval: Duration,
    pub temperature_request_interval: Option<Duration>,
    pub profile: ProfileConfig,
}

impl CommSettings {
    /// Settings with the default intervals; no `M105` timer unless one is set.
    pub fn new(client_uri: Url) -> Self {
        Self {
            client_uri,
            printer_model: crate::config::default_printer_model(),
            printer_name: crate::config::default_printer_name(),
            status_interval: Duration::from_secs(10),
            readline_interval: Duration::from_millis(100),
            temperature_request_interval: None,
            profile: ProfileConfig::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let node_uuid = config
            .service
            .node_uuid
            .ok_or_else(|| ConfigError::Invalid("service.node_uuid is required".to_string()))?;
        let service_url = config.service.parsed_url()?;
        let client_uri = client_uri(&service_url, &node_uuid)
            .map_err(|e| ConfigError::Invalid(format!("Cannot build client URI: {e}")))?;

        Ok(Self {
            client_uri,
            printer_model: config.service.printer_model.clone(),
            printer_name: config.service.printer_name.clone(),
            status_interval: Duration::from_millis(config.polling.status_interval_ms),
            readline_interval: Duration::from_millis(config.polling.readline_interval_ms),
            temperature_request_interval: Some(config.polling.temperature_request_ms)
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis),
            profile: config.profile.clone(),
        })
    }
}

struct Workers {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

/// Presents the remote printer to the host as if it were a serial device.
///
/// At most one [`Session`] is live at a time; connecting again closes the previous one.
pub struct CloudComm {
    settings: CommSettings,
    service: Arc<dyn PrintService>,
    callback: Arc<dyn HostCallback>,
    sink: Arc<dyn EventSink>,
    session: RwLock<Option<Arc<Session>>>,
    workers: Mutex<Option<Workers>>,
    companion: Mutex<Option<Box<dyn CompanionProcess>>>,
}

impl CloudComm {
    pub fn new(
        settings: CommSettings,
        service: Arc<dyn PrintService>,
        callback: Arc<dyn HostCallback>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            settings,
            service,
            callback,
            sink,
            session: RwLock::new(None),
            workers: Mutex::new(None),
            companion: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &CommSettings {
        &self.settings
    }

    /// Registers the process to interrupt when the connection closes.
    pub async fn attach_companion(&self, process: Box<dyn CompanionProcess>) {
        *self.companion.lock().await = Some(process);
    }

    pub async fn session(&self) -> Option<Arc<Session>> {
        self.session.read().await.clone()
    }

    /// Opens a session for `port`, registering the printer remotely if needed.
    ///
    /// Returns the state the session ended up in: normally whatever the first status poll
    /// reported, or [`PrinterState::Error`] when the printer could not be resolved.
    pub async fn connect(&self, port: &str, baud_rate: u32) -> PrinterState {
        self.close().await;

        let session = Arc::new(Session::new(
            port,
            baud_rate,
            self.service.clone(),
            self.callback.clone(),
            self.sink.clone(),
        ));
        *self.session.write().await = Some(session.clone());
        session.change_state(PrinterState::Connecting).await;

        let printer_uri = match self.resolve_printer(&session).await {
            Ok(uri) => uri,
            Err(e) => {
                session
                    .fail(format!("Could not set up printer on port {port}: {e}"))
                    .await;
                session.stop();
                return PrinterState::Error;
            }
        };
        tracing::info!("Using remote printer {} for port {}", printer_uri, port);
        session.set_printer_uri(printer_uri).await;

        polling::poll_once(&session).await;
        self.start_workers(session.clone()).await;
        session.log("Connected, starting monitor");
        session.state().await
    }

    async fn resolve_printer(&self, session: &Session) -> Result<Url, ApiError> {
        let client = &self.settings.client_uri;
        session.log(&format!("Getting printer list for client {client}"));
        let printers = self.service.list_printers(client).await?;

        if let Some(printer) = printers.into_iter().find(|p| p.port == session.port()) {
            session.log(&format!(
                "Printer {} matches selected port {}",
                printer.uri,
                session.port()
            ));
            if printer.baud_rate != session.baud_rate() {
                tracing::debug!(
                    "Updating baud rate of {} from {} to {}",
                    printer.uri,
                    printer.baud_rate,
                    session.baud_rate()
                );
                self.service
                    .update_baud_rate(&printer.uri, session.baud_rate())
                    .await?;
            }
            return Ok(printer.uri);
        }

        session.log(&format!("No printer found for port {}. Creating it.", session.port()));
        let request = CreatePrinterRequest {
            client: client.clone(),
            printer_model: self.settings.printer_model.clone(),
            name: self.settings.printer_name.clone(),
            port: session.port().to_string(),
            baud_rate: session.baud_rate(),
        };
        self.service.create_printer(&request).await
    }

    async fn start_workers(&self, session: Arc<Session>) {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks = Vec::new();

        let poller = StatusPoller::new(session.clone(), self.settings.status_interval);
        tasks.push(tokio::spawn(poller.run(shutdown_tx.subscribe())));

        tasks.push(tokio::spawn(run_readline(
            session.clone(),
            self.settings.readline_interval,
            shutdown_tx.subscribe(),
        )));

        if let Some(period) = self.settings.temperature_request_interval {
            tasks.push(tokio::spawn(run_temperature_requests(
                session,
                period,
                shutdown_tx.subscribe(),
            )));
        }

        *self.workers.lock().await = Some(Workers { shutdown_tx, tasks });
    }

    /// Stops the session. A print in progress is reported as failed.
    pub async fn close(&self) {
        let Some(session) = self.session().await else {
            return;
        };
        if !session.is_active() && session.state().await == PrinterState::Closed {
            return;
        }

        session.stop();
        if let Some(workers) = self.workers.lock().await.take() {
            let _ = workers.shutdown_tx.send(());
            tracing::debug!("Stopped {} worker tasks", workers.tasks.len());
        }

        if session.state().await.is_busy() {
            self.sink.fire(PrinterEvent::PrintFailed);
        }

        if let Some(mut companion) = self.companion.lock().await.take() {
            tracing::info!("Interrupting companion process");
            companion.interrupt();
        }

        session.queue().clear().await;
        session.change_state(PrinterState::Closed).await;
        session.log("Connection closed, closing down monitor");
    }

    /// Submits one line to the printer. Returns the acknowledgement URI if it was sent.
    pub async fn send_command(&self, line: &str) -> Option<Url> {
        self.session().await?.send_command(line).await
    }

    pub async fn pause_print(&self) -> Result<(), CommError> {
        self.update_job(JobAction::Pause, PrinterState::is_printing).await
    }

    pub async fn resume_print(&self) -> Result<(), CommError> {
        self.update_job(JobAction::Resume, PrinterState::is_paused).await
    }

    /// Cancels the running job; the print ends reported as cancelled rather than done.
    pub async fn cancel_print(&self) -> Result<(), CommError> {
        self.update_job(JobAction::Cancel, PrinterState::is_busy).await
    }

    async fn update_job(
        &self,
        action: JobAction,
        allowed: fn(PrinterState) -> bool,
    ) -> Result<(), CommError> {
        let session = self.session().await.ok_or(CommError::NotConnected)?;
        if !session.is_active() {
            return Err(CommError::NotConnected);
        }
        let state = session.state().await;
        if !allowed(state) {
            return Err(CommError::InvalidState(state));
        }
        let job = session.current_job_uri().await.ok_or(CommError::NoActiveJob)?;

        if action == JobAction::Cancel {
            session.mark_cancel_requested().await;
        }
        if let Err(e) = session.service().update_job(&job, action).await {
            if action == JobAction::Cancel {
                session.clear_cancel_requested().await;
            }
            return Err(e.into());
        }
        session.log(&format!("Requested {action:?} for job {job}"));
        Ok(())
    }

    /// Sends each line in order. Fails only when there is no live session.
    pub async fn commands<S: AsRef<str>>(&self, lines: &[S]) -> Result<(), CommError> {
        let session = self
            .session()
            .await
            .filter(|s| s.is_active())
            .ok_or(CommError::NotConnected)?;
        for line in lines {
            session.send_command(line.as_ref()).await;
        }
        Ok(())
    }

    /// Moves one axis by `amount` mm relative to the current position.
    pub async fn jog(&self, axis: &str, amount: f64) -> Result<(), CommError> {
        let lines = control::jog(&self.settings.profile, axis, amount)?;
        self.commands(&lines).await
    }

    pub async fn home(&self, axes: &[&str]) -> Result<(), CommError> {
        let lines = control::home(axes)?;
        self.commands(&lines).await
    }

    pub async fn extrude(&self, amount: f64) -> Result<(), CommError> {
        let lines = control::extrude(&self.settings.profile, amount)?;
        self.commands(&lines).await
    }

    /// Selects `tool<n>` as the active extruder.
    pub async fn change_tool(&self, tool: &str) -> Result<(), CommError> {
        let line = control::change_tool(tool)?;
        self.commands(&[line]).await
    }

    /// Sets the target of `tool<n>` or `bed`, in degrees Celsius.
    pub async fn set_temperature(&self, heater: &str, value: f64) -> Result<(), CommError> {
        let line = control::set_temperature(&self.settings.profile, heater, value)?;
        self.commands(&[line]).await
    }

    pub async fn feed_rate(&self, percent: u32) -> Result<(), CommError> {
        let line = control::feed_rate(percent)?;
        self.commands(&[line]).await
    }

    pub async fn flow_rate(&self, percent: u32) -> Result<(), CommError> {
        let line = control::flow_rate(percent)?;
        self.commands(&[line]).await
    }

    /// Runs one status poll right away instead of waiting for the next tick.
    pub async fn poll_status_now(&self) {
        if let Some(session) = self.session().await.filter(|s| s.is_active()) {
            polling::poll_once(&session).await;
        }
    }

    pub async fn state(&self) -> PrinterState {
        match self.session().await {
            Some(session) => session.state().await,
            None => PrinterState::Offline,
        }
    }

    pub async fn state_label(&self) -> String {
        match self.session().await {
            Some(session) => session.state_label().await,
            None => PrinterState::Offline.label(None),
        }
    }

    pub async fn last_error(&self) -> Option<String> {
        self.session().await?.last_error().await
    }

    /// Port and baud rate of the current session.
    pub async fn connection(&self) -> Option<(String, u32)> {
        let session = self.session().await?;
        Some((session.port().to_string(), session.baud_rate()))
    }

    pub async fn printer_uri(&self) -> Option<Url> {
        self.session().await?.printer_uri().await
    }

    pub async fn current_job_uri(&self) -> Option<Url> {
        self.session().await?.current_job_uri().await
    }

    pub async fn progress(&self) -> ProgressSnapshot {
        match self.session().await {
            Some(session) => session.progress().await,
            None => ProgressSnapshot::default(),
        }
    }
}

async fn run_readline(
    session: Arc<Session>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Readline loop shutting down");
                break;
            }
            _ = tokio::time::sleep(period) => {
                if !session.is_active() {
                    break;
                }
                session.read_line(Instant::now()).await;
            }
        }
    }
}

async fn run_temperature_requests(
    session: Arc<Session>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Temperature request timer shutting down");
                break;
            }
            _ = interval.tick() => {
                if !session.is_active() {
                    break;
                }
                if session.state().await.is_operational() {
                    session.send_command("M105").await;
                }
            }
        }
    }
}
