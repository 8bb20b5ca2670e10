// Shared fakes for the bridge integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use url::Url;

use printcloud_bridge::api::models::{
    AckStatus, CommandAck, CreatePrinterRequest, CurrentPrint, JobAction, PrinterResource,
    PrinterStatus, TemperatureReading, Temperatures,
};
use printcloud_bridge::{ApiError, HostCallback, PrinterEvent, PrinterState, Reading};

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub fn printer_uri() -> Url {
    url("https://print.test/printer/instance/1/")
}

pub fn failure() -> ApiError {
    ApiError::Status {
        status: 500,
        url: "https://print.test/".into(),
        body: "boom".into(),
    }
}

pub fn ack(status: AckStatus, response: Option<&str>) -> Result<CommandAck, ApiError> {
    Ok(CommandAck {
        status,
        command: Some("M105".into()),
        response: response.map(str::to_string),
    })
}

pub fn status(online: bool, print: Option<CurrentPrint>) -> PrinterStatus {
    PrinterStatus {
        status: if online { "ONLINE" } else { "OFFLINE" }.into(),
        temperatures: Some(Temperatures {
            extruder1: Some(TemperatureReading { current: Some(200.0), target: Some(210.0) }),
            bed: Some(TemperatureReading { current: Some(60.0), target: Some(60.0) }),
        }),
        current_print: print,
    }
}

pub fn print(status: &str, percent: f64) -> CurrentPrint {
    CurrentPrint {
        status: status.into(),
        percent_complete: Some(percent),
        elapsed: Some(percent * 6.0),
        remaining: Some((100.0 - percent) * 6.0),
        job_uri: Some(url("https://print.test/print/job/7/")),
    }
}

/// Scripted [`PrintService`](printcloud_bridge::PrintService) that records every call.
#[derive(Default)]
pub struct FakeService {
    pub printers: Mutex<Vec<PrinterResource>>,
    pub statuses: Mutex<VecDeque<Result<PrinterStatus, ApiError>>>,
    pub acks: Mutex<HashMap<Url, VecDeque<Result<CommandAck, ApiError>>>>,
    pub calls: Mutex<Vec<String>>,
    pub job_updates: Mutex<Vec<(Url, JobAction)>>,
    next_command: Mutex<u32>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_status(&self, status: Result<PrinterStatus, ApiError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn push_ack(&self, ack_uri: &Url, ack: Result<CommandAck, ApiError>) {
        self.acks
            .lock()
            .unwrap()
            .entry(ack_uri.clone())
            .or_default()
            .push_back(ack);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl printcloud_bridge::PrintService for FakeService {
    async fn list_printers(&self, client: &Url) -> Result<Vec<PrinterResource>, ApiError> {
        self.record(format!("list {client}"));
        Ok(self.printers.lock().unwrap().clone())
    }

    async fn create_printer(&self, request: &CreatePrinterRequest) -> Result<Url, ApiError> {
        self.record(format!("create {} {}", request.port, request.baud_rate));
        Ok(printer_uri())
    }

    async fn update_baud_rate(&self, printer: &Url, baud_rate: u32) -> Result<(), ApiError> {
        self.record(format!("baud {printer} {baud_rate}"));
        Ok(())
    }

    async fn printer_status(&self, printer: &Url) -> Result<PrinterStatus, ApiError> {
        self.record(format!("status {printer}"));
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(status(true, None)))
    }

    async fn send_command(&self, printer: &Url, command: &str) -> Result<Url, ApiError> {
        self.record(format!("command {command}"));
        let mut next = self.next_command.lock().unwrap();
        *next += 1;
        Ok(printer.join(&format!("/command/{}/", *next))?)
    }

    async fn command_ack(&self, ack_uri: &Url) -> Result<CommandAck, ApiError> {
        self.record(format!("ack {ack_uri}"));
        self.acks
            .lock()
            .unwrap()
            .get_mut(ack_uri)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ack(AckStatus::Sent, None))
    }

    async fn update_job(&self, job: &Url, action: JobAction) -> Result<(), ApiError> {
        self.record(format!("job {job} {action:?}"));
        self.job_updates.lock().unwrap().push((job.clone(), action));
        Ok(())
    }
}

/// Everything reported to the host, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    State(PrinterState, String),
    Temperature(Vec<Reading>, Option<Reading>),
    Line(String),
    Progress(Option<f64>, Option<f64>, Option<f64>, Option<f64>),
    Log(String),
}

#[derive(Default)]
pub struct RecordingHost {
    pub calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<PrinterState> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::State(state, _) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Line(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn temperatures(&self) -> Vec<(Vec<Reading>, Option<Reading>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Temperature(tools, bed) => Some((tools, bed)),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<HostCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, HostCall::Progress(..)))
            .collect()
    }

    fn push(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl HostCallback for RecordingHost {
    fn on_state_change(&self, state: PrinterState, label: &str) {
        self.push(HostCall::State(state, label.to_string()));
    }

    fn on_temperature_update(&self, tools: &[Reading], bed: Option<Reading>) {
        self.push(HostCall::Temperature(tools.to_vec(), bed));
    }

    fn on_line(&self, line: &str) {
        self.push(HostCall::Line(line.to_string()));
    }

    fn on_progress_update(
        &self,
        fraction: Option<f64>,
        raw_percent: Option<f64>,
        elapsed: Option<f64>,
        remaining: Option<f64>,
    ) {
        self.push(HostCall::Progress(fraction, raw_percent, elapsed, remaining));
    }

    fn on_log(&self, message: &str) {
        self.push(HostCall::Log(message.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<PrinterEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<PrinterEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl printcloud_bridge::EventSink for RecordingSink {
    fn fire(&self, event: PrinterEvent) {
        self.events.lock().unwrap().push(event);
    }
}
