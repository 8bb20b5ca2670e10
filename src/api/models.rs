//! Request and response bodies of the remote print service.

use serde::{Deserialize, Serialize};
use url::Url;

/// One printer resource registered for a client node.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PrinterResource {
    pub uri: Url,
    pub port: String,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PrinterList {
    #[serde(default)]
    pub resources: Vec<PrinterResource>,
}

/// Body of `POST /printer/instance/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePrinterRequest {
    pub client: Url,
    pub printer_model: String,
    pub name: String,
    pub port: String,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaudRateUpdate {
    pub baud_rate: u32,
}

/// Status document returned by `GET <printer uri>`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PrinterStatus {
    pub status: String,
    #[serde(default)]
    pub temperatures: Option<Temperatures>,
    #[serde(default)]
    pub current_print: Option<CurrentPrint>,
}

impl PrinterStatus {
    pub const ONLINE: &'static str = "ONLINE";

    pub fn is_online(&self) -> bool {
        self.status == Self::ONLINE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Temperatures {
    #[serde(default)]
    pub extruder1: Option<TemperatureReading>,
    #[serde(default)]
    pub bed: Option<TemperatureReading>,
}

/// A heater reading; either side may be missing from the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct TemperatureReading {
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CurrentPrint {
    pub status: String,
    #[serde(default)]
    pub percent_complete: Option<f64>,
    #[serde(default)]
    pub elapsed: Option<f64>,
    #[serde(default)]
    pub remaining: Option<f64>,
    #[serde(default)]
    pub job_uri: Option<Url>,
}

impl CurrentPrint {
    /// A job that was created but has not been started reports `new`.
    pub fn is_new(&self) -> bool {
        self.status == "new"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest<'a> {
    pub command: &'a str,
}

/// Delivery status of a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Ok,
    Sent,
    Unsent,
    Error,
    PrinterOffline,
    #[serde(other)]
    Unknown,
}

impl AckStatus {
    /// Statuses after which the command will never produce a response.
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, AckStatus::Error | AckStatus::PrinterOffline)
    }
}

/// Body of `GET <ack uri>`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandAck {
    pub status: AckStatus,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Cancel,
    Pause,
    Resume,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusUpdate {
    pub status: JobAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_without_print_or_temperatures() {
        let status: PrinterStatus = serde_json::from_str(r#"{"status": "OFFLINE"}"#).unwrap();
        assert!(!status.is_online());
        assert!(status.temperatures.is_none());
        assert!(status.current_print.is_none());
    }

    #[test]
    fn null_current_print_and_partial_temperatures() {
        let status: PrinterStatus = serde_json::from_str(
            r#"{"status": "ONLINE", "current_print": null,
                "temperatures": {"extruder1": {"current": 210.5}}}"#,
        )
        .unwrap();
        let temps = status.temperatures.unwrap();
        assert_eq!(temps.extruder1, Some(TemperatureReading { current: Some(210.5), target: None }));
        assert!(temps.bed.is_none());
        assert!(status.current_print.is_none());
    }

    #[test]
    fn ack_status_falls_back_to_unknown() {
        let ack: CommandAck =
            serde_json::from_str(r#"{"status": "queued", "command": "G28", "response": ""}"#).unwrap();
        assert_eq!(ack.status, AckStatus::Unknown);
        let ack: CommandAck = serde_json::from_str(r#"{"status": "printer_offline"}"#).unwrap();
        assert!(ack.status.is_terminal_failure());
    }

    #[test]
    fn job_update_serializes_lowercase() {
        let body = serde_json::to_string(&JobStatusUpdate { status: JobAction::Cancel }).unwrap();
        assert_eq!(body, r#"{"status":"cancel"}"#);
    }
}
