//! Wire format of the simulated print service.

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterResource {
    pub uri: Url,
    pub port: String,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrinterList {
    pub resources: Vec<PrinterResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrinter {
    pub client: String,
    pub printer_model: String,
    pub name: String,
    pub port: String,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaudRateUpdate {
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandBody {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckBody {
    pub status: String,
    pub command: String,
    pub response: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeaterBody {
    pub current: f64,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperaturesBody {
    pub extruder1: HeaterBody,
    pub bed: HeaterBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPrintBody {
    pub status: String,
    pub percent_complete: f64,
    pub elapsed: f64,
    pub remaining: f64,
    pub job_uri: Url,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
    pub temperatures: TemperaturesBody,
    pub current_print: Option<CurrentPrintBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: String,
}

/// Body of `POST /sim/printers/{id}/jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartJob {
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f64,
    /// Progress made per status read.
    #[serde(default = "default_step_percent")]
    pub step_percent: f64,
    /// A job that is not started stays `new` until resumed.
    #[serde(default = "default_start")]
    pub start: bool,
}

impl Default for StartJob {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            step_percent: default_step_percent(),
            start: default_start(),
        }
    }
}

fn default_duration_secs() -> f64 { 600.0 }
fn default_step_percent() -> f64 { 10.0 }
fn default_start() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedJob {
    pub job_uri: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineUpdate {
    pub online: bool,
}
