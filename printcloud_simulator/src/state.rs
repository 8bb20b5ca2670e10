// printcloud_simulator/src/state.rs - In-memory printers, commands and jobs
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

use crate::models::{
    AckBody, CreatePrinter, CurrentPrintBody, HeaterBody, PrinterResource, StartJob, StatusBody,
    TemperaturesBody,
};

/// Knobs of a simulator instance.
#[derive(Debug, Clone)]
pub struct SimOptions {
    pub api_key: String,
    pub api_secret: String,
    /// Acknowledgement reads answered `unsent`/`sent` before the command reports `ok`.
    pub ack_delay_reads: u32,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            api_key: "sim-key".to_string(),
            api_secret: "sim-secret".to_string(),
            ack_delay_reads: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    New,
    WarmingUp,
    Printing,
    Paused,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::WarmingUp => "warming_up",
            JobStatus::Printing => "printing",
            JobStatus::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Pause,
    Resume,
    Cancel,
}

impl JobAction {
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "pause" => Some(JobAction::Pause),
            "resume" => Some(JobAction::Resume),
            "cancel" => Some(JobAction::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobUpdateError {
    NotFound,
    Conflict,
}

#[derive(Debug, Clone, Copy)]
struct Heater {
    current: f64,
    target: f64,
}

impl Heater {
    fn ambient() -> Self {
        Self { current: 21.0, target: 0.0 }
    }

    fn step(&mut self, rng: &mut impl Rng) {
        let goal = if self.target > 0.0 { self.target } else { 21.0 };
        self.current += (goal - self.current) * 0.5 + rng.random_range(-0.3..0.3);
    }

    fn body(self) -> HeaterBody {
        HeaterBody {
            current: (self.current * 10.0).round() / 10.0,
            target: self.target,
        }
    }
}

#[derive(Debug, Clone)]
struct Printer {
    client: String,
    port: String,
    baud_rate: u32,
    online: bool,
    extruder: Heater,
    bed: Heater,
    job: Option<u64>,
}

#[derive(Debug, Clone)]
struct Job {
    printer: u64,
    status: JobStatus,
    percent: f64,
    spec: StartJob,
}

#[derive(Debug, Clone)]
struct Command {
    command: String,
    response: String,
    reads: u32,
    offline: bool,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    printers: BTreeMap<u64, Printer>,
    commands: HashMap<u64, Command>,
    jobs: HashMap<u64, Job>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared state behind the simulator's routes.
#[derive(Debug, Clone)]
pub struct SimState {
    base_url: Url,
    options: SimOptions,
    inner: Arc<Mutex<Inner>>,
}

impl SimState {
    pub fn new(base_url: Url, options: SimOptions) -> Self {
        Self {
            base_url,
            options,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn accepts(&self, api_key: &str, api_secret: &str) -> bool {
        api_key == self.options.api_key && api_secret == self.options.api_secret
    }

    fn uri(&self, path: &str) -> Url {
        self.base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone())
    }

    pub fn printer_uri(&self, id: u64) -> Url {
        self.uri(&format!("/printer/instance/{id}/"))
    }

    pub fn command_uri(&self, id: u64) -> Url {
        self.uri(&format!("/command/{id}/"))
    }

    pub fn job_uri(&self, id: u64) -> Url {
        self.uri(&format!("/print/job/{id}/"))
    }

    pub fn list_printers(&self, client: Option<&str>) -> Vec<PrinterResource> {
        self.inner()
            .printers
            .iter()
            .filter(|(_, p)| client.is_none_or(|c| p.client == c))
            .map(|(id, p)| PrinterResource {
                uri: self.printer_uri(*id),
                port: p.port.clone(),
                baud_rate: p.baud_rate,
            })
            .collect()
    }

    pub fn create_printer(&self, request: CreatePrinter) -> u64 {
        let mut inner = self.inner();
        let id = inner.next_id();
        tracing::info!(
            "Registering printer {} '{}' ({}) on {} for {}",
            id,
            request.name,
            request.printer_model,
            request.port,
            request.client
        );
        inner.printers.insert(
            id,
            Printer {
                client: request.client,
                port: request.port,
                baud_rate: request.baud_rate,
                online: true,
                extruder: Heater::ambient(),
                bed: Heater::ambient(),
                job: None,
            },
        );
        id
    }

    pub fn printer_id_for_port(&self, port: &str) -> Option<u64> {
        self.inner()
            .printers
            .iter()
            .find(|(_, p)| p.port == port)
            .map(|(id, _)| *id)
    }

    pub fn baud_rate(&self, id: u64) -> Option<u32> {
        self.inner().printers.get(&id).map(|p| p.baud_rate)
    }

    pub fn update_baud_rate(&self, id: u64, baud_rate: u32) -> bool {
        match self.inner().printers.get_mut(&id) {
            Some(printer) => {
                printer.baud_rate = baud_rate;
                true
            }
            None => false,
        }
    }

    pub fn set_online(&self, id: u64, online: bool) -> bool {
        match self.inner().printers.get_mut(&id) {
            Some(printer) => {
                printer.online = online;
                true
            }
            None => false,
        }
    }

    /// Reports a printer's status; every read moves heaters and the running job forward.
    pub fn status(&self, id: u64) -> Option<StatusBody> {
        let mut guard = self.inner();
        let inner = &mut *guard;
        let printer = inner.printers.get_mut(&id)?;

        let mut rng = rand::rng();
        printer.extruder.step(&mut rng);
        printer.bed.step(&mut rng);

        let mut current_print = None;
        if let Some(job_id) = printer.job {
            let finished = match inner.jobs.get_mut(&job_id) {
                Some(job) => {
                    match job.status {
                        JobStatus::WarmingUp => job.status = JobStatus::Printing,
                        JobStatus::Printing => {
                            job.percent = (job.percent + job.spec.step_percent).min(100.0)
                        }
                        JobStatus::New | JobStatus::Paused => {}
                    }
                    if job.percent >= 100.0 {
                        true
                    } else {
                        let elapsed = job.spec.duration_secs * job.percent / 100.0;
                        current_print = Some(CurrentPrintBody {
                            status: job.status.as_str().to_string(),
                            percent_complete: job.percent,
                            elapsed,
                            remaining: job.spec.duration_secs - elapsed,
                            job_uri: self.job_uri(job_id),
                        });
                        false
                    }
                }
                None => true,
            };
            if finished {
                tracing::info!("Job {} on printer {} finished", job_id, id);
                inner.jobs.remove(&job_id);
                printer.job = None;
            }
        }

        Some(StatusBody {
            status: if printer.online { "ONLINE" } else { "OFFLINE" }.to_string(),
            temperatures: TemperaturesBody {
                extruder1: printer.extruder.body(),
                bed: printer.bed.body(),
            },
            current_print,
        })
    }

    /// Accepts a command for a printer and answers it the way firmware would.
    pub fn submit_command(&self, printer_id: u64, command: &str) -> Option<u64> {
        let mut inner = self.inner();
        let printer = inner.printers.get_mut(&printer_id)?;
        let offline = !printer.online;
        let response = respond(printer, command);
        let id = inner.next_id();
        inner.commands.insert(
            id,
            Command {
                command: command.to_string(),
                response,
                reads: 0,
                offline,
            },
        );
        Some(id)
    }

    pub fn command_ack(&self, id: u64) -> Option<AckBody> {
        let delay = self.options.ack_delay_reads;
        let mut inner = self.inner();
        let command = inner.commands.get_mut(&id)?;
        command.reads += 1;

        let (status, response) = if command.offline {
            ("printer_offline", String::new())
        } else if command.reads > delay {
            ("ok", command.response.clone())
        } else if command.reads * 2 > delay {
            ("sent", String::new())
        } else {
            ("unsent", String::new())
        };
        Some(AckBody {
            status: status.to_string(),
            command: command.command.clone(),
            response,
        })
    }

    pub fn start_job(&self, printer_id: u64, spec: StartJob) -> Option<u64> {
        let mut inner = self.inner();
        if !inner.printers.contains_key(&printer_id) {
            return None;
        }
        let id = inner.next_id();
        if let Some(previous) = inner
            .printers
            .get_mut(&printer_id)
            .and_then(|p| p.job.replace(id))
        {
            inner.jobs.remove(&previous);
        }
        inner.jobs.insert(
            id,
            Job {
                printer: printer_id,
                status: if spec.start { JobStatus::WarmingUp } else { JobStatus::New },
                percent: 0.0,
                spec,
            },
        );
        tracing::info!("Job {} queued on printer {}", id, printer_id);
        Some(id)
    }

    pub fn update_job(&self, id: u64, action: JobAction) -> Result<(), JobUpdateError> {
        let mut inner = self.inner();
        let job = inner.jobs.get_mut(&id).ok_or(JobUpdateError::NotFound)?;
        match (action, job.status) {
            (JobAction::Pause, JobStatus::Printing | JobStatus::WarmingUp) => {
                job.status = JobStatus::Paused
            }
            (JobAction::Resume, JobStatus::Paused | JobStatus::New) => {
                job.status = JobStatus::Printing
            }
            (JobAction::Cancel, _) => {
                let printer = job.printer;
                inner.jobs.remove(&id);
                if let Some(p) = inner.printers.get_mut(&printer) {
                    p.job = None;
                }
            }
            _ => return Err(JobUpdateError::Conflict),
        }
        tracing::info!("Job {} updated with {:?}", id, action);
        Ok(())
    }
}

fn respond(printer: &mut Printer, command: &str) -> String {
    let code = command.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
    let s_value = || {
        command
            .split_whitespace()
            .find_map(|word| word.strip_prefix('S').and_then(|v| v.parse::<f64>().ok()))
    };
    match code.as_str() {
        "M105" => format!(
            "ok T:{:.1} /{:.1} B:{:.1} /{:.1} @:0 B@:0",
            printer.extruder.current, printer.extruder.target, printer.bed.current, printer.bed.target
        ),
        "M104" | "M109" => {
            if let Some(target) = s_value() {
                printer.extruder.target = target;
            }
            "ok".to_string()
        }
        "M140" | "M190" => {
            if let Some(target) = s_value() {
                printer.bed.target = target;
            }
            "ok".to_string()
        }
        _ => "ok".to_string(),
    }
}
