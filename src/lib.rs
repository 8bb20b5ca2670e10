//! Bridges a serial-style print host to a remote, HTTP-polled print service.
//!
//! The remote service has no persistent connection: commands are fire-and-forget POSTs that
//! hand back an acknowledgement URI, and printer state only arrives through status polling.
//! [`comm::CloudComm`] turns that into the connect / send line / receive line / temperature
//! model a print host expects.

pub mod api;
pub mod comm;
pub mod config;
pub mod estimation;
pub mod host;
pub mod monitor;

pub use api::{ApiError, Credentials, HttpPrintService, PrintService};
pub use comm::callback::HostCallback;
pub use comm::events::{ChannelEventSink, EventSink, PrinterEvent};
pub use comm::state::PrinterState;
pub use comm::telemetry::{parse_temperature_line, Reading, TelemetrySample};
pub use comm::{
    CloudComm, CommError, CommSettings, CompanionProcess, ControlError, ProgressSnapshot,
};
pub use config::{load_config, Config, ConfigError, ProfileConfig};
