use super::state::PrinterState;
use super::telemetry::Reading;

/// Everything the bridge reports back to the print host.
///
/// Calls happen on the bridge's worker tasks; implementations should not block for long.
pub trait HostCallback: Send + Sync {
    fn on_state_change(&self, state: PrinterState, label: &str);

    /// `tools` is ordered by tool index and always holds tool 0.
    fn on_temperature_update(&self, tools: &[Reading], bed: Option<Reading>);

    /// A response line, as if it had been read from the printer's serial port.
    fn on_line(&self, line: &str);

    /// `fraction` is 0..=1, `raw_percent` the same value on a 0..=100 scale.
    fn on_progress_update(
        &self,
        fraction: Option<f64>,
        raw_percent: Option<f64>,
        elapsed: Option<f64>,
        remaining: Option<f64>,
    );

    fn on_log(&self, message: &str);
}
