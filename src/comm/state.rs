// src/comm/state.rs - Printer lifecycle state machine
use serde::Serialize;

use super::events::PrinterEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PrinterState {
    #[default]
    Offline,
    Connecting,
    Operational,
    Printing,
    Paused,
    Closed,
    Error,
    ClosedWithError,
}

impl PrinterState {
    pub fn is_operational(self) -> bool {
        matches!(
            self,
            PrinterState::Operational | PrinterState::Printing | PrinterState::Paused
        )
    }

    pub fn is_printing(self) -> bool {
        self == PrinterState::Printing
    }

    pub fn is_paused(self) -> bool {
        self == PrinterState::Paused
    }

    pub fn is_busy(self) -> bool {
        matches!(self, PrinterState::Printing | PrinterState::Paused)
    }

    pub fn is_error(self) -> bool {
        matches!(self, PrinterState::Error | PrinterState::ClosedWithError)
    }

    pub fn is_closed_or_error(self) -> bool {
        matches!(
            self,
            PrinterState::Closed | PrinterState::Error | PrinterState::ClosedWithError
        )
    }

    /// Human readable label; error states carry the last error message.
    pub fn label(self, last_error: Option<&str>) -> String {
        match self {
            PrinterState::Offline => "Offline".to_string(),
            PrinterState::Connecting => "Connecting".to_string(),
            PrinterState::Operational => "Operational".to_string(),
            PrinterState::Printing => "Printing".to_string(),
            PrinterState::Paused => "Paused".to_string(),
            PrinterState::Closed => "Closed".to_string(),
            PrinterState::Error | PrinterState::ClosedWithError => {
                format!("Error: {}", last_error.unwrap_or("unknown"))
            }
        }
    }
}

/// A state change that actually happened, with the events it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: PrinterState,
    pub to: PrinterState,
    pub events: Vec<PrinterEvent>,
}

/// Current state plus the context needed to build event payloads.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: PrinterState,
    last_error: Option<String>,
    port: String,
    baud_rate: u32,
    cancel_requested: bool,
}

impl StateMachine {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            state: PrinterState::Offline,
            last_error: None,
            port: port.into(),
            baud_rate,
            cancel_requested: false,
        }
    }

    pub fn state(&self) -> PrinterState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Marks that the running job was cancelled from this side, so the next
    /// busy -> operational transition is reported as a cancel, not a finished print.
    pub fn mark_cancel_requested(&mut self) {
        self.cancel_requested = true;
    }

    /// Forgets a cancel request the service never accepted.
    pub fn clear_cancel_requested(&mut self) {
        self.cancel_requested = false;
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn label(&self) -> String {
        self.state.label(self.last_error())
    }

    /// Moves to `new_state`. Returns `None` when already there.
    pub fn transition(&mut self, new_state: PrinterState) -> Option<Transition> {
        if self.state == new_state {
            return None;
        }
        let from = self.state;
        let events = self.events_for(from, new_state);
        self.state = new_state;

        if !new_state.is_busy() || from == PrinterState::Operational {
            self.cancel_requested = false;
        }

        Some(Transition {
            from,
            to: new_state,
            events,
        })
    }

    fn events_for(&self, from: PrinterState, to: PrinterState) -> Vec<PrinterEvent> {
        use PrinterState::*;

        let event = match (from, to) {
            (_, Closed) => Some(PrinterEvent::Disconnected),
            (_, Error | ClosedWithError) => Some(PrinterEvent::Error {
                message: self.last_error.clone(),
            }),
            (Connecting, Operational | Printing | Paused) => Some(PrinterEvent::Connected {
                port: self.port.clone(),
                baud_rate: self.baud_rate,
            }),
            (Printing, Paused) => Some(PrinterEvent::PrintPaused),
            (Paused, Printing) => Some(PrinterEvent::PrintResumed),
            (Operational, Printing) => Some(PrinterEvent::PrintStarted),
            (Printing | Paused, Operational) if self.cancel_requested => {
                Some(PrinterEvent::PrintCancelled)
            }
            (Printing, Operational) => Some(PrinterEvent::PrintDone),
            _ => None,
        };
        event.into_iter().collect()
    }
}
