// src/comm/events.rs - Domain events emitted on state transitions
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Events a print host reacts to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PrinterEvent {
    Connected { port: String, baud_rate: u32 },
    Disconnected,
    Error { message: Option<String> },
    PrintStarted,
    PrintPaused,
    PrintResumed,
    PrintDone,
    PrintCancelled,
    PrintFailed,
}

/// Receives events synchronously, in transition order.
pub trait EventSink: Send + Sync {
    fn fire(&self, event: PrinterEvent);
}

impl<F> EventSink for F
where
    F: Fn(PrinterEvent) + Send + Sync,
{
    fn fire(&self, event: PrinterEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: UnboundedSender<PrinterEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, UnboundedReceiver<PrinterEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn fire(&self, event: PrinterEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::debug!("Dropping event, receiver is gone: {:?}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelEventSink::new();
        sink.fire(PrinterEvent::PrintStarted);
        sink.fire(PrinterEvent::PrintDone);
        assert_eq!(rx.try_recv().unwrap(), PrinterEvent::PrintStarted);
        assert_eq!(rx.try_recv().unwrap(), PrinterEvent::PrintDone);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closures_are_sinks() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |event: PrinterEvent| seen.lock().unwrap().push(event);
        sink.fire(PrinterEvent::Disconnected);
        assert_eq!(*seen.lock().unwrap(), vec![PrinterEvent::Disconnected]);
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let json = serde_json::to_value(PrinterEvent::Connected {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 115200,
        })
        .unwrap();
        assert_eq!(json["event"], "connected");
        assert_eq!(json["baud_rate"], 115200);
    }
}
