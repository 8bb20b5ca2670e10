// src/comm/queue.rs - Correlates submitted commands with their acknowledgements
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

use crate::api::models::AckStatus;
use crate::api::PrintService;

/// Minimum time between two lookups of the same acknowledgement.
pub const RECHECK_INTERVAL: Duration = Duration::from_secs(2);
/// Commands still unresolved after this long are given up on.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(120);

/// A submitted command whose outcome is not known yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub ack_uri: Url,
    pub start_time: Instant,
    pub last_poll_time: Option<Instant>,
}

impl PendingCommand {
    pub fn new(ack_uri: Url, start_time: Instant) -> Self {
        Self {
            ack_uri,
            start_time,
            last_poll_time: None,
        }
    }
}

/// What a single [`CommandQueue::drain_one`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Empty,
    /// Checked too recently; moved to the tail untouched.
    Throttled,
    /// Not resolved yet; moved to the tail with a new poll time.
    Retrying,
    Expired,
    Rejected(AckStatus),
    Acknowledged(String),
}

impl DrainOutcome {
    /// The response line, when the command was acknowledged.
    pub fn into_line(self) -> Option<String> {
        match self {
            DrainOutcome::Acknowledged(line) => Some(line),
            _ => None,
        }
    }
}

/// FIFO of pending commands, drained one entry per call.
#[derive(Debug)]
pub struct CommandQueue {
    pending: Mutex<VecDeque<PendingCommand>>,
    recheck_interval: Duration,
    ack_timeout: Duration,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::with_limits(RECHECK_INTERVAL, ACK_TIMEOUT)
    }

    pub fn with_limits(recheck_interval: Duration, ack_timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            recheck_interval,
            ack_timeout,
        }
    }

    pub async fn enqueue(&self, ack_uri: Url) {
        self.enqueue_at(ack_uri, Instant::now()).await;
    }

    pub async fn enqueue_at(&self, ack_uri: Url, now: Instant) {
        self.push(PendingCommand::new(ack_uri, now)).await;
    }

    pub async fn push(&self, command: PendingCommand) {
        self.pending.lock().await.push_back(command);
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<PendingCommand> {
        self.pending.lock().await.iter().cloned().collect()
    }

    pub async fn clear(&self) {
        self.pending.lock().await.clear();
    }

    /// Takes the oldest pending command and, unless it was checked within the recheck
    /// interval, looks up its acknowledgement once.
    ///
    /// The head is popped under the lock, so concurrent drainers never look up the same entry.
    pub async fn drain_one(&self, service: &dyn PrintService, now: Instant) -> DrainOutcome {
        let Some(command) = self.pending.lock().await.pop_front() else {
            return DrainOutcome::Empty;
        };

        let since_start = now.saturating_duration_since(command.start_time);
        let since_last_poll = command
            .last_poll_time
            .map_or(since_start, |last| now.saturating_duration_since(last));

        if since_last_poll < self.recheck_interval {
            self.push(command).await;
            return DrainOutcome::Throttled;
        }

        let ack = match service.command_ack(&command.ack_uri).await {
            Ok(ack) if ack.status.is_terminal_failure() => {
                tracing::debug!("Dropping command {} after status {:?}", command.ack_uri, ack.status);
                return DrainOutcome::Rejected(ack.status);
            }
            Ok(ack) if ack.status == AckStatus::Ok => ack,
            Ok(ack) => {
                tracing::trace!("Command {} still {:?}", command.ack_uri, ack.status);
                return self.retry(command, since_start, now).await;
            }
            Err(e) => {
                tracing::debug!("Lookup of {} failed: {}", command.ack_uri, e);
                return self.retry(command, since_start, now).await;
            }
        };

        tracing::debug!(
            "Got response: {:?}, for command: {:?}",
            ack.response,
            ack.command
        );
        DrainOutcome::Acknowledged(ack.response.unwrap_or_default())
    }

    async fn retry(&self, mut command: PendingCommand, since_start: Duration, now: Instant) -> DrainOutcome {
        if since_start < self.ack_timeout {
            command.last_poll_time = Some(now);
            self.push(command).await;
            DrainOutcome::Retrying
        } else {
            tracing::debug!("Giving up on command {} after {:?}", command.ack_uri, since_start);
            DrainOutcome::Expired
        }
    }
}
