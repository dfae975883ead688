//! Pairs each outbound command with its acknowledgement.
//!
//! The protocol carries no request identifiers, so correlation is positional:
//! exactly one command is outstanding at a time and the next message equal to
//! its expected acknowledgement confirms it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics;

use super::link::{DeviceLink, Inbox, LinkError};
use super::protocol::Command;

/// What to do with a message that is not the awaited acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Log it and keep waiting until the deadline.
    #[default]
    Ignore,
    /// Stop waiting and report the mismatch.
    Abort,
}

/// Result of one command round trip.
#[derive(Debug)]
pub enum ExpectOutcome {
    /// The expected acknowledgement arrived before the deadline.
    Matched,
    /// A different message arrived and the policy is [`MismatchPolicy::Abort`].
    Mismatched { actual: String },
    /// The deadline passed. Carries every non-matching message seen meanwhile.
    TimedOut { unexpected: Vec<String> },
    /// The command could not be written.
    SendFailed(LinkError),
}

impl ExpectOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, ExpectOutcome::Matched)
    }

    /// Label used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectOutcome::Matched => "matched",
            ExpectOutcome::Mismatched { .. } => "mismatched",
            ExpectOutcome::TimedOut { .. } => "timed_out",
            ExpectOutcome::SendFailed(_) => "send_failed",
        }
    }
}

pub struct Correlator {
    link: Arc<DeviceLink>,
    inbox: Mutex<Inbox>,
    policy: MismatchPolicy,
}

impl Correlator {
    pub fn new(link: Arc<DeviceLink>, inbox: Inbox, policy: MismatchPolicy) -> Self {
        Self {
            link,
            inbox: Mutex::new(inbox),
            policy,
        }
    }

    /// Send `command` and wait for its acknowledgement.
    ///
    /// The inbox lock is held for the whole round trip, so concurrent callers
    /// are serialized and never see each other's acknowledgements. Messages
    /// that arrived while nothing was outstanding are still queued and are
    /// examined first.
    pub async fn expect(&self, command: &Command) -> ExpectOutcome {
        let mut inbox = self.inbox.lock().await;

        let verb = command.verb().to_string();
        let started = Instant::now();
        let outcome = self.round_trip(&mut inbox, command).await;

        metrics::DEVICE_COMMANDS
            .with_label_values(&[&verb, outcome.as_str()])
            .inc();
        if !matches!(outcome, ExpectOutcome::SendFailed(_)) {
            metrics::ACK_WAIT_DURATION
                .with_label_values(&[&verb])
                .observe(started.elapsed().as_secs_f64());
        }
        outcome
    }

    async fn round_trip(&self, inbox: &mut Inbox, command: &Command) -> ExpectOutcome {
        if let Err(e) = self.link.send(&command.text).await {
            return ExpectOutcome::SendFailed(e);
        }
        info!(
            command = %command.text,
            expected = command.expected_ack,
            timeout_ms = command.timeout.as_millis() as u64,
            "Command sent, awaiting acknowledgement"
        );

        let deadline = Instant::now() + command.timeout;
        let mut unexpected = Vec::new();

        while let Some(message) = inbox.recv_until(deadline).await {
            if message == command.expected_ack {
                debug!(command = %command.text, "Acknowledgement received");
                return ExpectOutcome::Matched;
            }

            warn!(
                command = %command.text,
                expected = command.expected_ack,
                actual = %message,
                "Unexpected message from controller"
            );
            metrics::UNEXPECTED_MESSAGES
                .with_label_values(&[command.verb()])
                .inc();

            if self.policy == MismatchPolicy::Abort {
                return ExpectOutcome::Mismatched { actual: message };
            }
            unexpected.push(message);
        }

        warn!(
            command = %command.text,
            expected = command.expected_ack,
            unexpected = unexpected.len(),
            "Timed out waiting for acknowledgement"
        );
        ExpectOutcome::TimedOut { unexpected }
    }
}
