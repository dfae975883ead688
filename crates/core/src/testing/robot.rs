//! Simulated robot controller.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::device::protocol::{
    PICKUP_COMPLETE, PICKUP_PRINT, PLACE_BAD, PLACE_BAD_COMPLETE, PLACE_GOOD, PLACE_GOOD_COMPLETE,
};
use crate::device::DeviceLink;

#[derive(Debug, Clone, Default)]
struct Behavior {
    /// Never acknowledge.
    silent: bool,
    /// Command verbs that go unacknowledged.
    ignored: Vec<String>,
    /// Wait before replying.
    delay: Duration,
    /// Sent before each acknowledgement.
    preamble: Vec<String>,
}

/// The controller side of an in-memory connection to a [`DeviceLink`].
///
/// Acknowledges every command with the matching `*_COMPLETE` message unless
/// told otherwise. Dropping it closes the connection.
///
/// # Example
///
/// ```rust,ignore
/// let (link, inbox) = DeviceLink::new();
/// let robot = SimulatedRobot::connect(&link);
/// robot.ignore("ROBOT_PICKUP_PRINT").await;
/// ```
pub struct SimulatedRobot {
    accepted: bool,
    commands: Arc<RwLock<Vec<String>>>,
    behavior: Arc<RwLock<Behavior>>,
    writer: Arc<Mutex<WriteHalf<DuplexStream>>>,
    task: JoinHandle<()>,
}

/// The acknowledgement a well-behaved controller sends for `command`.
pub fn acknowledgement_for(command: &str) -> Option<&'static str> {
    match command.split_whitespace().next()? {
        PICKUP_PRINT => Some(PICKUP_COMPLETE),
        PLACE_GOOD => Some(PLACE_GOOD_COMPLETE),
        PLACE_BAD => Some(PLACE_BAD_COMPLETE),
        _ => None,
    }
}

impl SimulatedRobot {
    /// Connect to `link`. Check [`SimulatedRobot::accepted`] when another
    /// controller may already be connected.
    pub fn connect(link: &Arc<DeviceLink>) -> Self {
        let (client, server) = duplex(1024);
        let accepted = link.accept(server, "simulated-robot");

        let (mut reader, writer) = tokio::io::split(client);
        let writer = Arc::new(Mutex::new(writer));
        let commands = Arc::new(RwLock::new(Vec::new()));
        let behavior = Arc::new(RwLock::new(Behavior::default()));

        let task = {
            let commands = Arc::clone(&commands);
            let behavior = Arc::clone(&behavior);
            let writer = Arc::clone(&writer);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    let n = match reader.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    let command = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                    commands.write().await.push(command.clone());

                    let behavior = behavior.read().await.clone();
                    let verb = command.split_whitespace().next().unwrap_or_default();
                    if behavior.silent || behavior.ignored.iter().any(|v| v == verb) {
                        continue;
                    }
                    if !behavior.delay.is_zero() {
                        tokio::time::sleep(behavior.delay).await;
                    }

                    let mut writer = writer.lock().await;
                    for message in &behavior.preamble {
                        if writer.write_all(format!("{}\n", message).as_bytes()).await.is_err() {
                            return;
                        }
                    }
                    if let Some(ack) = acknowledgement_for(&command) {
                        if writer.write_all(format!("{}\n", ack).as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            })
        };

        Self {
            accepted,
            commands,
            behavior,
            writer,
            task,
        }
    }

    pub fn accepted(&self) -> bool {
        self.accepted
    }

    /// Commands received so far, in order.
    pub async fn commands(&self) -> Vec<String> {
        self.commands.read().await.clone()
    }

    /// Stop acknowledging anything.
    pub async fn set_silent(&self, silent: bool) {
        self.behavior.write().await.silent = silent;
    }

    /// Stop acknowledging commands with this verb.
    pub async fn ignore(&self, verb: &str) {
        self.behavior.write().await.ignored.push(verb.to_string());
    }

    pub async fn set_delay(&self, delay: Duration) {
        self.behavior.write().await.delay = delay;
    }

    /// Messages to send ahead of each acknowledgement.
    pub async fn set_preamble(&self, messages: &[&str]) {
        self.behavior.write().await.preamble = messages.iter().map(|m| m.to_string()).collect();
    }

    /// Send an unsolicited message.
    pub async fn send(&self, message: &str) {
        let _ = self
            .writer
            .lock()
            .await
            .write_all(format!("{}\n", message).as_bytes())
            .await;
    }
}

impl Drop for SimulatedRobot {
    fn drop(&mut self) {
        self.task.abort();
    }
}
