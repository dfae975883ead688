//! The single physical connection to the robot controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics;

use super::protocol::{decode_chunk, READ_BUFFER_SIZE};

/// Errors from the device link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No controller is connected.
    #[error("no robot controller connected")]
    NotConnected,

    /// Writing to the controller failed; the session has been torn down.
    #[error("write to robot controller failed: {0}")]
    Write(#[from] std::io::Error),
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The live session. Only the link touches the writer.
struct Session {
    id: u64,
    peer: String,
    connected_at: DateTime<Utc>,
    writer: Arc<tokio::sync::Mutex<BoxedWriter>>,
    closed: Arc<Notify>,
}

/// Snapshot of the live session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: u64,
    pub peer: String,
    pub connected_at: DateTime<Utc>,
}

/// Receiving end of the inbound message queue.
///
/// Messages arrive in the order the controller sent them. Whoever holds the
/// inbox is the only consumer.
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<String>,
}

impl Inbox {
    /// Wait for the next message until `deadline`. `None` once the deadline passes.
    pub async fn recv_until(&mut self, deadline: Instant) -> Option<String> {
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(message)) => Some(message),
            Ok(None) => {
                // Every sender is gone; nothing can arrive before the deadline.
                tokio::time::sleep_until(deadline).await;
                None
            }
            Err(_) => None,
        }
    }
}

/// Owns the one permitted controller connection.
///
/// At most one session is live. A connection offered while one is live is
/// closed immediately. The session ends on disconnect, read error, the first
/// failed write, or [`DeviceLink::disconnect`].
pub struct DeviceLink {
    session: Mutex<Option<Session>>,
    inbound_tx: mpsc::UnboundedSender<String>,
    next_session_id: AtomicU64,
}

impl DeviceLink {
    /// Create a link and the inbox its receive loops feed.
    pub fn new() -> (Arc<Self>, Inbox) {
        let (inbound_tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(Self {
            session: Mutex::new(None),
            inbound_tx,
            next_session_id: AtomicU64::new(0),
        });
        (link, Inbox { rx })
    }

    fn slot(&self) -> MutexGuard<'_, Option<Session>> {
        // The guarded value is always consistent, so a poisoned lock is still usable.
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offer a freshly accepted connection.
    ///
    /// Returns `false` (and closes `stream`) if a session is already live.
    pub fn accept<S>(self: &Arc<Self>, stream: S, peer: &str) -> bool
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut slot = self.slot();
        if let Some(existing) = slot.as_ref() {
            warn!(
                peer = %peer,
                live_peer = %existing.peer,
                "Another client tried to connect while a controller is live, closing it"
            );
            metrics::DEVICE_CONNECTIONS
                .with_label_values(&["rejected"])
                .inc();
            return false;
        }

        let (reader, writer) = tokio::io::split(stream);
        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        let closed = Arc::new(Notify::new());

        *slot = Some(Session {
            id,
            peer: peer.to_string(),
            connected_at: Utc::now(),
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(writer))),
            closed: Arc::clone(&closed),
        });
        drop(slot);

        info!(peer = %peer, session_id = id, "Robot controller connected");
        metrics::DEVICE_CONNECTIONS
            .with_label_values(&["accepted"])
            .inc();

        tokio::spawn(Arc::clone(self).receive_loop(id, peer.to_string(), reader, closed));
        true
    }

    /// Send a command to the live controller.
    ///
    /// No retry: a failed write tears the session down.
    pub async fn send(&self, command: &str) -> Result<(), LinkError> {
        let (id, writer) = {
            let slot = self.slot();
            let session = slot.as_ref().ok_or(LinkError::NotConnected)?;
            (session.id, Arc::clone(&session.writer))
        };

        debug!(session_id = id, command = %command, "Sending command to controller");
        let result = {
            let mut writer = writer.lock().await;
            match writer.write_all(command.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };

        if let Err(e) = result {
            warn!(session_id = id, error = %e, "Failed to send command, connection likely lost");
            self.teardown(id, "write failed");
            return Err(LinkError::Write(e));
        }
        Ok(())
    }

    /// Whether a controller is connected right now.
    pub fn is_live(&self) -> bool {
        self.slot().is_some()
    }

    /// The connected controller's address, if any.
    /// Details of the live session, or `None` when no controller is connected.
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.slot().as_ref().map(|s| SessionInfo {
            session_id: s.id,
            peer: s.peer.clone(),
            connected_at: s.connected_at,
        })
    }

    /// Drop the live session, if any.
    pub fn disconnect(&self) {
        let id = self.slot().as_ref().map(|s| s.id);
        if let Some(id) = id {
            self.teardown(id, "disconnect requested");
        }
    }

    /// Clear session `id` if it is still the live one.
    fn teardown(&self, id: u64, reason: &str) {
        let removed = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(session) if session.id == id => slot.take(),
                _ => None,
            }
        };

        if let Some(session) = removed {
            session.closed.notify_one();
            info!(
                peer = %session.peer,
                session_id = id,
                reason = reason,
                "Robot controller session closed"
            );
        }
    }

    async fn receive_loop<R>(
        self: Arc<Self>,
        id: u64,
        peer: String,
        mut reader: ReadHalf<R>,
        closed: Arc<Notify>,
    ) where
        R: AsyncRead + AsyncWrite + Send,
    {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let reason = loop {
            tokio::select! {
                _ = closed.notified() => break "session closed",
                result = reader.read(&mut buf) => match result {
                    Ok(0) => break "disconnected",
                    Ok(n) => {
                        for message in decode_chunk(&buf[..n]) {
                            debug!(peer = %peer, message = %message, "Received from controller");
                            if self.inbound_tx.send(message).is_err() {
                                debug!("Inbox dropped, discarding controller message");
                            }
                        }
                    }
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "Error reading from controller");
                        break "read error";
                    }
                },
            }
        };

        self.teardown(id, reason);
    }
}
