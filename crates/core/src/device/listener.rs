//! TCP accept loop for the robot controller port.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::link::DeviceLink;

/// Back-off after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct DeviceListener {
    listener: TcpListener,
    link: Arc<DeviceLink>,
}

impl DeviceListener {
    pub async fn bind(addr: SocketAddr, link: Arc<DeviceLink>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, link })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires, handing each to the link.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(addr = %addr, "Waiting for robot controller connections");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Device listener received shutdown signal");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        // A rejected stream is dropped, which closes it.
                        self.link.accept(stream, &peer.to_string());
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept controller connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        self.link.disconnect();
    }
}
