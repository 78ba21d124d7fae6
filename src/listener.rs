//! UDP listener for the JS8Call API.
//!
//! Every datagram becomes one envelope line (`('ip', port)|<json>`) on an
//! unbounded channel. The listener never blocks on the pipeline.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::envelope::{Envelope, Origin};

/// Largest datagram JS8Call sends, with room to spare.
const MAX_DATAGRAM: usize = 65_535;

/// Receives JS8Call API datagrams.
pub struct Listener {
    socket: UdpSocket,
}

impl Listener {
    /// Bind the listening socket.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let socket = UdpSocket::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind UDP listener on {}", addr))?;
        info!("Listening for JS8Call on {}", socket.local_addr()?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Start receiving in a background task.
    ///
    /// Returns the receiving end of the envelope queue. The task ends when
    /// the receiver is dropped or the socket fails.
    pub fn start(self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            self.run(tx).await;
        });
        rx
    }

    async fn run(self, tx: mpsc::UnboundedSender<String>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!("UDP receive failed: {}", e);
                    break;
                }
            };

            let text = String::from_utf8_lossy(&buf[..n]);
            let text = text.trim();
            if text.is_empty() {
                warn!("Empty datagram from {}", peer);
                continue;
            }
            debug!("{} bytes from {}", n, peer);

            if tx.send(Envelope::format(&Origin::from(peer), text)).is_err() {
                debug!("Envelope queue closed, listener stopping");
                break;
            }
        }
    }
}
