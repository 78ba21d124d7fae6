//! Command relay.
//!
//! Client applications send JS8Call API commands to the monitor, naming the
//! radio they are for. Once a command clears authorization the pipeline
//! queues it here and the relay sends the original JSON on to the radio.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::envelope::Origin;
use crate::event::CommandKind;
use crate::sinks::SinkError;
use crate::stats::MonitorStats;

/// A command bound for a radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCommand {
    /// Where the radio's JS8Call API listens.
    pub radio: Origin,
    /// Friendly name of the radio host.
    pub radio_name: String,
    pub kind: CommandKind,
    /// The command JSON exactly as received.
    pub payload: String,
}

/// Sends queued commands to radios over UDP.
pub struct CommandRelay {
    socket: UdpSocket,
    stats: Option<Arc<MonitorStats>>,
}

impl CommandRelay {
    pub async fn bind() -> Result<Self, SinkError> {
        Ok(Self {
            socket: UdpSocket::bind("0.0.0.0:0").await?,
            stats: None,
        })
    }

    pub fn with_stats(mut self, stats: Arc<MonitorStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Relay one command. Returns `false` for a test message, which is only
    /// logged.
    pub async fn send(&self, command: &RelayCommand) -> Result<bool, SinkError> {
        info!(
            target: "smdr",
            "{} from {} ({})",
            command.kind.description(),
            command.radio.ip,
            command.radio_name
        );

        if command.kind == CommandKind::Test {
            return Ok(false);
        }

        self.socket
            .send_to(
                command.payload.as_bytes(),
                (command.radio.ip.as_str(), command.radio.port),
            )
            .await?;
        debug!("Relayed {} to {}", command.kind, command.radio);
        Ok(true)
    }

    /// Drain the queue until every sender is gone.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<RelayCommand>) {
        while let Some(command) = rx.recv().await {
            match self.send(&command).await {
                Ok(true) => {
                    if let Some(stats) = &self.stats {
                        stats.record_command_relayed();
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to relay {} to {}: {}", command.kind, command.radio, e);
                    if let Some(stats) = &self.stats {
                        stats.record_sink_failure("relay");
                    }
                }
            }
        }
        debug!("Command relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn command(kind: CommandKind, port: u16) -> RelayCommand {
        RelayCommand {
            radio: Origin::new("127.0.0.1", port),
            radio_name: "Shack".to_string(),
            kind,
            payload: r#"{"type":"RIG.SET_FREQ","params":{"DIAL":14078000}}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn test_relay_sends_payload_verbatim() {
        let radio = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = radio.local_addr().unwrap().port();
        let relay = CommandRelay::bind().await.unwrap();

        let cmd = command(CommandKind::RigSetFreq, port);
        assert!(relay.send(&cmd).await.unwrap());

        let mut buf = [0u8; 1024];
        let (n, _) = radio.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], cmd.payload.as_bytes());
    }

    #[tokio::test]
    async fn test_test_message_is_not_sent() {
        let radio = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = radio.local_addr().unwrap().port();
        let relay = CommandRelay::bind().await.unwrap();

        assert!(!relay.send(&command(CommandKind::Test, port)).await.unwrap());

        let mut buf = [0u8; 64];
        let nothing = tokio::time::timeout(Duration::from_millis(100), radio.recv_from(&mut buf)).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_run_drains_queue() {
        let radio = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = radio.local_addr().unwrap().port();
        let stats = Arc::new(MonitorStats::new());
        let relay = CommandRelay::bind().await.unwrap().with_stats(stats.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(command(CommandKind::RigSetFreq, port)).unwrap();
        tx.send(command(CommandKind::Test, port)).unwrap();
        tx.send(command(CommandKind::RigGetFreq, port)).unwrap();
        drop(tx);

        relay.run(rx).await;
        assert_eq!(stats.summary().commands_relayed, 2);
    }
}
