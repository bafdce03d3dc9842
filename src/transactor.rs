use std::net::SocketAddr;

use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{debug, info};

use crate::channel::DatagramChannel;
use crate::command::{CommandResponse, DroneCommand};
use crate::errors::{LinkError, Result};

/// Sends one command at a time and pairs it with the next inbound datagram.
///
/// The wire protocol has no request identifiers, so correlation is purely
/// positional: the reply to a command is whatever arrives next on the
/// command port.  That is only sound while at most one command is
/// outstanding, and the lock on the channel is what enforces it - a second
/// `send` while one is pending fails with [`LinkError::Busy`] without
/// writing any bytes.
#[derive(Debug)]
pub(crate) struct CommandTransactor {
    remote: SocketAddr,
    // Holding this lock IS the pending transaction.
    pending: Mutex<DatagramChannel>,
}

impl CommandTransactor {
    pub(crate) fn new(remote: SocketAddr, channel: DatagramChannel) -> Self {
        Self { remote, pending: Mutex::new(channel) }
    }

    pub(crate) async fn send(
        &self,
        command: &DroneCommand,
        deadline: Duration,
    ) -> Result<CommandResponse> {
        let mut channel = self.pending.try_lock().map_err(|_| LinkError::Busy)?;

        // Anything still queued belongs to an earlier command that timed
        // out; it must not resolve this one.
        channel.drain();

        let text = command.wire_text();
        info!(command = text, "SEND");
        channel.send_to(self.remote, text.as_bytes()).await?;

        let raw = channel.recv(deadline).await?;
        // whatever the bytes, the reply is classified as text
        let reply = String::from_utf8_lossy(&raw);
        let reply = reply.trim();
        debug!(command = text, reply, "RECEIVED");

        CommandResponse::parse(reply).map_err(LinkError::ProtocolFailure)
    }
}
