use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio::{spawn, task};
use tracing::{debug, warn};

use crate::errors::{LinkError, Result};

/// Largest datagram we expect on either port.  Video chunks from the drone
/// are at most 1460 bytes; command replies are far smaller.
pub(crate) const MAX_DATAGRAM_SIZE: usize = 2048;

/// A UDP socket with its receive path pulled off onto a dedicated task.
///
/// Inbound datagrams are read as soon as they arrive and queued internally,
/// so a caller that is slow to ask for the next message never causes
/// OS-level receive-buffer drops.  A socket-level receive error is queued
/// in order like any datagram, then the listener stops.
#[derive(Debug)]
pub(crate) struct DatagramChannel {
    sock: Arc<UdpSocket>,
    inbound: mpsc::UnboundedReceiver<io::Result<Vec<u8>>>,
    listener: task::JoinHandle<()>,
}

impl DatagramChannel {
    /// Binds `0.0.0.0:local_port` and starts the listener.  Port 0 asks
    /// the OS for an ephemeral port.
    pub(crate) async fn open(local_port: u16) -> Result<Self> {
        let sock = Arc::new(UdpSocket::bind(("0.0.0.0", local_port)).await?);
        debug!(local = %sock.local_addr()?, "datagram channel open");

        let (tx, rx) = mpsc::unbounded_channel();
        let listener_sock = Arc::clone(&sock);
        let listener = spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                match listener_sock.recv_from(&mut buf).await {
                    Ok((n, _peer)) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "datagram receive failed, listener stopping");
                        let _ = tx.send(Err(err));
                        break;
                    }
                }
            }
        });

        Ok(Self { sock, inbound: rx, listener })
    }

    pub(crate) fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.sock.local_addr()?)
    }

    pub(crate) async fn send_to(&self, target: SocketAddr, bytes: &[u8]) -> Result<()> {
        self.sock.send_to(bytes, target).await?;
        Ok(())
    }

    /// Next queued datagram, or [`LinkError::TimedOut`] after `deadline`.
    pub(crate) async fn recv(&mut self, deadline: Duration) -> Result<Vec<u8>> {
        match timeout(deadline, self.inbound.recv()).await {
            Ok(Some(Ok(datagram))) => Ok(datagram),
            Ok(Some(Err(err))) => Err(LinkError::Transport(err)),
            Ok(None) => Err(LinkError::Transport(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "datagram listener stopped",
            ))),
            Err(_) => Err(LinkError::TimedOut),
        }
    }

    /// Next queued datagram, waiting indefinitely.  `None` once the
    /// listener has stopped and the queue is exhausted.
    pub(crate) async fn recv_next(&mut self) -> Option<io::Result<Vec<u8>>> {
        self.inbound.recv().await
    }

    /// Discards everything queued so far.
    ///
    /// Called before each command send so a stale reply to an earlier,
    /// timed-out command cannot be attributed to the new one.
    pub(crate) fn drain(&mut self) {
        while let Ok(msg) = self.inbound.try_recv() {
            if let Ok(datagram) = msg {
                debug!(len = datagram.len(), "discarding stale datagram");
            }
        }
    }

    /// Stops the listener and waits until its socket reference is gone,
    /// so the local port is certainly free to rebind on return.  Dropping
    /// the channel releases the port too, just not synchronously.
    pub(crate) async fn close(mut self) {
        self.listener.abort();
        let _ = (&mut self.listener).await;
    }
}

impl Drop for DatagramChannel {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_datagrams_in_arrival_order() -> anyhow::Result<()> {
        let mut chan = DatagramChannel::open(0).await?;
        let target = SocketAddr::from(([127, 0, 0, 1], chan.local_addr()?.port()));

        let sender = UdpSocket::bind("0.0.0.0:0").await?;
        sender.send_to(b"first", target).await?;
        sender.send_to(b"second", target).await?;

        let a = chan.recv(Duration::from_secs(1)).await?;
        let b = chan.recv(Duration::from_secs(1)).await?;
        assert_eq!(a, b"first");
        assert_eq!(b, b"second");
        Ok(())
    }

    #[tokio::test]
    async fn recv_times_out_when_nothing_arrives() -> anyhow::Result<()> {
        let mut chan = DatagramChannel::open(0).await?;
        let err = chan.recv(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, LinkError::TimedOut));
        Ok(())
    }

    #[tokio::test]
    async fn drain_discards_queued_datagrams() -> anyhow::Result<()> {
        let mut chan = DatagramChannel::open(0).await?;
        let target = SocketAddr::from(([127, 0, 0, 1], chan.local_addr()?.port()));

        let sender = UdpSocket::bind("0.0.0.0:0").await?;
        sender.send_to(b"stale", target).await?;
        // let the listener pick it up
        tokio::time::sleep(Duration::from_millis(50)).await;

        chan.drain();
        let err = chan.recv(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, LinkError::TimedOut));
        Ok(())
    }
}
