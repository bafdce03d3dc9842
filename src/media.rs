use std::sync::{Arc, Mutex as StdMutex};

use bytebuffer::ByteBuffer;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio::{spawn, task};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::DatagramChannel;
use crate::command::DroneCommand;
use crate::errors::{LinkError, Result};
use crate::transactor::CommandTransactor;

/// The media ingest side of the link: the drone pushes raw payload
/// datagrams, unsolicited, to a fixed local port once streaming is on.
///
/// Two session types use that port and they are mutually exclusive - a
/// capture while recording (or vice versa) fails with
/// [`LinkError::SessionConflict`].  The socket is bound when a session
/// starts and released when it ends, never shared with the command path.
pub(crate) struct MediaChannel {
    ingest_port: u16,
    session: Mutex<MediaSession>,
}

enum MediaSession {
    Idle,
    Capturing,
    Recording(Recording),
}

struct Recording {
    accumulator: Arc<StdMutex<ByteBuffer>>,
    cancel: CancellationToken,
    task: task::JoinHandle<()>,
}

impl MediaChannel {
    pub(crate) fn new(ingest_port: u16) -> Self {
        Self { ingest_port, session: Mutex::new(MediaSession::Idle) }
    }

    /// Asks the drone for one still frame and returns the first datagram
    /// that lands on the ingest port, verbatim.
    ///
    /// A snapshot is assumed to fit in a single datagram; later packets
    /// are not consumed.  The socket is released before returning, on
    /// success and failure alike.
    pub(crate) async fn capture_photo(
        &self,
        transactor: &CommandTransactor,
        deadline: Duration,
    ) -> Result<Vec<u8>> {
        {
            let mut session = self.session.lock().await;
            match *session {
                MediaSession::Idle => *session = MediaSession::Capturing,
                _ => return Err(LinkError::SessionConflict),
            }
        }

        let result = self.receive_snapshot(transactor, deadline).await;
        *self.session.lock().await = MediaSession::Idle;
        result
    }

    async fn receive_snapshot(
        &self,
        transactor: &CommandTransactor,
        deadline: Duration,
    ) -> Result<Vec<u8>> {
        transactor.send(&DroneCommand::Snapshot, deadline).await?;

        let mut channel = DatagramChannel::open(self.ingest_port).await?;
        let received = channel.recv(deadline).await;
        channel.close().await;

        let payload = received?;
        info!(len = payload.len(), "captured photo");
        Ok(payload)
    }

    /// Binds the ingest port and starts appending every inbound datagram,
    /// in arrival order, to a fresh accumulator.
    pub(crate) async fn start_recording(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        match *session {
            MediaSession::Recording(_) => return Err(LinkError::AlreadyRecording),
            MediaSession::Capturing => return Err(LinkError::SessionConflict),
            MediaSession::Idle => {}
        }

        let mut channel = DatagramChannel::open(self.ingest_port).await?;
        let accumulator = Arc::new(StdMutex::new(ByteBuffer::new()));
        let sink = Arc::clone(&accumulator);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = channel.recv_next() => match msg {
                        Some(Ok(chunk)) => {
                            // UDP delivery order is trusted as-is
                            sink.lock().unwrap().write_bytes(&chunk);
                        }
                        Some(Err(err)) => {
                            warn!(%err, "recording socket failed");
                            break;
                        }
                        None => break,
                    },
                }
            }
            // frees the ingest port before the stop call returns
            channel.close().await;
        });

        info!(port = self.ingest_port, "recording started");
        *session = MediaSession::Recording(Recording { accumulator, cancel, task });
        Ok(())
    }

    /// Stops accumulating, releases the socket and hands back everything
    /// received so far as one contiguous payload.
    pub(crate) async fn stop_recording(&self) -> Result<Vec<u8>> {
        let mut session = self.session.lock().await;
        match std::mem::replace(&mut *session, MediaSession::Idle) {
            MediaSession::Recording(recording) => {
                recording.cancel.cancel();
                let _ = recording.task.await;
                let accumulator = std::mem::replace(
                    &mut *recording.accumulator.lock().unwrap(),
                    ByteBuffer::new(),
                );
                let bytes = accumulator.into_vec();
                info!(len = bytes.len(), "recording stopped");
                Ok(bytes)
            }
            other => {
                *session = other;
                Err(LinkError::NotRecording)
            }
        }
    }

    /// Best-effort teardown on disconnect; any unsaved bytes are lost.
    pub(crate) async fn abort_recording(&self) {
        let mut session = self.session.lock().await;
        match std::mem::replace(&mut *session, MediaSession::Idle) {
            MediaSession::Recording(recording) => {
                debug!("aborting in-progress recording");
                recording.cancel.cancel();
                let _ = recording.task.await;
            }
            other => *session = other,
        }
    }
}
