use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::channel::DatagramChannel;
use crate::command::{CommandResponse, DroneCommand};
use crate::errors::{LinkError, Result};
use crate::media::MediaChannel;
use crate::options::LinkOptions;
use crate::telemetry::{TelemetryMonitor, TelemetryReceiver, TelemetrySample};
use crate::transactor::CommandTransactor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Off,
    On,
}

/// The drone link: one command socket, one media socket, one connection.
///
/// Construct one per drone and keep it wherever your application composes
/// its services - there is no global instance.  All operations are
/// methods; state changes are published on watch channels so the UI layer
/// can subscribe and drop its receiver to unsubscribe.
///
/// ```no_run
/// use tello_link::{DroneLink, LinkOptions};
///
/// # async fn fly() -> tello_link::Result<()> {
/// let link = DroneLink::new(LinkOptions::default());
/// link.connect().await?;
/// link.take_off().await?;
/// link.land().await?;
/// link.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct DroneLink {
    options: LinkOptions,
    media: MediaChannel,
    // Serializes connect/disconnect/session transitions.
    inner: Mutex<LinkInner>,
    connection_tx: watch::Sender<ConnectionState>,
    connection_rx: watch::Receiver<ConnectionState>,
    stream_tx: watch::Sender<StreamState>,
    stream_rx: watch::Receiver<StreamState>,
    telemetry_tx: Arc<watch::Sender<TelemetrySample>>,
    telemetry_rx: TelemetryReceiver,
}

#[derive(Debug, Default)]
struct LinkInner {
    transactor: Option<Arc<CommandTransactor>>,
    monitor: Option<TelemetryMonitor>,
}

impl DroneLink {
    pub fn new(options: LinkOptions) -> Self {
        let (connection_tx, connection_rx) = watch::channel(ConnectionState::Disconnected);
        let (stream_tx, stream_rx) = watch::channel(StreamState::Off);
        let (telemetry_tx, telemetry_rx) = watch::channel(TelemetrySample::default());
        Self {
            media: MediaChannel::new(options.media_ingest_port),
            options,
            inner: Mutex::new(LinkInner::default()),
            connection_tx,
            connection_rx,
            stream_tx,
            stream_rx,
            telemetry_tx: Arc::new(telemetry_tx),
            telemetry_rx,
        }
    }

    /// Opens the command socket, puts the drone in command mode and starts
    /// the telemetry poll.  A no-op when already connected; on failure the
    /// link stays Disconnected.
    pub async fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.transactor.is_some() {
            return Ok(());
        }

        info!(drone = %self.options.command_endpoint, "connecting");
        let channel = DatagramChannel::open(0).await?;
        let transactor = Arc::new(CommandTransactor::new(
            self.options.command_endpoint,
            channel,
        ));

        transactor
            .send(&DroneCommand::Init, self.options.command_timeout)
            .await?;

        inner.monitor = Some(TelemetryMonitor::start(
            Arc::clone(&transactor),
            Arc::clone(&self.telemetry_tx),
            self.options.telemetry_interval,
            self.options.command_timeout,
        ));
        inner.transactor = Some(transactor);
        let _ = self.connection_tx.send(ConnectionState::Connected);
        info!("connected");
        Ok(())
    }

    /// Stops the telemetry poll, closes the command socket and aborts any
    /// in-progress recording (unsaved bytes are discarded).  Idempotent.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(monitor) = inner.monitor.take() {
            monitor.stop();
        }
        if inner.transactor.take().is_some() {
            info!("disconnected");
        }
        drop(inner);

        self.media.abort_recording().await;
        let _ = self.stream_tx.send(StreamState::Off);
        let _ = self.connection_tx.send(ConnectionState::Disconnected);
    }

    /// Sends a raw command and waits for its reply.
    ///
    /// May return [`LinkError::Busy`] if the telemetry poll has a command
    /// in flight; back off and retry.
    pub async fn send_command(&self, command: &str) -> Result<CommandResponse> {
        self.transact(&DroneCommand::from(command)).await
    }

    pub async fn take_off(&self) -> Result<()> {
        self.transact(&DroneCommand::TakeOff).await.map(|_| ())
    }

    pub async fn land(&self) -> Result<()> {
        self.transact(&DroneCommand::Land).await.map(|_| ())
    }

    /// Stops all motors immediately.
    pub async fn emergency(&self) -> Result<()> {
        self.transact(&DroneCommand::EmergencyStop).await.map(|_| ())
    }

    /// Turns the media stream on or off.
    ///
    /// StreamState only moves to On on an `ok` reply; any failure forces
    /// it Off whatever it was before.
    pub async fn set_stream(&self, enabled: bool) -> Result<()> {
        let command = if enabled {
            DroneCommand::StreamOn
        } else {
            DroneCommand::StreamOff
        };
        match self.transact(&command).await {
            Ok(CommandResponse::Ok) => {
                let state = if enabled { StreamState::On } else { StreamState::Off };
                let _ = self.stream_tx.send(state);
                Ok(())
            }
            Ok(CommandResponse::Value(n)) => {
                let _ = self.stream_tx.send(StreamState::Off);
                Err(LinkError::ProtocolFailure(n.to_string()))
            }
            Err(err) => {
                let _ = self.stream_tx.send(StreamState::Off);
                Err(err)
            }
        }
    }

    /// Asks the drone for a still frame and returns its raw bytes.
    ///
    /// The frame is whatever single datagram the drone pushes first - a
    /// snapshot is assumed to fit in one datagram.
    pub async fn capture_photo(&self) -> Result<Vec<u8>> {
        let transactor = self.require_connected().await?;
        self.require_streaming()?;
        self.media
            .capture_photo(&transactor, self.options.command_timeout)
            .await
    }

    /// Starts accumulating stream datagrams until [`stop_recording`].
    ///
    /// [`stop_recording`]: DroneLink::stop_recording
    pub async fn start_recording(&self) -> Result<()> {
        let _ = self.require_connected().await?;
        self.require_streaming()?;
        self.media.start_recording().await
    }

    /// Returns everything recorded so far as one contiguous payload.
    pub async fn stop_recording(&self) -> Result<Vec<u8>> {
        self.media.stop_recording().await
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_rx.borrow()
    }

    pub fn stream_state(&self) -> StreamState {
        *self.stream_rx.borrow()
    }

    /// Subscriptions for the UI layer; drop the receiver to unsubscribe.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection_rx.clone()
    }

    pub fn watch_stream(&self) -> watch::Receiver<StreamState> {
        self.stream_rx.clone()
    }

    pub fn watch_telemetry(&self) -> TelemetryReceiver {
        self.telemetry_rx.clone()
    }

    /// A transport failure on the command path makes further commands
    /// meaningless, so it forces a disconnect before surfacing.
    async fn transact(&self, command: &DroneCommand) -> Result<CommandResponse> {
        let transactor = self.require_connected().await?;
        let result = transactor
            .send(command, self.options.command_timeout)
            .await;
        match &result {
            Ok(response) => self.publish_query_result(command, response),
            Err(LinkError::Transport(_)) => {
                warn!(%command, "command socket failed, dropping the link");
                self.disconnect().await;
            }
            Err(_) => {}
        }
        result
    }

    /// A user-issued status query feeds the telemetry sample too, exactly
    /// like a monitor poll would.
    fn publish_query_result(&self, command: &DroneCommand, response: &CommandResponse) {
        let Some(value) = response.value() else { return };
        match command.wire_text() {
            "battery?" if (0..=100).contains(&value) => {
                self.telemetry_tx.send_modify(|sample| {
                    sample.battery_percent = Some(value as u8);
                    sample.observed_at = Instant::now();
                });
            }
            "time?" if value >= 0 => {
                self.telemetry_tx.send_modify(|sample| {
                    sample.flight_time_seconds = Some(value as u32);
                    sample.observed_at = Instant::now();
                });
            }
            _ => {}
        }
    }

    async fn require_connected(&self) -> Result<Arc<CommandTransactor>> {
        self.inner
            .lock()
            .await
            .transactor
            .clone()
            .ok_or(LinkError::NotConnected)
    }

    fn require_streaming(&self) -> Result<()> {
        match self.stream_state() {
            StreamState::On => Ok(()),
            StreamState::Off => Err(LinkError::NotStreaming),
        }
    }
}

impl Default for DroneLink {
    fn default() -> Self {
        Self::new(LinkOptions::default())
    }
}
