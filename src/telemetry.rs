use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep, Duration, Instant};
use tokio::spawn;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::DroneCommand;
use crate::transactor::CommandTransactor;

/// The most recent polled readings from the drone.
///
/// Fields are `None` until the first successful poll of that query; a
/// failed or timed-out poll keeps the previous reading rather than
/// clearing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub battery_percent: Option<u8>,
    pub flight_time_seconds: Option<u32>,
    pub observed_at: Instant,
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self {
            battery_percent: None,
            flight_time_seconds: None,
            observed_at: Instant::now(),
        }
    }
}

pub type TelemetryReceiver = watch::Receiver<TelemetrySample>;

/// Polls `battery?` then `time?` on a fixed cadence and republishes the
/// parsed values on a watch channel.
///
/// The first poll runs immediately on start.  Stopping cancels any future
/// cycle but never interrupts one already in flight, which finishes and
/// publishes normally.
#[derive(Debug)]
pub(crate) struct TelemetryMonitor {
    cancel: CancellationToken,
}

impl TelemetryMonitor {
    pub(crate) fn start(
        transactor: Arc<CommandTransactor>,
        publisher: Arc<watch::Sender<TelemetrySample>>,
        interval: Duration,
        command_deadline: Duration,
    ) -> Self {
        debug!(?interval, "telemetry monitor starting");
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        spawn(async move {
            loop {
                poll_once(&transactor, &publisher, command_deadline).await;
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(interval) => {}
                }
            }
            debug!("telemetry monitor stopped");
        });
        Self { cancel }
    }

    /// Idempotent; the task winds down on its own after any in-flight
    /// poll completes.
    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TelemetryMonitor {
    fn drop(&mut self) {
        // Cancel rather than abort: a cycle in flight keeps its own
        // handles on the transactor and publisher, finishes, and
        // publishes before the task winds down.
        self.cancel.cancel();
    }
}

async fn poll_once(
    transactor: &CommandTransactor,
    publisher: &watch::Sender<TelemetrySample>,
    deadline: Duration,
) {
    let mut sample = *publisher.borrow();

    match transactor.send(&DroneCommand::QueryBattery, deadline).await {
        Ok(resp) => {
            if let Some(percent) = resp.value().filter(|v| (0..=100).contains(v)) {
                sample.battery_percent = Some(percent as u8);
            }
        }
        Err(err) => warn!(%err, "battery poll failed"),
    }

    match transactor.send(&DroneCommand::QueryFlightTime, deadline).await {
        Ok(resp) => {
            if let Some(seconds) = resp.value().filter(|v| *v >= 0) {
                sample.flight_time_seconds = Some(seconds as u32);
            }
        }
        Err(err) => warn!(%err, "flight time poll failed"),
    }

    sample.observed_at = Instant::now();
    debug!(
        battery = ?sample.battery_percent,
        flight_time = ?sample.flight_time_seconds,
        "telemetry sample"
    );
    let _ = publisher.send(sample);
}

/// Waits for the next published sample.  `None` once the link is gone.
pub async fn next_sample(receiver: &mut TelemetryReceiver) -> Option<TelemetrySample> {
    receiver.changed().await.ok()?;
    Some(*receiver.borrow_and_update())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DatagramChannel;
    use crate::errors::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::UdpSocket;

    /// Replies "87" to battery? and "12" to time?, counting requests.
    async fn fake_drone(counter: Arc<AtomicUsize>) -> Result<std::net::SocketAddr> {
        let sock = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = sock.local_addr()?;
        spawn(async move {
            let mut buf = [0u8; 256];
            while let Ok((n, peer)) = sock.recv_from(&mut buf).await {
                counter.fetch_add(1, Ordering::SeqCst);
                let reply: &[u8] = match &buf[..n] {
                    b"battery?" => b"87",
                    b"time?" => b"12",
                    _ => b"ok",
                };
                let _ = sock.send_to(reply, peer).await;
            }
        });
        Ok(addr)
    }

    #[tokio::test]
    async fn first_poll_runs_immediately() -> anyhow::Result<()> {
        let polls = Arc::new(AtomicUsize::new(0));
        let drone = fake_drone(Arc::clone(&polls)).await?;
        let transactor = Arc::new(CommandTransactor::new(
            drone,
            DatagramChannel::open(0).await?,
        ));
        let (tx, mut rx) = watch::channel(TelemetrySample::default());
        let tx = Arc::new(tx);

        let monitor = TelemetryMonitor::start(
            transactor,
            tx,
            Duration::from_secs(60),
            Duration::from_secs(1),
        );

        let sample = next_sample(&mut rx).await.unwrap();
        assert_eq!(sample.battery_percent, Some(87));
        assert_eq!(sample.flight_time_seconds, Some(12));

        monitor.stop();
        Ok(())
    }

    #[tokio::test]
    async fn no_polls_after_stop() -> anyhow::Result<()> {
        let polls = Arc::new(AtomicUsize::new(0));
        let drone = fake_drone(Arc::clone(&polls)).await?;
        let transactor = Arc::new(CommandTransactor::new(
            drone,
            DatagramChannel::open(0).await?,
        ));
        let (tx, mut rx) = watch::channel(TelemetrySample::default());
        let tx = Arc::new(tx);

        let monitor = TelemetryMonitor::start(
            transactor,
            tx,
            Duration::from_millis(50),
            Duration::from_secs(1),
        );
        let _ = next_sample(&mut rx).await.unwrap();

        monitor.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_stop = polls.load(Ordering::SeqCst);

        // several would-be intervals pass with no further traffic
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(polls.load(Ordering::SeqCst), after_stop);
        Ok(())
    }

    #[tokio::test]
    async fn dropping_the_monitor_mid_cycle_lets_the_poll_finish() -> anyhow::Result<()> {
        // a drone that is slow to answer the battery query
        let sock = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = sock.local_addr()?;
        spawn(async move {
            let mut buf = [0u8; 256];
            while let Ok((n, peer)) = sock.recv_from(&mut buf).await {
                let reply: &[u8] = match &buf[..n] {
                    b"battery?" => {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        b"87"
                    }
                    _ => b"12",
                };
                let _ = sock.send_to(reply, peer).await;
            }
        });

        let transactor = Arc::new(CommandTransactor::new(
            addr,
            DatagramChannel::open(0).await?,
        ));
        let (tx, mut rx) = watch::channel(TelemetrySample::default());
        let tx = Arc::new(tx);
        let monitor = TelemetryMonitor::start(
            transactor,
            tx,
            Duration::from_secs(3600),
            Duration::from_secs(1),
        );

        // drop while the first cycle is still waiting on the reply
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(monitor);

        let sample = tokio::time::timeout(Duration::from_secs(2), next_sample(&mut rx))
            .await?
            .expect("cycle publishes after the monitor is gone");
        assert_eq!(sample.battery_percent, Some(87));
        assert_eq!(sample.flight_time_seconds, Some(12));
        Ok(())
    }

    #[tokio::test]
    async fn failed_poll_keeps_previous_reading() -> anyhow::Result<()> {
        // a drone that answers the first cycle then goes silent
        let sock = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = sock.local_addr()?;
        spawn(async move {
            let mut buf = [0u8; 256];
            for reply in [&b"87"[..], &b"12"[..]] {
                if let Ok((_, peer)) = sock.recv_from(&mut buf).await {
                    let _ = sock.send_to(reply, peer).await;
                }
            }
            // swallow everything afterwards without replying
            while sock.recv_from(&mut buf).await.is_ok() {}
        });

        let transactor = Arc::new(CommandTransactor::new(
            addr,
            DatagramChannel::open(0).await?,
        ));
        let (tx, mut rx) = watch::channel(TelemetrySample::default());
        let tx = Arc::new(tx);
        let monitor = TelemetryMonitor::start(
            transactor,
            tx,
            Duration::from_millis(10),
            Duration::from_millis(100),
        );

        let first = next_sample(&mut rx).await.unwrap();
        assert_eq!(first.battery_percent, Some(87));

        // the next cycle times out on both queries but must not clear
        let second = next_sample(&mut rx).await.unwrap();
        assert_eq!(second.battery_percent, Some(87));
        assert_eq!(second.flight_time_seconds, Some(12));

        monitor.stop();
        Ok(())
    }
}
