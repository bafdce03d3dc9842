use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::time::Duration;

const DEFAULT_DRONE_HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 10, 1));

const COMMAND_UDP_PORT: u16 = 8889;
const MEDIA_UDP_PORT: u16 = 11111;

/// Endpoints and timings for a drone link.
///
/// The defaults match the drone in AP mode - its own WiFi network, with
/// the well-known control address.  Override the endpoints to drive a
/// simulator or a drone behind a different address.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Where commands go.
    pub command_endpoint: SocketAddr,
    /// The fixed local port the drone pushes media datagrams to.
    pub media_ingest_port: u16,
    /// Per-command (and per-capture) response deadline.
    pub command_timeout: Duration,
    /// Cadence of the battery / flight-time poll.
    pub telemetry_interval: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            command_endpoint: SocketAddr::new(DEFAULT_DRONE_HOST, COMMAND_UDP_PORT),
            media_ingest_port: MEDIA_UDP_PORT,
            command_timeout: Duration::from_secs(5),
            telemetry_interval: Duration::from_secs(10),
        }
    }
}
