mod channel;
mod command;
mod errors;
mod link;
mod media;
mod options;
mod telemetry;
mod transactor;

pub use command::{CommandResponse, DroneCommand};
pub use errors::{LinkError, Result};
pub use link::{ConnectionState, DroneLink, StreamState};
pub use options::LinkOptions;
pub use telemetry::{next_sample, TelemetryReceiver, TelemetrySample};
