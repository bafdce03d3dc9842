use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkError>;

/// Everything that can go wrong while talking to the drone.
///
/// The crate never retries on its own; each of these is surfaced to the
/// caller, who decides whether to try again.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Socket bind or send failed.  Fatal to the current session.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// No response arrived within the deadline.  Recoverable - retry if
    /// you like.
    #[error("timed out waiting for the drone")]
    TimedOut,

    /// The drone replied with something other than "ok" or a number.
    #[error("drone rejected the command: {0}")]
    ProtocolFailure(String),

    /// A command is already in flight; back off and retry.
    #[error("a command is already awaiting its response")]
    Busy,

    #[error("not connected to the drone")]
    NotConnected,

    #[error("streaming is not enabled")]
    NotStreaming,

    /// A capture was attempted while recording, or vice versa.
    #[error("the media socket is held by another session")]
    SessionConflict,

    #[error("already recording")]
    AlreadyRecording,

    #[error("not recording")]
    NotRecording,
}
