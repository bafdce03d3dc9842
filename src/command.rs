use std::fmt;

/// The command vocabulary the link uses on the wire.
///
/// Commands are plain ASCII words sent one per datagram; `Raw` carries
/// anything not covered by a named variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DroneCommand {
    /// Puts the drone in SDK command mode - the first command of every
    /// session.
    Init,
    TakeOff,
    Land,
    EmergencyStop,
    StreamOn,
    StreamOff,
    /// Asks the drone to push one still frame to the media port.
    Snapshot,
    QueryBattery,
    QueryFlightTime,
    Raw(String),
}

impl DroneCommand {
    pub fn wire_text(&self) -> &str {
        match self {
            DroneCommand::Init => "command",
            DroneCommand::TakeOff => "takeoff",
            DroneCommand::Land => "land",
            DroneCommand::EmergencyStop => "emergency",
            DroneCommand::StreamOn => "streamon",
            DroneCommand::StreamOff => "streamoff",
            DroneCommand::Snapshot => "snapshot",
            DroneCommand::QueryBattery => "battery?",
            DroneCommand::QueryFlightTime => "time?",
            DroneCommand::Raw(text) => text,
        }
    }
}

impl fmt::Display for DroneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_text())
    }
}

impl From<&str> for DroneCommand {
    fn from(text: &str) -> Self {
        DroneCommand::Raw(text.to_string())
    }
}

/// A validated reply from the drone.
///
/// The drone answers every command with either the literal `ok` or a
/// decimal number; anything else is a failure and never reaches this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResponse {
    Ok,
    Value(i64),
}

impl CommandResponse {
    /// Classifies trimmed response text, or returns the text back if the
    /// drone rejected the command.
    pub(crate) fn parse(text: &str) -> std::result::Result<Self, String> {
        if text == "ok" {
            return Ok(CommandResponse::Ok);
        }
        match text.parse::<i64>() {
            Ok(n) => Ok(CommandResponse::Value(n)),
            Err(_) => Err(text.to_string()),
        }
    }

    pub fn value(&self) -> Option<i64> {
        match self {
            CommandResponse::Value(n) => Some(*n),
            CommandResponse::Ok => None,
        }
    }
}
