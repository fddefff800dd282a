//! Commands that can be sent to the plug.

use crate::constants::*;
use crate::frame::FrameCodec;
use crate::types::*;

/// Commands that can be sent to the plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Authenticate with the factory PIN "0000". Sent once per connection.
    Login,

    /// Request a measurement notification.
    Measure,

    /// Switch the relay.
    Switch(SwitchMode),
}

impl Command {
    /// The command code carried by this command's frame.
    pub fn id(&self) -> CommandId {
        match self {
            Command::Login => CommandId::Login,
            Command::Measure => CommandId::Measure,
            Command::Switch(_) => CommandId::Switch,
        }
    }

    /// Encode the command as a complete wire frame.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Login => LOGIN_FRAME_DEFAULT_PIN.to_vec(),
            Command::Measure => FrameCodec::encode(CMD_MEASURE, &[]),
            Command::Switch(mode) => FrameCodec::encode(CMD_SWITCH, &[mode.as_byte()]),
        }
    }
}
