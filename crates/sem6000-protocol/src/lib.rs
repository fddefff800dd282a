//! SEM6000 BLE Protocol
//!
//! This crate provides types and utilities for talking to Voltcraft SEM6000 /
//! SPB012BLE metering smart plugs. The plug exposes one characteristic for
//! commands and one for notifications; both carry the same frame layout.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → plug): login, measure, switch
//! - **Notifications** (plug → host): measurement samples, switch
//!   acknowledgements, login acknowledgements
//!
//! Only the commands needed for metering and switching are implemented.
//!
//! # Example
//!
//! ```rust
//! use sem6000_protocol::{Command, NotificationEvent, SwitchMode};
//!
//! let frame = Command::Switch(SwitchMode::On).encode();
//! assert_eq!(frame, [0x0F, 0x04, 0x03, 0x00, 0x01, 0x05, 0xFF, 0xFF]);
//!
//! let event = NotificationEvent::from_bytes(&[0x0F, 0x03, 0x03, 0x00, 0x04, 0xFF, 0xFF]);
//! assert_eq!(event, Ok(NotificationEvent::SwitchAck));
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod notifications;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use notifications::*;
pub use types::*;
