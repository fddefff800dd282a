//! Link Transport Seam
//!
//! The coordinator talks to the plug through [`Transport`]: one connection,
//! one command characteristic to write frames to, one notification stream.
//! A BLE stack implements it for real hardware; [`crate::sim::SimulatedPlug`]
//! implements it for tests and the CLI.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Callback invoked with each raw notification the plug pushes.
///
/// Implementations may call it from any thread, concurrently with the
/// coordinator's own calls into the transport.
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

// ============================================================================
// Errors
// ============================================================================

/// Errors reported by a transport.
///
/// Any of these ends the current refresh cycle; the session itself survives
/// and reconnects on the next cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Operation needs a live link.
    #[error("not connected")]
    NotConnected,

    /// Link establishment failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing to the command characteristic failed.
    #[error("write failed: {0}")]
    Write(String),

    /// Tearing the link down failed.
    #[error("disconnect failed: {0}")]
    Disconnect(String),

    /// Enabling or disabling notifications failed.
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

// ============================================================================
// Transport Trait
// ============================================================================

/// A link to a single plug.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish the link. Calling this while connected is allowed.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Tear the link down. Also drops any notification subscription.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Write one complete frame to the command characteristic.
    async fn write(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Route notifications to `handler`, replacing any previous handler.
    async fn subscribe(&self, handler: NotificationHandler) -> Result<(), TransportError>;

    /// Stop routing notifications.
    async fn unsubscribe(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(TransportError::NotConnected.to_string(), "not connected");
        assert_eq!(
            TransportError::Write("gatt busy".into()).to_string(),
            "write failed: gatt busy"
        );
    }

    #[test]
    fn test_handler_is_shareable() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: NotificationHandler = Arc::new(move |raw| sink.lock().push(raw.to_vec()));

        let clone = handler.clone();
        std::thread::spawn(move || clone(&[0x0F]))
            .join()
            .expect("should join handler thread");
        handler(&[0xFF]);

        assert_eq!(*seen.lock(), vec![vec![0x0F], vec![0xFF]]);
    }
}
