//! Owner of all live sessions, keyed by device address.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::SessionConfig;
use crate::coordinator::SessionCoordinator;
use crate::transport::Transport;

/// Errors from registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The address is not six hex octets.
    #[error("invalid device address: {0}")]
    InvalidAddress(String),

    /// A session for this device already exists.
    #[error("device already registered: {0}")]
    AlreadyRegistered(String),
}

/// Normalize a Bluetooth address to lowercase, colon-separated octets.
///
/// Accepts `:`, `-` or no separator, in any case.
///
/// ```rust
/// use sem6000_session::normalize_address;
///
/// assert_eq!(
///     normalize_address("A4-C1-38-00-11-22").unwrap(),
///     "a4:c1:38:00:11:22"
/// );
/// ```
pub fn normalize_address(address: &str) -> Result<String, RegistryError> {
    let digits: String = address
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-'))
        .collect();
    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RegistryError::InvalidAddress(address.to_string()));
    }
    let lower = digits.to_ascii_lowercase();
    let octets: Vec<&str> = (0..6).map(|i| &lower[i * 2..i * 2 + 2]).collect();
    Ok(octets.join(":"))
}

/// Maps normalized device addresses to their coordinators.
pub struct SessionRegistry<T: Transport> {
    sessions: BTreeMap<String, SessionCoordinator<T>>,
}

impl<T: Transport> Default for SessionRegistry<T> {
    fn default() -> Self {
        SessionRegistry {
            sessions: BTreeMap::new(),
        }
    }
}

impl<T: Transport> SessionRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a coordinator for `address`. The session is not
    /// started.
    pub fn insert(
        &mut self,
        address: &str,
        transport: Arc<T>,
        config: SessionConfig,
    ) -> Result<SessionCoordinator<T>, RegistryError> {
        let key = normalize_address(address)?;
        if self.sessions.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(key));
        }
        let session = SessionCoordinator::new(key.clone(), transport, config);
        self.sessions.insert(key.clone(), session.clone());
        info!(device = %key, "session registered");
        Ok(session)
    }

    /// Look up a session by address in any accepted format.
    pub fn get(&self, address: &str) -> Option<SessionCoordinator<T>> {
        let key = normalize_address(address).ok()?;
        self.sessions.get(&key).cloned()
    }

    /// Shut down and forget a session. Returns false if none was registered.
    pub async fn remove(&mut self, address: &str) -> bool {
        let Ok(key) = normalize_address(address) else {
            return false;
        };
        match self.sessions.remove(&key) {
            Some(session) => {
                session.shutdown().await;
                info!(device = %key, "session removed");
                true
            }
            None => false,
        }
    }

    /// Shut down every session and empty the registry.
    pub async fn shutdown_all(&mut self) {
        for (_, session) in std::mem::take(&mut self.sessions) {
            session.shutdown().await;
        }
    }

    /// Registered addresses, sorted.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
