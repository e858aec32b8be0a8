//! Client interface for the hub coordinator.
//!
//! [`HubHandle`] is cheap to clone and is what the accept path and every pump
//! hold. Each method turns into one [`HubCommand`] on the coordinator's
//! channel.

use crate::connection::{Connection, ConnectionId};
use crate::hub::{Hub, HubCommand, HubConfig, HubStats};
use relay_protocol::Envelope;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// The coordinator task has stopped.
    #[error("Hub coordinator is not running")]
    Closed,
}

/// Handle for submitting requests to the hub coordinator.
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Create a handle from a command sender.
    #[must_use]
    pub fn new(sender: mpsc::Sender<HubCommand>) -> Self {
        Self { sender }
    }

    /// Register a connection.
    ///
    /// The other members receive a "peer joined" notice.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` if the coordinator has stopped.
    pub async fn register(&self, connection: Connection) -> Result<(), HubError> {
        self.submit(HubCommand::Register { connection }).await
    }

    /// Unregister a connection. Unknown IDs are ignored.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` if the coordinator has stopped.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.submit(HubCommand::Unregister { id }).await
    }

    /// Broadcast an envelope to every member.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` if the coordinator has stopped.
    pub async fn broadcast(&self, envelope: Envelope) -> Result<(), HubError> {
        self.submit(HubCommand::Broadcast { envelope }).await
    }

    /// Get hub statistics.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` if the coordinator has stopped.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (tx, rx) = oneshot::channel();
        self.submit(HubCommand::Stats { respond_to: tx }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Get the IDs of all current members.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Closed` if the coordinator has stopped.
    pub async fn members(&self) -> Result<Vec<ConnectionId>, HubError> {
        let (tx, rx) = oneshot::channel();
        self.submit(HubCommand::Members { respond_to: tx }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    async fn submit(&self, command: HubCommand) -> Result<(), HubError> {
        self.sender.send(command).await.map_err(|_| HubError::Closed)
    }
}

/// Spawn the hub coordinator.
///
/// Returns a handle for submitting requests and the coordinator's task. The
/// task only finishes once every handle has been dropped, so a finished task
/// while handles are still alive means the coordinator died.
pub fn spawn_hub(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.command_buffer);
    let hub = Hub::new(rx, config);
    let task = tokio::spawn(hub.run());
    (HubHandle::new(tx), task)
}
