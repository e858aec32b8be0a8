//! Broadcast coordinator for Relay.
//!
//! The [`Hub`] is the single owner of the membership set. It runs on its own
//! task and applies [`HubCommand`]s one at a time, so register, unregister and
//! broadcast are totally ordered with respect to each other. Nothing else ever
//! touches the membership map.

use crate::connection::{Connection, ConnectionId};
use bytes::Bytes;
use relay_protocol::{codec, Envelope};
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the command channel feeding the coordinator.
    pub command_buffer: usize,
    /// Maximum encoded envelope size. Larger envelopes are dropped.
    pub max_envelope_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_buffer: 1024,
            max_envelope_size: codec::MAX_ENVELOPE_SIZE,
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Number of registered connections.
    pub members: usize,
    /// Connections registered since start.
    pub registered_total: u64,
    /// Connections removed through unregister.
    pub unregistered_total: u64,
    /// Connections evicted because their outbox was full or closed.
    pub evicted_total: u64,
    /// Broadcast requests processed.
    pub broadcasts_total: u64,
    /// Envelopes dropped because they could not be encoded.
    pub dropped_total: u64,
}

/// Requests accepted by the coordinator.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a connection and notify the other members.
    Register {
        /// The connection to add.
        connection: Connection,
    },

    /// Remove a connection if present and notify the remaining members.
    Unregister {
        /// ID of the connection to remove.
        id: ConnectionId,
    },

    /// Deliver an envelope to every member, the sender included.
    Broadcast {
        /// The envelope to deliver.
        envelope: Envelope,
    },

    /// Report current statistics.
    Stats {
        /// Channel to send the result
        respond_to: oneshot::Sender<HubStats>,
    },

    /// Report the IDs of current members.
    Members {
        /// Channel to send the result
        respond_to: oneshot::Sender<Vec<ConnectionId>>,
    },
}

/// The broadcast coordinator.
pub struct Hub {
    /// Command receiver.
    receiver: mpsc::Receiver<HubCommand>,
    /// Live connections. Owned exclusively by this task.
    members: HashMap<ConnectionId, Connection>,
    /// Configuration.
    config: HubConfig,
    /// Running counters.
    stats: HubStats,
}

impl Hub {
    /// Create a coordinator reading from `receiver`.
    #[must_use]
    pub fn new(receiver: mpsc::Receiver<HubCommand>, config: HubConfig) -> Self {
        Self {
            receiver,
            members: HashMap::new(),
            config,
            stats: HubStats::default(),
        }
    }

    /// Run the coordinator loop.
    ///
    /// Processes commands until every sender has been dropped.
    pub async fn run(mut self) {
        info!("Hub coordinator starting");

        while let Some(command) = self.receiver.recv().await {
            self.handle_command(command);
        }

        info!(members = self.members.len(), "Hub coordinator stopped");
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { connection } => self.handle_register(connection),
            HubCommand::Unregister { id } => self.handle_unregister(&id),
            HubCommand::Broadcast { envelope } => self.handle_broadcast(&envelope),
            HubCommand::Stats { respond_to } => {
                // Ignore send error - requester may have gone away
                let _ = respond_to.send(self.snapshot_stats());
            }
            HubCommand::Members { respond_to } => {
                let _ = respond_to.send(self.members.keys().cloned().collect());
            }
        }
    }

    fn handle_register(&mut self, connection: Connection) {
        let id = connection.id().clone();

        if self.members.contains_key(&id) {
            warn!(connection = %id, "Connection already registered, ignoring");
            return;
        }

        self.members.insert(id.clone(), connection);
        self.stats.registered_total += 1;

        debug!(connection = %id, members = self.members.len(), "Registered");

        if let Some(payload) = self.encode(&Envelope::joined()) {
            self.fan_out(&payload, Some(&id));
        }
    }

    fn handle_unregister(&mut self, id: &ConnectionId) {
        // Dropping the entry closes the outbox
        if self.members.remove(id).is_none() {
            trace!(connection = %id, "Unregister for unknown connection");
            return;
        }
        self.stats.unregistered_total += 1;

        debug!(connection = %id, members = self.members.len(), "Unregistered");

        if let Some(payload) = self.encode(&Envelope::left()) {
            self.fan_out(&payload, None);
        }
    }

    fn handle_broadcast(&mut self, envelope: &Envelope) {
        self.stats.broadcasts_total += 1;

        if let Some(payload) = self.encode(envelope) {
            let delivered = self.fan_out(&payload, None);
            trace!(sender = %envelope.sender, recipients = delivered, "Broadcast");
        }
    }

    /// Encode an envelope, counting and logging failures.
    fn encode(&mut self, envelope: &Envelope) -> Option<Bytes> {
        match codec::encode_with_limit(envelope, self.config.max_envelope_size) {
            Ok(payload) => Some(payload),
            Err(e) => {
                self.stats.dropped_total += 1;
                warn!(sender = %envelope.sender, error = %e, "Dropping envelope");
                None
            }
        }
    }

    /// Offer `payload` to every member except `skip` without waiting.
    ///
    /// Members whose outbox is full or closed are evicted silently. Returns
    /// the number of members the payload was queued for.
    fn fan_out(&mut self, payload: &Bytes, skip: Option<&ConnectionId>) -> usize {
        let mut delivered = 0;
        let mut evicted = Vec::new();

        for (id, connection) in &self.members {
            if skip == Some(id) {
                continue;
            }

            match connection.try_deliver(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection = %id, "Outbox full, evicting slow consumer");
                    evicted.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection = %id, "Outbox closed, evicting");
                    evicted.push(id.clone());
                }
            }
        }

        for id in evicted {
            self.members.remove(&id);
            self.stats.evicted_total += 1;
        }

        delivered
    }

    fn snapshot_stats(&self) -> HubStats {
        HubStats {
            members: self.members.len(),
            ..self.stats.clone()
        }
    }
}
