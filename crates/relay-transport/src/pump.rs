//! Per-connection pumps.
//!
//! Every connection gets two loops: the inbound pump reads from the transport
//! and submits broadcasts, the outbound pump drains the outbox into the
//! transport. A read failure ends in an unregister request; the hub then
//! closes the outbox, which stops the outbound pump. Once the outbound pump
//! stops, for whatever reason, the inbound pump is dropped with it, so a
//! connection the hub has let go never submits another broadcast.

use crate::traits::{MessageSink, MessageStream, TransportError};
use relay_core::{
    Connection, ConnectionId, ConnectionState, HubError, HubHandle, Outbox,
    DEFAULT_OUTBOX_CAPACITY,
};
use relay_protocol::Envelope;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Outbox capacity, in envelopes.
    pub outbox_capacity: usize,
    /// Treat a connection as dead after this long without an inbound message.
    pub idle_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            idle_timeout: None,
        }
    }
}

/// Register a connection and run both of its pumps to completion.
///
/// Returns once both pumps have exited and both transport halves are dropped.
///
/// # Errors
///
/// Returns `HubError::Closed` if the connection could not be registered. The
/// transport is dropped in that case.
pub async fn serve_connection<R, W>(
    hub: &HubHandle,
    id: ConnectionId,
    reader: R,
    writer: W,
    config: &ConnectionConfig,
) -> Result<(), HubError>
where
    R: MessageStream,
    W: MessageSink + 'static,
{
    debug!(connection = %id, state = %ConnectionState::Connecting, "Connection upgraded");

    let (connection, outbox) = Connection::open(id.clone(), config.outbox_capacity);
    hub.register(connection).await?;
    debug!(connection = %id, state = %ConnectionState::Registered, "Registration submitted");

    let mut outbound = tokio::spawn(outbound_pump(hub.clone(), id.clone(), writer, outbox));
    debug!(connection = %id, state = %ConnectionState::Active, "Pumps started");

    tokio::select! {
        biased;

        // Outbox closed or write failed: the hub no longer holds this
        // connection, stop reading from it
        result = &mut outbound => {
            if let Err(e) = result {
                warn!(connection = %id, error = %e, "Outbound pump aborted");
            }
            debug!(connection = %id, "Outbound pump finished first, dropping reader");
        }

        () = inbound_pump(hub, &id, reader, config.idle_timeout) => {
            if let Err(e) = outbound.await {
                warn!(connection = %id, error = %e, "Outbound pump aborted");
            }
        }
    }

    debug!(connection = %id, state = %ConnectionState::Closed, "Connection closed");
    Ok(())
}

/// Read from the transport and broadcast every message until it fails.
async fn inbound_pump<R: MessageStream>(
    hub: &HubHandle,
    id: &ConnectionId,
    mut reader: R,
    idle_timeout: Option<Duration>,
) {
    loop {
        let next = match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, reader.recv())
                .await
                .unwrap_or(Err(TransportError::Timeout)),
            None => reader.recv().await,
        };

        match next {
            Ok(Some(content)) => {
                let envelope = Envelope::from_peer(id.as_str(), content);
                if hub.broadcast(envelope).await.is_err() {
                    error!(connection = %id, "Hub is gone, dropping connection");
                    return;
                }
            }
            Ok(None) => {
                debug!(connection = %id, "Peer closed connection");
                break;
            }
            Err(e) => {
                warn!(connection = %id, error = %e, "Read failed");
                break;
            }
        }
    }

    debug!(connection = %id, state = %ConnectionState::Unregistering, "Inbound pump finished");
    if hub.unregister(id.clone()).await.is_err() {
        error!(connection = %id, "Hub is gone, could not unregister");
    }
}

/// Drain the outbox into the transport until the hub closes it.
async fn outbound_pump<W: MessageSink>(
    hub: HubHandle,
    id: ConnectionId,
    mut writer: W,
    mut outbox: Outbox,
) {
    while let Some(payload) = outbox.recv().await {
        if let Err(e) = writer.send(payload).await {
            warn!(connection = %id, error = %e, "Write failed");
            debug!(connection = %id, state = %ConnectionState::Unregistering, "Outbound pump finished");
            if hub.unregister(id.clone()).await.is_err() {
                error!(connection = %id, "Hub is gone, could not unregister");
            }
            return;
        }
    }

    // Outbox closed: the hub has dropped this connection
    if let Err(e) = writer.close().await {
        debug!(connection = %id, error = %e, "Close failed");
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use relay_core::{spawn_hub, HubConfig};
    use relay_protocol::{codec, JOINED_NOTICE, LEFT_NOTICE};
    use tokio::sync::{mpsc, watch};
    use tokio::time::timeout;

    /// Reader fed from a channel. Dropping the sender is a clean close.
    struct ChannelReader {
        incoming: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    }

    #[async_trait]
    impl MessageStream for ChannelReader {
        async fn recv(&mut self) -> Result<Option<String>, TransportError> {
            match self.incoming.recv().await {
                Some(Ok(text)) => Ok(Some(text)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        }
    }

    #[derive(Debug)]
    enum Written {
        Payload(Envelope),
        Closed,
    }

    /// How a test writer treats sends.
    enum WriterMode {
        Working,
        Failing,
        /// Sends block until the gate is opened.
        Gated(watch::Receiver<bool>),
    }

    /// Writer that reports what it was asked to do.
    struct ChannelWriter {
        written: mpsc::UnboundedSender<Written>,
        mode: WriterMode,
    }

    #[async_trait]
    impl MessageSink for ChannelWriter {
        async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
            match &mut self.mode {
                WriterMode::Working => {}
                WriterMode::Failing => {
                    return Err(TransportError::SendFailed("broken pipe".into()));
                }
                WriterMode::Gated(gate) => {
                    let _ = gate.wait_for(|open| *open).await;
                }
            }
            let envelope = codec::decode(&payload).unwrap();
            let _ = self.written.send(Written::Payload(envelope));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            let _ = self.written.send(Written::Closed);
            Ok(())
        }
    }

    struct Peer {
        /// `None` once the peer has hung up.
        incoming: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
        written: mpsc::UnboundedReceiver<Written>,
        task: tokio::task::JoinHandle<Result<(), HubError>>,
    }

    impl Peer {
        /// Feed a message into the reader. Returns false if the reader is gone.
        fn say(&self, text: &str) -> bool {
            self.feed(Ok(text.to_string()))
        }

        fn feed(&self, item: Result<String, TransportError>) -> bool {
            self.incoming
                .as_ref()
                .map_or(false, |incoming| incoming.send(item).is_ok())
        }

        fn hang_up(&mut self) {
            self.incoming = None;
        }

        async fn next_written(&mut self) -> Written {
            timeout(Duration::from_secs(2), self.written.recv())
                .await
                .expect("timed out waiting for write")
                .expect("writer dropped")
        }

        async fn next_envelope(&mut self) -> Envelope {
            match self.next_written().await {
                Written::Payload(envelope) => envelope,
                Written::Closed => panic!("Expected payload, got close"),
            }
        }

        async fn finished(self) -> Result<(), HubError> {
            timeout(Duration::from_secs(2), self.task)
                .await
                .expect("connection task did not finish")
                .unwrap()
        }
    }

    fn connect(hub: &HubHandle, name: &str, config: ConnectionConfig) -> Peer {
        connect_with(hub, name, WriterMode::Working, config)
    }

    fn connect_with(
        hub: &HubHandle,
        name: &str,
        mode: WriterMode,
        config: ConnectionConfig,
    ) -> Peer {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let reader = ChannelReader { incoming: in_rx };
        let writer = ChannelWriter {
            written: out_tx,
            mode,
        };

        let hub = hub.clone();
        let id = ConnectionId::new(name);
        let task =
            tokio::spawn(async move { serve_connection(&hub, id, reader, writer, &config).await });

        Peer {
            incoming: Some(in_tx),
            written: out_rx,
            task,
        }
    }

    async fn wait_for_members(hub: &HubHandle, count: usize) {
        for _ in 0..200 {
            if hub.stats().await.unwrap().members == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("hub never reached {count} members");
    }

    #[tokio::test]
    async fn test_inbound_message_is_broadcast() {
        let (hub, _hub_task) = spawn_hub(HubConfig::default());
        let mut peer = connect(&hub, "a", ConnectionConfig::default());
        wait_for_members(&hub, 1).await;

        assert!(peer.say("hello"));
        assert_eq!(peer.next_envelope().await, Envelope::from_peer("a", "hello"));
    }

    #[tokio::test]
    async fn test_peer_close_unregisters_and_closes() {
        let (hub, _hub_task) = spawn_hub(HubConfig::default());
        let mut a = connect(&hub, "a", ConnectionConfig::default());
        wait_for_members(&hub, 1).await;
        let mut b = connect(&hub, "b", ConnectionConfig::default());
        wait_for_members(&hub, 2).await;

        assert_eq!(a.next_envelope().await, Envelope::notice(JOINED_NOTICE));

        b.hang_up();
        assert!(matches!(b.next_written().await, Written::Closed));
        b.finished().await.unwrap();

        assert_eq!(a.next_envelope().await, Envelope::notice(LEFT_NOTICE));
        assert_eq!(hub.stats().await.unwrap().members, 1);
    }

    #[tokio::test]
    async fn test_read_error_unregisters() {
        let (hub, _hub_task) = spawn_hub(HubConfig::default());
        let mut peer = connect(&hub, "a", ConnectionConfig::default());
        wait_for_members(&hub, 1).await;

        assert!(peer.feed(Err(TransportError::ReceiveFailed("reset".into()))));

        assert!(matches!(peer.next_written().await, Written::Closed));
        peer.finished().await.unwrap();

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.members, 0);
        assert_eq!(stats.unregistered_total, 1);
    }

    #[tokio::test]
    async fn test_write_failure_unregisters_and_stops_reading() {
        let (hub, _hub_task) = spawn_hub(HubConfig::default());
        let peer = connect_with(
            &hub,
            "broken",
            WriterMode::Failing,
            ConnectionConfig::default(),
        );
        wait_for_members(&hub, 1).await;

        hub.broadcast(Envelope::notice("anyone there?")).await.unwrap();

        // The reader is still open on the peer side, the task ends anyway
        let incoming = peer.incoming.clone();
        peer.finished().await.unwrap();
        assert!(incoming.unwrap().send(Ok("late".to_string())).is_err());

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.members, 0);
        assert_eq!(stats.unregistered_total, 1);
        assert_eq!(stats.broadcasts_total, 1);
    }

    #[tokio::test]
    async fn test_hub_unregister_stops_both_pumps() {
        let (hub, _hub_task) = spawn_hub(HubConfig::default());
        let mut a = connect(&hub, "a", ConnectionConfig::default());
        wait_for_members(&hub, 1).await;
        let mut b = connect(&hub, "b", ConnectionConfig::default());
        wait_for_members(&hub, 2).await;
        assert_eq!(a.next_envelope().await, Envelope::notice(JOINED_NOTICE));

        hub.unregister(ConnectionId::new("a")).await.unwrap();
        assert!(matches!(a.next_written().await, Written::Closed));

        // a never hangs up, yet its reader is dropped and nothing it sends
        // after removal reaches anyone
        let _ = a.say("after removal");
        let incoming = a.incoming.clone();
        a.finished().await.unwrap();
        assert!(incoming.unwrap().send(Ok("later".to_string())).is_err());

        assert_eq!(b.next_envelope().await, Envelope::notice(LEFT_NOTICE));
        assert!(b.say("still here"));
        assert_eq!(b.next_envelope().await, Envelope::from_peer("b", "still here"));

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.members, 1);
        assert_eq!(stats.broadcasts_total, 1);
    }

    #[tokio::test]
    async fn test_slow_consumer_is_disconnected() {
        let (hub, _hub_task) = spawn_hub(HubConfig::default());
        let mut fast = connect(&hub, "fast", ConnectionConfig::default());
        wait_for_members(&hub, 1).await;

        let (gate, gate_rx) = watch::channel(false);
        let slow_config = ConnectionConfig {
            outbox_capacity: 1,
            ..ConnectionConfig::default()
        };
        let mut slow = connect_with(&hub, "slow", WriterMode::Gated(gate_rx), slow_config);
        wait_for_members(&hub, 2).await;
        assert_eq!(fast.next_envelope().await, Envelope::notice(JOINED_NOTICE));

        // slow's writer is stuck, so its single outbox slot fills up
        for text in ["one", "two", "three"] {
            assert!(fast.say(text));
            assert_eq!(fast.next_envelope().await, Envelope::from_peer("fast", text));
        }

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.members, 1);
        assert_eq!(stats.evicted_total, 1);

        // No departure notice for an eviction, and the fast peer is not held up
        assert!(fast.say("four"));
        assert_eq!(fast.next_envelope().await, Envelope::from_peer("fast", "four"));

        // Once unstuck, slow drains what was queued before eviction and is closed
        gate.send(true).unwrap();
        loop {
            match slow.next_written().await {
                Written::Payload(envelope) => assert_ne!(envelope.content, "four"),
                Written::Closed => break,
            }
        }
        let incoming = slow.incoming.clone();
        slow.finished().await.unwrap();
        assert!(incoming.unwrap().send(Ok("too late".to_string())).is_err());

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.members, 1);
        assert_eq!(stats.broadcasts_total, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_unregisters() {
        let (hub, _hub_task) = spawn_hub(HubConfig::default());
        let config = ConnectionConfig {
            idle_timeout: Some(Duration::from_secs(30)),
            ..ConnectionConfig::default()
        };
        let mut peer = connect(&hub, "idle", config);

        // Paused clock: the idle timer is the only one, so it fires first
        (&mut peer.task).await.unwrap().unwrap();
        assert!(matches!(peer.written.try_recv(), Ok(Written::Closed)));
        assert_eq!(hub.stats().await.unwrap().members, 0);
    }

    #[tokio::test]
    async fn test_register_fails_when_hub_is_gone() {
        let (hub, hub_task) = spawn_hub(HubConfig::default());
        hub_task.abort();
        let _ = hub_task.await;

        let peer = connect(&hub, "late", ConnectionConfig::default());
        assert!(matches!(peer.task.await.unwrap(), Err(HubError::Closed)));
    }
}
