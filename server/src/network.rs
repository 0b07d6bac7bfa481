//! Server protocol dispatch and snapshot broadcasting

use crate::client_manager::ConnectionRegistry;
use crate::config::{IdentityPolicy, ServerConfig};
use crate::game::PlayerStore;
use log::{debug, error, info, warn};
use shared::{
    decode, encode, ConnectionId, Message, NetEvent, Periodic, PlayerState, ServerTransport,
    TransportError, Vector3,
};
use std::time::Instant;
use tokio::time::{interval, MissedTickBehavior};

/// Authoritative server owning its connections, player store and broadcast timer
///
/// All state is mutated from `update`, which first drains transport events
/// and then runs the broadcast if it is due. Nothing here is shared across
/// tasks, so no locking is involved.
pub struct Server<T: ServerTransport> {
    transport: T,
    config: ServerConfig,
    connections: ConnectionRegistry,
    players: PlayerStore,
    broadcaster: Periodic,
    /// Set while snapshots exceed what the transport can carry
    snapshot_oversized: bool,
}

impl<T: ServerTransport> Server<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        let broadcaster = Periodic::new(config.sync_interval);
        Self {
            transport,
            config,
            connections: ConnectionRegistry::new(),
            players: PlayerStore::new(),
            broadcaster,
            snapshot_oversized: false,
        }
    }

    /// Starts the periodic snapshot broadcast
    pub fn start(&mut self, now: Instant) {
        self.broadcaster.start(now);
        info!(
            "Broadcasting snapshots every {}ms",
            self.broadcaster.interval().as_millis()
        );
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn players(&self) -> &PlayerStore {
        &self.players
    }

    /// Runs one frame: cleanup, accept, drain events, then broadcast if due
    pub fn update(&mut self, now: Instant) {
        self.transport.update();
        self.connections.cleanup();

        while let Some(connection) = self.transport.accept() {
            self.on_connect(connection);
        }

        for connection in self.connections.list() {
            while let Some(event) = self.transport.pop_event(connection) {
                match event {
                    NetEvent::Data(bytes) => self.on_data(connection, &bytes),
                    NetEvent::Disconnect => {
                        self.on_disconnect(connection);
                        break;
                    }
                    NetEvent::Connect => debug!("Connection {} reported connect", connection),
                }
            }
        }

        if self.broadcaster.poll(now) {
            self.broadcast_snapshot();
        }
    }

    /// Drives `update` on a fixed frame interval until the future is dropped
    pub async fn run(&mut self) {
        let mut frame = interval(self.config.frame_interval);
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.start(Instant::now());
        info!("Server started successfully");

        loop {
            frame.tick().await;
            self.update(Instant::now());
        }
    }

    /// Disconnects every client and stops broadcasting
    pub fn shutdown(&mut self) {
        self.broadcaster.stop();

        for connection in self.connections.list() {
            self.transport.disconnect(connection);
            if let Some(identity) = self.connections.remove(connection) {
                self.players.remove(&identity);
            }
        }
        self.connections.cleanup();

        info!("Server shut down");
    }

    fn on_connect(&mut self, connection: ConnectionId) {
        let identity = match self.connections.add(connection) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Refusing connection {}: {}", connection, e);
                self.transport.disconnect(connection);
                return;
            }
        };

        let handshake = Message::Handshake {
            player: PlayerState::with_id(identity.clone()),
        };
        self.send_to(connection, &handshake);

        // Registered before the peer knows its identity, so the next snapshot includes it
        self.players.upsert(&identity, Vector3::ZERO);
        self.connections.activate(connection);
    }

    fn on_data(&mut self, connection: ConnectionId, bytes: &[u8]) {
        let message = match decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Discarding message from connection {}: {}", connection, e);
                return;
            }
        };

        match message {
            Message::Handshake { player } => {
                info!("Handshake message received from player {}", player.id);
            }
            Message::PlayerUpdate { player } => self.on_player_update(connection, player),
            Message::ServerUpdate { .. } | Message::DroppedClient { .. } => {
                warn!(
                    "Unexpected {:?} message from connection {}",
                    message.command(),
                    connection
                );
            }
        }
    }

    fn on_player_update(&mut self, connection: ConnectionId, player: PlayerState) {
        if self.config.identity_policy == IdentityPolicy::Bound
            && self.connections.identity(connection) != Some(player.id.as_str())
        {
            warn!(
                "Connection {} sent an update for player {}; discarding",
                connection, player.id
            );
            return;
        }

        if !self.players.contains(&player.id) {
            if self.connections.is_retired(&player.id) {
                debug!("Ignoring update for departed player {}", player.id);
                return;
            }
            debug!("Update for unknown player {}; creating it", player.id);
        }

        self.players.upsert(&player.id, player.position);
    }

    fn on_disconnect(&mut self, connection: ConnectionId) {
        let Some(identity) = self.connections.remove(connection) else {
            return;
        };
        self.players.remove(&identity);

        let dropped = Message::DroppedClient {
            player: PlayerState::with_id(identity),
        };
        if let Err(e) = self.broadcast(&dropped) {
            error!("Failed to announce departure: {}", e);
        }
    }

    fn broadcast_snapshot(&mut self) {
        let players = self.players.snapshot();
        let count = players.len();
        let snapshot = Message::ServerUpdate { players };

        match self.broadcast(&snapshot) {
            Err(TransportError::PayloadTooLarge(size)) => {
                if !self.snapshot_oversized {
                    error!(
                        "Snapshot of {} players is {} bytes, over the transport limit",
                        count, size
                    );
                    self.snapshot_oversized = true;
                }
            }
            Err(e) => error!("Snapshot broadcast failed: {}", e),
            Ok(()) => {
                if self.snapshot_oversized {
                    info!("Snapshot of {} players fits again; broadcasts resumed", count);
                    self.snapshot_oversized = false;
                }
            }
        }
    }

    fn send_to(&mut self, connection: ConnectionId, message: &Message) {
        let bytes = match encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };

        if let Err(e) = self.transport.send(connection, &bytes) {
            error!("Failed to send to connection {}: {}", connection, e);
        }
    }

    /// Sends one payload to every live connection
    ///
    /// Per-connection failures are logged. A payload the transport rejects as
    /// too large would fail for everyone, so it aborts the whole broadcast.
    fn broadcast(&mut self, message: &Message) -> Result<(), TransportError> {
        let bytes = match encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("{}", e);
                return Ok(());
            }
        };

        for connection in self.connections.list() {
            match self.transport.send(connection, &bytes) {
                Err(e @ TransportError::PayloadTooLarge(_)) => return Err(e),
                Err(e) => error!("Failed to send to connection {}: {}", connection, e),
                Ok(()) => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_manager::ConnectionState;
    use shared::transport::{LoopbackClientTransport, LoopbackNetwork, LoopbackServerTransport};
    use shared::ClientTransport;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct Harness {
        network: LoopbackNetwork,
        server: Server<LoopbackServerTransport>,
        now: Instant,
    }

    impl Harness {
        fn new(config: ServerConfig) -> Self {
            let network = LoopbackNetwork::new();
            let server = Server::new(network.server(), config);
            Self {
                network,
                server,
                now: Instant::now(),
            }
        }

        /// Runs a frame without letting the broadcast fire
        fn frame(&mut self) {
            self.server.update(self.now);
        }

        /// Advances to the next broadcast
        fn tick(&mut self) {
            if !self.server.broadcaster.is_running() {
                self.server.start(self.now);
            } else {
                self.now += self.server.config.sync_interval;
            }
            self.server.update(self.now);
        }

        fn connect(&mut self) -> (LoopbackClientTransport, ConnectionId) {
            let mut client = self.network.client();
            let link = client.connect("loopback").unwrap();
            self.frame();
            (client, link)
        }
    }

    fn drain(client: &mut LoopbackClientTransport, link: ConnectionId) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(event) = client.pop_event(link) {
            if let NetEvent::Data(bytes) = event {
                messages.push(decode(&bytes).unwrap());
            }
        }
        messages
    }

    fn send(client: &mut LoopbackClientTransport, link: ConnectionId, message: &Message) {
        client.send(link, &encode(message).unwrap()).unwrap();
    }

    fn update_for(id: &str, x: f32, y: f32, z: f32) -> Message {
        Message::PlayerUpdate {
            player: PlayerState::new(id, Vector3::new(x, y, z)),
        }
    }

    #[test]
    fn test_connect_sends_handshake_and_registers_player() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut client, link) = harness.connect();

        let identity = link.to_string();
        assert!(harness.server.players().contains(&identity));
        assert_eq!(
            harness.server.connections().state(link),
            Some(ConnectionState::Active)
        );

        let messages = drain(&mut client, link);
        assert_eq!(
            messages,
            vec![Message::Handshake {
                player: PlayerState::with_id(identity)
            }]
        );
    }

    #[test]
    fn test_new_player_in_first_snapshot() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut client, link) = harness.connect();
        drain(&mut client, link);

        harness.tick();

        let messages = drain(&mut client, link);
        assert_eq!(
            messages,
            vec![Message::ServerUpdate {
                players: vec![PlayerState::with_id(link.to_string())]
            }]
        );
    }

    #[test]
    fn test_broadcast_sent_every_interval_without_changes() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut client, link) = harness.connect();
        drain(&mut client, link);

        harness.tick();
        harness.tick();
        harness.tick();

        let snapshots = drain(&mut client, link)
            .into_iter()
            .filter(|m| matches!(m, Message::ServerUpdate { .. }))
            .count();
        assert_eq!(snapshots, 3);
    }

    #[test]
    fn test_no_broadcast_between_ticks() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut client, link) = harness.connect();
        harness.tick();
        drain(&mut client, link);

        harness.now += Duration::from_millis(50);
        harness.frame();

        assert!(drain(&mut client, link).is_empty());
    }

    #[test]
    fn test_last_update_wins() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut client, link) = harness.connect();
        drain(&mut client, link);

        send(&mut client, link, &update_for("A", 1.0, 1.0, 1.0));
        send(&mut client, link, &update_for("A", 2.0, 2.0, 2.0));
        harness.tick();

        let snapshot = drain(&mut client, link);
        let Message::ServerUpdate { players } = &snapshot[0] else {
            panic!("expected a snapshot, got {:?}", snapshot);
        };
        let a: Vec<&PlayerState> = players.iter().filter(|p| p.id == "A").collect();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].position, Vector3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_trusted_policy_accepts_foreign_ids() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut first, first_link) = harness.connect();
        let (_second, second_link) = harness.connect();

        let victim = second_link.to_string();
        send(&mut first, first_link, &update_for(&victim, 9.0, 0.0, 0.0));
        harness.frame();

        assert_eq!(
            harness.server.players().get(&victim),
            Some(Vector3::new(9.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_bound_policy_rejects_foreign_ids() {
        let config = ServerConfig {
            identity_policy: IdentityPolicy::Bound,
            ..ServerConfig::default()
        };
        let mut harness = Harness::new(config);
        let (mut first, first_link) = harness.connect();
        let (_second, second_link) = harness.connect();

        let victim = second_link.to_string();
        send(&mut first, first_link, &update_for(&victim, 9.0, 0.0, 0.0));
        send(&mut first, first_link, &update_for("ghost", 1.0, 0.0, 0.0));
        let own = first_link.to_string();
        send(&mut first, first_link, &update_for(&own, 3.0, 0.0, 0.0));
        harness.frame();

        assert_eq!(harness.server.players().get(&victim), Some(Vector3::ZERO));
        assert!(!harness.server.players().contains("ghost"));
        assert_eq!(
            harness.server.players().get(&own),
            Some(Vector3::new(3.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_unknown_id_is_created_implicitly() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut client, link) = harness.connect();

        send(&mut client, link, &update_for("stranger", 4.0, 5.0, 6.0));
        harness.frame();

        assert_eq!(
            harness.server.players().get("stranger"),
            Some(Vector3::new(4.0, 5.0, 6.0))
        );
    }

    #[test]
    fn test_disconnect_removes_player_and_notifies_others_once() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut a, a_link) = harness.connect();
        let (mut b, b_link) = harness.connect();
        let (mut c, c_link) = harness.connect();
        drain(&mut a, a_link);
        drain(&mut b, b_link);

        c.disconnect(c_link);
        harness.frame();

        let gone = c_link.to_string();
        assert!(!harness.server.players().contains(&gone));
        assert!(!harness.server.connections().is_live(c_link));

        for (client, link) in [(&mut a, a_link), (&mut b, b_link)] {
            let dropped: Vec<Message> = drain(client, link)
                .into_iter()
                .filter(|m| matches!(m, Message::DroppedClient { .. }))
                .collect();
            assert_eq!(
                dropped,
                vec![Message::DroppedClient {
                    player: PlayerState::with_id(gone.clone())
                }]
            );
        }

        harness.tick();
        let snapshot = drain(&mut a, a_link);
        let Message::ServerUpdate { players } = &snapshot[0] else {
            panic!("expected a snapshot, got {:?}", snapshot);
        };
        assert!(players.iter().all(|p| p.id != gone));
        assert_eq!(players.len(), 2);
    }

    #[test]
    fn test_late_update_does_not_resurrect_departed_player() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut a, a_link) = harness.connect();
        let (mut b, b_link) = harness.connect();

        let gone = b_link.to_string();
        b.disconnect(b_link);
        harness.frame();

        send(&mut a, a_link, &update_for(&gone, 1.0, 1.0, 1.0));
        harness.frame();

        assert!(!harness.server.players().contains(&gone));
    }

    #[test]
    fn test_malformed_message_is_discarded() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut client, link) = harness.connect();
        let identity = link.to_string();

        client
            .send(link, br#"{"cmd":99,"player":{"id":"x"}}"#)
            .unwrap();
        client.send(link, b"not json").unwrap();
        send(&mut client, link, &update_for(&identity, 1.0, 2.0, 3.0));
        harness.frame();

        assert!(harness.server.connections().is_live(link));
        assert_eq!(
            harness.server.players().get(&identity),
            Some(Vector3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn test_wrong_direction_messages_are_ignored() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut client, link) = harness.connect();
        let identity = link.to_string();

        send(
            &mut client,
            link,
            &Message::DroppedClient {
                player: PlayerState::with_id(identity.clone()),
            },
        );
        send(
            &mut client,
            link,
            &Message::ServerUpdate {
                players: vec![PlayerState::new("z", Vector3::new(1.0, 0.0, 0.0))],
            },
        );
        harness.frame();

        assert!(harness.server.players().contains(&identity));
        assert!(!harness.server.players().contains("z"));
    }

    #[test]
    fn test_run_loop_serves_connections() {
        let mut harness = Harness::new(ServerConfig::default());
        let mut client = harness.network.client();
        let link = client.connect("loopback").unwrap();

        let server = &mut harness.server;
        let result = tokio_test::block_on(async {
            tokio::time::timeout(Duration::from_millis(50), server.run()).await
        });
        assert!(result.is_err());

        let messages = drain(&mut client, link);
        assert_eq!(
            messages.first(),
            Some(&Message::Handshake {
                player: PlayerState::with_id(link.to_string())
            })
        );
        assert!(messages
            .iter()
            .any(|m| matches!(m, Message::ServerUpdate { .. })));
    }

    /// Accepts queued connections and rejects every snapshot as oversized
    #[derive(Default)]
    struct TightTransport {
        pending: VecDeque<ConnectionId>,
        snapshot_attempts: usize,
    }

    impl ServerTransport for TightTransport {
        fn update(&mut self) {}

        fn accept(&mut self) -> Option<ConnectionId> {
            self.pending.pop_front()
        }

        fn pop_event(&mut self, _connection: ConnectionId) -> Option<NetEvent> {
            None
        }

        fn send(
            &mut self,
            _connection: ConnectionId,
            payload: &[u8],
        ) -> Result<(), TransportError> {
            match decode(payload) {
                Ok(Message::ServerUpdate { .. }) => {
                    self.snapshot_attempts += 1;
                    Err(TransportError::PayloadTooLarge(payload.len()))
                }
                _ => Ok(()),
            }
        }

        fn disconnect(&mut self, _connection: ConnectionId) {}
    }

    #[test]
    fn test_oversized_snapshot_aborts_broadcast() {
        let transport = TightTransport {
            pending: (1..=3).map(ConnectionId).collect(),
            ..TightTransport::default()
        };
        let mut server = Server::new(transport, ServerConfig::default());
        let mut now = Instant::now();
        server.start(now);

        server.update(now);
        assert_eq!(server.connections().len(), 3);
        assert_eq!(server.transport.snapshot_attempts, 1);
        assert!(server.snapshot_oversized);

        now += server.config.sync_interval;
        server.update(now);
        assert_eq!(server.transport.snapshot_attempts, 2);
        assert!(server.snapshot_oversized);
    }

    #[test]
    fn test_shutdown_disconnects_everyone() {
        let mut harness = Harness::new(ServerConfig::default());
        let (mut client, link) = harness.connect();
        drain(&mut client, link);

        harness.server.shutdown();

        assert!(harness.server.connections().is_empty());
        assert!(harness.server.players().is_empty());
        assert_eq!(client.pop_event(link), Some(NetEvent::Disconnect));
        assert_eq!(harness.network.open_connections(), 0);
    }
}
