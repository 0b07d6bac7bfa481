//! Integration tests driving real clients against a real server
//!
//! Most tests run over the in-memory loopback transport with a hand-advanced
//! clock, so every frame is deterministic. One test exercises the UDP
//! transport end to end.

use assert_approx_eq::assert_approx_eq;
use client::config::ClientConfig;
use client::network::{Client, ClientState};
use client::presenter::PlayerPresenter;
use server::config::{IdentityPolicy, ServerConfig};
use server::network::Server;
use shared::transport::{LoopbackClientTransport, LoopbackNetwork, LoopbackServerTransport};
use shared::{ClientTransport, Vector3, SYNC_INTERVAL};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Created(String, Vector3),
    Moved(String, Vector3),
    Removed(String),
}

#[derive(Default)]
struct Recorder {
    calls: Vec<Call>,
}

impl Recorder {
    fn removals_of(&self, id: &str) -> usize {
        self.calls
            .iter()
            .filter(|call| **call == Call::Removed(id.to_string()))
            .count()
    }
}

impl PlayerPresenter for Recorder {
    fn on_player_created(&mut self, id: &str, position: Vector3) {
        self.calls.push(Call::Created(id.to_string(), position));
    }

    fn on_player_moved(&mut self, id: &str, position: Vector3) {
        self.calls.push(Call::Moved(id.to_string(), position));
    }

    fn on_player_removed(&mut self, id: &str) {
        self.calls.push(Call::Removed(id.to_string()));
    }
}

type TestClient = Client<LoopbackClientTransport, Recorder>;

/// Server plus clients sharing one loopback network and one clock
struct Session {
    network: LoopbackNetwork,
    server: Server<LoopbackServerTransport>,
    clients: Vec<TestClient>,
    now: Instant,
}

impl Session {
    fn new(config: ServerConfig) -> Self {
        let network = LoopbackNetwork::new();
        let mut server = Server::new(network.server(), config);
        let now = Instant::now();
        server.start(now);

        Self {
            network,
            server,
            clients: Vec::new(),
            now,
        }
    }

    fn join(&mut self) -> usize {
        let mut client = Client::new(
            self.network.client(),
            Recorder::default(),
            ClientConfig::default(),
        );
        client.connect("loopback").unwrap();
        self.clients.push(client);
        self.clients.len() - 1
    }

    /// Runs enough frames at the current instant for messages to cross both ways
    fn settle(&mut self) {
        for _ in 0..3 {
            self.server.update(self.now);
            for client in &mut self.clients {
                client.update(self.now);
            }
        }
    }

    /// Moves the clock to the next broadcast and settles
    fn tick(&mut self) {
        self.now += SYNC_INTERVAL;
        self.settle();
    }

    fn client(&self, index: usize) -> &TestClient {
        &self.clients[index]
    }

    fn id_of(&self, index: usize) -> String {
        self.clients[index].world().self_id().unwrap().to_string()
    }
}

mod lifecycle_tests {
    use super::*;

    /// Joining clients learn their identity and see each other at the origin
    #[test]
    fn clients_discover_each_other() {
        let mut session = Session::new(ServerConfig::default());
        let a = session.join();
        let b = session.join();
        session.settle();

        let a_id = session.id_of(a);
        let b_id = session.id_of(b);
        assert_ne!(a_id, b_id);

        for index in [a, b] {
            assert_eq!(session.client(index).state(), ClientState::Active);
            assert_eq!(session.client(index).world().len(), 2);
        }
        assert_eq!(session.client(a).world().get(&b_id), Some(Vector3::ZERO));
        assert_eq!(
            session.client(b).presenter().calls,
            vec![
                Call::Created(b_id.clone(), Vector3::ZERO),
                Call::Created(a_id.clone(), Vector3::ZERO),
            ]
        );
    }

    /// A locally authored move reaches the other client through report and broadcast
    #[test]
    fn movement_propagates_to_other_clients() {
        let mut session = Session::new(ServerConfig::default());
        let a = session.join();
        let b = session.join();
        session.settle();
        let a_id = session.id_of(a);

        let target = Vector3::new(1.5, 0.0, -2.0);
        session.clients[a].set_local_position(target);
        session.tick();
        session.tick();

        let stored = session.server.players().get(&a_id).unwrap();
        let seen = session.client(b).world().get(&a_id).unwrap();
        for position in [stored, seen] {
            assert_approx_eq!(position.x, 1.5);
            assert_approx_eq!(position.y, 0.0);
            assert_approx_eq!(position.z, -2.0);
        }
        assert!(session
            .client(b)
            .presenter()
            .calls
            .contains(&Call::Moved(a_id.clone(), target)));
        assert_eq!(session.client(a).world().self_position(), Some(target));
    }

    /// Leaving produces exactly one removal on every remaining client
    #[test]
    fn departure_is_announced_once() {
        let mut session = Session::new(ServerConfig::default());
        let a = session.join();
        let b = session.join();
        let c = session.join();
        session.settle();
        let c_id = session.id_of(c);

        session.clients[c].shutdown();
        session.settle();
        session.tick();
        session.tick();

        assert!(!session.server.players().contains(&c_id));
        for index in [a, b] {
            assert!(!session.client(index).world().contains(&c_id));
            assert_eq!(session.client(index).presenter().removals_of(&c_id), 1);
        }
        assert_eq!(session.client(c).state(), ClientState::Closed);
    }

    /// A connection lost underneath both sides closes the client and frees the server slot
    #[test]
    fn severed_connection_is_cleaned_up() {
        let mut session = Session::new(ServerConfig::default());
        let a = session.join();
        let b = session.join();
        session.settle();
        let b_id = session.id_of(b);
        let b_link = session.client(b).connection().unwrap();

        session.network.sever(b_link);
        session.settle();

        assert_eq!(session.client(b).state(), ClientState::Closed);
        assert!(!session.server.connections().is_live(b_link));
        assert!(!session.client(a).world().contains(&b_id));
        assert_eq!(session.network.open_connections(), 1);
    }

    /// Snapshots keep flowing even when nothing moves
    #[test]
    fn idle_session_keeps_broadcasting() {
        let mut session = Session::new(ServerConfig::default());
        let a = session.join();
        session.settle();

        for _ in 0..5 {
            session.tick();
        }

        assert_eq!(session.client(a).state(), ClientState::Active);
        assert_eq!(session.server.players().len(), 1);
        assert!(session
            .client(a)
            .presenter()
            .calls
            .iter()
            .all(|call| !matches!(call, Call::Moved(..))));
    }
}

mod trust_tests {
    use super::*;
    use shared::{encode, Message, PlayerState};

    fn forge_update(session: &mut Session, from: usize, victim: &str, position: Vector3) {
        let link = session.client(from).connection().unwrap();
        let bytes = encode(&Message::PlayerUpdate {
            player: PlayerState::new(victim, position),
        })
        .unwrap();
        session.clients[from]
            .transport_mut()
            .send(link, &bytes)
            .unwrap();
    }

    #[test]
    fn trusted_policy_lets_any_client_move_any_player() {
        let mut session = Session::new(ServerConfig::default());
        let a = session.join();
        let b = session.join();
        session.settle();
        let b_id = session.id_of(b);

        forge_update(&mut session, a, &b_id, Vector3::new(7.0, 0.0, 0.0));
        session.server.update(session.now);

        assert_eq!(
            session.server.players().get(&b_id),
            Some(Vector3::new(7.0, 0.0, 0.0))
        );
    }

    #[test]
    fn bound_policy_keeps_players_with_their_connection() {
        let config = ServerConfig {
            identity_policy: IdentityPolicy::Bound,
            ..ServerConfig::default()
        };
        let mut session = Session::new(config);
        let a = session.join();
        let b = session.join();
        session.settle();
        let b_id = session.id_of(b);

        forge_update(&mut session, a, &b_id, Vector3::new(7.0, 0.0, 0.0));
        session.tick();

        assert_eq!(session.server.players().get(&b_id), Some(Vector3::ZERO));
        assert_eq!(session.client(a).world().get(&b_id), Some(Vector3::ZERO));
    }

    /// Unknown command kinds are dropped without disturbing later traffic
    #[test]
    fn unknown_command_is_discarded() {
        let mut session = Session::new(ServerConfig::default());
        let a = session.join();
        session.settle();
        let a_id = session.id_of(a);
        let link = session.client(a).connection().unwrap();

        let unknown = serde_json::json!({
            "cmd": 99,
            "player": { "id": "x", "cubPos": { "x": 1.0, "y": 1.0, "z": 1.0 } }
        });
        session.clients[a]
            .transport_mut()
            .send(link, unknown.to_string().as_bytes())
            .unwrap();
        session.clients[a].set_local_position(Vector3::new(0.0, 2.0, 0.0));
        session.tick();

        assert!(!session.server.players().contains("x"));
        assert_eq!(
            session.server.players().get(&a_id),
            Some(Vector3::new(0.0, 2.0, 0.0))
        );
        assert!(session.server.connections().is_live(link));
    }
}

mod udp_tests {
    use super::*;
    use shared::transport::{UdpClientTransport, UdpConfig, UdpServerTransport};
    use std::time::Duration;
    use tokio::time::sleep;

    /// Two clients find each other and see a departure over real sockets
    #[tokio::test]
    async fn udp_session_end_to_end() {
        let transport = UdpServerTransport::bind("127.0.0.1:0", UdpConfig::default())
            .await
            .unwrap();
        let address = transport.local_addr().unwrap().to_string();
        let fast = Duration::from_millis(20);
        let mut server = Server::new(
            transport,
            ServerConfig {
                sync_interval: fast,
                ..ServerConfig::default()
            },
        );
        server.start(Instant::now());

        let client_config = ClientConfig {
            report_interval: fast,
            ..ClientConfig::default()
        };
        let mut clients = Vec::new();
        for _ in 0..2 {
            let transport = UdpClientTransport::bind("127.0.0.1:0", UdpConfig::default())
                .await
                .unwrap();
            let mut client = Client::new(transport, Recorder::default(), client_config.clone());
            client.connect(&address).unwrap();
            clients.push(client);
        }

        let mut frames = 0;
        while clients.iter().any(|c| c.world().len() < 2) {
            assert!(frames < 400, "clients never discovered each other");
            server.update(Instant::now());
            for client in &mut clients {
                client.update(Instant::now());
            }
            sleep(Duration::from_millis(5)).await;
            frames += 1;
        }

        let leaver = clients[1].world().self_id().unwrap().to_string();
        clients[1].shutdown();

        let mut frames = 0;
        while clients[0].world().contains(&leaver) {
            assert!(frames < 400, "departure was never announced");
            server.update(Instant::now());
            clients[0].update(Instant::now());
            sleep(Duration::from_millis(5)).await;
            frames += 1;
        }

        assert_eq!(clients[0].presenter().removals_of(&leaver), 1);
        assert!(!server.players().contains(&leaver));
    }
}
