//! Client protocol dispatch and periodic position reporting

use crate::config::ClientConfig;
use crate::connection::ConnectionSlot;
use crate::game::ShadowWorld;
use crate::input::MovementSource;
use crate::presenter::PlayerPresenter;
use log::{debug, error, info, warn};
use shared::{
    decode, encode, ClientTransport, ConnectionId, Message, NetEvent, Periodic, PlayerState,
    TransportError, Vector3,
};
use std::time::Instant;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No connection attempted yet
    Idle,
    /// Connected or connecting, waiting for the server's handshake
    Pending,
    /// Identity known, reporting position
    Active,
    /// Connection lost or shut down; never reopened
    Closed,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client already left the idle state ({0:?}); connections are not reopened")]
    AlreadyStarted(ClientState),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Client holding one server connection and its shadow of the world
pub struct Client<T: ClientTransport, P: PlayerPresenter> {
    transport: T,
    presenter: P,
    config: ClientConfig,
    connection: ConnectionSlot,
    state: ClientState,
    world: ShadowWorld,
    reporter: Periodic,
}

impl<T: ClientTransport, P: PlayerPresenter> Client<T, P> {
    pub fn new(transport: T, presenter: P, config: ClientConfig) -> Self {
        let reporter = Periodic::new(config.report_interval);
        Self {
            transport,
            presenter,
            config,
            connection: ConnectionSlot::new(),
            state: ClientState::Idle,
            world: ShadowWorld::new(),
            reporter,
        }
    }

    /// Opens the connection; the client stays `Pending` until the handshake arrives
    ///
    /// A client connects once. Any state other than `Idle` is rejected.
    pub fn connect(&mut self, address: &str) -> Result<ConnectionId, ClientError> {
        if self.state != ClientState::Idle {
            return Err(ClientError::AlreadyStarted(self.state));
        }

        let connection = self.transport.connect(address)?;
        self.connection.set_connection(connection);
        self.state = ClientState::Pending;
        info!("Connecting to {}", address);
        Ok(connection)
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn world(&self) -> &ShadowWorld {
        &self.world
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection.current()
    }

    /// Records the locally authored position of the own player
    pub fn set_local_position(&mut self, position: Vector3) -> bool {
        self.world.set_self_position(position)
    }

    /// Runs one frame: drain events, then report the own position if due
    pub fn update(&mut self, now: Instant) {
        self.transport.update();

        if let Some(connection) = self.connection.current() {
            while let Some(event) = self.transport.pop_event(connection) {
                match event {
                    NetEvent::Connect => self.on_connect(connection),
                    NetEvent::Data(bytes) => self.on_data(&bytes, now),
                    NetEvent::Disconnect => {
                        self.on_disconnect(connection);
                        break;
                    }
                }
            }
        }

        if self.reporter.poll(now) {
            self.report_position();
        }
    }

    /// Sends the own position; skipped while the own player is unresolvable
    pub fn report_position(&mut self) {
        let (Some(connection), Some(id), Some(position)) = (
            self.connection.current(),
            self.world.self_id(),
            self.world.self_position(),
        ) else {
            debug!("Own player not resolvable; skipping report");
            return;
        };

        let message = Message::PlayerUpdate {
            player: PlayerState::new(id, position),
        };
        let bytes = match encode(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };

        if let Err(e) = self.transport.send(connection, &bytes) {
            error!("Failed to report position: {}", e);
        }
    }

    /// Drives frames until the connection closes, moving the own player with `movement`
    pub async fn run(&mut self, movement: &mut impl MovementSource) {
        let mut frame = interval(self.config.frame_interval);
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        while self.state != ClientState::Closed {
            frame.tick().await;
            let now = Instant::now();
            let dt = now.duration_since(last).as_secs_f32();
            last = now;

            if let Some(position) = self.world.self_position() {
                self.world.set_self_position(movement.step(position, dt));
            }

            self.update(now);
        }

        info!("Client stopped");
    }

    /// Closes the connection and stops reporting
    pub fn shutdown(&mut self) {
        self.reporter.stop();
        if let Some(connection) = self.connection.clear() {
            self.transport.disconnect(connection);
            info!("Disconnected from server");
        }
        self.state = ClientState::Closed;
    }

    fn on_connect(&mut self, connection: ConnectionId) {
        info!("Transport connected as connection {}", connection);
    }

    fn on_data(&mut self, bytes: &[u8], now: Instant) {
        let message = match decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Discarding message from server: {}", e);
                return;
            }
        };

        match message {
            Message::Handshake { player } => self.on_handshake(player, now),
            Message::ServerUpdate { players } => self.on_server_update(&players),
            Message::DroppedClient { player } => self.on_dropped_client(&player.id),
            Message::PlayerUpdate { player } => {
                warn!("Unexpected PlayerUpdate for {} from server", player.id);
            }
        }
    }

    fn on_handshake(&mut self, player: PlayerState, now: Instant) {
        if self.state != ClientState::Pending {
            warn!("Ignoring handshake for {} in state {:?}", player.id, self.state);
            return;
        }

        info!("Handshake received, playing as {}", player.id);
        self.world.spawn_self(&player.id, Vector3::ZERO, &mut self.presenter);
        self.state = ClientState::Active;
        self.reporter.start(now);
    }

    fn on_server_update(&mut self, players: &[PlayerState]) {
        let Some(self_id) = self.world.self_id().map(str::to_owned) else {
            debug!("Snapshot before handshake; ignoring");
            return;
        };
        self.world.apply_snapshot(players, &self_id, &mut self.presenter);
    }

    fn on_dropped_client(&mut self, id: &str) {
        if self.world.self_id() == Some(id) {
            warn!("Server reported own player {} as dropped; ignoring", id);
            return;
        }

        if self.world.remove(id, &mut self.presenter) {
            info!("Player {} disconnected", id);
        } else {
            warn!("Dropped player {} was never seen", id);
        }
    }

    fn on_disconnect(&mut self, connection: ConnectionId) {
        self.connection.clear();
        self.reporter.stop();
        self.state = ClientState::Closed;
        info!("Connection {} to server closed", connection);
    }
}
