//! Connection-oriented datagram transport over UDP
//!
//! A background task per socket receives datagrams and forwards them over an
//! unbounded channel; everything else (connection bookkeeping, keepalives,
//! timeout detection) happens synchronously inside `update`. Every datagram
//! carries one bincode-encoded `Frame`. Delivery is best effort: nothing is
//! acknowledged or retransmitted except the connect request.

use super::{ClientTransport, ConnectionId, NetEvent, ServerTransport, TransportError};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Largest datagram either side sends or accepts
pub const MAX_DATAGRAM_SIZE: usize = 8192;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
enum Frame {
    Connect,
    Accept { connection: u32 },
    Data(Vec<u8>),
    Heartbeat,
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Idle time after which a keepalive is sent (also the connect retry period)
    pub heartbeat_interval: Duration,
    /// Silence after which a peer is considered gone
    pub timeout: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        }
    }
}

fn spawn_receiver(
    socket: Arc<UdpSocket>,
    inbound: mpsc::UnboundedSender<(Frame, SocketAddr)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            match socket.recv_from(&mut buffer).await {
                Ok((len, addr)) => match deserialize::<Frame>(&buffer[..len]) {
                    Ok(frame) => {
                        if inbound.send((frame, addr)).is_err() {
                            // Transport dropped
                            break;
                        }
                    }
                    Err(_) => warn!("Failed to deserialize datagram from {}", addr),
                },
                Err(e) => {
                    debug!("Error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    })
}

fn send_frame(socket: &UdpSocket, frame: &Frame, addr: SocketAddr) -> Result<(), TransportError> {
    let data = serialize(frame)?;
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(TransportError::PayloadTooLarge(data.len()));
    }
    match socket.try_send_to(&data, addr) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            debug!(
                "Socket not writable; dropped {} frame to {}",
                frame_kind(frame),
                addr
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn frame_kind(frame: &Frame) -> &'static str {
    match frame {
        Frame::Connect => "connect",
        Frame::Accept { .. } => "accept",
        Frame::Data(_) => "data",
        Frame::Heartbeat => "heartbeat",
        Frame::Disconnect => "disconnect",
    }
}

#[derive(Debug)]
struct Peer {
    addr: SocketAddr,
    last_seen: Instant,
    last_sent: Instant,
    events: VecDeque<NetEvent>,
    closed: bool,
}

/// Listening UDP endpoint
pub struct UdpServerTransport {
    socket: Arc<UdpSocket>,
    inbound: mpsc::UnboundedReceiver<(Frame, SocketAddr)>,
    receiver: JoinHandle<()>,
    config: UdpConfig,
    peers: HashMap<ConnectionId, Peer>,
    by_addr: HashMap<SocketAddr, ConnectionId>,
    pending_accepts: VecDeque<ConnectionId>,
    next_connection: u32,
}

impl UdpServerTransport {
    /// Binds the listening socket; failure here is fatal for a server
    pub async fn bind(addr: &str, config: UdpConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        // Non-blocking sends fail until the reactor has seen the socket writable
        socket.writable().await?;
        let socket = Arc::new(socket);
        info!("Listening on {}", socket.local_addr()?);

        let (tx, inbound) = mpsc::unbounded_channel();
        let receiver = spawn_receiver(Arc::clone(&socket), tx);

        Ok(Self {
            socket,
            inbound,
            receiver,
            config,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            pending_accepts: VecDeque::new(),
            next_connection: 1,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    fn handle_frame(&mut self, frame: Frame, addr: SocketAddr, now: Instant) {
        if let Frame::Connect = frame {
            let connection = match self.by_addr.get(&addr) {
                // Retransmitted request; the earlier accept was probably lost
                Some(existing) => *existing,
                None => {
                    let connection = ConnectionId(self.next_connection);
                    self.next_connection += 1;
                    self.peers.insert(
                        connection,
                        Peer {
                            addr,
                            last_seen: now,
                            last_sent: now,
                            events: VecDeque::new(),
                            closed: false,
                        },
                    );
                    self.by_addr.insert(addr, connection);
                    self.pending_accepts.push_back(connection);
                    debug!("Connection {} requested from {}", connection, addr);
                    connection
                }
            };

            let accept = Frame::Accept {
                connection: connection.0,
            };
            if let Err(e) = send_frame(&self.socket, &accept, addr) {
                error!("Failed to accept connection from {}: {}", addr, e);
            }
            return;
        }

        let Some(connection) = self.by_addr.get(&addr).copied() else {
            debug!("Ignoring datagram from unknown peer {}", addr);
            return;
        };
        let Some(peer) = self.peers.get_mut(&connection) else {
            return;
        };
        peer.last_seen = now;

        match frame {
            Frame::Data(payload) => peer.events.push_back(NetEvent::Data(payload)),
            Frame::Heartbeat => {}
            Frame::Disconnect => {
                peer.events.push_back(NetEvent::Disconnect);
                peer.closed = true;
                self.by_addr.remove(&addr);
            }
            Frame::Accept { .. } => warn!("Unexpected accept frame from {}", addr),
            Frame::Connect => {}
        }
    }
}

impl ServerTransport for UdpServerTransport {
    fn update(&mut self) {
        let now = Instant::now();

        while let Ok((frame, addr)) = self.inbound.try_recv() {
            self.handle_frame(frame, addr, now);
        }

        for (connection, peer) in self.peers.iter_mut() {
            if peer.closed {
                continue;
            }

            if now.duration_since(peer.last_seen) > self.config.timeout {
                info!("Connection {} timed out", connection);
                peer.events.push_back(NetEvent::Disconnect);
                peer.closed = true;
                self.by_addr.remove(&peer.addr);
                continue;
            }

            if now.duration_since(peer.last_sent) >= self.config.heartbeat_interval {
                if let Err(e) = send_frame(&self.socket, &Frame::Heartbeat, peer.addr) {
                    debug!("Failed to send heartbeat to {}: {}", connection, e);
                }
                peer.last_sent = now;
            }
        }
    }

    fn accept(&mut self) -> Option<ConnectionId> {
        self.pending_accepts.pop_front()
    }

    fn pop_event(&mut self, connection: ConnectionId) -> Option<NetEvent> {
        let peer = self.peers.get_mut(&connection)?;
        let event = peer.events.pop_front();

        if event == Some(NetEvent::Disconnect) {
            self.peers.remove(&connection);
        }

        event
    }

    fn send(&mut self, connection: ConnectionId, payload: &[u8]) -> Result<(), TransportError> {
        let peer = self
            .peers
            .get_mut(&connection)
            .filter(|peer| !peer.closed)
            .ok_or(TransportError::UnknownConnection(connection))?;

        send_frame(&self.socket, &Frame::Data(payload.to_vec()), peer.addr)?;
        peer.last_sent = Instant::now();
        Ok(())
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        if let Some(peer) = self.peers.remove(&connection) {
            if !peer.closed {
                if let Err(e) = send_frame(&self.socket, &Frame::Disconnect, peer.addr) {
                    debug!("Failed to notify {} of disconnect: {}", connection, e);
                }
                self.by_addr.remove(&peer.addr);
            }
        }
    }
}

impl Drop for UdpServerTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Connecting,
    Connected,
    Closed,
}

#[derive(Debug)]
struct Link {
    id: ConnectionId,
    server: SocketAddr,
    state: LinkState,
    started: Instant,
    last_seen: Instant,
    last_sent: Instant,
    events: VecDeque<NetEvent>,
}

/// Connecting UDP endpoint holding at most one connection
pub struct UdpClientTransport {
    socket: Arc<UdpSocket>,
    inbound: mpsc::UnboundedReceiver<(Frame, SocketAddr)>,
    receiver: JoinHandle<()>,
    config: UdpConfig,
    link: Option<Link>,
    next_connection: u32,
}

impl UdpClientTransport {
    pub async fn bind(local_addr: &str, config: UdpConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: local_addr.to_string(),
                source,
            })?;
        socket.writable().await?;
        let socket = Arc::new(socket);

        let (tx, inbound) = mpsc::unbounded_channel();
        let receiver = spawn_receiver(Arc::clone(&socket), tx);

        Ok(Self {
            socket,
            inbound,
            receiver,
            config,
            link: None,
            next_connection: 1,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    fn close_link(link: &mut Link) {
        link.state = LinkState::Closed;
        link.events.push_back(NetEvent::Disconnect);
    }

    fn handle_frame(&mut self, frame: Frame, addr: SocketAddr, now: Instant) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if addr != link.server || link.state == LinkState::Closed {
            return;
        }
        link.last_seen = now;

        match frame {
            Frame::Accept { connection } => {
                if link.state == LinkState::Connecting {
                    debug!("Server accepted us as connection {}", connection);
                    link.state = LinkState::Connected;
                    link.events.push_back(NetEvent::Connect);
                }
            }
            Frame::Data(payload) => {
                // Data before the accept means the accept frame was lost
                if link.state == LinkState::Connecting {
                    link.state = LinkState::Connected;
                    link.events.push_back(NetEvent::Connect);
                }
                link.events.push_back(NetEvent::Data(payload));
            }
            Frame::Heartbeat => {}
            Frame::Disconnect => Self::close_link(link),
            Frame::Connect => warn!("Unexpected connect frame from {}", addr),
        }
    }
}

impl ClientTransport for UdpClientTransport {
    fn update(&mut self) {
        let now = Instant::now();

        while let Ok((frame, addr)) = self.inbound.try_recv() {
            self.handle_frame(frame, addr, now);
        }

        let Some(link) = self.link.as_mut() else {
            return;
        };

        match link.state {
            LinkState::Connecting => {
                if now.duration_since(link.started) > self.config.timeout {
                    warn!("Connection attempt to {} timed out", link.server);
                    Self::close_link(link);
                } else if now.duration_since(link.last_sent) >= self.config.heartbeat_interval {
                    if let Err(e) = send_frame(&self.socket, &Frame::Connect, link.server) {
                        debug!("Failed to resend connect request: {}", e);
                    }
                    link.last_sent = now;
                }
            }
            LinkState::Connected => {
                if now.duration_since(link.last_seen) > self.config.timeout {
                    info!("Connection to {} timed out", link.server);
                    Self::close_link(link);
                } else if now.duration_since(link.last_sent) >= self.config.heartbeat_interval {
                    if let Err(e) = send_frame(&self.socket, &Frame::Heartbeat, link.server) {
                        debug!("Failed to send heartbeat: {}", e);
                    }
                    link.last_sent = now;
                }
            }
            LinkState::Closed => {}
        }
    }

    fn connect(&mut self, address: &str) -> Result<ConnectionId, TransportError> {
        let server = address
            .to_socket_addrs()
            .map_err(|_| TransportError::Resolve(address.to_string()))?
            .next()
            .ok_or_else(|| TransportError::Resolve(address.to_string()))?;

        if let Some(previous) = self.link.as_ref().map(|link| link.id) {
            self.disconnect(previous);
        }

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;

        let now = Instant::now();
        send_frame(&self.socket, &Frame::Connect, server)?;
        self.link = Some(Link {
            id,
            server,
            state: LinkState::Connecting,
            started: now,
            last_seen: now,
            last_sent: now,
            events: VecDeque::new(),
        });

        Ok(id)
    }

    fn pop_event(&mut self, connection: ConnectionId) -> Option<NetEvent> {
        let link = self.link.as_mut().filter(|link| link.id == connection)?;
        let event = link.events.pop_front();

        if event == Some(NetEvent::Disconnect) {
            self.link = None;
        }

        event
    }

    fn send(&mut self, connection: ConnectionId, payload: &[u8]) -> Result<(), TransportError> {
        let link = self
            .link
            .as_mut()
            .filter(|link| link.id == connection)
            .ok_or(TransportError::UnknownConnection(connection))?;

        if link.state != LinkState::Connected {
            return Err(TransportError::NotConnected);
        }

        send_frame(&self.socket, &Frame::Data(payload.to_vec()), link.server)?;
        link.last_sent = Instant::now();
        Ok(())
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        let Some(link) = self.link.take() else {
            return;
        };
        if link.id != connection {
            self.link = Some(link);
            return;
        }

        if link.state != LinkState::Closed {
            if let Err(e) = send_frame(&self.socket, &Frame::Disconnect, link.server) {
                debug!("Failed to notify server of disconnect: {}", e);
            }
        }
    }
}

impl Drop for UdpClientTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}
