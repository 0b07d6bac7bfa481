//! # Position Sync Server
//!
//! Authoritative side of the position-synchronization protocol. The server
//! accepts connections, binds each one to a player identity, keeps the last
//! reported position of every player and broadcasts the full player list to
//! everyone on a fixed interval.
//!
//! ## Connection Lifecycle
//!
//! A newly accepted connection is registered, sent a `Handshake` carrying its
//! identity and given a player entry at the origin, all within the frame that
//! accepted it. The next snapshot therefore already lists the newcomer, even
//! before the client has processed its handshake. When the transport reports
//! a disconnect, the connection and its player are removed and every
//! remaining client is told with a `DroppedClient` message.
//!
//! ## Frame Loop
//!
//! Everything runs from one loop. Each frame drains transport events in
//! delivery order, then sends a `ServerUpdate` if the broadcast interval has
//! elapsed. Broadcasts are unconditional: a snapshot goes out every interval
//! whether or not anything moved.
//!
//! ## Trust
//!
//! By default the id inside a `PlayerUpdate` is taken at face value, so any
//! client can move any player. `IdentityPolicy::Bound` restricts updates to
//! the identity bound to the sending connection.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use shared::transport::{UdpConfig, UdpServerTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = UdpServerTransport::bind("0.0.0.0:8080", UdpConfig::default()).await?;
//!     let mut server = Server::new(transport, ServerConfig::default());
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
