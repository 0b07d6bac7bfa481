//! # Position Sync Client
//!
//! Client side of the position-synchronization protocol. The client opens one
//! connection, learns its identity from the server's handshake and from then
//! on reports its own position on a fixed interval. Snapshots from the server
//! are reconciled into a local shadow of every other player.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! `ShadowWorld`, the client's view of all players. Remote players are created
//! the first time a snapshot names them and moved on later snapshots. They
//! only disappear when the server sends `DroppedClient`. The own player is
//! authored locally and never overwritten by the network.
//!
//! ### Network Module (`network`)
//! `Client`, which drains transport events, dispatches decoded messages and
//! runs the position reporter after each drain.
//!
//! ### Presenter Module (`presenter`)
//! `PlayerPresenter` receives create, move and remove notifications so a
//! front end can draw players. `LogPresenter` is the headless default.
//!
//! ### Input Module (`input`)
//! `MovementSource` implementations that author the own player's position.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::input::Wanderer;
//! use client::network::Client;
//! use client::presenter::LogPresenter;
//! use shared::transport::{UdpClientTransport, UdpConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = UdpClientTransport::bind("0.0.0.0:0", UdpConfig::default()).await?;
//!     let mut client = Client::new(transport, LogPresenter, ClientConfig::default());
//!     client.connect("127.0.0.1:8080")?;
//!     client.run(&mut Wanderer::new(2.0, None)).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod game;
pub mod input;
pub mod network;
pub mod presenter;
