//! # Replica Client Library
//!
//! This library provides the client side of an authoritative RTS session. The
//! client never decides anything about its own player state: it mirrors what
//! the server replicates and asks the server for construction.
//!
//! ## Architecture Overview
//!
//! ### One-Way Replication
//! Ownership and gold arrive from the server. The local ownership registry
//! listens only for entities owned by this connection. The gold replica has
//! no setter at all and only accepts updates minted by the server's ledger.
//!
//! ### Placement Preview
//! Before sending a construction request the client can run the same
//! placement validator as the server against its replicated world. The
//! preview is advisory; the server re-validates everything.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The replicated player state and world view:
//! - Local ownership bridge and registry
//! - Read-only gold replica with change notifications
//! - Replica world used for placement previews
//!
//! ### Orders Module (`orders`)
//! Parsing of scripted construction orders (`id@x,y,z`).
//!
//! ### Network Module (`network`)
//! UDP transport, heartbeats and order issuing.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let options = ClientOptions {
//!         orders: vec!["2@5,0,0".parse()?],
//!         ..ClientOptions::default()
//!     };
//!     let mut client = Client::new("127.0.0.1:8080", options).await?;
//!     client.run().await?;
//!
//!     println!("Gold left: {}", client.game_state().gold());
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
pub mod orders;
