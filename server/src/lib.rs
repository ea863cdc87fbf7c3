//! # Authority Server Library
//!
//! This library provides the authoritative server for a real-time strategy
//! session. It owns the canonical per-player state (who owns which units and
//! buildings, how much gold each player has) and decides every construction
//! request on behalf of its clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Player State
//! Each connection gets a gold account, an ownership record and a starting
//! base when it joins. All of it is torn down again when the connection
//! leaves or times out.
//!
//! ### Placement Validation
//! Construction requests run a single pass through template lookup,
//! affordability, overlap and range checks before anything is committed.
//! Rejected requests leave no state behind and are not answered.
//!
//! ### Replication
//! Spawns and despawns are broadcast to every client, while balance changes
//! go only to the client that owns the account.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Connection tracking, id assignment, team colours and timeout detection.
//!
//! ### World Module (`world`)
//! The spatial world: entity colliders, terrain and overlap queries.
//!
//! ### Session Module (`session`)
//! The player-state core tying ledger, ownership bridge, world and catalog
//! together, including the placement pipeline.
//!
//! ### Replication Module (`replication`)
//! Outbound seam from the session to the transport.
//!
//! ### Network Module (`network`)
//! UDP transport with receiver, sender and timeout tasks around one event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!
//!     // Runs until a shutdown message arrives or a contract violation occurs
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;
pub mod replication;
pub mod session;
pub mod world;
