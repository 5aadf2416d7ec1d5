//! # Session Server Library
//!
//! This library provides the authoritative server for a shared 2D space where
//! clients register as named players, stream their positions to each other and
//! exchange moderated, rate-limited chat messages.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! Every WebSocket connection becomes a session that moves through a small
//! state machine:
//! - `Connected`: the connection is open and has received the seed
//! - `Active`: a `new player` request was accepted and a player is bound
//! - `Disconnected`: the transport closed; the player and presence entry are gone
//!
//! Events that arrive for a session in the wrong state are dropped without
//! side effects.
//!
//! ### Shared State
//! The player registry, the presence map and the chat log are process-wide and
//! start empty. They are never persisted.
//!
//! ### Fan-out
//! Membership changes re-broadcast the full presence map and roster to every
//! session. Position updates go to everyone but the sender. Chat goes to
//! everyone.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! Connection tasks never touch shared state. They forward frames to one main
//! loop that owns the [`hub::Hub`], so every mutation is serialised. This is
//! what keeps username registration check-then-set atomic: two sessions
//! racing for the same name are handled strictly one after the other.
//!
//! ### Admission Pipeline
//! Inbound events pass through, in order:
//! 1. shape validation (`shared::ClientEvent::decode`)
//! 2. rate limiting keyed by client IP ([`rate_limiter`])
//! 3. session state checks ([`session`])
//! 4. moderation for usernames and chat text ([`moderation`])
//! 5. registry and presence mutation, then fan-out ([`broadcast`])
//!
//! Any stage may reject. Rejections are terminal drops; only `invalid username`
//! and `username taken` are signaled back to the sender.
//!
//! ## Module Organization
//!
//! - `broadcast`: audiences, deliveries and per-connection outbound queues
//! - `chat`: append-only chat log
//! - `config`: command line and environment configuration
//! - `error`: rejection taxonomy
//! - `hub`: the session state machine over all shared state
//! - `moderation`: wordlist and leetspeak screening
//! - `network`: WebSocket accept loop, connection tasks and the main loop
//! - `presence`: "who is online" projection
//! - `rate_limiter`: fixed-window admission control
//! - `registry`: session to player map with unique usernames
//! - `session`: per-connection lifecycle record
//!
//! ## Scalability
//! Each join or leave re-sends the full presence map and roster, which is O(n)
//! per membership change. The chat log grows for the lifetime of the process.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         host: "127.0.0.1".to_string(),
//!         port: 8080,
//!         max_connections: 64,
//!     };
//!
//!     let mut server = Server::new(&config, rand::random()).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod chat;
pub mod config;
pub mod error;
pub mod hub;
pub mod moderation;
pub mod network;
pub mod presence;
pub mod rate_limiter;
pub mod registry;
pub mod session;
