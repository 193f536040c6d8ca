//! # Snake Duel Server Library
//!
//! This library provides the authoritative server for a two-lane multiplayer
//! Snake match. Each of the two player slots plays on its own board; the
//! boards only interact through debuffs, which a player drops onto the
//! opponent's board by eating food.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server advances both boards on a fixed tick, resolves wall and
//! self collisions, spawns food and debuffs, and decides the outcome of the
//! match. Clients only send heading changes and render what they are told.
//!
//! ### Match Lifecycle
//! A match moves through waiting, countdown, running and game over. After a
//! game over both occupants must agree before a new countdown starts; an AI
//! opponent always agrees.
//!
//! ### Client Management
//! Handles the lifecycle of client connections including:
//! - Connection tracking keyed by socket address
//! - Binding at most one occupant to each slot
//! - Heartbeat-driven timeout detection
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All match mutations happen on one `tokio::select!` loop in
//! [`network::Server::run`]: incoming packets, timeouts, countdown steps and
//! ticks are handled strictly one after another. Network I/O runs in
//! separate tasks connected through channels.
//!
//! ### Epoch-Tagged Timers
//! The match owns at most one timer handle. Arming a new one bumps its
//! epoch, and firings carrying an older epoch are ignored, so a tick from a
//! previous round can never reach a new one.
//!
//! ## Module Organization
//!
//! - `oracle`: random free-cell sampling
//! - `board`, `resolver`: per-slot state and the movement rules
//! - `ai`: the scripted opponent
//! - `game`: the match aggregate (slots, phase, timer)
//! - `lifecycle`: the state machine driving the match
//! - `client_manager`: sessions and slot bindings
//! - `score`: final score persistence
//! - `config`: match tuning
//! - `network`: UDP transport and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::MatchConfig;
//! use server::network::Server;
//! use server::score::LogScoreSink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         MatchConfig::default(),
//!         16,
//!         Box::new(LogScoreSink),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod ai;
pub mod board;
pub mod client_manager;
pub mod config;
pub mod game;
pub mod lifecycle;
pub mod network;
pub mod oracle;
pub mod resolver;
pub mod score;
