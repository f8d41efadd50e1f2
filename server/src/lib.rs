//! # Simulation Server Library
//!
//! This library provides the authoritative match server for two-player pong.
//! One process hosts exactly one match: it hands its token pair to the
//! coordinator, admits the two players that present those tokens, and then
//! runs the physics loop and streams state to both of them.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! The server moves through `Waiting -> Preparing -> Started -> Finished` and
//! never goes back. Queries are answered in every phase so the coordinator can
//! poll availability; everything else is only accepted in its own phase.
//!
//! ### Authoritative Simulation
//! Clients only ever send a paddle direction. Ball movement, paddle positions,
//! collisions and scoring are all decided here on a fixed tick.
//!
//! ### State Broadcasting
//! Every tick the current frame is sent to both players, stamped with the
//! recipient's own token. Frames carry a monotonically increasing counter so
//! clients can drop datagrams that arrive out of order.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Token pair generation, phase transitions, seat registration, and the
//! match end conditions (score limit and idle players).
//!
//! ### Game Module (`game`)
//! Ball and paddle physics for a single tick, including wall bounces, paddle
//! deflection and scoring.
//!
//! ### Network Module (`network`)
//! UDP socket handling and the main event loop that interleaves incoming
//! requests with physics ticks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::session::SessionConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig {
//!         secret: Some("change-me".to_string()),
//!         max_score: Some(11),
//!         idle_timeout: Some(Duration::from_secs(10)),
//!     };
//!
//!     // 128 Hz physics
//!     let mut server = Server::new("0.0.0.0:5001", config, Duration::from_micros(7812)).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
pub mod session;
