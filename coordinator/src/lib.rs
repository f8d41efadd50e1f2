//! # Matchmaking Coordinator Library
//!
//! Players connect here over TCP and ask for a match. The coordinator keeps a
//! fixed list of simulation servers, polls each of them for its phase, and as
//! soon as two players are waiting and one server is idle it prepares that
//! server and hands each player an address and a token.
//!
//! ## Module Organization
//!
//! ### Fleet Module (`fleet`)
//! Configured server addresses and the last phase each one reported.
//!
//! ### Queue Module (`queue`)
//! First-in first-out queue of searching clients.
//!
//! ### Link Module (`link`)
//! One-shot UDP request/reply exchanges with a simulation server, behind the
//! `ServerLink` trait so matchmaking can be exercised without sockets.
//!
//! ### Coordinator Module (`coordinator`)
//! Shared state, health checks and the matchmaking cycle.
//!
//! ### Network Module (`network`)
//! The TCP listener and per-connection reader and writer tasks.

pub mod coordinator;
pub mod fleet;
pub mod link;
pub mod network;
pub mod queue;
