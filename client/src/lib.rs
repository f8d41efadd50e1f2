//! # Pong Client Library
//!
//! A thin player client. It asks the coordinator for a match over TCP, joins
//! the assigned simulation server over UDP, forwards paddle direction changes
//! and draws whatever frame the server sent last.
//!
//! The client does no simulation of its own. Frames are applied only when they
//! carry the client's own token and are not older than the frame already on
//! screen, which is all the ordering the unreliable game channel needs.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Match assignment, connection status and the frame filter.
//!
//! ### Input Module (`input`)
//! Arrow keys to paddle direction, reporting only changes.
//!
//! ### Network Module (`network`)
//! Coordinator search, server join, keep-alives and the receive loop.
//!
//! ### Rendering Module (`rendering`)
//! Court, paddles, ball, score line and status text with macroquad.

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
